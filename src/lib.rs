//! # patchlink
//! A purpose-built static linker and patcher for PowerPC code injection.
//! ## Usage
//! patchlink compiles a directory of C sources with a cross toolchain, merges
//! the resulting objects with precompiled archives, resolves final addresses
//! inside the free memory regions of a fixed target image, and emits a
//! flattened, address-ordered stream of 32-bit machine words ready to be
//! written into the target's memory.
//! ## Example
//! ```no_run
//! use patchlink::{Arguments, Builder, ConfigParser, SystemRunner};
//!
//! let mut args = Arguments::new();
//! args.set_option("ar", "powerpc-eabi-ar");
//! args.set_option("output", "libinject.a");
//! args.set_option("inject", "inject-src");
//! args.set_option("config", "patchlink.ini");
//! args.set_option("target", "2");
//! ConfigParser::parse(&mut args).unwrap();
//!
//! let mut builder = Builder::new(&args, SystemRunner).unwrap();
//! let objects = builder
//!     .get_object_files("inject-src", &["include".into()], &[])
//!     .unwrap();
//! let mut sections = builder.get_section_addresses(&objects).unwrap();
//! builder.add_stack_setup(&mut sections);
//! let mut code = builder.get_linked_code(&sections).unwrap();
//! builder.add_original_instruction(&mut code).unwrap();
//! ```

pub mod arch;
pub mod builder;
pub mod code_sections;
pub mod config;
mod error;
pub mod object;
pub mod runner;
pub mod section;
pub mod toolchain;

pub use builder::Builder;
pub use config::{Arguments, ConfigParser, MemRegion, TargetLayout};
pub use error::Error;
pub use runner::{CommandRunner, SystemRunner, ToolOutput};
pub use section::{AsmCode, FileList, Section, SectionList};
pub use toolchain::Toolchain;

pub type Result<T> = core::result::Result<T, Error>;
