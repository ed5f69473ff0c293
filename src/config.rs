//! The configuration bundle consumed by the pipeline.
//!
//! [`Arguments`] collects command-line options, library archives, and include
//! directories; [`ConfigParser`] fills in the per-target memory layout from an
//! INI-style configuration file:
//!
//! ```ini
//! [target.2]
//! inject-address = 0x80377998
//! original-instruction = 0x7ee3bb78
//! regions = 0x803fa3e8-0x803fa724, 0x803001dc-0x80300288
//! ; optional tool overrides
//! compiler = powerpc-eabi-gcc
//! cflags = -O2 -ffreestanding
//! ```

use crate::{
    Result,
    error::{config_error, io_error},
};
use std::collections::HashMap;
use std::fs;

/// Archiver executable path.
pub const OPT_AR: &str = "ar";
/// Output archive path.
pub const OPT_OUTPUT: &str = "output";
/// Directory of sources to inject.
pub const OPT_INJECT: &str = "inject";
/// Configuration file path.
pub const OPT_CONFIG: &str = "config";
/// Numeric target identifier.
pub const OPT_TARGET: &str = "target";
/// Compiler executable override.
pub const OPT_COMPILER: &str = "compiler";
/// Linker executable override.
pub const OPT_LINKER: &str = "linker";
/// Section dump executable override.
pub const OPT_OBJDUMP: &str = "objdump";
/// Section extraction executable override.
pub const OPT_OBJCOPY: &str = "objcopy";
/// Extra compiler flags, whitespace separated.
pub const OPT_CFLAGS: &str = "cflags";
/// Scratch directory for link intermediates.
pub const OPT_SCRATCH: &str = "scratch";

/// Option keys that must be present before any pipeline operation runs.
pub const REQUIRED_OPTIONS: [&str; 5] = [OPT_AR, OPT_OUTPUT, OPT_INJECT, OPT_CONFIG, OPT_TARGET];

/// A free region of target memory usable for injected code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    /// First usable address.
    pub start: u32,
    /// One past the last usable address.
    pub end: u32,
}

impl MemRegion {
    /// Region size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Whether the region spans no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The fixed memory layout of one supported target image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    /// Address of the instruction replaced by the inject-point branch.
    pub inject_address: u32,
    /// The instruction originally at the injection address in the unmodified
    /// image.
    pub original_instruction: u32,
    /// Free memory regions, in configuration order. The first region hosts
    /// the stack-setup stub.
    pub regions: Vec<MemRegion>,
}

/// The structured configuration bundle.
///
/// Created once per invocation; the pipeline only reads it.
#[derive(Debug, Default)]
pub struct Arguments {
    options: HashMap<String, String>,
    /// Extra library archives, in input order.
    pub libs: Vec<String>,
    /// Extra include directories, in input order.
    pub includes: Vec<String>,
    layouts: HashMap<u32, TargetLayout>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option value, replacing any previous value for the key.
    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    /// Sets an option value only if the key is not already set.
    ///
    /// Configuration-file values go through here so that command-line
    /// options win.
    pub fn set_default_option(&mut self, key: &str, value: &str) {
        self.options
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Looks up an option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Looks up an option value, failing when the key is absent.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.option(key)
            .ok_or_else(|| config_error(format!("required option `{key}` is not set")))
    }

    /// The numeric target identifier from the `target` option.
    pub fn target_id(&self) -> Result<u32> {
        let raw = self.require(OPT_TARGET)?;
        parse_u32(raw)
            .ok_or_else(|| config_error(format!("target identifier `{raw}` is not a number")))
    }

    /// Installs the memory layout for a target identifier.
    pub fn set_layout(&mut self, id: u32, layout: TargetLayout) {
        self.layouts.insert(id, layout);
    }

    /// The memory layout selected by the `target` option.
    pub fn layout(&self) -> Result<&TargetLayout> {
        let id = self.target_id()?;
        self.layouts
            .get(&id)
            .ok_or_else(|| config_error(format!("no memory layout configured for target {id}")))
    }
}

/// Parses the INI-style configuration file into an [`Arguments`] bundle.
pub struct ConfigParser;

impl ConfigParser {
    /// Reads the file named by the `config` option and installs its
    /// contents into `args`.
    pub fn parse(args: &mut Arguments) -> Result<()> {
        let path = args.require(OPT_CONFIG)?.to_string();
        let text = fs::read_to_string(&path)
            .map_err(|err| io_error(format!("cannot read config file `{path}`: {err}")))?;
        Self::parse_str(args, &text)
    }

    /// Installs configuration text into `args`.
    ///
    /// Target sections (`[target.N]`) become memory layouts; every other
    /// `key = value` line becomes a default option, so command-line values
    /// take precedence.
    pub fn parse_str(args: &mut Arguments, text: &str) -> Result<()> {
        let mut current: Option<(u32, PartialLayout)> = None;
        for (number, raw_line) in text.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| config_error(format!("line {}: unterminated section header", number + 1)))?;
                if let Some((id, partial)) = current.take() {
                    args.set_layout(id, partial.finish(id)?);
                }
                let id = name
                    .strip_prefix("target.")
                    .and_then(parse_u32)
                    .ok_or_else(|| {
                        config_error(format!("line {}: unknown section `[{name}]`", number + 1))
                    })?;
                current = Some((id, PartialLayout::default()));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(config_error(format!(
                    "line {}: expected `key = value`, got `{line}`",
                    number + 1
                )));
            };
            let (key, value) = (key.trim(), value.trim());
            match &mut current {
                Some((_, partial)) if partial.accepts(key) => partial.set(key, value)?,
                _ => args.set_default_option(key, value),
            }
        }
        if let Some((id, partial)) = current.take() {
            args.set_layout(id, partial.finish(id)?);
        }
        Ok(())
    }
}

/// Layout fields accumulated while walking one `[target.N]` section.
#[derive(Default)]
struct PartialLayout {
    inject_address: Option<u32>,
    original_instruction: Option<u32>,
    regions: Vec<MemRegion>,
}

impl PartialLayout {
    fn accepts(&self, key: &str) -> bool {
        matches!(key, "inject-address" | "original-instruction" | "regions")
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "inject-address" => {
                self.inject_address = Some(parse_u32(value).ok_or_else(|| {
                    config_error(format!("inject-address `{value}` is not a number"))
                })?);
            }
            "original-instruction" => {
                self.original_instruction = Some(parse_u32(value).ok_or_else(|| {
                    config_error(format!("original-instruction `{value}` is not a number"))
                })?);
            }
            "regions" => {
                for range in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    self.regions.push(parse_region(range)?);
                }
            }
            _ => unreachable!("checked by accepts"),
        }
        Ok(())
    }

    fn finish(self, id: u32) -> Result<TargetLayout> {
        let inject_address = self
            .inject_address
            .ok_or_else(|| config_error(format!("target {id}: missing inject-address")))?;
        let original_instruction = self
            .original_instruction
            .ok_or_else(|| config_error(format!("target {id}: missing original-instruction")))?;
        if self.regions.is_empty() {
            return Err(config_error(format!("target {id}: no memory regions")));
        }
        Ok(TargetLayout {
            inject_address,
            original_instruction,
            regions: self.regions,
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_u32(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

fn parse_region(range: &str) -> Result<MemRegion> {
    let parse = || -> Option<MemRegion> {
        let (start, end) = range.split_once('-')?;
        let region = MemRegion {
            start: parse_u32(start)?,
            end: parse_u32(end)?,
        };
        (region.start < region.end).then_some(region)
    };
    parse().ok_or_else(|| config_error(format!("malformed memory region `{range}`")))
}
