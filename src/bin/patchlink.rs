//! Command-line front end for the patchlink pipeline.
//!
//! `patchlink` either builds a reusable injection archive (`--build-lib`) or
//! runs the full pipeline: compile the injection sources, resolve section
//! addresses inside the target's free memory regions, splice in the
//! trampoline stubs, and write the merged machine-word stream as a patch
//! listing (one `address word` hex pair per line, ascending).

use getopts::{Fail, Options};
use patchlink::{
    Arguments, Builder, ConfigParser, Error, SystemRunner,
    config::{OPT_AR, OPT_CONFIG, OPT_INJECT, OPT_OUTPUT, OPT_SCRATCH, OPT_TARGET},
};
use std::{env, fs, io::Write as _};

/// Types of commands
enum Command {
    /// Build the output archive only.
    BuildLib(Arguments),
    /// Run the full pipeline and write the patch listing to the given path.
    Patch(Arguments, String),
    Usage,
}

/// Entrypoint for the patcher
fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = get_opts();
    let usage = opts.usage(&format!("Usage: {program} [OPTIONS]"));

    match parse_options(opts, args) {
        Ok(Command::BuildLib(arguments)) => exit_on_error(run_build_lib(&arguments)),
        Ok(Command::Patch(arguments, listing)) => {
            exit_on_error(run_patch(&arguments, &listing))
        }
        Ok(Command::Usage) => {
            println!("{usage}");
            std::process::exit(exitcode::OK);
        }
        Err(fail) => {
            eprintln!("{fail}");
            println!("{usage}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

fn run_build_lib(arguments: &Arguments) -> Result<(), Error> {
    let mut builder = Builder::new(arguments, SystemRunner)?;
    builder.build_library()
}

fn run_patch(arguments: &Arguments, listing: &str) -> Result<(), Error> {
    let mut builder = Builder::new(arguments, SystemRunner)?;

    let source_dir = arguments.require(OPT_INJECT)?.to_string();
    let includes = arguments.includes.clone();
    let libs = arguments.libs.clone();

    let objects = builder.get_object_files(&source_dir, &includes, &libs)?;
    let mut sections = builder.get_section_addresses(&objects)?;
    builder.add_stack_setup(&mut sections);
    let mut code = builder.get_linked_code(&sections)?;
    builder.add_original_instruction(&mut code)?;

    let mut out = Vec::with_capacity(code.len() * 18);
    for &(address, word) in &code {
        writeln!(out, "{address:08x} {word:08x}").expect("write to Vec cannot fail");
    }
    fs::write(listing, out).map_err(|err| Error::Io {
        msg: format!("cannot write patch listing `{listing}`: {err}").into(),
    })?;
    println!("wrote {} words to `{listing}`", code.len());
    Ok(())
}

fn exit_on_error(result: Result<(), Error>) {
    match result {
        Ok(()) => std::process::exit(exitcode::OK),
        Err(err) => {
            eprintln!("fatal: {err}");
            let status = match err {
                Error::Config { .. } => exitcode::CONFIG,
                Error::Parse { .. } | Error::NotFound { .. } => exitcode::DATAERR,
                Error::Tool { .. } => exitcode::SOFTWARE,
                Error::Patch { .. } => exitcode::DATAERR,
                Error::Io { .. } => exitcode::IOERR,
            };
            std::process::exit(status);
        }
    }
}

/// Get 'Options'
fn get_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "config", "configuration file", "FILE");
    opts.optopt("t", "target", "numeric target identifier", "ID");
    opts.optopt("i", "inject", "directory of sources to inject", "DIR");
    opts.optopt("a", "ar", "archiver executable", "PATH");
    opts.optopt("o", "output", "output archive path", "FILE");
    opts.optopt("p", "patch-out", "patch listing output path", "FILE");
    opts.optopt("", "scratch", "scratch directory for link intermediates", "DIR");
    opts.optmulti("l", "lib", "additional library archive", "FILE");
    opts.optmulti("I", "include", "additional include directory", "DIR");
    opts.optflag("", "build-lib", "only build the output archive");
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Option parser
fn parse_options(opts: Options, args: Vec<String>) -> Result<Command, Fail> {
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") {
        return Ok(Command::Usage);
    }
    if let Some(stray) = matches.free.first() {
        return Err(Fail::UnrecognizedOption(stray.clone()));
    }

    let mut arguments = Arguments::new();
    for (flag, key) in [
        ("config", OPT_CONFIG),
        ("target", OPT_TARGET),
        ("inject", OPT_INJECT),
        ("ar", OPT_AR),
        ("output", OPT_OUTPUT),
        ("scratch", OPT_SCRATCH),
    ] {
        if let Some(value) = matches.opt_str(flag) {
            arguments.set_option(key, &value);
        }
    }
    arguments.libs = matches.opt_strs("lib");
    arguments.includes = matches.opt_strs("include");

    if let Err(err) = ConfigParser::parse(&mut arguments) {
        eprintln!("fatal: {err}");
        std::process::exit(exitcode::CONFIG);
    }

    if matches.opt_present("build-lib") {
        return Ok(Command::BuildLib(arguments));
    }
    let listing = matches
        .opt_str("patch-out")
        .unwrap_or_else(|| String::from("patchlink.out"));
    Ok(Command::Patch(arguments, listing))
}
