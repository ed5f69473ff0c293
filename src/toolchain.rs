//! The native toolchain boundary.
//!
//! [`Toolchain`] formats the concrete compiler, archiver, linker, and binutil
//! invocations the pipeline needs and hands them to a [`CommandRunner`]. It
//! owns no parsing beyond file plumbing; callers interpret the captured text.

use crate::{
    Result,
    config::{
        Arguments, OPT_AR, OPT_CFLAGS, OPT_COMPILER, OPT_LINKER, OPT_OBJCOPY, OPT_OBJDUMP,
    },
    error::{io_error, tool_error},
    runner::{CommandRunner, ToolOutput},
};
use std::fs;
use std::path::Path;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        const EXE_SUFFIX: &str = ".exe";
    } else {
        const EXE_SUFFIX: &str = "";
    }
}

/// Default executable name for a tool of the PowerPC cross toolchain.
fn default_tool(base: &str) -> String {
    format!("powerpc-eabi-{base}{EXE_SUFFIX}")
}

/// Concrete tool invocations over a [`CommandRunner`].
#[derive(Debug)]
pub struct Toolchain<R> {
    runner: R,
    compiler: String,
    archiver: String,
    linker: String,
    objdump: String,
    objcopy: String,
    cflags: Vec<String>,
}

impl<R: CommandRunner> Toolchain<R> {
    /// Resolves tool paths from `args`, falling back to the `powerpc-eabi-`
    /// prefixed defaults.
    pub fn from_args(args: &Arguments, runner: R) -> Self {
        let tool = |key: &str, base: &str| {
            args.option(key)
                .map(str::to_string)
                .unwrap_or_else(|| default_tool(base))
        };
        Toolchain {
            runner,
            compiler: tool(OPT_COMPILER, "gcc"),
            archiver: tool(OPT_AR, "ar"),
            linker: tool(OPT_LINKER, "ld"),
            objdump: tool(OPT_OBJDUMP, "objdump"),
            objcopy: tool(OPT_OBJCOPY, "objcopy"),
            cflags: args
                .option(OPT_CFLAGS)
                .map(|flags| flags.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    fn run_checked(&mut self, program: &str, args: Vec<String>, what: &str) -> Result<ToolOutput> {
        let output = self.runner.run(program, &args)?;
        if !output.success() {
            return Err(tool_error(format!(
                "{what} failed: `{program}` exited with status {}: {}",
                output.status,
                output.stderr_excerpt()
            )));
        }
        Ok(output)
    }

    /// Compiles (or assembles) one source file into `object`.
    pub fn compile(&mut self, source: &str, object: &str, includes: &[String]) -> Result<()> {
        let mut args = vec!["-c".into(), source.into(), "-o".into(), object.into()];
        for include in includes {
            args.push("-I".into());
            args.push(include.clone());
        }
        args.extend(self.cflags.iter().cloned());
        let compiler = self.compiler.clone();
        self.run_checked(&compiler, args, &format!("compiling `{source}`"))?;
        Ok(())
    }

    /// Archives `inputs` into `output`, replacing any previous archive.
    pub fn archive(&mut self, output: &str, inputs: &[String]) -> Result<()> {
        let mut args = vec!["rcs".to_string(), output.to_string()];
        args.extend(inputs.iter().cloned());
        let archiver = self.archiver.clone();
        self.run_checked(&archiver, args, &format!("archiving into `{output}`"))?;
        Ok(())
    }

    /// Extracts every member of `archive` into `dest`.
    pub fn extract_archive(&mut self, archive: &str, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|err| io_error(format!("cannot create `{}`: {err}", dest.display())))?;
        let args = vec![
            "x".to_string(),
            archive.to_string(),
            "--output".to_string(),
            dest.display().to_string(),
        ];
        let archiver = self.archiver.clone();
        self.run_checked(&archiver, args, &format!("extracting members of `{archive}`"))?;
        Ok(())
    }

    /// Links `inputs` under the given script into `output`, discarding input
    /// sections unreachable from the entry point.
    pub fn link(&mut self, output: &str, script: &str, inputs: &[String]) -> Result<()> {
        let mut args = vec![
            "-o".to_string(),
            output.to_string(),
            "-T".to_string(),
            script.to_string(),
            "--gc-sections".to_string(),
        ];
        args.extend(inputs.iter().cloned());
        let linker = self.linker.clone();
        self.run_checked(&linker, args, &format!("linking `{output}`"))?;
        Ok(())
    }

    /// Captures the section-header dump of an object, archive, or image.
    pub fn section_headers(&mut self, path: &str) -> Result<String> {
        let objdump = self.objdump.clone();
        let output = self.run_checked(
            &objdump,
            vec!["-h".to_string(), path.to_string()],
            &format!("dumping section headers of `{path}`"),
        )?;
        output.stdout_text()
    }

    /// Extracts the raw contents of one named section of `image` via `dest`.
    pub fn extract_section(&mut self, image: &str, section: &str, dest: &Path) -> Result<Vec<u8>> {
        let args = vec![
            "-O".to_string(),
            "binary".to_string(),
            format!("--only-section={section}"),
            image.to_string(),
            dest.display().to_string(),
        ];
        let objcopy = self.objcopy.clone();
        self.run_checked(
            &objcopy,
            args,
            &format!("extracting section `{section}` of `{image}`"),
        )?;
        fs::read(dest).map_err(|err| {
            io_error(format!(
                "cannot read extracted section `{}`: {err}",
                dest.display()
            ))
        })
    }
}
