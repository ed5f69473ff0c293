//! Shared test support: a canned-output CommandRunner and dump builders.
#![allow(dead_code)]

use patchlink::{CommandRunner, Result, ToolOutput};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A [`CommandRunner`] that serves canned tool output instead of spawning
/// the cross toolchain.
///
/// Section-header dumps are keyed by file path; extraction payloads by
/// output-section name. Compile/archive/link invocations create their output
/// files so the pipeline's file plumbing stays observable.
#[derive(Default, Debug)]
pub struct MockRunner {
    dumps: HashMap<String, String>,
    payloads: HashMap<String, Vec<u8>>,
    /// Every invocation, joined as `program arg arg …`.
    pub log: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dump(&mut self, path: &str, dump: String) {
        self.dumps.insert(path.to_string(), dump);
    }

    pub fn add_payload(&mut self, section: &str, bytes: Vec<u8>) {
        self.payloads.insert(section.to_string(), bytes);
    }

    fn failure(message: String) -> ToolOutput {
        ToolOutput {
            status: 1,
            stdout: Vec::new(),
            stderr: message.into_bytes(),
        }
    }

    fn success() -> ToolOutput {
        ToolOutput {
            status: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

impl CommandRunner for MockRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<ToolOutput> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{program} {}", args.join(" ")));
        let tool = program.rsplit('/').next().unwrap_or(program);

        if tool.ends_with("objdump") {
            let path = &args[1];
            return Ok(match self.dumps.get(path) {
                Some(text) => ToolOutput {
                    status: 0,
                    stdout: text.clone().into_bytes(),
                    stderr: Vec::new(),
                },
                None => Self::failure(format!("{path}: file format not recognized")),
            });
        }
        if tool.ends_with("objcopy") {
            let section = args
                .iter()
                .find_map(|arg| arg.strip_prefix("--only-section="))
                .expect("objcopy invocation without --only-section");
            let dest = args.last().unwrap();
            return Ok(match self.payloads.get(section) {
                Some(bytes) => {
                    fs::write(dest, bytes).unwrap();
                    Self::success()
                }
                None => Self::failure(format!("section {section} not found")),
            });
        }
        if tool.ends_with("gcc") || tool.ends_with("ld") {
            if let Some(pos) = args.iter().position(|arg| arg == "-o") {
                fs::write(&args[pos + 1], b"").unwrap();
            }
            return Ok(Self::success());
        }
        if tool.ends_with("ar") {
            if args.first().map(String::as_str) == Some("rcs") {
                fs::write(&args[1], b"!<arch>\n").unwrap();
            }
            return Ok(Self::success());
        }
        Ok(Self::success())
    }
}

/// A per-test scratch directory under the system temp dir.
pub fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("patchlink-test-{}-{name}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn section_table(sections: &[(&str, usize, u32)]) -> String {
    let mut text = String::from(
        "Sections:\nIdx Name          Size      VMA       LMA       File off  Algn\n",
    );
    for (index, (name, size, vma)) in sections.iter().enumerate() {
        text.push_str(&format!(
            "  {index} {name:<13} {size:08x}  {vma:08x}  {vma:08x}  00000034  2**2\n"
        ));
        text.push_str("                  CONTENTS, ALLOC, LOAD, READONLY, CODE\n");
    }
    text
}

/// A section-header dump of a plain object file (all addresses zero).
pub fn object_dump(path: &str, sections: &[(&str, usize)]) -> String {
    let rows: Vec<(&str, usize, u32)> =
        sections.iter().map(|&(name, size)| (name, size, 0)).collect();
    format!(
        "\n{path}:     file format elf32-powerpc\n\n{}",
        section_table(&rows)
    )
}

/// A section-header dump of an archive: one table per member, in order.
pub fn archive_dump(path: &str, members: &[(&str, &[(&str, usize)])]) -> String {
    let mut text = format!("In archive {path}:\n");
    for (member, sections) in members {
        let rows: Vec<(&str, usize, u32)> =
            sections.iter().map(|&(name, size)| (name, size, 0)).collect();
        text.push_str(&format!(
            "\n{member}:     file format elf32-powerpc\n\n{}",
            section_table(&rows)
        ));
    }
    text
}

/// A section-header dump of a linked image with resolved addresses.
pub fn image_dump(path: &str, sections: &[(&str, usize, u32)]) -> String {
    format!(
        "\n{path}:     file format elf32-powerpc\n\n{}",
        section_table(sections)
    )
}

/// Encodes words as big-endian section contents.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/// A deterministic filler payload of `count` words tagged with `tag`.
pub fn filler_words(tag: u32, count: usize) -> Vec<u32> {
    (0..count as u32).map(|index| (tag << 16) | index).collect()
}
