//! Structural section listings of object files and archives.
//!
//! The listing comes from the external section-header dump; nothing here
//! opens the binary itself. A plain object yields its section names as found;
//! an archive yields each member's names suffixed with the member's
//! zero-based index, so names are globally unique within one file.

use crate::{Result, error::parse_error, runner::CommandRunner, toolchain::Toolchain};
use bitflags::bitflags;

bitflags! {
    /// Section attributes parsed from the dump's flag list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const CONTENTS = 1 << 0;
        const ALLOC = 1 << 1;
        const LOAD = 1 << 2;
        const RELOC = 1 << 3;
        const READONLY = 1 << 4;
        const CODE = 1 << 5;
        const DATA = 1 << 6;
        const DEBUGGING = 1 << 7;
    }
}

impl SectionFlags {
    /// Parses a comma-separated flag list such as
    /// `CONTENTS, ALLOC, LOAD, READONLY, CODE`. Unknown flags are ignored.
    pub fn parse(desc: &str) -> Self {
        let mut flags = SectionFlags::empty();
        for token in desc.split(',').map(str::trim) {
            flags |= match token {
                "CONTENTS" => SectionFlags::CONTENTS,
                "ALLOC" => SectionFlags::ALLOC,
                "LOAD" => SectionFlags::LOAD,
                "RELOC" => SectionFlags::RELOC,
                "READONLY" => SectionFlags::READONLY,
                "CODE" => SectionFlags::CODE,
                "DATA" => SectionFlags::DATA,
                "DEBUGGING" => SectionFlags::DEBUGGING,
                _ => SectionFlags::empty(),
            };
        }
        flags
    }
}

/// One section of an inventoried file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Exposed name: leading dot stripped, member index appended for
    /// archive members.
    pub name: String,
    /// Name exactly as dumped, used to select the section in link scripts.
    pub raw: String,
    /// Index of the owning archive member; `None` for plain objects.
    pub member: Option<usize>,
    /// Section size in bytes.
    pub size: usize,
    /// Virtual address recorded in the section table.
    pub vma: u32,
    /// Parsed attribute flags.
    pub flags: SectionFlags,
}

/// The parsed section structure of one object file, archive, or image.
#[derive(Debug, Default)]
pub struct Inventory {
    /// Path the inventory was taken from.
    pub path: String,
    /// Whether the file is an archive of member objects.
    pub is_archive: bool,
    /// Member object names in archive order; empty for plain objects.
    pub members: Vec<String>,
    /// Exposed sections, in discovery order.
    pub sections: Vec<SectionInfo>,
}

impl Inventory {
    /// Looks up an exposed section by name.
    pub fn section(&self, name: &str) -> Option<&SectionInfo> {
        self.sections.iter().find(|info| info.name == name)
    }
}

/// Enumerates the named sections present in object files and archives.
pub struct ObjectFile;

impl ObjectFile {
    /// Returns the exposed section names of `path`, in discovery order.
    ///
    /// Plain objects yield unsuffixed names; archive members are suffixed
    /// with the member's zero-based index. Debug and symbol-table sections
    /// are not exposed.
    pub fn named_sections<R: CommandRunner>(
        toolchain: &mut Toolchain<R>,
        path: &str,
    ) -> Result<Vec<String>> {
        let inventory = Self::inventory(toolchain, path)?;
        Ok(inventory
            .sections
            .into_iter()
            .map(|info| info.name)
            .collect())
    }

    /// Captures and parses the full section inventory of `path`.
    pub fn inventory<R: CommandRunner>(
        toolchain: &mut Toolchain<R>,
        path: &str,
    ) -> Result<Inventory> {
        let dump = toolchain.section_headers(path)?;
        parse_dump(path, &dump)
    }
}

/// Parses a section-header dump into an [`Inventory`].
pub fn parse_dump(path: &str, dump: &str) -> Result<Inventory> {
    let mut inventory = Inventory {
        path: path.to_string(),
        ..Inventory::default()
    };
    let mut member: Option<usize> = None;
    let mut lines = dump.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("In archive") {
            inventory.is_archive = true;
            continue;
        }
        if let Some(name) = object_header(trimmed) {
            if inventory.is_archive {
                inventory.members.push(name.to_string());
                member = Some(inventory.members.len() - 1);
            } else {
                member = None;
            }
            continue;
        }
        let Some((raw, size, vma)) = section_row(trimmed) else {
            continue;
        };
        // The attribute list sits on its own line directly below the row.
        let flags = lines
            .next_if(|next| section_row(next.trim()).is_none() && !next.trim().is_empty())
            .map(SectionFlags::parse)
            .unwrap_or_else(SectionFlags::empty);
        let normalized = raw.strip_prefix('.').unwrap_or(raw);
        if !flags.contains(SectionFlags::CONTENTS)
            || flags.contains(SectionFlags::DEBUGGING)
            || normalized == "comment"
        {
            continue;
        }
        let name = match member {
            Some(index) if inventory.is_archive => format!("{normalized}{index}"),
            _ => normalized.to_string(),
        };
        inventory.sections.push(SectionInfo {
            name,
            raw: raw.to_string(),
            member,
            size,
            vma,
            flags,
        });
    }
    if inventory.members.is_empty() && !inventory.is_archive && !dump.contains("file format") {
        return Err(parse_error(format!(
            "`{path}` is not a recognized object or archive dump"
        )));
    }
    Ok(inventory)
}

/// Matches a `name:     file format <format>` object header line.
fn object_header(line: &str) -> Option<&str> {
    let (name, rest) = line.split_once(':')?;
    rest.trim_start()
        .starts_with("file format")
        .then_some(name.trim())
}

/// Matches a section-table row: `Idx Name Size VMA ...` with numeric index,
/// returning `(name, size, vma)`.
fn section_row(line: &str) -> Option<(&str, usize, u32)> {
    let mut tokens = line.split_whitespace();
    let index = tokens.next()?;
    if index.parse::<usize>().is_err() {
        return None;
    }
    let name = tokens.next()?;
    let size = usize::from_str_radix(tokens.next()?, 16).ok()?;
    let vma = u32::from_str_radix(tokens.next()?, 16).ok()?;
    Some((name, size, vma))
}
