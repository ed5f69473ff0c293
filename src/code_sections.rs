//! Building the named, sized section table of a file list.

use crate::{
    Result,
    object::ObjectFile,
    runner::CommandRunner,
    section::{FileList, Section, SectionList},
    toolchain::Toolchain,
};
use std::collections::HashMap;

/// Appends one [`Section`] per named section per file, in file order.
///
/// Sizes and addresses are left at zero. Pre-existing entries in `sections`
/// are never cleared or reordered; this operation is purely additive.
pub fn store_names<R: CommandRunner>(
    sections: &mut SectionList,
    files: &FileList,
    toolchain: &mut Toolchain<R>,
) -> Result<()> {
    for file in files {
        for name in ObjectFile::named_sections(toolchain, file)? {
            sections.push(Section::new(file, &name));
        }
    }
    log::debug!("discovered {} sections in {} files", sections.len(), files.len());
    Ok(())
}

/// Fills in the byte size of every section from its source file.
///
/// Each distinct file is measured once. A section absent from its file's
/// measured output keeps size zero, the sentinel for "not present"; that is
/// never a failure.
pub fn store_sizes<R: CommandRunner>(
    sections: &mut SectionList,
    toolchain: &mut Toolchain<R>,
) -> Result<()> {
    let mut measured: HashMap<String, HashMap<String, usize>> = HashMap::new();
    for section in sections.iter_mut() {
        let Some((file, name)) = section
            .split_path()
            .map(|(file, name)| (file.to_string(), name.to_string()))
        else {
            continue;
        };
        if !measured.contains_key(&file) {
            let inventory = ObjectFile::inventory(toolchain, &file)?;
            let table = inventory
                .sections
                .into_iter()
                .map(|info| (info.name, info.size))
                .collect();
            measured.insert(file.clone(), table);
        }
        section.size = measured[&file].get(&name).copied().unwrap_or(0);
    }
    Ok(())
}
