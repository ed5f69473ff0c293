//! The end-to-end pipeline producing the final patch stream.
//!
//! [`Builder`] owns the stages in order: compile the injection sources,
//! resolve every section's address inside the target's free memory regions
//! by driving the external linker, splice in the trampoline stubs, and merge
//! everything into one address-ordered stream of machine words.

use crate::{
    Result, arch, code_sections,
    config::{Arguments, OPT_INJECT, OPT_OUTPUT, OPT_SCRATCH, REQUIRED_OPTIONS, TargetLayout},
    error::{config_error, io_error, not_found_error, parse_error},
    object::{Inventory, ObjectFile},
    runner::CommandRunner,
    section::{AsmCode, FileList, Section, SectionList},
    toolchain::Toolchain,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Guard gap in bytes left between consecutively placed sections.
pub const SECTION_GAP: u32 = 4;

/// File name of the linked intermediate image inside the scratch directory.
const LINKED_IMAGE: &str = "linked.out";

/// File name of the generated link script inside the scratch directory.
const LINK_SCRIPT: &str = "patch.ld";

/// Output-section names of the trampoline stubs in the linked image.
const STACK_SETUP_OUT: &str = "stack_setup";
const INJECT_POINT_OUT: &str = "inject_point";

/// One resolved placement: a section-list index and its assigned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into the section list handed to [`allocate`].
    pub index: usize,
    /// Word-aligned address assigned inside a memory region.
    pub address: u32,
}

/// Assigns every nonzero-size section an address inside the target's free
/// memory regions.
///
/// Regions are filled first-fit in configuration order. Candidates are taken
/// by size descending (stable: equal sizes keep discovery order) so large
/// sections claim the big regions before fragmentation sets in. Each
/// placement is word-aligned and followed by a [`SECTION_GAP`] guard gap.
/// The start of the first region is reserved for the stack-setup stub.
pub fn allocate(sections: &SectionList, layout: &TargetLayout) -> Result<Vec<Placement>> {
    if layout.regions.is_empty() {
        return Err(config_error("target layout has no memory regions"));
    }
    let mut cursors: Vec<u32> = layout.regions.iter().map(|region| region.start).collect();
    cursors[0] += arch::STACK_SETUP_SIZE as u32 + SECTION_GAP;

    let mut order: Vec<usize> = (0..sections.len())
        .filter(|&index| sections[index].size > 0)
        .collect();
    order.sort_by(|&a, &b| sections[b].size.cmp(&sections[a].size));

    let mut placements = Vec::with_capacity(order.len());
    'sections: for index in order {
        let need = sections[index].size as u32;
        for (slot, region) in layout.regions.iter().enumerate() {
            let start = align_word(cursors[slot]);
            let Some(end) = start.checked_add(need) else {
                continue;
            };
            if end <= region.end {
                cursors[slot] = end + SECTION_GAP;
                log::trace!(
                    "placed `{}` at {:#010x} ({} bytes)",
                    sections[index].path,
                    start,
                    need
                );
                placements.push(Placement { index, address: start });
                continue 'sections;
            }
        }
        return Err(config_error(format!(
            "no memory region fits section `{}` ({} bytes)",
            sections[index].path, sections[index].size
        )));
    }
    Ok(placements)
}

#[inline]
fn align_word(address: u32) -> u32 {
    (address + (arch::WORD_SIZE as u32 - 1)) & !(arch::WORD_SIZE as u32 - 1)
}

/// The pipeline orchestrator.
///
/// Holds the configuration bundle, the resolved target layout, and the
/// toolchain seam; carries the linked-image bookkeeping between the address
/// resolution and final merge stages. Each build uses its own instance;
/// nothing is shared across builds.
#[derive(Debug)]
pub struct Builder<'args, R: CommandRunner> {
    args: &'args Arguments,
    layout: TargetLayout,
    toolchain: Toolchain<R>,
    scratch: PathBuf,
    image: Option<String>,
    placed: HashMap<String, String>,
}

impl<'args, R: CommandRunner> Builder<'args, R> {
    /// Validates the configuration bundle and prepares a pipeline.
    ///
    /// Every required option key and the memory layout for the selected
    /// target must be present, or this fails before any stage runs.
    pub fn new(args: &'args Arguments, runner: R) -> Result<Self> {
        for key in REQUIRED_OPTIONS {
            args.require(key)?;
        }
        let layout = args.layout()?.clone();
        if layout.regions.is_empty() {
            return Err(config_error("target layout has no memory regions"));
        }
        let scratch = PathBuf::from(args.option(OPT_SCRATCH).unwrap_or("patchlink-work"));
        Ok(Builder {
            args,
            layout,
            toolchain: Toolchain::from_args(args, runner),
            scratch,
            image: None,
            placed: HashMap::new(),
        })
    }

    /// The memory layout of the selected target.
    #[inline]
    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    /// Compiles every source under the injection directory and archives the
    /// resulting objects, plus the configured library inputs, into the
    /// output archive. An existing archive at that path is overwritten.
    pub fn build_library(&mut self) -> Result<()> {
        let source_dir = self.args.require(OPT_INJECT)?.to_string();
        let output = self.args.require(OPT_OUTPUT)?.to_string();
        let includes = self.args.includes.clone();
        let libs = self.args.libs.clone();
        let inputs = self.get_object_files(&source_dir, &includes, &libs)?;
        self.toolchain.archive(&output, &inputs)?;
        log::info!("built archive `{output}` from {} inputs", inputs.len());
        Ok(())
    }

    /// Compiles every source under `source_dir` and returns the resulting
    /// object paths, followed by `libs` in their given order.
    ///
    /// Sources are taken in lexicographic order; each object lands beside
    /// its source with an `.o` extension. A compile failure aborts the
    /// batch; objects already produced are left on disk.
    pub fn get_object_files(
        &mut self,
        source_dir: &str,
        includes: &[String],
        libs: &[String],
    ) -> Result<FileList> {
        let sources = discover_sources(source_dir)?;
        let mut files = FileList::with_capacity(sources.len() + libs.len());
        for source in &sources {
            let object = Path::new(source).with_extension("o").display().to_string();
            self.toolchain.compile(source, &object, includes)?;
            files.push(object);
        }
        files.extend(libs.iter().cloned());
        Ok(files)
    }

    /// Builds the full named and sized section list for `objects` and
    /// resolves every section's virtual address through the link step.
    ///
    /// Sections the linker drops as unreachable from the injection point are
    /// reset to size 0 and address 0: they must not appear in the final
    /// output, regardless of their structural size. The relative order of
    /// entries is preserved.
    pub fn get_section_addresses(&mut self, objects: &FileList) -> Result<SectionList> {
        let mut sections = SectionList::new();
        code_sections::store_names(&mut sections, objects, &mut self.toolchain)?;
        code_sections::store_sizes(&mut sections, &mut self.toolchain)?;
        self.link_sections(&mut sections, objects)?;
        Ok(sections)
    }

    /// Replaces the no-operation word at the original-instruction slot with
    /// the instruction that sat at the injection address in the unmodified
    /// image, preserving the backup inside the stack-setup stub.
    ///
    /// Fails with a patch precondition error when the slot no longer holds
    /// the nop encoding: at most one call per slot per code stream succeeds.
    pub fn add_original_instruction(&self, code: &mut AsmCode) -> Result<()> {
        let slot = self.layout.regions[0].start + arch::ORIG_SLOT_OFFSET;
        code.patch_nop_slot(slot, self.layout.original_instruction)
    }

    /// Appends the two synthetic trampoline entries: the stack-setup stub at
    /// the start of the first memory region, then the inject-point branch at
    /// the configured injection address. Sizes come from the fixed payloads.
    pub fn add_stack_setup(&self, sections: &mut SectionList) {
        sections.push(Section::synthetic(
            arch::STACK_SETUP_NAME,
            self.layout.regions[0].start,
            arch::STACK_SETUP_SIZE,
        ));
        sections.push(Section::synthetic(
            arch::INJECT_POINT_NAME,
            self.layout.inject_address,
            arch::INJECT_POINT_SIZE,
        ));
    }

    /// Reads every nonzero section's machine words out of the linked image,
    /// pairs each word with its absolute address, and returns the merged
    /// stream sorted ascending by address.
    pub fn get_linked_code(&mut self, sections: &SectionList) -> Result<AsmCode> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| not_found_error("no linked image; resolve section addresses first"))?;
        let mut code = AsmCode::new();
        for section in sections.iter() {
            if section.size == 0 {
                continue;
            }
            let out_name = self.placed.get(&section.path).cloned().ok_or_else(|| {
                not_found_error(format!(
                    "section `{}` was not placed by the link step",
                    section.path
                ))
            })?;
            let dest = self.scratch.join(format!("{out_name}.bin"));
            let bytes = self.toolchain.extract_section(&image, &out_name, &dest)?;
            if bytes.len() != section.size {
                return Err(parse_error(format!(
                    "section `{}`: extracted {} bytes, expected {}",
                    section.path,
                    bytes.len(),
                    section.size
                )));
            }
            for (offset, word) in arch::be_words(&bytes)?.into_iter().enumerate() {
                code.push((
                    section.address + (offset * arch::WORD_SIZE) as u32,
                    word,
                ));
            }
        }
        code.sort_ascending();
        log::info!("merged {} machine words", code.len());
        Ok(code)
    }

    /// Allocates addresses, drives the external linker, and writes resolved
    /// addresses back into `sections`.
    fn link_sections(&mut self, sections: &mut SectionList, objects: &FileList) -> Result<()> {
        fs::create_dir_all(&self.scratch).map_err(|err| {
            io_error(format!(
                "cannot create scratch directory `{}`: {err}",
                self.scratch.display()
            ))
        })?;
        let stack_setup = self.assemble_stub("stack_setup", arch::STACK_SETUP_ASM)?;
        let inject_point = self.assemble_stub("inject_point", arch::INJECT_POINT_ASM)?;

        // Inventory each input once; archive members are extracted so the
        // link script can pin individual member sections.
        let mut inputs = vec![stack_setup.clone(), inject_point.clone()];
        let mut inventories: HashMap<String, (Inventory, Vec<String>)> = HashMap::new();
        for (index, file) in objects.iter().enumerate() {
            let inventory = ObjectFile::inventory(&mut self.toolchain, file)?;
            let extracted = if inventory.is_archive {
                let dest = self.scratch.join(format!("members{index}"));
                self.toolchain.extract_archive(file, &dest)?;
                let members: Vec<String> = inventory
                    .members
                    .iter()
                    .map(|member| dest.join(member).display().to_string())
                    .collect();
                inputs.extend(members.iter().cloned());
                members
            } else {
                inputs.push(file.clone());
                Vec::new()
            };
            inventories.insert(file.clone(), (inventory, extracted));
        }

        let placements = allocate(sections, &self.layout)?;
        let script = self.write_link_script(sections, &placements, &inventories, &stack_setup, &inject_point)?;

        let image = self.scratch.join(LINKED_IMAGE).display().to_string();
        self.toolchain.link(&image, &script, &inputs)?;

        // Addresses come from the linked image itself: a section the linker
        // dropped is excluded, whatever its structural size said.
        let resolved = ObjectFile::inventory(&mut self.toolchain, &image)?;
        self.placed.clear();
        for (ordinal, placement) in placements.iter().enumerate() {
            let section = &mut sections[placement.index];
            match resolved.section(&format!("patch{ordinal}")) {
                Some(info) if info.size > 0 => {
                    section.address = info.vma;
                    self.placed
                        .insert(section.path.clone(), format!("patch{ordinal}"));
                }
                _ => {
                    section.address = 0;
                    section.size = 0;
                }
            }
        }
        for (path, out_name) in [
            (arch::STACK_SETUP_NAME, STACK_SETUP_OUT),
            (arch::INJECT_POINT_NAME, INJECT_POINT_OUT),
        ] {
            if resolved.section(out_name).is_none() {
                return Err(parse_error(format!(
                    "linked image `{image}` is missing the `{out_name}` stub section"
                )));
            }
            self.placed.insert(path.to_string(), out_name.to_string());
        }
        self.image = Some(image);
        Ok(())
    }

    /// Writes and assembles one trampoline stub, returning its object path.
    fn assemble_stub(&mut self, name: &str, asm: &str) -> Result<String> {
        let source = self.scratch.join(format!("{name}.s"));
        fs::write(&source, asm).map_err(|err| {
            io_error(format!("cannot write `{}`: {err}", source.display()))
        })?;
        let object = self.scratch.join(format!("{name}.o")).display().to_string();
        self.toolchain
            .compile(&source.display().to_string(), &object, &[])?;
        Ok(object)
    }

    /// Generates the link script pinning every placed input section at its
    /// allocated address, with the trampoline stubs at their fixed spots.
    fn write_link_script(
        &self,
        sections: &SectionList,
        placements: &[Placement],
        inventories: &HashMap<String, (Inventory, Vec<String>)>,
        stack_setup: &str,
        inject_point: &str,
    ) -> Result<String> {
        let mut script = String::from("ENTRY(inject_point)\nSECTIONS\n{\n");
        script.push_str(&format!(
            "    {STACK_SETUP_OUT} {:#x} : {{ KEEP(\"{stack_setup}\"(*)) }}\n",
            self.layout.regions[0].start
        ));
        script.push_str(&format!(
            "    {INJECT_POINT_OUT} {:#x} : {{ KEEP(\"{inject_point}\"(*)) }}\n",
            self.layout.inject_address
        ));
        for (ordinal, placement) in placements.iter().enumerate() {
            let section = &sections[placement.index];
            let (file, name) = section.split_path().ok_or_else(|| {
                not_found_error(format!("section `{}` has no source file", section.path))
            })?;
            let (inventory, extracted) = inventories.get(file).ok_or_else(|| {
                not_found_error(format!("no inventory for input file `{file}`"))
            })?;
            let info = inventory.section(name).ok_or_else(|| {
                parse_error(format!("section `{name}` vanished from `{file}`"))
            })?;
            let input = match info.member {
                Some(member) => extracted[member].as_str(),
                None => file,
            };
            script.push_str(&format!(
                "    patch{ordinal} {:#x} : {{ \"{input}\"({}) }}\n",
                placement.address, info.raw
            ));
        }
        script.push_str("    /DISCARD/ : { *(*) }\n}\n");
        let path = self.scratch.join(LINK_SCRIPT);
        fs::write(&path, script)
            .map_err(|err| io_error(format!("cannot write `{}`: {err}", path.display())))?;
        Ok(path.display().to_string())
    }
}

/// Lists the compilable sources under `dir` in lexicographic order.
fn discover_sources(dir: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .map_err(|err| io_error(format!("cannot read source directory `{dir}`: {err}")))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| io_error(format!("cannot read entry in `{dir}`: {err}")))?;
        let path = entry.path();
        let compilable = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("c") || ext.eq_ignore_ascii_case("s"));
        if compilable {
            sources.push(path.display().to_string());
        }
    }
    sources.sort();
    Ok(sources)
}
