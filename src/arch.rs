//! PowerPC encoding constants and the fixed trampoline payloads.
//!
//! The target executes fixed-width 32-bit big-endian instruction words. The
//! trampoline consists of two tiny payloads: a stack-setup stub placed at the
//! start of the first free memory region, and a single branch placed at the
//! injection address inside the original code.

use crate::{Result, error::parse_error};

/// Width of one machine word in bytes.
pub const WORD_SIZE: usize = 4;

/// The no-operation encoding (`ori 0,0,0`).
pub const NOP: u32 = 0x6000_0000;

/// Offset of the original-instruction slot within the stack-setup payload.
///
/// The displaced instruction from the injection address is written over the
/// `nop` at this offset, so the stub executes it on the way back into
/// original code flow.
pub const ORIG_SLOT_OFFSET: u32 = 4;

/// Byte size of the stack-setup payload (two words).
pub const STACK_SETUP_SIZE: usize = 8;

/// Byte size of the inject-point payload (one branch word).
pub const INJECT_POINT_SIZE: usize = 4;

/// Synthetic section name for the stack-setup stub.
pub const STACK_SETUP_NAME: &str = "stack_setup.o";

/// Synthetic section name for the inject-point branch.
pub const INJECT_POINT_NAME: &str = "inject_point.o";

/// Assembly source of the stack-setup stub.
///
/// `bl` records the address of the slot below in the link register, so the
/// injected entry point returns through the displaced original instruction.
pub const STACK_SETUP_ASM: &str = "\
.globl stack_setup
.section .text
stack_setup:
\tbl _main
\tnop
";

/// Assembly source of the inject-point stub: one `bl` into the stack-setup
/// stub, resolved by the link step.
pub const INJECT_POINT_ASM: &str = "\
.globl inject_point
.section .text
inject_point:
\tbl stack_setup
";

/// Splits section bytes into big-endian machine words.
///
/// The byte count must be a multiple of [`WORD_SIZE`]; section contents on
/// this target are always whole instruction words.
pub fn be_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % WORD_SIZE != 0 {
        return Err(parse_error(format!(
            "section contents of {} bytes are not a whole number of {WORD_SIZE}-byte words",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(WORD_SIZE)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
