//! Small helpers shared by all crates of the workspace.

mod ieee64;
mod macros;
pub mod packed_option;

pub use crate::ieee64::Ieee64;

/// Rounds `offset` up to the next multiple of `align` (which must be a power of two).
#[inline]
pub fn align_to(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    (offset + align - 1) & !(align - 1)
}
