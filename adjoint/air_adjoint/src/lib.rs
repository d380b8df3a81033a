//! Reverse mode differential synthesis.
//!
//! [`GradientUtils`] owns the derivative state of a function while an adjoint code generator
//! walks a [`PrimalClone`] of it:
//!
//! * every active value gets a zero initialized differential slot (an `alloca` in the
//!   inversion-allocation block) that is read with [`diffe`](GradientUtils::diffe), incremented
//!   with [`add_to_diffe`](GradientUtils::add_to_diffe) and reset with
//!   [`set_diffe`](GradientUtils::set_diffe),
//! * every forward block is mirrored by (at least) one reverse block,
//! * derivatives of memory are accumulated through shadow pointers with
//!   [`add_to_inverted_ptr_diffe`](GradientUtils::add_to_inverted_ptr_diffe),
//! * memory that was only cached for the reverse pass is released with
//!   [`free_cache`](GradientUtils::free_cache).
//!
//! Activity analysis, the cloning of the primal function and the decision which values need to
//! be cached are not part of this crate. They are consumed through [`TypeResults`],
//! [`PrimalClone`], [`ValueLookup`] and [`CacheScope`].

use std::fmt;

mod accumulate;
mod activity;
mod cache;
mod clone;
mod differentials;
mod gradient;
mod lanes;
mod shadow;


pub use crate::activity::{ActivitySet, TypeResults};
pub use crate::cache::{cache_alignment, CacheScope, LoopIndex};
pub use crate::clone::{IdentityLookup, PrimalClone, ValueLookup};
pub use crate::differentials::DiffSlot;
pub use crate::gradient::GradientUtils;
pub use crate::lanes::for_each_lane;
pub use crate::shadow::Placeholders;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DerivativeMode {
    ForwardMode,
    ForwardModeSplit,
    /// Only the augmented forward pass of a split reverse mode derivative. Never handled by
    /// [`GradientUtils`].
    ReverseModePrimal,
    ReverseModeGradient,
    ReverseModeCombined,
}

impl DerivativeMode {
    pub fn is_forward(self) -> bool {
        matches!(self, DerivativeMode::ForwardMode | DerivativeMode::ForwardModeSplit)
    }

    /// Whether the derivative has a reverse pass that accumulates adjoints.
    pub fn is_reverse(self) -> bool {
        matches!(self, DerivativeMode::ReverseModeGradient | DerivativeMode::ReverseModeCombined)
    }

    /// Prefix of the name of the generated function.
    pub fn prefix(self) -> &'static str {
        match self {
            DerivativeMode::ForwardMode | DerivativeMode::ForwardModeSplit => "fwddiffe",
            DerivativeMode::ReverseModeGradient | DerivativeMode::ReverseModeCombined => "diffe",
            DerivativeMode::ReverseModePrimal => {
                unreachable!("invalid DerivativeMode: ReverseModePrimal")
            }
        }
    }
}

impl fmt::Display for DerivativeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Settings that influence the generated adjoint code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AdjointConfig {
    /// Release memory that was cached for the reverse pass.
    pub free_memory: bool,
    /// Treat integer differentials of unknown type as `f64` (64 bit) or `f32` (32 bit).
    pub loose_types: bool,
    /// Accumulate into shadow memory with atomic read-modify-write operations.
    pub atomic_add: bool,
}

impl Default for AdjointConfig {
    fn default() -> Self {
        AdjointConfig { free_memory: true, loose_types: false, atomic_add: false }
    }
}
