//! Entity references.
//!
//! Instructions, values, blocks and the other objects of the IR are stored in tables owned by
//! the [`Function`](crate::Function). All references to them are plain 32-bit indices into these
//! tables which keeps the IR compact and makes it trivially cloneable.

use stdx::packed_option::ReservedValue;
use stdx::{impl_debug_display, impl_idx_from};

macro_rules! entities {
    ($($(#[$attr:meta])* $name:ident => $prefix:literal;)*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            #[repr(transparent)]
            pub struct $name(u32);

            impl_idx_from!($name(u32));
            impl_debug_display!($name => $prefix);

            impl ReservedValue for $name {
                const RESERVED: Self = $name(u32::MAX);
            }
        )*
    };
}

entities! {
    /// An opaque reference to a basic block in a [`Function`](crate::Function).
    Block => "block";
    /// An opaque reference to an instruction in a [`Function`](crate::Function).
    Inst => "inst";
    /// An opaque reference to an SSA value.
    Value => "v";
    /// The position of a function parameter.
    Param => "param";
    /// An interned type, see [`TypeTable`](crate::TypeTable).
    Type => "ty";
    /// A scope for `alias_scope`/`noalias` metadata.
    AliasScope => "scope";
    /// A domain alias scopes are grouped into.
    AliasDomain => "domain";
    /// An `invariant_group` metadata node.
    InvariantGroup => "invgroup";
    /// A type based alias analysis tag.
    TbaaTag => "tbaa";
}

/// A reference to any of the entities defined in this module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AnyEntity {
    Block(Block),
    Inst(Inst),
    Value(Value),
}

impl From<Block> for AnyEntity {
    fn from(block: Block) -> Self {
        AnyEntity::Block(block)
    }
}

impl From<Inst> for AnyEntity {
    fn from(inst: Inst) -> Self {
        AnyEntity::Inst(inst)
    }
}

impl From<Value> for AnyEntity {
    fn from(val: Value) -> Self {
        AnyEntity::Value(val)
    }
}

impl std::fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyEntity::Block(block) => write!(f, "{block}"),
            AnyEntity::Inst(inst) => write!(f, "{inst}"),
            AnyEntity::Value(val) => write!(f, "{val}"),
        }
    }
}
