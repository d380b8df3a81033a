//! Insertion ordered hash maps whose entries are addressed by a typed index.
//!
//! The position of an entry never changes (entries are never removed), so the index of an
//! entry can be handed out as a stable identifier.

mod map;

pub use map::TiMap;
