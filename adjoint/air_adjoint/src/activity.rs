use ahash::AHashSet;
use air::Value;

/// The results of the type/activity analysis of the primal function.
pub trait TypeResults {
    /// Whether `val` does not carry a derivative.
    fn is_constant_value(&self, val: Value) -> bool;
}

/// [`TypeResults`] backed by an explicit set of constant values. Every value that was not marked
/// as constant is considered active.
#[derive(Clone, Debug, Default)]
pub struct ActivitySet {
    constants: AHashSet<Value>,
}

impl ActivitySet {
    pub fn new() -> ActivitySet {
        ActivitySet::default()
    }

    pub fn mark_constant(&mut self, val: Value) {
        self.constants.insert(val);
    }

    pub fn mark_active(&mut self, val: Value) {
        self.constants.remove(&val);
    }
}

impl FromIterator<Value> for ActivitySet {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        ActivitySet { constants: iter.into_iter().collect() }
    }
}

impl TypeResults for ActivitySet {
    fn is_constant_value(&self, val: Value) -> bool {
        self.constants.contains(&val)
    }
}
