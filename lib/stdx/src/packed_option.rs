//! `Option` for entity references without a separate discriminant.
//!
//! Entity tables never hand out the all-ones index, so it can mark a missing link in the
//! layout tables at no extra cost.

use std::fmt;

/// Entity references with a value that is never allocated.
pub trait ReservedValue: Copy + PartialEq {
    const RESERVED: Self;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PackedOption<T: ReservedValue>(T);

impl<T: ReservedValue> PackedOption<T> {
    pub const NONE: Self = PackedOption(T::RESERVED);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == T::RESERVED
    }

    #[inline]
    pub fn expand(self) -> Option<T> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Unpacks the value, panicking with `msg` if there is none.
    #[inline]
    #[track_caller]
    pub fn expect(self, msg: &str) -> T {
        self.expand().expect(msg)
    }

    /// Returns the current value and leaves `NONE` behind.
    #[inline]
    pub fn take(&mut self) -> Option<T> {
        std::mem::replace(self, Self::NONE).expand()
    }
}

impl<T: ReservedValue> Default for PackedOption<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T: ReservedValue> From<T> for PackedOption<T> {
    fn from(val: T) -> Self {
        debug_assert!(val != T::RESERVED, "the reserved value can not be packed");
        PackedOption(val)
    }
}

impl<T: ReservedValue> From<Option<T>> for PackedOption<T> {
    fn from(val: Option<T>) -> Self {
        val.map_or(Self::NONE, Self::from)
    }
}

impl<T: ReservedValue + fmt::Debug> fmt::Debug for PackedOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.expand(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::{PackedOption, ReservedValue};

    #[derive(Clone, Copy, PartialEq, Debug)]
    struct Idx(u32);

    impl ReservedValue for Idx {
        const RESERVED: Self = Idx(u32::MAX);
    }

    #[test]
    fn roundtrip() {
        let mut packed: PackedOption<Idx> = Idx(3).into();
        assert_eq!(packed.expand(), Some(Idx(3)));
        assert_eq!(packed.take(), Some(Idx(3)));
        assert!(packed.is_none());
        assert_eq!(PackedOption::<Idx>::from(None), PackedOption::default());
        assert_eq!(format!("{packed:?}"), "None");
    }

    #[test]
    fn expect_unpacks() {
        let packed: PackedOption<Idx> = Idx(7).into();
        assert_eq!(packed.expect("packed"), Idx(7));
    }

    #[test]
    #[should_panic(expected = "nothing packed")]
    fn expect_on_none() {
        PackedOption::<Idx>::NONE.expect("nothing packed");
    }
}
