use std::fmt::{self, Display, Formatter};

/// An IEEE binary64 floating point value, represented by its bit pattern.
///
/// Comparing and hashing the bit pattern makes constants usable as hash map keys: `0.0` and
/// `-0.0` are distinct and every NaN payload is its own constant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Ieee64(u64);

impl Ieee64 {
    #[inline]
    pub const fn with_bits(bits: u64) -> Ieee64 {
        Ieee64(bits)
    }

    #[inline]
    pub fn with_float(val: f64) -> Ieee64 {
        Ieee64(val.to_bits())
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Returns `true` for both `+0.0` and `-0.0`.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 & !(1 << 63) == 0
    }
}

impl From<f64> for Ieee64 {
    fn from(val: f64) -> Self {
        Ieee64::with_float(val)
    }
}

impl From<Ieee64> for f64 {
    fn from(val: Ieee64) -> Self {
        val.to_f64()
    }
}

impl Display for Ieee64 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::Ieee64;

    #[test]
    fn zero() {
        assert!(Ieee64::with_float(0.0).is_zero());
        assert!(Ieee64::with_float(-0.0).is_zero());
        assert!(!Ieee64::with_float(1.0).is_zero());
        assert_ne!(Ieee64::with_float(0.0), Ieee64::with_float(-0.0));
    }

    #[test]
    fn display() {
        assert_eq!(Ieee64::with_float(1.0).to_string(), "1.0");
        assert_eq!(Ieee64::with_float(-2.5).to_string(), "-2.5");
    }
}
