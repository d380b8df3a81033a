/// Implements the conversions `typed-index-collections` requires for an index newtype
/// (`usize` in both directions) as well as conversions from/to the raw integer.
#[macro_export]
macro_rules! impl_idx_from {
    ($ty:ident($raw:ident)) => {
        impl From<usize> for $ty {
            #[inline(always)]
            fn from(idx: usize) -> Self {
                debug_assert!(idx <= <$raw>::MAX as usize);
                Self(idx as $raw)
            }
        }

        impl From<$ty> for usize {
            #[inline(always)]
            fn from(idx: $ty) -> usize {
                idx.0 as usize
            }
        }

        impl From<$raw> for $ty {
            #[inline(always)]
            fn from(raw: $raw) -> Self {
                Self(raw)
            }
        }

        impl From<$ty> for $raw {
            #[inline(always)]
            fn from(idx: $ty) -> $raw {
                idx.0
            }
        }
    };
}

/// Implements `Debug` and `Display` for an index newtype by printing its raw number with a prefix.
#[macro_export]
macro_rules! impl_debug_display {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(
            impl ::core::fmt::Debug for $ty {
                fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                    write!(f, concat!($prefix, "{}"), self.0)
                }
            }

            impl ::core::fmt::Display for $ty {
                fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                    write!(f, concat!($prefix, "{}"), self.0)
                }
            }
        )*
    };
}
