use core::fmt;

/// Creates an enum for a raw hardware code, with codes not listed becoming a catch-all `Unknown`
/// variant instead of being rejected.
///
/// Values read back from hardware must round-trip bit-exactly, so the generated conversions are
/// total in both directions.
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        $v:vis enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr $(,)*
            ),*
        }
    ) => {
        $( #[$enum_attr] )*
        $v enum $name {
            $(
              $( #[$variant_attr] )*
              $variant,
            )*
            Unknown($ty)
        }

        impl $name {
            /// Returns the raw hardware code of `self`.
            #[allow(dead_code)]
            pub fn raw(&self) -> $ty {
                (*self).into()
            }

            /// Returns whether the raw code was not one of the listed values.
            #[allow(dead_code)]
            pub fn is_unknown(&self) -> bool {
                match self {
                    $name::Unknown(_) => true,
                    _ => false,
                }
            }
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant, )*
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value, )*
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// `Debug`-formats its contents in hexadecimal.
#[derive(Copy, Clone)]
pub struct Hex<T>(pub T)
where
    T: fmt::LowerHex;

impl<T: fmt::LowerHex> fmt::Debug for Hex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
