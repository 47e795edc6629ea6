//! Parsing helpers for values read back from the cache or remote store.
//!
//! Persisted enum values are stored as short snake_case strings. Reading
//! them never fails: unknown or malformed values fall back to a default, and
//! the returned [`Parsed`] records whether that happened.

use std::str::FromStr;

/// Error for a string that names no variant of a persisted enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Outcome of a parse-with-fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    /// The raw value parsed cleanly (or was legitimately absent).
    Exact(T),
    /// The raw value was missing or malformed; the default was used.
    Fallback(T),
}

impl<T> Parsed<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Exact(v) | Self::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Parse `raw`, using `default` when it is absent or does not parse.
pub fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> Parsed<T> {
    match raw.map(str::parse::<T>) {
        Some(Ok(v)) => Parsed::Exact(v),
        _ => Parsed::Fallback(default),
    }
}

/// Parse an optional value: absent is a legitimate `None`, malformed falls back to `None`.
pub fn parse_optional<T: FromStr>(raw: Option<&str>) -> Parsed<Option<T>> {
    match raw {
        None => Parsed::Exact(None),
        Some(s) => match s.parse::<T>() {
            Ok(v) => Parsed::Exact(Some(v)),
            Err(_) => Parsed::Fallback(None),
        },
    }
}

/// Declare a fieldless enum persisted as fixed strings.
///
/// Generates `ALL`, `as_str`, `Display` and a `FromStr` that rejects
/// unknown strings with [`UnknownVariant`].
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::persisted::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err($crate::persisted::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use string_enum;
