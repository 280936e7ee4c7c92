//! Newtype keys for type-safe entity references.
//!
//! Use the `define_key!` macro to create string-backed key wrappers that
//! prevent accidentally passing a product identifier where an owner is
//! expected.

/// Errors that can occur when parsing a key.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The input string is empty or only whitespace.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the key type.
        kind: &'static str,
    },
    /// The input string is too long.
    #[error("{kind} must be at most {max} characters")]
    TooLong {
        /// Name of the key type.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` (validated through `TryFrom<String>`)
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - `parse()`, `as_str()`, `into_inner()`
/// - `Display` and `AsRef<str>`
///
/// # Example
///
/// ```rust
/// # use basket_core::define_key;
/// define_key!(WishlistId, "wishlist id");
///
/// let id = WishlistId::parse("w-1").unwrap();
/// assert_eq!(id.as_str(), "w-1");
/// assert!(WishlistId::parse("  ").is_err());
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident, $kind:literal) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Maximum length of the key.
            pub const MAX_LENGTH: usize = 255;

            /// Parse a key from a string.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is blank or longer than
            /// [`Self::MAX_LENGTH`].
            pub fn parse(s: &str) -> Result<Self, $crate::types::id::KeyError> {
                if s.trim().is_empty() {
                    return Err($crate::types::id::KeyError::Empty { kind: $kind });
                }
                if s.len() > Self::MAX_LENGTH {
                    return Err($crate::types::id::KeyError::TooLong {
                        kind: $kind,
                        max: Self::MAX_LENGTH,
                    });
                }
                Ok(Self(s.to_owned()))
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the key and returns its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::types::id::KeyError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0
            }
        }
    };
}

define_key!(OwnerId, "owner id");
define_key!(ProductId, "product id");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_owner() {
        let owner = OwnerId::parse("alice").unwrap();
        assert_eq!(owner.as_str(), "alice");
        assert_eq!(owner.to_string(), "alice");
    }

    #[test]
    fn test_parse_blank_rejected() {
        assert_eq!(
            OwnerId::parse("   ").unwrap_err(),
            KeyError::Empty { kind: "owner id" }
        );
        assert!(ProductId::parse("").is_err());
    }

    #[test]
    fn test_parse_too_long() {
        let long = "x".repeat(OwnerId::MAX_LENGTH + 1);
        assert!(matches!(
            OwnerId::parse(&long),
            Err(KeyError::TooLong { max: 255, .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let owner: OwnerId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(owner.as_str(), "bob");

        let result: Result<ProductId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }
}
