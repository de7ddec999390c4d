//! Shared trait and macro for regex-validated newtype strings.

use crate::errors::GatewayError;

/// Common behavior for a string newtype backed by a single validating regex.
pub trait ValidatedStr: Sized + AsRef<str> {
    /// Human-readable name used in error messages.
    const TYPE_NAME: &'static str;

    /// The regex the whole input must match, for error reporting only.
    fn pattern() -> &'static str;

    /// Validate and wrap `input`, or return `None` if it does not match.
    fn try_decode(input: &str) -> Option<Self>;

    /// Validate and wrap `input`, panicking on mismatch. For literals and
    /// values already known to be valid.
    fn decode(input: impl Into<String>) -> Self {
        let input = input.into();
        Self::try_decode(&input)
            .unwrap_or_else(|| panic!("invalid {}: {:?}", Self::TYPE_NAME, input))
    }

    /// Validate and wrap `input`, returning a typed error on mismatch.
    fn try_decode_result(input: &str) -> Result<Self, GatewayError> {
        Self::try_decode(input).ok_or_else(|| GatewayError::Validation {
            type_name: Self::TYPE_NAME,
            input: input.to_string(),
            regex: Self::pattern(),
        })
    }
}

/// Defines a `Deref<Target = str>`-backed validated string newtype whose
/// constructor checks `$regex`.
macro_rules! validated_str {
    ($name:ident, $regex:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            fn regex() -> &'static ::once_cell::sync::Lazy<::regex::Regex> {
                static RE: ::once_cell::sync::Lazy<::regex::Regex> =
                    ::once_cell::sync::Lazy::new(|| ::regex::Regex::new($regex).unwrap());
                &RE
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl $crate::strings::ValidatedStr for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn pattern() -> &'static str {
                $regex
            }

            fn try_decode(input: &str) -> Option<Self> {
                if Self::regex().is_match(input) {
                    Some(Self(input.to_string()))
                } else {
                    None
                }
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <Self as $crate::strings::ValidatedStr>::try_decode(&s)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid {}: {s:?}", stringify!($name))))
            }
        }
    };
}

pub(crate) use validated_str;
