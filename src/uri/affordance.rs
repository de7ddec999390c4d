//! Affordance suffixes: `{resource_uri}${affordance}`.

use crate::errors::GatewayError;
use crate::uri::resource::ResourceUri;
use std::fmt;

/// The kind of content an affordance produces. `Body` is the connector's
/// default rendering (usually Markdown), `Collection` lists children,
/// `File` streams raw bytes, `Plain` is a flattened text-only rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affordance {
    Body,
    Collection,
    File,
    Plain,
}

impl Affordance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affordance::Body => "body",
            Affordance::Collection => "collection",
            Affordance::File => "file",
            Affordance::Plain => "plain",
        }
    }

    pub fn try_decode(input: &str) -> Option<Self> {
        match input {
            "body" => Some(Affordance::Body),
            "collection" => Some(Affordance::Collection),
            "file" => Some(Affordance::File),
            "plain" => Some(Affordance::Plain),
            _ => None,
        }
    }
}

impl fmt::Display for Affordance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Affordance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Affordance {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Affordance::try_decode(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid affordance: {s:?}")))
    }
}

/// A `ResourceUri` paired with the affordance requested against it, e.g.
/// `ndk://github/file/owner/repo/main/README.md$plain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffordanceUri {
    resource_uri: ResourceUri,
    affordance: Affordance,
}

impl AffordanceUri {
    pub fn new(resource_uri: ResourceUri, affordance: Affordance) -> Self {
        AffordanceUri {
            resource_uri,
            affordance,
        }
    }

    pub fn resource_uri(&self) -> &ResourceUri {
        &self.resource_uri
    }

    pub fn affordance(&self) -> Affordance {
        self.affordance
    }

    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        let (uri_part, affordance_part) = input.split_once('$').ok_or_else(|| invalid(input))?;
        let resource_uri = ResourceUri::try_decode(uri_part)?;
        let affordance = Affordance::try_decode(affordance_part).ok_or_else(|| invalid(input))?;
        Ok(AffordanceUri {
            resource_uri,
            affordance,
        })
    }
}

impl fmt::Display for AffordanceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.resource_uri, self.affordance)
    }
}

fn invalid(input: &str) -> GatewayError {
    GatewayError::Validation {
        type_name: "AffordanceUri",
        input: input.to_string(),
        regex: "{resource_uri}${affordance}",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let au = AffordanceUri::try_decode("ndk://github/file/owner/repo/main/README.md$plain").unwrap();
        assert_eq!(au.affordance(), Affordance::Plain);
        assert_eq!(
            au.to_string(),
            "ndk://github/file/owner/repo/main/README.md$plain"
        );
    }

    #[test]
    fn rejects_unknown_affordance() {
        assert!(AffordanceUri::try_decode("ndk://github/file/owner/repo$bogus").is_err());
    }
}
