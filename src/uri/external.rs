//! `ExternalUri`: an opaque `ext://{realm}/{opaque-id}` reference to a
//! resource a connector has not yet resolved into a concrete locator, used
//! for persisted aliasing (§4.7, `v1/alias/...`).

use crate::errors::GatewayError;
use crate::uri::resource::Realm;
use crate::strings::ValidatedStr;
use std::fmt;

/// An unresolved external reference, scoped by realm, with connector-defined
/// opaque contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalUri {
    realm: Realm,
    opaque: String,
}

impl ExternalUri {
    pub fn new(realm: Realm, opaque: impl Into<String>) -> Self {
        ExternalUri {
            realm,
            opaque: opaque.into(),
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        let rest = input.strip_prefix("ext://").ok_or_else(|| invalid(input))?;
        let (realm, opaque) = rest.split_once('/').ok_or_else(|| invalid(input))?;
        Ok(ExternalUri {
            realm: Realm::try_decode_result(realm)?,
            opaque: opaque.to_string(),
        })
    }
}

impl fmt::Display for ExternalUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ext://{}/{}", self.realm, self.opaque)
    }
}

impl serde::Serialize for ExternalUri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ExternalUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ExternalUri::try_decode(&s).map_err(serde::de::Error::custom)
    }
}

fn invalid(input: &str) -> GatewayError {
    GatewayError::Validation {
        type_name: "ExternalUri",
        input: input.to_string(),
        regex: "ext://{realm}/{opaque}",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let uri = ExternalUri::try_decode("ext://jira/PROJ-123").unwrap();
        assert_eq!(uri.realm().as_str(), "jira");
        assert_eq!(uri.opaque(), "PROJ-123");
        assert_eq!(uri.to_string(), "ext://jira/PROJ-123");
    }
}
