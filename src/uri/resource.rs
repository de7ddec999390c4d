//! `ResourceUri`: `ndk://{realm}/{subrealm}/{path}`.

use crate::errors::GatewayError;
use crate::strings::validated::{validated_str, ValidatedStr};
use crate::uri::affordance::{Affordance, AffordanceUri};
use std::fmt;

validated_str!(Realm, r"^[a-z][a-z0-9_]*$");
validated_str!(Subrealm, r"^[a-z][a-z0-9_]*$");

const SCHEME: &str = "ndk";

/// A resource address scoped to a connector's realm/subrealm, e.g.
/// `ndk://github/file/owner/repo/main/src/lib.rs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUri {
    realm: Realm,
    subrealm: Subrealm,
    path: String,
}

impl ResourceUri {
    pub fn new(realm: Realm, subrealm: Subrealm, path: impl Into<String>) -> Self {
        ResourceUri {
            realm,
            subrealm,
            path: path.into(),
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn subrealm(&self) -> &Subrealm {
        &self.subrealm
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Appends an affordance suffix, yielding `{resource_uri}${aff}` (§3.1, §4.1).
    pub fn child_affordance(&self, aff: Affordance) -> AffordanceUri {
        AffordanceUri::new(self.clone(), aff)
    }

    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        let rest = input.strip_prefix("ndk://").ok_or_else(|| invalid(input))?;
        let mut parts = rest.splitn(3, '/');
        let realm = parts.next().ok_or_else(|| invalid(input))?;
        let subrealm = parts.next().ok_or_else(|| invalid(input))?;
        let path = parts.next().ok_or_else(|| invalid(input))?;

        Ok(ResourceUri {
            realm: Realm::try_decode_result(realm)?,
            subrealm: Subrealm::try_decode_result(subrealm)?,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/{}/{}", self.realm, self.subrealm, self.path)
    }
}

fn invalid(input: &str) -> GatewayError {
    GatewayError::Validation {
        type_name: "ResourceUri",
        input: input.to_string(),
        regex: "ndk://{realm}/{subrealm}/{path}",
    }
}

impl serde::Serialize for ResourceUri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ResourceUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceUri::try_decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let uri = ResourceUri::try_decode("ndk://github/file/owner/repo/main/src/lib.rs").unwrap();
        assert_eq!(uri.realm().as_str(), "github");
        assert_eq!(uri.subrealm().as_str(), "file");
        assert_eq!(uri.path(), "owner/repo/main/src/lib.rs");
        assert_eq!(uri.to_string(), "ndk://github/file/owner/repo/main/src/lib.rs");
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(ResourceUri::try_decode("github/file/owner/repo").is_err());
    }

    #[test]
    fn child_affordance_appends_suffix() {
        let uri = ResourceUri::try_decode("ndk://github/file/owner/repo/main/README.md").unwrap();
        let au = uri.child_affordance(Affordance::Plain);
        assert_eq!(au.to_string(), "ndk://github/file/owner/repo/main/README.md$plain");
        assert_eq!(au.resource_uri(), &uri);
    }
}
