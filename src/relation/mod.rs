//! Relations between resources, and the content-addressed `RelationId` that
//! names them.
//!
//! Grounded on `base/resources/relation.py`: a relation's id is derived by
//! hashing the canonical JSON encoding of its (tagged, sorted-key) fields,
//! salted, so that two calls describing the same edge produce the same id
//! without a lookup.

use crate::errors::GatewayError;
use crate::strings::validated::{validated_str, ValidatedStr};
use crate::uri::ResourceUri;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

validated_str!(RelationId, r"^[a-z]+-[a-z0-9]{32}$");

const SALT: &str = "knowledge-relation";

/// An edge between two resources. `Embed`/`Link` are directed structural
/// references discovered while rendering a body; `Misc` is a connector-
/// defined subkind (e.g. a Jira "Teams conversation" link); `Parent` states
/// that `child` belongs under `parent` (used for synthetic child resources
/// such as a Jira-linked Teams message, §4.4 scenario 4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "kind")]
pub enum Relation {
    Embed { source: ResourceUri, target: ResourceUri },
    Link { source: ResourceUri, target: ResourceUri },
    Misc { subkind: String, source: ResourceUri, target: ResourceUri },
    Parent { parent: ResourceUri, child: ResourceUri },
}

impl Relation {
    /// Construct a `Misc` relation, normalizing `subkind` the way the
    /// original `RelationMisc.new()` does: lowercase, spaces to
    /// underscores, diacritics stripped, disallowed characters removed,
    /// and duplicate/leading/trailing underscores collapsed.
    pub fn new_misc(subkind: &str, source: ResourceUri, target: ResourceUri) -> Self {
        Relation::Misc {
            subkind: normalize_subkind(subkind),
            source,
            target,
        }
    }

    /// The two endpoint resources this relation references, for resolution
    /// validation (§4.5 `try_resolve_relations`).
    pub fn nodes(&self) -> (&ResourceUri, &ResourceUri) {
        match self {
            Relation::Embed { source, target } => (source, target),
            Relation::Link { source, target } => (source, target),
            Relation::Misc { source, target, .. } => (source, target),
            Relation::Parent { parent, child } => (parent, child),
        }
    }

    /// The edge's origin endpoint (§3.5 `get_source()`): the embedding/
    /// linking/misc-subkind source, or the `parent` of a `Parent` edge.
    pub fn get_source(&self) -> &ResourceUri {
        self.nodes().0
    }

    /// The edge's destination endpoints (§3.5 `get_targets()`): always
    /// exactly one node for these binary relation kinds, returned as a
    /// slice-shaped iterator for symmetry with hypothetical multi-target
    /// relation kinds.
    pub fn get_targets(&self) -> Vec<&ResourceUri> {
        vec![self.nodes().1]
    }

    fn kind_tag(&self) -> &'static str {
        match self {
            Relation::Embed { .. } => "embed",
            Relation::Link { .. } => "link",
            Relation::Misc { .. } => "misc",
            Relation::Parent { .. } => "parent",
        }
    }

    /// The content-addressed id for this relation: `{kind}-{32 hex}`, where
    /// the hash covers the canonical (sorted-key) JSON encoding of the
    /// relation plus a fixed salt.
    pub fn unique_id(&self) -> RelationId {
        let canonical = canonical_json(self);
        let mut hasher = Sha256::new();
        hasher.update(SALT.as_bytes());
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        let hex_full = hex::encode(digest);
        let id = format!("{}-{}", self.kind_tag(), &hex_full[..32]);
        RelationId::decode(id)
    }
}

/// Serialize with sorted object keys so the hash is stable regardless of
/// field declaration order.
fn canonical_json(relation: &Relation) -> String {
    let value = serde_json::to_value(relation).expect("Relation always serializes");
    canonical_value(&value)
}

fn canonical_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_value(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items.iter().map(canonical_value).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

fn normalize_subkind(input: &str) -> String {
    let lowered = input.to_lowercase().replace(' ', "_");
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_underscore = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if c == '_' {
                if last_was_underscore {
                    continue;
                }
                last_was_underscore = true;
            } else {
                last_was_underscore = false;
            }
            out.push(c);
        }
    }
    out.trim_matches('_').to_string()
}

pub fn try_decode_relation_id(input: &str) -> Result<RelationId, GatewayError> {
    RelationId::try_decode_result(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::{Realm, Subrealm};

    fn uri(path: &str) -> ResourceUri {
        ResourceUri::new(Realm::decode("github"), Subrealm::decode("file"), path)
    }

    #[test]
    fn unique_id_is_stable_and_tagged() {
        let relation = Relation::Embed {
            source: uri("owner/repo/a"),
            target: uri("owner/repo/b"),
        };
        let id1 = relation.unique_id();
        let id2 = relation.unique_id();
        assert_eq!(id1, id2);
        assert!(id1.as_str().starts_with("embed-"));
        assert_eq!(id1.as_str().len(), "embed-".len() + 32);
    }

    #[test]
    fn different_relations_hash_differently() {
        let a = Relation::Link { source: uri("a"), target: uri("b") };
        let b = Relation::Link { source: uri("a"), target: uri("c") };
        assert_ne!(a.unique_id(), b.unique_id());
    }

    #[test]
    fn misc_subkind_normalizes() {
        let relation = Relation::new_misc("Microsoft  Teams Link", uri("a"), uri("b"));
        match relation {
            Relation::Misc { subkind, .. } => assert_eq!(subkind, "microsoft_teams_link"),
            _ => panic!("expected Misc"),
        }
    }
}
