//! The stable object-storage key layout (§4.7, §6.5). Keys MUST use these
//! literal prefixes for forward compatibility of out-of-band tooling.

use crate::relation::RelationId;
use crate::uri::{Affordance, ResourceUri};
use sha2::{Digest, Sha256};

const SALT: &str = "knowledge-alias";

pub fn resource_key(uri: &ResourceUri) -> String {
    format!("v1/resource/{}/{}/{}.yml", uri.realm(), uri.subrealm(), uri.path())
}

pub fn observed_key(uri: &ResourceUri, affordance: Affordance) -> String {
    format!(
        "v1/observed/{}+{}+{}/{}.yml",
        uri.realm(),
        uri.subrealm(),
        uri.path(),
        affordance
    )
}

/// `v1/alias/{40-char salted hash of reference}.yml` (§4.7).
pub fn alias_key(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SALT.as_bytes());
    hasher.update(reference.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("v1/alias/{}.yml", &digest[..40])
}

pub fn relation_def_key(id: &RelationId) -> String {
    format!("v1/relation/defs/{id}.yml")
}

fn node_part(node: &ResourceUri) -> String {
    format!("{}+{}+{}", node.realm(), node.subrealm(), node.path())
}

pub fn relation_ref_key(node: &ResourceUri, id: &RelationId) -> String {
    format!("v1/relation/refs/{}/{}.txt", node_part(node), id)
}

pub fn relation_ref_prefix(node: &ResourceUri) -> String {
    format!("v1/relation/refs/{}/", node_part(node))
}

/// `v1/delta/{site_id}.txt` (§8 scenario 6): the last `@odata.deltaLink`
/// Graph handed back for a SharePoint site's drive delta feed.
pub fn delta_token_key(site_id: &str) -> String {
    format!("v1/delta/{site_id}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::{Realm, Subrealm};

    #[test]
    fn resource_key_uses_canonical_prefix() {
        let uri = ResourceUri::new(Realm::decode("github"), Subrealm::decode("file"), "acme/widget/README.md");
        assert_eq!(
            resource_key(&uri),
            "v1/resource/github/file/acme/widget/README.md.yml"
        );
    }

    #[test]
    fn alias_key_is_stable_and_40_chars() {
        let a = alias_key("ext://jira/PROJ-42");
        let b = alias_key("ext://jira/PROJ-42");
        assert_eq!(a, b);
        assert!(a.starts_with("v1/alias/"));
        assert_eq!(a.len(), "v1/alias/".len() + 40 + ".yml".len());
    }
}
