//! Configuration surface (§6.6): the `connectors.yml` manifest and the
//! per-repository `nandam.yml` override.
//!
//! Grounded on the teacher's `main.rs` `Config`/`ServerConfig` pattern: plain
//! `serde`-derived structs with `#[serde(default = "...")]` helpers for
//! optional fields, loaded from YAML via `serde_yaml`, rather than a runtime
//! schema validator.

use crate::errors::{GatewayError, GatewayResult};
use serde::Deserialize;

/// One entry in `connectors.yml`. The tag is the connector kind; fields are
/// exactly the options enumerated in §6.6.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConnectorConfig {
    Confluence {
        realm: String,
        domain: String,
        #[serde(default)]
        public_token: Option<String>,
    },
    #[serde(rename = "github")]
    GitHub {
        realm: String,
        #[serde(default)]
        public_token: Option<String>,
    },
    #[serde(rename = "gitlab")]
    GitLab {
        realm: String,
        domain: String,
        public_token: String,
    },
    Jira {
        realm: String,
        domain: String,
        #[serde(default)]
        public_username: Option<String>,
        #[serde(default)]
        public_token: Option<String>,
    },
    #[serde(rename = "microsoft-my")]
    MicrosoftMy {
        realm: String,
        domain: String,
        tenant_id: String,
    },
    #[serde(rename = "microsoft-org")]
    MicrosoftOrg {
        realm: String,
        domain: String,
        tenant_id: String,
        #[serde(default)]
        public_client_id: Option<String>,
        #[serde(default)]
        public_client_secret: Option<String>,
        #[serde(default)]
        internal_site_ids: Vec<String>,
        #[serde(default)]
        refresh_site_ids: Vec<String>,
    },
    Georges {
        realm: String,
        domain: String,
    },
    Testrail {
        realm: String,
        domain: String,
        #[serde(default)]
        public_username: Option<String>,
        #[serde(default)]
        public_password: Option<String>,
    },
}

impl ConnectorConfig {
    pub fn realm(&self) -> &str {
        match self {
            ConnectorConfig::Confluence { realm, .. }
            | ConnectorConfig::GitHub { realm, .. }
            | ConnectorConfig::GitLab { realm, .. }
            | ConnectorConfig::Jira { realm, .. }
            | ConnectorConfig::MicrosoftMy { realm, .. }
            | ConnectorConfig::MicrosoftOrg { realm, .. }
            | ConnectorConfig::Georges { realm, .. }
            | ConnectorConfig::Testrail { realm, .. } => realm,
        }
    }
}

/// The top-level `connectors.yml` document: an ordered list of connector
/// configs. Order is dispatch precedence (§4.4) once `WebConnector` and
/// `PublicConnector` are appended by the caller.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ConnectorsManifest {
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

impl ConnectorsManifest {
    pub fn from_yaml(input: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(input).map_err(|e| GatewayError::config(format!("invalid connectors.yml: {e}")))
    }
}

/// Per-repository override, read from a `nandam.yml` at the repository
/// root (§6.6). `allowed`/`skipped` gate which subproject directories a
/// GitHub/GitLab connector's `$collection` affordance surfaces; see §9's
/// open question on their precedence, resolved in `DESIGN.md`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct NandamConfig {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub skipped_notify: Vec<String>,
    #[serde(default)]
    pub subprojects: std::collections::HashMap<String, SubprojectConfig>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct SubprojectConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl NandamConfig {
    pub fn from_yaml(input: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(input).map_err(|e| GatewayError::config(format!("invalid nandam.yml: {e}")))
    }

    /// Whether `path` should be surfaced in a repository's `$collection`
    /// listing, given this repo-level override (§9 open question, resolved
    /// in `DESIGN.md`: an explicit `allowed` entry always wins over a
    /// `skipped` entry that also matches, since `allowed` is the
    /// maintainer's narrower, more specific opt-in).
    pub fn path_is_allowed(&self, path: &str) -> bool {
        let allowed_match = self.allowed.iter().any(|p| path_matches(path, p));
        let skipped_match = self.skipped.iter().any(|p| path_matches(path, p));
        if allowed_match {
            true
        } else if skipped_match {
            false
        } else {
            self.allowed.is_empty()
        }
    }
}

fn path_matches(path: &str, pattern: &str) -> bool {
    path == pattern || path.starts_with(&format!("{pattern}/"))
}

/// Per-request credential override (§6.7): `realm -> token|header`. When
/// present for a realm, overrides that connector's configured public
/// credential for the duration of the request.
#[derive(Debug, Clone, Default)]
pub struct Creds {
    tokens: std::collections::HashMap<String, String>,
}

impl Creds {
    pub fn new() -> Self {
        Creds::default()
    }

    pub fn with(mut self, realm: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(realm.into(), token.into());
        self
    }

    pub fn get(&self, realm: &str) -> Option<&str> {
        self.tokens.get(realm).map(String::as_str)
    }
}

/// Construct a `Basic` auth header value from a username/password pair
/// (§4.4, §6.7 "Basic-auth and Bearer-auth header construction is
/// centralised").
pub fn basic_auth_header(username: &str, password: &str) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

pub fn bearer_auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_mixed_connectors_manifest() {
        let yaml = r#"
connectors:
  - type: github
    realm: github
    public_token: ghp_abc
  - type: gitlab
    realm: gitlab
    domain: gitlab.example.com
    public_token: glpat_abc
  - type: jira
    realm: jira
    domain: acme.atlassian.net
"#;
        let manifest = ConnectorsManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.connectors.len(), 3);
        assert_eq!(manifest.connectors[0].realm(), "github");
        assert_eq!(manifest.connectors[1].realm(), "gitlab");
    }

    #[test]
    fn nandam_allowed_wins_over_skipped_when_both_match() {
        let config = NandamConfig {
            allowed: vec!["packages/core".to_string()],
            skipped: vec!["packages".to_string()],
            ..Default::default()
        };
        assert!(config.path_is_allowed("packages/core"));
        assert!(!config.path_is_allowed("packages/legacy"));
    }

    #[test]
    fn nandam_default_allow_list_is_permissive() {
        let config = NandamConfig::default();
        assert!(config.path_is_allowed("anything/here"));
    }

    #[test]
    fn basic_auth_header_encodes_credentials() {
        let header = basic_auth_header("user", "pass");
        assert_eq!(header, "Basic dXNlcjpwYXNz");
    }
}
