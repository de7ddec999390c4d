//! Concrete `Connector` implementations, one module per backend (§4.4,
//! §4.5), plus the shared auth plumbing in `auth` and the registry-building
//! helper that turns a `ConnectorsManifest` into a live `ConnectorRegistry`.

mod auth;
mod confluence;
mod georges;
mod github;
mod gitlab;
mod jira;
mod microsoft_my;
mod microsoft_org;
mod public;
mod testrail;
mod web;

pub use confluence::ConfluenceConnector;
pub use georges::GeorgesConnector;
pub use github::GitHubConnector;
pub use gitlab::GitLabConnector;
pub use jira::JiraConnector;
pub use microsoft_my::MicrosoftMyConnector;
pub use microsoft_org::MicrosoftOrgConnector;
pub use public::PublicConnector;
pub use testrail::TestRailConnector;
pub use web::WebConnector;

use crate::config::{ConnectorConfig, ConnectorsManifest};
use crate::connector::ConnectorRegistry;
use crate::downloader::Downloader;
use crate::errors::GatewayResult;
use crate::uri::Realm;
use std::sync::Arc;

/// Build a `ConnectorRegistry` from a parsed manifest, in dispatch order
/// (§4.4): domain-scoped connectors in manifest order, then the public
/// (ArXiv/YouTube) connector, then the catch-all `WebConnector` last.
pub fn build_registry(manifest: &ConnectorsManifest, downloader: Arc<dyn Downloader>) -> GatewayResult<ConnectorRegistry> {
    let mut registry = ConnectorRegistry::new();

    for entry in &manifest.connectors {
        let connector: Box<dyn crate::connector::Connector> = match entry {
            ConnectorConfig::Confluence { realm, domain, public_token } => Box::new(ConfluenceConnector::new(
                Realm::decode(realm.clone()),
                domain.clone(),
                public_token.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::GitHub { realm, public_token } => Box::new(GitHubConnector::new(
                Realm::decode(realm.clone()),
                public_token.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::GitLab { realm, domain, public_token } => Box::new(GitLabConnector::new(
                Realm::decode(realm.clone()),
                domain.clone(),
                public_token.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::Jira { realm, domain, public_username, public_token } => {
                Box::new(JiraConnector::new(
                    Realm::decode(realm.clone()),
                    domain.clone(),
                    public_username.clone(),
                    public_token.clone(),
                    downloader.clone(),
                ))
            }
            ConnectorConfig::MicrosoftMy { realm, domain, tenant_id } => Box::new(MicrosoftMyConnector::new(
                Realm::decode(realm.clone()),
                domain.clone(),
                tenant_id.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::MicrosoftOrg {
                realm,
                domain,
                tenant_id,
                public_client_id,
                public_client_secret,
                internal_site_ids,
                refresh_site_ids,
            } => Box::new(MicrosoftOrgConnector::new(
                Realm::decode(realm.clone()),
                domain.clone(),
                tenant_id.clone(),
                public_client_id.clone(),
                public_client_secret.clone(),
                internal_site_ids.clone(),
                refresh_site_ids.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::Georges { realm, domain } => Box::new(GeorgesConnector::new(
                Realm::decode(realm.clone()),
                domain.clone(),
                downloader.clone(),
            )),
            ConnectorConfig::Testrail { realm, domain, public_username, public_password } => {
                Box::new(TestRailConnector::new(
                    Realm::decode(realm.clone()),
                    domain.clone(),
                    public_username.clone(),
                    public_password.clone(),
                    downloader.clone(),
                ))
            }
        };
        registry.register(connector)?;
    }

    registry.register(Box::new(PublicConnector::new(downloader.clone())))?;
    registry.register(Box::new(WebConnector::new(downloader)))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;

    #[test]
    fn builds_a_registry_with_public_and_web_appended_last() {
        let manifest = ConnectorsManifest {
            connectors: vec![ConnectorConfig::GitHub {
                realm: "github".to_string(),
                public_token: None,
            }],
        };
        let downloader: Arc<dyn Downloader> = Arc::new(StubDownloader::new());
        let registry = build_registry(&manifest, downloader).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.find_by_realm(&Realm::decode("github")).is_some());
        assert!(registry.find_by_realm(&Realm::decode("public")).is_some());
        assert!(registry.find_by_realm(&Realm::decode("www")).is_some());
    }
}
