//! Connector dispatch and lifecycle protocol (§4.4): `Locator`, the
//! `Connector` trait, dispatch precedence, and the `resolve`/`observe`
//! result shapes.

mod locator;

pub use locator::{
    ArXivPaperLocator, ConfluencePageLocator, GeorgesPageLocator, GitHubBlobLocator,
    GitHubCommitLocator, GitHubCompareLocator, GitHubRepoLocator, GitHubTreeLocator,
    GitLabBlobLocator, GitLabCommitLocator, GitLabCompareLocator, GitLabProjectLocator,
    GitLabTreeLocator, ImageBlobLocator, JiraIssueLocator, Locator, MsChatMessageLocator,
    MsDriveFileLocator, MsEmailLocator, MsSharePointFileLocator, TeamsMessageLocator,
    TestRailCaseLocator, WebPageLocator, YouTubeVideoLocator,
};

use crate::content::Bundle;
use crate::errors::GatewayResult;
use crate::metadata::{MetadataDelta, ObservedDelta};
use crate::relation::Relation;
use crate::uri::{Affordance, ExternalUri, Realm, ResourceUri, WebUrl};
use async_trait::async_trait;

/// What a caller hands the coordinator to start dispatch: a web URL, an
/// opaque external id, or an already-canonical internal resource URI (e.g.
/// a cached alias being re-resolved, §4.6).
#[derive(Debug, Clone)]
pub enum Reference {
    Web(WebUrl),
    External(ExternalUri),
    Resource(ResourceUri),
}

impl Reference {
    pub fn as_str_for_cache_key(&self) -> String {
        match self {
            Reference::Web(w) => w.to_string(),
            Reference::External(e) => e.to_string(),
            Reference::Resource(r) => r.to_string(),
        }
    }
}

/// The result of `Connector::resolve` (§4.4): a metadata delta, the set of
/// observables the connector now knows to be stale, and a caching hint.
#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub metadata: MetadataDelta,
    pub expired: Vec<Affordance>,
    pub should_cache: bool,
}

/// Flags a connector returns alongside an `ObserveResult` telling the
/// caller what post-processing to run over the bundle (§4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcessing {
    pub cache: bool,
    pub extract_label: bool,
    pub link_relations: bool,
    pub parent_relations: bool,
}

/// The result of `Connector::observe` (§4.4): the fetched bundle plus
/// optional metadata/relation side effects.
#[derive(Debug, Clone)]
pub struct ObserveResult {
    pub bundle: Bundle,
    pub observed: Option<ObservedDelta>,
    pub relations: Vec<Relation>,
    pub post_processing: PostProcessing,
}

/// A per-backend adapter implementing the locator/resolve/observe protocol
/// (§4.4). Implementations are value-typed; any request-scoped auth or
/// response caching lives behind an internal lazily-constructed handle, not
/// in fields mutated through `&self`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// This connector's namespace in the internal URI space.
    fn realm(&self) -> &Realm;

    /// Dispatch rule: if `reference` belongs to this connector, return a
    /// concrete `Locator`; return `Ok(None)` to defer to the next
    /// registered connector; return `Err(UnavailableError)` if it clearly
    /// belongs here but cannot be resolved to a real item (§4.4).
    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>>;

    /// Validate access and compute a lightweight metadata delta. MUST NOT
    /// fetch full content; MUST raise `UnavailableError` when the caller
    /// may not access the resource (§4.4).
    async fn resolve(
        &self,
        locator: &Locator,
        cached: Option<&MetadataDelta>,
    ) -> GatewayResult<ResolveResult>;

    /// Perform the (possibly expensive) fetch for one affordance and
    /// return its bundle plus side effects (§4.4, §4.5).
    async fn observe(
        &self,
        locator: &Locator,
        observable: Affordance,
        resolved: &ResolveResult,
    ) -> GatewayResult<ObserveResult>;

    /// Sync deltas from upstream (e.g. a SharePoint drive delta token) and
    /// return the locators that changed. Connectors without a push/delta
    /// channel keep the default no-op (§4.4, §8 scenario 6).
    async fn refresh(&self) -> GatewayResult<Vec<Locator>> {
        Ok(Vec::new())
    }
}

/// An ordered connector list. Registration order is dispatch precedence
/// (§4.4): domain-scoped connectors first, `PublicConnector` before the
/// catch-all, `WebConnector` last.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        ConnectorRegistry { connectors: Vec::new() }
    }

    /// Register `connector`, rejecting a duplicate realm as a
    /// configuration error (§7).
    pub fn register(&mut self, connector: Box<dyn Connector>) -> GatewayResult<()> {
        let realm = connector.realm().clone();
        if self.connectors.iter().any(|c| *c.realm() == realm) {
            return Err(crate::errors::GatewayError::config(format!(
                "duplicate connector realm: {realm}"
            )));
        }
        self.connectors.push(connector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn find_by_realm(&self, realm: &Realm) -> Option<&dyn Connector> {
        self.connectors.iter().find(|c| c.realm() == realm).map(|b| b.as_ref())
    }

    /// Try each connector in registration order; the first to return
    /// `Some` wins. A connector that returns `UnavailableError` aborts the
    /// lookup rather than deferring to the next one (§4.4).
    pub async fn dispatch(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        for connector in &self.connectors {
            if let Some(locator) = connector.locator(reference).await? {
                return Ok(Some(locator));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;

    struct StubConnector {
        realm: Realm,
        matches: bool,
    }

    #[async_trait]
    impl Connector for StubConnector {
        fn realm(&self) -> &Realm {
            &self.realm
        }

        async fn locator(&self, _reference: &Reference) -> GatewayResult<Option<Locator>> {
            if self.matches {
                Ok(Some(Locator::ArXivPaper(ArXivPaperLocator {
                    paper_id: "1234.5678".into(),
                })))
            } else {
                Ok(None)
            }
        }

        async fn resolve(
            &self,
            _locator: &Locator,
            _cached: Option<&MetadataDelta>,
        ) -> GatewayResult<ResolveResult> {
            Ok(ResolveResult::default())
        }

        async fn observe(
            &self,
            _locator: &Locator,
            _observable: Affordance,
            _resolved: &ResolveResult,
        ) -> GatewayResult<ObserveResult> {
            Err(GatewayError::unavailable())
        }
    }

    #[tokio::test]
    async fn dispatch_tries_connectors_in_order_and_stops_at_first_match() {
        let mut registry = ConnectorRegistry::new();
        registry
            .register(Box::new(StubConnector {
                realm: Realm::decode("first"),
                matches: false,
            }))
            .unwrap();
        registry
            .register(Box::new(StubConnector {
                realm: Realm::decode("second"),
                matches: true,
            }))
            .unwrap();

        let reference = Reference::Web(WebUrl::try_decode("https://arxiv.org/abs/1234.5678").unwrap());
        let locator = registry.dispatch(&reference).await.unwrap();
        assert!(locator.is_some());
    }

    #[test]
    fn register_rejects_duplicate_realm() {
        let mut registry = ConnectorRegistry::new();
        registry
            .register(Box::new(StubConnector {
                realm: Realm::decode("github"),
                matches: false,
            }))
            .unwrap();
        let err = registry.register(Box::new(StubConnector {
            realm: Realm::decode("github"),
            matches: false,
        }));
        assert!(err.is_err());
    }
}
