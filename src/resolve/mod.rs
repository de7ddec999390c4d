//! Resolution coordinator (§4.6): turns a `Reference` into a `Locator`
//! (inferring and, on success, persisting an alias), resolves a `Locator`
//! against its connector, and wires both into the batched,
//! relation-resolving entry point the API layer calls per request.
//!
//! Grounded on `knowledge/domain/resolve.py`. The Python original
//! memoises both successes and exceptions in a per-request dict and
//! re-raises a cached exception on a repeat lookup within the same
//! request; `CacheResolve` below reproduces that by caching
//! `GatewayResult<T>` directly.

use crate::connector::{ConnectorRegistry, Locator, Reference, ResolveResult};
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::MetadataDelta;
use crate::relation::{Relation, RelationId};
use crate::storage::{CacheStorage, StorageService};
use crate::uri::ResourceUri;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// How many references `try_infer_and_resolve_locators` resolves per
/// concurrent batch. Matches `BATCH_SIZE_RESOLVE` in the original.
const BATCH_SIZE_RESOLVE: usize = 10;

/// Whether a relation endpoint in `realm` should get a persisted
/// back-reference. Preserves the original predicate verbatim rather than
/// fixing it: the source wrote `realm not in ("www,")`, where `("www,")` is
/// a plain string (the parens don't make it a tuple without a trailing
/// comma outside the quotes), so this is a substring check against the
/// four characters `www,` rather than an equality check against `www`.
fn should_backlink(realm: &str) -> bool {
    !"www,".contains(realm)
}

/// Request-scoped memoisation of locator inference and locator resolution,
/// keyed by the reference's cache-key string. Both successes and failures
/// are cached: a reference that fails to infer/resolve once in a request
/// fails the same way for the rest of that request, without retrying the
/// connector (§3.8, §5).
#[derive(Default)]
pub struct CacheResolve {
    locators: Mutex<HashMap<String, Option<Locator>>>,
    resolves: Mutex<HashMap<String, GatewayResult<ResolveResult>>>,
}

impl CacheResolve {
    pub fn new() -> Self {
        CacheResolve::default()
    }
}

impl Clone for GatewayError {
    fn clone(&self) -> Self {
        match self {
            GatewayError::Unavailable => GatewayError::Unavailable,
            GatewayError::BadRequest { affordance } => GatewayError::BadRequest { affordance: *affordance },
            GatewayError::Download { status, message } => {
                GatewayError::Download { status: *status, message: message.clone() }
            }
            GatewayError::Ingestion(s) => GatewayError::Ingestion(s.clone()),
            GatewayError::Config(s) => GatewayError::Config(s.clone()),
            GatewayError::Validation { type_name, input, regex } => GatewayError::Validation {
                type_name,
                input: input.clone(),
                regex,
            },
        }
    }
}

impl Clone for ResolveResult {
    fn clone(&self) -> Self {
        ResolveResult {
            metadata: self.metadata.clone(),
            expired: self.expired.clone(),
            should_cache: self.should_cache,
        }
    }
}

/// Infer a `Locator` for `reference`, consulting (in order) the request
/// cache, a cached `ResourceHistory`'s merged locator, a persisted alias,
/// and finally connector dispatch. On a fresh successful inference from an
/// `ExternalUri` with no existing history, persists the alias so later
/// requests skip connector dispatch entirely (§4.6).
#[instrument(skip_all, fields(reference = %reference.as_str_for_cache_key()))]
pub async fn try_infer_locator(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    reference: &Reference,
) -> Option<Locator> {
    let key = reference.as_str_for_cache_key();
    {
        let cache = cache_resolve.locators.lock().unwrap();
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
    }

    let mut had_history = false;
    let inferred = if let Reference::Resource(uri) = reference {
        match cache_storage.get_or_load_history(storage, uri).await {
            Ok(Some(history)) => {
                had_history = true;
                history.merged().locator
            }
            _ => None,
        }
    } else {
        None
    };

    let inferred = match inferred {
        Some(locator) => Some(locator),
        None => match cache_storage.get_or_load_alias(storage, &key).await {
            Ok(Some(locator)) => Some(locator),
            _ => match registry.dispatch(reference).await {
                Ok(Some(locator)) => {
                    if matches!(reference, Reference::External(_)) && !had_history {
                        if let Err(err) = storage.save_alias(&key, &locator).await {
                            debug!(%err, "failed to persist alias after locator inference");
                        }
                    }
                    Some(locator)
                }
                Ok(None) => None,
                Err(err) => {
                    debug!(%err, "locator inference failed");
                    None
                }
            },
        },
    };

    cache_resolve
        .locators
        .lock()
        .unwrap()
        .insert(key, inferred.clone());
    inferred
}

/// Infer locators for each of `references` in order, sequentially (only
/// the batch-resolve step below runs concurrently, matching the original).
pub async fn try_infer_locators(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    references: &[Reference],
) -> Vec<Option<Locator>> {
    let mut out = Vec::with_capacity(references.len());
    for reference in references {
        out.push(try_infer_locator(registry, storage, cache_storage, cache_resolve, reference).await);
    }
    out
}

/// Resolve `locator` against its connector, propagating any failure
/// (unlike inference, resolution errors are not swallowed here — callers
/// that want a best-effort resolution use `try_resolve_locator`).
#[instrument(skip_all, fields(realm = %locator.realm()))]
pub async fn resolve_locator(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    locator: &Locator,
) -> GatewayResult<ResolveResult> {
    let key = locator.resource_uri().to_string();
    {
        let cache = cache_resolve.resolves.lock().unwrap();
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
    }

    let connector = registry
        .find_by_realm(locator.realm())
        .ok_or_else(GatewayError::unavailable)?;

    let uri = locator.resource_uri();
    let cached_metadata = match cache_storage.get_or_load_history(storage, &uri).await {
        Ok(Some(history)) => Some(history.merged().metadata),
        _ => None,
    };

    let result = connector.resolve(locator, cached_metadata.as_ref()).await;
    cache_resolve
        .resolves
        .lock()
        .unwrap()
        .insert(key, result.clone());
    result
}

/// Best-effort resolution: swallows any failure and returns `None`.
pub async fn try_resolve_locator(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    locator: &Locator,
) -> Option<ResolveResult> {
    resolve_locator(registry, storage, cache_storage, cache_resolve, locator)
        .await
        .ok()
}

/// Infer then resolve in one step; `None` if either stage fails.
pub async fn try_infer_and_resolve_locator(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    reference: &Reference,
) -> Option<(Locator, ResolveResult)> {
    let locator = try_infer_locator(registry, storage, cache_storage, cache_resolve, reference).await?;
    let resolved = try_resolve_locator(registry, storage, cache_storage, cache_resolve, &locator).await?;
    Some((locator, resolved))
}

/// Infer and resolve every reference in `references`, deduplicated by
/// cache key, processed in batches of `BATCH_SIZE_RESOLVE` concurrently
/// run requests within a batch, batches sequential. Only references that
/// both infer and resolve successfully appear in the returned map; order
/// is otherwise irrelevant since the result is keyed by cache key.
pub async fn try_infer_and_resolve_locators(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    references: &[Reference],
) -> HashMap<String, (Locator, ResolveResult)> {
    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<&Reference> = references
        .iter()
        .filter(|r| seen.insert(r.as_str_for_cache_key()))
        .collect();

    let mut out = HashMap::new();
    for batch in deduped.chunks(BATCH_SIZE_RESOLVE) {
        let futures = batch.iter().map(|reference| async move {
            let result = try_infer_and_resolve_locator(registry, storage, cache_storage, cache_resolve, reference).await;
            (reference.as_str_for_cache_key(), result)
        });
        let results = futures::future::join_all(futures).await;
        for (key, result) in results {
            if let Some(pair) = result {
                out.insert(key, pair);
            }
        }
    }
    out
}

/// Infer and resolve every endpoint of `relations`, keep only relations
/// whose both endpoints resolved, then build the per-node relation-id map
/// a caller uses to persist backreferences — excluding `origin` itself,
/// since the origin resource is the one already being observed and does
/// not need a self-referential update (§4.5 `try_resolve_relations`).
pub async fn try_resolve_relations(
    registry: &ConnectorRegistry,
    storage: &StorageService,
    cache_storage: &CacheStorage,
    cache_resolve: &CacheResolve,
    origin: &ResourceUri,
    relations: &[Relation],
) -> (Vec<Relation>, Vec<(Locator, Vec<RelationId>)>) {
    let mut endpoint_uris: Vec<ResourceUri> = Vec::new();
    for relation in relations {
        let (a, b) = relation.nodes();
        endpoint_uris.push(a.clone());
        endpoint_uris.push(b.clone());
    }
    endpoint_uris.sort_by_key(|u| u.to_string());
    endpoint_uris.dedup_by_key(|u| u.to_string());

    let references: Vec<Reference> = endpoint_uris.into_iter().map(Reference::Resource).collect();
    let resolved =
        try_infer_and_resolve_locators(registry, storage, cache_storage, cache_resolve, &references).await;

    let mut valid_relations: Vec<Relation> = relations
        .iter()
        .filter(|r| {
            let (a, b) = r.nodes();
            resolved.contains_key(&a.to_string()) && resolved.contains_key(&b.to_string())
        })
        .cloned()
        .collect();
    // §8 "Relation dedup invariant": the returned list's `unique_id()`s must
    // be strictly sorted and unique, the same treatment `ResourceView::
    // all_relations` applies.
    let mut seen = std::collections::HashSet::new();
    valid_relations.retain(|r| seen.insert(r.unique_id()));
    valid_relations.sort_by_key(|r| r.unique_id().into_string());

    let mut valid_mapping: HashMap<String, (Locator, Vec<RelationId>)> = HashMap::new();
    for relation in &valid_relations {
        let (a, b) = relation.nodes();
        for node in [a, b] {
            if node == origin || !should_backlink(node.realm().as_str()) {
                continue;
            }
            let key = node.to_string();
            let Some((locator, _)) = resolved.get(&key) else { continue };
            valid_mapping
                .entry(key)
                .or_insert_with(|| (locator.clone(), Vec::new()))
                .1
                .push(relation.unique_id());
        }
    }

    let mut pairs: Vec<(String, (Locator, Vec<RelationId>))> = valid_mapping.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mapping = pairs.into_iter().map(|(_, v)| v).collect();

    (valid_relations, mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ArXivPaperLocator, Connector, ObserveResult, Reference};
    use crate::uri::{Affordance, Realm, Subrealm};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryStore {
        objects: StdMutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl crate::storage::ObjectStore for InMemoryStore {
        async fn object_get(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }
        async fn object_set(&self, key: &str, body: &[u8]) -> GatewayResult<()> {
            self.objects.lock().unwrap().insert(key.to_string(), body.to_vec());
            Ok(())
        }
        async fn object_list(&self, prefix: &str) -> GatewayResult<Vec<String>> {
            Ok(self.objects.lock().unwrap().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }
        async fn object_delete(&self, key: &str) -> GatewayResult<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct ArxivStub;

    #[async_trait]
    impl Connector for ArxivStub {
        fn realm(&self) -> &Realm {
            static R: once_cell::sync::Lazy<Realm> = once_cell::sync::Lazy::new(|| Realm::decode("public"));
            &R
        }

        async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
            match reference {
                Reference::Web(url) if url.as_url().host_str() == Some("arxiv.org") => {
                    Ok(Some(Locator::ArXivPaper(ArXivPaperLocator { paper_id: "1234.5678".into() })))
                }
                Reference::Resource(uri) if uri.realm().as_str() == "public" && uri.subrealm().as_str() == "arxiv" => {
                    Ok(Some(Locator::ArXivPaper(ArXivPaperLocator { paper_id: uri.path().to_string().into() })))
                }
                _ => Ok(None),
            }
        }

        async fn resolve(&self, _locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
            Ok(ResolveResult { should_cache: true, ..Default::default() })
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

    fn registry() -> ConnectorRegistry {
        let mut r = ConnectorRegistry::new();
        r.register(Box::new(ArxivStub)).unwrap();
        r
    }

    #[tokio::test]
    async fn infers_and_resolves_a_fresh_reference() {
        let registry = registry();
        let storage = StorageService::new(Box::new(InMemoryStore::default()));
        let cache_storage = CacheStorage::new();
        let cache_resolve = CacheResolve::new();
        let reference = Reference::Web(crate::uri::WebUrl::try_decode("https://arxiv.org/abs/1234.5678").unwrap());

        let result = try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference).await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn batched_resolution_dedupes_and_skips_unresolvable() {
        let registry = registry();
        let storage = StorageService::new(Box::new(InMemoryStore::default()));
        let cache_storage = CacheStorage::new();
        let cache_resolve = CacheResolve::new();

        let arxiv = Reference::Web(crate::uri::WebUrl::try_decode("https://arxiv.org/abs/1234.5678").unwrap());
        let unresolvable = Reference::Web(crate::uri::WebUrl::try_decode("https://example.com/nope").unwrap());
        let references = vec![arxiv.clone(), arxiv.clone(), unresolvable];

        let resolved = try_infer_and_resolve_locators(&registry, &storage, &cache_storage, &cache_resolve, &references).await;
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key(&arxiv.as_str_for_cache_key()));
    }

    #[tokio::test]
    async fn resolve_relations_excludes_origin_from_mapping() {
        let registry = registry();
        let storage = StorageService::new(Box::new(InMemoryStore::default()));
        let cache_storage = CacheStorage::new();
        let cache_resolve = CacheResolve::new();

        let origin = ResourceUri::new(Realm::decode("public"), Subrealm::decode("arxiv"), "1234.5678");
        let target = ResourceUri::new(Realm::decode("public"), Subrealm::decode("arxiv"), "8765.4321");
        let relations = vec![Relation::Link { source: origin.clone(), target: target.clone() }];

        let (valid, mapping) = try_resolve_relations(&registry, &storage, &cache_storage, &cache_resolve, &origin, &relations).await;
        assert_eq!(valid.len(), 1);
        assert_eq!(mapping.len(), 1);
        assert!(!mapping.iter().any(|(l, _)| l.resource_uri() == origin));
    }

    #[tokio::test]
    async fn resolve_relations_dedups_and_sorts_by_unique_id() {
        let registry = registry();
        let storage = StorageService::new(Box::new(InMemoryStore::default()));
        let cache_storage = CacheStorage::new();
        let cache_resolve = CacheResolve::new();

        let origin = ResourceUri::new(Realm::decode("public"), Subrealm::decode("arxiv"), "1234.5678");
        let target = ResourceUri::new(Realm::decode("public"), Subrealm::decode("arxiv"), "8765.4321");
        // The same edge proposed twice (as `Link` and as its duplicate)
        // plus a distinct `Embed` edge between the same two endpoints.
        let relations = vec![
            Relation::Link { source: origin.clone(), target: target.clone() },
            Relation::Link { source: origin.clone(), target: target.clone() },
            Relation::Embed { source: origin.clone(), target: target.clone() },
        ];

        let (valid, _mapping) =
            try_resolve_relations(&registry, &storage, &cache_storage, &cache_resolve, &origin, &relations).await;

        assert_eq!(valid.len(), 2);
        let ids: Vec<String> = valid.iter().map(|r| r.unique_id().into_string()).collect();
        let mut sorted_unique = ids.clone();
        sorted_unique.sort();
        sorted_unique.dedup();
        assert_eq!(ids, sorted_unique);
    }

    #[test]
    fn should_backlink_preserves_the_substring_quirk() {
        assert!(should_backlink("github"));
        assert!(should_backlink("jira"));
        // These realms are substrings of the literal "www," and are
        // therefore (incorrectly, but intentionally) excluded too.
        assert!(!should_backlink("www"));
        assert!(!should_backlink("w"));
        assert!(!should_backlink(""));
    }
}
