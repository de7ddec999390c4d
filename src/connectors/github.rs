//! GitHub connector (§4.4, §8 scenarios 1-2): blobs, trees, commits,
//! compares, and whole repos, addressed by `github.com` web URLs.
//!
//! Grounded on the teacher's `infrastructure/github.rs` `GitHubRepository`:
//! same `Client`, same bearer-token header, same raw-content/contents-API
//! split between blob bytes and directory listings.

use crate::config::{bearer_auth_header, Creds, NandamConfig};
use crate::connector::{
    Connector, GitHubBlobLocator, GitHubCommitLocator, GitHubCompareLocator, GitHubRepoLocator,
    GitHubTreeLocator, Locator, ObserveResult, PostProcessing, Reference, ResolveResult,
};
use crate::content::{AffordanceInfo, Bundle, BundleCollection, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::MetadataDelta;
use crate::metadata::field::FieldDelta;
use crate::strings::MimeType;
use crate::uri::{Affordance, Realm, WebUrl};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

pub struct GitHubConnector {
    realm: Realm,
    public_token: Option<String>,
    downloader: Arc<dyn Downloader>,
}

impl GitHubConnector {
    pub fn new(realm: Realm, public_token: Option<String>, downloader: Arc<dyn Downloader>) -> Self {
        GitHubConnector { realm, public_token, downloader }
    }

    fn auth_header(&self, creds: Option<&Creds>) -> Option<String> {
        crate::connectors::auth::effective_token(creds, self.realm.as_str(), self.public_token.as_deref())
            .map(bearer_auth_header)
    }

    fn headers(&self, creds: Option<&Creds>) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Accept".to_string(), "application/vnd.github+json".to_string());
        if let Some(auth) = self.auth_header(creds) {
            headers.insert("Authorization".to_string(), auth);
        }
        headers
    }

    /// Disambiguate `blob/{ref}/{path...}` (the ref may itself contain
    /// slashes, e.g. `feature/x`) by querying the repo's branch list and
    /// preferring the longest matching prefix; falls back to treating the
    /// first segment alone as the ref when no branch matches.
    async fn split_ref_and_path(
        &self,
        owner: &str,
        repo: &str,
        segments: &[String],
        creds: Option<&Creds>,
    ) -> GatewayResult<(String, Vec<String>)> {
        let branches = self.list_branch_names(owner, repo, creds).await.unwrap_or_default();
        for split in (1..=segments.len()).rev() {
            let candidate = segments[..split].join("/");
            if branches.iter().any(|b| b == &candidate) {
                return Ok((candidate, segments[split..].to_vec()));
            }
        }
        if segments.is_empty() {
            return Err(GatewayError::unavailable());
        }
        Ok((segments[0].clone(), segments[1..].to_vec()))
    }

    async fn list_branch_names(&self, owner: &str, repo: &str, creds: Option<&Creds>) -> GatewayResult<Vec<String>> {
        #[derive(Deserialize)]
        struct BranchDto {
            name: String,
        }
        let url = WebUrl::try_decode(&format!(
            "https://api.github.com/repos/{owner}/{repo}/branches?per_page=100"
        ))?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(creds))).await?;
        let branches: Vec<BranchDto> =
            serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn default_branch(&self, owner: &str, repo: &str, creds: Option<&Creds>) -> GatewayResult<String> {
        #[derive(Deserialize)]
        struct RepoDto {
            default_branch: String,
        }
        let url = WebUrl::try_decode(&format!("https://api.github.com/repos/{owner}/{repo}"))?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(creds))).await?;
        let dto: RepoDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok(dto.default_branch)
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some("github.com") {
            return Ok(None);
        }
        let segments: Vec<String> = url.path().trim_matches('/').split('/').map(str::to_string).collect();
        if segments.len() < 2 || segments[0].is_empty() {
            return Ok(None);
        }
        let owner = segments[0].clone();
        let repo = segments[1].clone();

        if segments.len() == 2 {
            return Ok(Some(Locator::GitHubRepo(GitHubRepoLocator { owner, repo })));
        }

        match segments[2].as_str() {
            "blob" | "tree" => {
                let is_blob = segments[2] == "blob";
                let rest = &segments[3..];
                let (r#ref, path) = self.split_ref_and_path(&owner, &repo, rest, None).await?;
                let default_branch = self.default_branch(&owner, &repo, None).await.unwrap_or_else(|_| r#ref.clone());
                let is_default_branch = r#ref == default_branch;
                Ok(Some(if is_blob {
                    Locator::GitHubBlob(GitHubBlobLocator { owner, repo, r#ref, is_default_branch, path })
                } else {
                    Locator::GitHubTree(GitHubTreeLocator { owner, repo, r#ref, is_default_branch, path })
                }))
            }
            "commit" => {
                let sha = segments.get(3).ok_or_else(GatewayError::unavailable)?.clone();
                Ok(Some(Locator::GitHubCommit(GitHubCommitLocator { owner, repo, sha })))
            }
            "compare" => {
                let range = segments.get(3).ok_or_else(GatewayError::unavailable)?;
                let (base, head) = range
                    .split_once("...")
                    .ok_or_else(GatewayError::unavailable)?;
                Ok(Some(Locator::GitHubCompare(GitHubCompareLocator {
                    owner,
                    repo,
                    base: base.to_string(),
                    head: head.to_string(),
                })))
            }
            _ => Ok(None),
        }
    }

    #[instrument(skip(self, _cached))]
    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let mut metadata = MetadataDelta::default();
        let mut affordances = HashMap::new();
        match locator {
            Locator::GitHubRepo(l) => {
                metadata.name = FieldDelta::Set(format!("{}/{}", l.owner, l.repo));
                affordances.insert(Affordance::Collection, AffordanceInfo::default());
            }
            Locator::GitHubBlob(l) => {
                let name = l.path.last().cloned().unwrap_or_else(|| l.repo.clone());
                let mime = MimeType::guess_from_filename(&name);
                metadata.name = FieldDelta::Set(name);
                affordances.insert(
                    Affordance::Body,
                    AffordanceInfo { mime_type: Some(mime.clone()), ..Default::default() },
                );
                // §8 scenario 1: `$plain` is only advertised when the blob's
                // MIME is text-flavored; a PDF or image blob has no plain
                // rendering (§7 `BadRequestError`).
                if mime.is_text() {
                    affordances.insert(
                        Affordance::Plain,
                        AffordanceInfo { mime_type: Some(mime.clone()), ..Default::default() },
                    );
                }
                metadata.mime_type = FieldDelta::Set(mime);
            }
            Locator::GitHubTree(l) => {
                let name = l.path.last().cloned().unwrap_or_else(|| l.repo.clone());
                metadata.name = FieldDelta::Set(name);
                affordances.insert(Affordance::Collection, AffordanceInfo::default());
            }
            Locator::GitHubCommit(l) => {
                metadata.name = FieldDelta::Set(l.sha.clone());
                affordances.insert(Affordance::Body, AffordanceInfo::default());
            }
            Locator::GitHubCompare(l) => {
                metadata.name = FieldDelta::Set(format!("{}...{}", l.base, l.head));
                affordances.insert(Affordance::Body, AffordanceInfo::default());
            }
            _ => return Err(GatewayError::unavailable()),
        }
        metadata.affordances = Some(affordances);
        metadata.citation_url = locator
            .citation_url()
            .map(FieldDelta::Set)
            .unwrap_or(FieldDelta::Unset);

        Ok(ResolveResult {
            metadata,
            expired: Vec::new(),
            should_cache: true,
        })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        match (locator, observable) {
            (Locator::GitHubBlob(l), Affordance::Plain) => {
                let mime = MimeType::guess_from_filename(l.path.last().map(String::as_str).unwrap_or(""));
                if !mime.is_text() {
                    return Err(GatewayError::bad_request(observable));
                }
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let (bytes, _, _) = self.downloader.fetch_bytes(&url, Some(&self.headers(None))).await?;
                let text = String::from_utf8_lossy(&bytes).to_string();
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::plain(text)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, extract_label: true, link_relations: true, ..Default::default() },
                })
            }
            (Locator::GitHubBlob(_), Affordance::Body) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let (bytes, mime, _) = self.downloader.fetch_bytes(&url, Some(&self.headers(None))).await?;
                let text = String::from_utf8_lossy(&bytes).to_string();
                let bundle = if mime.as_str() == "text/markdown" || mime.as_str() == "text/x-markdown" {
                    Bundle::Fragment(Fragment::markdown(text))
                } else {
                    Bundle::Fragment(Fragment::plain(text))
                };
                Ok(ObserveResult {
                    bundle,
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, extract_label: true, link_relations: true, ..Default::default() },
                })
            }
            (Locator::GitHubRepo(_), Affordance::Collection) | (Locator::GitHubTree(_), Affordance::Collection) => {
                self.observe_collection(locator).await
            }
            (Locator::GitHubCompare(_), Affordance::Body) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None))).await?;
                let text = render_compare(&value);
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::markdown(text)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, ..Default::default() },
                })
            }
            _ => Err(GatewayError::bad_request(observable)),
        }
    }
}

impl GitHubConnector {
    async fn observe_collection(&self, locator: &Locator) -> GatewayResult<ObserveResult> {
        let (owner, repo, path) = match locator {
            Locator::GitHubRepo(l) => (l.owner.clone(), l.repo.clone(), Vec::new()),
            Locator::GitHubTree(l) => (l.owner.clone(), l.repo.clone(), l.path.clone()),
            _ => return Err(GatewayError::bad_request(Affordance::Collection)),
        };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None))).await?;

        #[derive(Deserialize)]
        struct ContentsEntry {
            name: String,
            #[serde(rename = "type")]
            kind: String,
        }
        let entries: Vec<ContentsEntry> =
            serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let nandam = self.fetch_nandam(&owner, &repo).await.unwrap_or_default();

        let mut results = Vec::new();
        for entry in entries {
            let mut child_path = path.clone();
            child_path.push(entry.name.clone());
            let rel_path = child_path.join("/");
            if !nandam.path_is_allowed(&rel_path) {
                continue;
            }
            let child = if entry.kind == "dir" {
                Locator::GitHubTree(crate::connector::GitHubTreeLocator {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    r#ref: "HEAD".to_string(),
                    is_default_branch: true,
                    path: child_path,
                })
            } else {
                Locator::GitHubBlob(GitHubBlobLocator {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    r#ref: "HEAD".to_string(),
                    is_default_branch: true,
                    path: child_path,
                })
            };
            results.push(child.resource_uri());
        }

        Ok(ObserveResult {
            bundle: Bundle::BundleCollection(BundleCollection {
                uri: locator.resource_uri(),
                results,
            }),
            observed: None,
            relations: Vec::new(),
            post_processing: PostProcessing { cache: true, ..Default::default() },
        })
    }

    /// Best-effort fetch of the repository's `nandam.yml` override (§6.6);
    /// a missing or unparsable file means "no override" rather than an
    /// error, since most repositories don't carry one.
    async fn fetch_nandam(&self, owner: &str, repo: &str) -> GatewayResult<NandamConfig> {
        let url = WebUrl::try_decode(&format!(
            "https://raw.githubusercontent.com/{owner}/{repo}/HEAD/nandam.yml"
        ))?;
        let (bytes, _, _) = self.downloader.fetch_bytes(&url, None).await?;
        NandamConfig::from_yaml(&String::from_utf8_lossy(&bytes))
    }
}

fn render_compare(value: &serde_json::Value) -> String {
    let mut out = String::new();
    out.push_str("<commits>\n");
    if let Some(commits) = value.get("commits").and_then(|c| c.as_array()) {
        for commit in commits {
            let sha = commit.get("sha").and_then(|s| s.as_str()).unwrap_or_default();
            let message = commit
                .get("commit")
                .and_then(|c| c.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            out.push_str(&format!("{sha}: {message}\n"));
        }
    }
    out.push_str("</commits>\n<diffs>\n");
    if let Some(files) = value.get("files").and_then(|f| f.as_array()) {
        for file in files {
            let filename = file.get("filename").and_then(|f| f.as_str()).unwrap_or_default();
            let patch = file.get("patch").and_then(|p| p.as_str()).unwrap_or_default();
            out.push_str(&format!("<file_diff path=\"{filename}\">\n{patch}\n</file_diff>\n"));
        }
    }
    out.push_str("</diffs>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;

    fn connector() -> GitHubConnector {
        GitHubConnector::new(Realm::decode("github"), None, Arc::new(StubDownloader::new()))
    }

    #[tokio::test]
    async fn locator_rejects_non_github_hosts() {
        let connector = connector();
        let reference = Reference::Web(WebUrl::try_decode("https://example.com/acme/widget").unwrap());
        assert!(connector.locator(&reference).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn locator_recognizes_bare_repo_url() {
        let connector = connector();
        let reference = Reference::Web(WebUrl::try_decode("https://github.com/acme/widget").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::GitHubRepo(l) if l.owner == "acme" && l.repo == "widget"));
    }

    #[tokio::test]
    async fn resolve_advertises_body_and_plain_for_a_markdown_blob() {
        let connector = connector();
        let locator = Locator::GitHubBlob(GitHubBlobLocator {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            r#ref: "main".to_string(),
            is_default_branch: true,
            path: vec!["README.md".to_string()],
        });
        let resolved = connector.resolve(&locator, None).await.unwrap();
        let affordances = resolved.metadata.affordances.unwrap();
        assert!(affordances.contains_key(&Affordance::Body));
        assert!(affordances.contains_key(&Affordance::Plain));
    }

    #[tokio::test]
    async fn resolve_does_not_advertise_plain_for_a_pdf_blob() {
        let connector = connector();
        let locator = Locator::GitHubBlob(GitHubBlobLocator {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            r#ref: "main".to_string(),
            is_default_branch: true,
            path: vec!["spec.pdf".to_string()],
        });
        let resolved = connector.resolve(&locator, None).await.unwrap();
        let affordances = resolved.metadata.affordances.unwrap();
        assert!(affordances.contains_key(&Affordance::Body));
        assert!(!affordances.contains_key(&Affordance::Plain));
    }

    #[tokio::test]
    async fn observe_plain_rejects_non_text_blob() {
        let connector = connector();
        let locator = Locator::GitHubBlob(GitHubBlobLocator {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            r#ref: "main".to_string(),
            is_default_branch: true,
            path: vec!["spec.pdf".to_string()],
        });
        let resolved = connector.resolve(&locator, None).await.unwrap();
        let err = connector.observe(&locator, Affordance::Plain, &resolved).await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest { .. }));
    }
}
