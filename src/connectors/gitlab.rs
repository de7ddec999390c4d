//! GitLab connector (§4.4, §8 scenario 3): blobs, trees, commits, and
//! compares, addressed by web URLs against a configured self-hosted domain.
//!
//! Grounded on `github.rs` in this same module: identical dispatch and
//! fetch shape, generalized to GitLab's `-/blob|tree|commit|compare` path
//! convention and numeric-id project API.

use crate::config::{bearer_auth_header, NandamConfig};
use crate::connector::{
    Connector, GitLabBlobLocator, GitLabCommitLocator, GitLabCompareLocator, GitLabProjectLocator,
    GitLabTreeLocator, Locator, ObserveResult, PostProcessing, Reference, ResolveResult,
};
use crate::content::{Bundle, BundleCollection, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::uri::{Affordance, Realm, WebUrl};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct GitLabConnector {
    realm: Realm,
    domain: String,
    public_token: String,
    downloader: Arc<dyn Downloader>,
}

impl GitLabConnector {
    pub fn new(realm: Realm, domain: String, public_token: String, downloader: Arc<dyn Downloader>) -> Self {
        GitLabConnector { realm, domain, public_token, downloader }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), bearer_auth_header(&self.public_token));
        headers
    }

    fn project_id(group_path: &[String], project: &str) -> String {
        let mut parts = group_path.to_vec();
        parts.push(project.to_string());
        percent_encoding::utf8_percent_encode(&parts.join("/"), percent_encoding::NON_ALPHANUMERIC).to_string()
    }

    async fn default_branch(&self, group_path: &[String], project: &str) -> GatewayResult<String> {
        #[derive(Deserialize)]
        struct ProjectDto {
            default_branch: String,
        }
        let url = WebUrl::try_decode(&format!(
            "https://{}/api/v4/projects/{}",
            self.domain,
            Self::project_id(group_path, project)
        ))?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: ProjectDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok(dto.default_branch)
    }
}

#[async_trait]
impl Connector for GitLabConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some(self.domain.as_str()) {
            return Ok(None);
        }
        let segments: Vec<String> = url.path().trim_matches('/').split('/').map(str::to_string).collect();
        let Some(dash) = segments.iter().position(|s| s == "-") else {
            if segments.len() >= 2 {
                let project = segments.last().unwrap().clone();
                let group_path = segments[..segments.len() - 1].to_vec();
                return Ok(Some(Locator::GitLabProject(GitLabProjectLocator {
                    domain: self.domain.clone(),
                    group_path,
                    project,
                })));
            }
            return Ok(None);
        };
        if dash < 1 || dash + 1 >= segments.len() {
            return Ok(None);
        }
        let project = segments[dash - 1].clone();
        let group_path = segments[..dash - 1].to_vec();
        let kind = segments[dash + 1].as_str();
        let rest = &segments[dash + 2..];

        match kind {
            "blob" | "tree" => {
                if rest.is_empty() {
                    return Ok(None);
                }
                let r#ref = rest[0].clone();
                let path = rest[1..].to_vec();
                let default_branch = self.default_branch(&group_path, &project).await.unwrap_or_else(|_| r#ref.clone());
                let is_default_branch = r#ref == default_branch;
                Ok(Some(if kind == "blob" {
                    Locator::GitLabBlob(GitLabBlobLocator { domain: self.domain.clone(), group_path, project, r#ref, is_default_branch, path })
                } else {
                    Locator::GitLabTree(GitLabTreeLocator { domain: self.domain.clone(), group_path, project, r#ref, is_default_branch, path })
                }))
            }
            "commit" => {
                let sha = rest.first().ok_or_else(GatewayError::unavailable)?.clone();
                Ok(Some(Locator::GitLabCommit(GitLabCommitLocator { domain: self.domain.clone(), group_path, project, sha })))
            }
            "compare" => {
                let range = rest.first().ok_or_else(GatewayError::unavailable)?;
                let (base, head) = range.split_once("...").ok_or_else(GatewayError::unavailable)?;
                Ok(Some(Locator::GitLabCompare(GitLabCompareLocator {
                    domain: self.domain.clone(),
                    group_path,
                    project,
                    base: base.to_string(),
                    head: head.to_string(),
                })))
            }
            _ => Ok(None),
        }
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let mut metadata = MetadataDelta::default();
        let name = match locator {
            Locator::GitLabProject(l) => format!("{}/{}", l.group_path.join("/"), l.project),
            Locator::GitLabBlob(l) | Locator::GitLabTree(l) => l.path.last().cloned().unwrap_or_else(|| l.project.clone()),
            Locator::GitLabCommit(l) => l.sha.clone(),
            Locator::GitLabCompare(l) => format!("{}...{}", l.base, l.head),
            _ => return Err(GatewayError::unavailable()),
        };
        metadata.name = FieldDelta::Set(name);
        metadata.citation_url = locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        match (locator, observable) {
            (Locator::GitLabBlob(_), Affordance::Body) | (Locator::GitLabBlob(_), Affordance::Plain) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let (bytes, _, _) = self.downloader.fetch_bytes(&url, Some(&self.headers())).await?;
                let text = String::from_utf8_lossy(&bytes).to_string();
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::plain(text)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
                })
            }
            (Locator::GitLabCompare(_), Affordance::Body) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::markdown(render_compare(&value))),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, ..Default::default() },
                })
            }
            (Locator::GitLabProject(_), Affordance::Collection) | (Locator::GitLabTree(_), Affordance::Collection) => {
                self.observe_collection(locator).await
            }
            _ => Err(GatewayError::bad_request(observable)),
        }
    }
}

impl GitLabConnector {
    async fn observe_collection(&self, locator: &Locator) -> GatewayResult<ObserveResult> {
        let (group_path, project, path) = match locator {
            Locator::GitLabProject(l) => (l.group_path.clone(), l.project.clone(), Vec::new()),
            Locator::GitLabTree(l) => (l.group_path.clone(), l.project.clone(), l.path.clone()),
            _ => return Err(GatewayError::bad_request(Affordance::Collection)),
        };
        let url = WebUrl::try_decode(&format!(
            "https://{}/api/v4/projects/{}/repository/tree?path={}",
            self.domain,
            Self::project_id(&group_path, &project),
            percent_encoding::utf8_percent_encode(&path.join("/"), percent_encoding::NON_ALPHANUMERIC),
        ))?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;

        #[derive(Deserialize)]
        struct TreeEntry {
            name: String,
            #[serde(rename = "type")]
            kind: String,
        }
        let entries: Vec<TreeEntry> =
            serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        let nandam = self.fetch_nandam(&group_path, &project).await.unwrap_or_default();

        let mut results = Vec::new();
        for entry in entries {
            let mut child_path = path.clone();
            child_path.push(entry.name.clone());
            if !nandam.path_is_allowed(&child_path.join("/")) {
                continue;
            }
            let child = if entry.kind == "tree" {
                Locator::GitLabTree(GitLabTreeLocator {
                    domain: self.domain.clone(),
                    group_path: group_path.clone(),
                    project: project.clone(),
                    r#ref: "HEAD".to_string(),
                    is_default_branch: true,
                    path: child_path,
                })
            } else {
                Locator::GitLabBlob(GitLabBlobLocator {
                    domain: self.domain.clone(),
                    group_path: group_path.clone(),
                    project: project.clone(),
                    r#ref: "HEAD".to_string(),
                    is_default_branch: true,
                    path: child_path,
                })
            };
            results.push(child.resource_uri());
        }

        Ok(ObserveResult {
            bundle: Bundle::BundleCollection(BundleCollection { uri: locator.resource_uri(), results }),
            observed: None,
            relations: Vec::new(),
            post_processing: PostProcessing { cache: true, ..Default::default() },
        })
    }

    async fn fetch_nandam(&self, group_path: &[String], project: &str) -> GatewayResult<NandamConfig> {
        let url = WebUrl::try_decode(&format!(
            "https://{}/api/v4/projects/{}/repository/files/nandam%2Eyml/raw?ref=HEAD",
            self.domain,
            Self::project_id(group_path, project)
        ))?;
        let (bytes, _, _) = self.downloader.fetch_bytes(&url, Some(&self.headers())).await?;
        NandamConfig::from_yaml(&String::from_utf8_lossy(&bytes))
    }
}

fn render_compare(value: &serde_json::Value) -> String {
    let mut out = String::new();
    out.push_str("<commits>\n");
    if let Some(commits) = value.get("commits").and_then(|c| c.as_array()) {
        for commit in commits {
            let id = commit.get("id").and_then(|s| s.as_str()).unwrap_or_default();
            let message = commit.get("message").and_then(|m| m.as_str()).unwrap_or_default();
            out.push_str(&format!("{id}: {message}\n"));
        }
    }
    out.push_str("</commits>\n<diffs>\n");
    if let Some(diffs) = value.get("diffs").and_then(|d| d.as_array()) {
        for diff in diffs {
            let new_path = diff.get("new_path").and_then(|p| p.as_str()).unwrap_or_default();
            let body = diff.get("diff").and_then(|p| p.as_str()).unwrap_or_default();
            out.push_str(&format!("<file_diff path=\"{new_path}\">\n{body}\n</file_diff>\n"));
        }
    }
    out.push_str("</diffs>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;

    fn connector() -> GitLabConnector {
        GitLabConnector::new(
            Realm::decode("gitlab"),
            "gitlab.example.com".to_string(),
            "token".to_string(),
            Arc::new(StubDownloader::new()),
        )
    }

    #[tokio::test]
    async fn locator_rejects_other_domains() {
        let connector = connector();
        let reference = Reference::Web(WebUrl::try_decode("https://gitlab.com/group/proj").unwrap());
        assert!(connector.locator(&reference).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn locator_recognizes_bare_project_url() {
        let connector = connector();
        let reference = Reference::Web(WebUrl::try_decode("https://gitlab.example.com/group/sub/proj").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::GitLabProject(l) if l.project == "proj" && l.group_path == vec!["group", "sub"]));
    }
}
