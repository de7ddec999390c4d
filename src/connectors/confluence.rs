//! Confluence connector (§4.4): wiki pages addressed by space key + page id.

use crate::config::bearer_auth_header;
use crate::connector::{Connector, ConfluencePageLocator, Locator, ObserveResult, PostProcessing, Reference, ResolveResult};
use crate::content::{Bundle, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::uri::{Affordance, Realm, WebUrl};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ConfluenceConnector {
    realm: Realm,
    domain: String,
    public_token: Option<String>,
    downloader: Arc<dyn Downloader>,
}

impl ConfluenceConnector {
    pub fn new(realm: Realm, domain: String, public_token: Option<String>, downloader: Arc<dyn Downloader>) -> Self {
        ConfluenceConnector { realm, domain, public_token, downloader }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(token) = &self.public_token {
            headers.insert("Authorization".to_string(), bearer_auth_header(token));
        }
        headers
    }
}

#[derive(Deserialize)]
struct ConfluencePageDto {
    title: String,
    space: ConfluenceSpaceDto,
    body: ConfluenceBodyDto,
}

#[derive(Deserialize)]
struct ConfluenceSpaceDto {
    key: String,
}

#[derive(Deserialize)]
struct ConfluenceBodyDto {
    storage: ConfluenceStorageDto,
}

#[derive(Deserialize)]
struct ConfluenceStorageDto {
    value: String,
}

#[async_trait]
impl Connector for ConfluenceConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some(self.domain.as_str()) {
            return Ok(None);
        }
        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        // `/wiki/spaces/{space_key}/pages/{page_id}[...]`
        if segments.len() >= 5 && segments[0] == "wiki" && segments[1] == "spaces" && segments[3] == "pages" {
            return Ok(Some(Locator::ConfluencePage(ConfluencePageLocator {
                domain: self.domain.clone(),
                space_key: segments[2].to_string(),
                page_id: segments[4].to_string(),
            })));
        }
        // `/wiki/pages/viewpage.action?pageId={id}` — space key resolved on demand, so just the id.
        if segments.len() >= 3 && segments[0] == "wiki" && segments[1] == "pages" {
            if let Some(page_id) = url.get_query("pageId") {
                return Ok(Some(Locator::ConfluencePage(ConfluencePageLocator {
                    domain: self.domain.clone(),
                    space_key: "unknown".to_string(),
                    page_id,
                })));
            }
        }
        Ok(None)
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let Locator::ConfluencePage(_) = locator else { return Err(GatewayError::unavailable()) };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: ConfluencePageDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut metadata = MetadataDelta::default();
        metadata.name = FieldDelta::Set(dto.title);
        metadata.citation_url = locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        let _ = dto.space.key;
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        if observable != Affordance::Body {
            return Err(GatewayError::bad_request(observable));
        }
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: ConfluencePageDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok(ObserveResult {
            bundle: Bundle::Fragment(Fragment::markdown(storage_to_markdown(&dto.body.storage.value))),
            observed: None,
            relations: Vec::new(),
            post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
        })
    }
}

/// Strip Confluence storage-format XHTML markup down to plain text.
/// A real renderer would handle macros/tables; this keeps the text legible
/// without attempting a full XHTML→Markdown conversion.
fn storage_to_markdown(storage: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in storage.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;

    #[tokio::test]
    async fn locator_recognizes_space_page_url() {
        let connector = ConfluenceConnector::new(
            Realm::decode("confluence"),
            "acme.atlassian.net".to_string(),
            None,
            Arc::new(StubDownloader::new()),
        );
        let reference = Reference::Web(
            WebUrl::try_decode("https://acme.atlassian.net/wiki/spaces/ENG/pages/12345").unwrap(),
        );
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::ConfluencePage(l) if l.space_key == "ENG" && l.page_id == "12345"));
    }

    #[test]
    fn storage_to_markdown_strips_tags() {
        assert_eq!(storage_to_markdown("<p>hello <b>world</b></p>"), "hello world");
    }
}
