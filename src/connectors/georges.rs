//! Georges connector (§4.4): a minimal internal wiki-like backend, addressed
//! by a flat page id with no sub-hierarchy.
//!
//! Grounded on `confluence.rs` in this module, stripped down to the single
//! affordance this backend's simpler page model supports.

use crate::connector::{Connector, GeorgesPageLocator, Locator, ObserveResult, PostProcessing, Reference, ResolveResult};
use crate::content::{Bundle, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::uri::{Affordance, Realm};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct GeorgesConnector {
    realm: Realm,
    domain: String,
    downloader: Arc<dyn Downloader>,
}

impl GeorgesConnector {
    pub fn new(realm: Realm, domain: String, downloader: Arc<dyn Downloader>) -> Self {
        GeorgesConnector { realm, domain, downloader }
    }
}

#[derive(Deserialize)]
struct GeorgesPageDto {
    title: String,
    content: String,
}

#[async_trait]
impl Connector for GeorgesConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some(self.domain.as_str()) {
            return Ok(None);
        }
        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        if segments.len() == 2 && segments[0] == "pages" {
            return Ok(Some(Locator::GeorgesPage(GeorgesPageLocator {
                domain: self.domain.clone(),
                page_id: segments[1].to_string(),
            })));
        }
        Ok(None)
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let Locator::GeorgesPage(_) = locator else { return Err(GatewayError::unavailable()) };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, None).await?;
        let dto: GeorgesPageDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut metadata = MetadataDelta::default();
        metadata.name = FieldDelta::Set(dto.title);
        metadata.citation_url = locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        if observable != Affordance::Body {
            return Err(GatewayError::bad_request(observable));
        }
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, None).await?;
        let dto: GeorgesPageDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok(ObserveResult {
            bundle: Bundle::Fragment(Fragment::markdown(dto.content)),
            observed: None,
            relations: Vec::new(),
            post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;
    use crate::uri::WebUrl;

    #[tokio::test]
    async fn locator_recognizes_page_url() {
        let connector = GeorgesConnector::new(Realm::decode("georges"), "georges.internal".to_string(), Arc::new(StubDownloader::new()));
        let reference = Reference::Web(WebUrl::try_decode("https://georges.internal/pages/42").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::GeorgesPage(l) if l.page_id == "42"));
    }
}
