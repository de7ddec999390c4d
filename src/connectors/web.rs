//! Catch-all web connector (§4.4): registered last, matches any `http(s)`
//! reference no earlier connector claimed. Addresses pages by a stable hash
//! of the URL since the path cannot generally be inferred from arbitrary
//! web content (§3.2).

use crate::connector::{Connector, Locator, ObserveResult, PostProcessing, Reference, ResolveResult, WebPageLocator};
use crate::content::{Bundle, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::uri::{Affordance, Realm};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub struct WebConnector {
    realm: Realm,
    downloader: Arc<dyn Downloader>,
}

impl WebConnector {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        WebConnector { realm: Realm::decode("www"), downloader }
    }
}

#[async_trait]
impl Connector for WebConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        let mut hasher = Sha256::new();
        hasher.update(url.to_string().as_bytes());
        let hash = hex::encode(hasher.finalize())[..32].to_string();
        Ok(Some(Locator::WebPage(WebPageLocator { url: url.clone(), hash })))
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let Locator::WebPage(l) = locator else { return Err(GatewayError::unavailable()) };
        let headers = self.downloader.fetch_head(&l.url, None).await?;
        let mut metadata = MetadataDelta::default();
        if let Some(name) = l.url.path().rsplit('/').find(|s| !s.is_empty()) {
            metadata.name = FieldDelta::Set(name.to_string());
        }
        metadata.citation_url = FieldDelta::Set(l.url.clone());
        let _ = headers;
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        if observable != Affordance::Body {
            return Err(GatewayError::bad_request(observable));
        }
        let Locator::WebPage(l) = locator else { return Err(GatewayError::bad_request(observable)) };
        let (bytes, mime, _) = self.downloader.fetch_bytes(&l.url, None).await?;
        let text = if mime.as_str() == "text/html" {
            html_to_text(&String::from_utf8_lossy(&bytes))
        } else {
            String::from_utf8_lossy(&bytes).to_string()
        };
        Ok(ObserveResult {
            bundle: Bundle::Fragment(Fragment::plain(text)),
            observed: None,
            relations: Vec::new(),
            post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
        })
    }
}

/// Minimal HTML-to-text reduction: strip tags and scripts/styles. The
/// document-parsing subservice (§6.8) is the real renderer for anything
/// beyond this best-effort fallback.
fn html_to_text(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0u32;
    let lower = html.to_lowercase();
    let mut chars = html.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '<' {
            in_tag = true;
            if lower[i..].starts_with("<script") || lower[i..].starts_with("<style") {
                skip_depth += 1;
            } else if lower[i..].starts_with("</script") || lower[i..].starts_with("</style") {
                skip_depth = skip_depth.saturating_sub(1);
            }
            continue;
        }
        if c == '>' {
            in_tag = false;
            continue;
        }
        if !in_tag && skip_depth == 0 {
            out.push(c);
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;
    use crate::uri::WebUrl;

    #[tokio::test]
    async fn locator_always_matches_web_references() {
        let connector = WebConnector::new(Arc::new(StubDownloader::new()));
        let reference = Reference::Web(WebUrl::try_decode("https://example.com/a/b").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::WebPage(l) if l.hash.len() == 32));
    }

    #[test]
    fn html_to_text_strips_script_and_style() {
        let html = "<html><head><style>.a{}</style></head><body><script>x()</script>hello <b>world</b></body></html>";
        assert_eq!(html_to_text(html), "hello world");
    }
}
