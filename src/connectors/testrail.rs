//! TestRail connector (§4.4): test cases addressed by numeric case id.

use crate::config::basic_auth_header;
use crate::connector::{Connector, Locator, ObserveResult, PostProcessing, Reference, ResolveResult, TestRailCaseLocator};
use crate::content::{Bundle, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::uri::{Affordance, Realm};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TestRailConnector {
    realm: Realm,
    domain: String,
    public_username: Option<String>,
    public_password: Option<String>,
    downloader: Arc<dyn Downloader>,
}

impl TestRailConnector {
    pub fn new(
        realm: Realm,
        domain: String,
        public_username: Option<String>,
        public_password: Option<String>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        TestRailConnector { realm, domain, public_username, public_password, downloader }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let (Some(user), Some(pass)) = (&self.public_username, &self.public_password) {
            headers.insert("Authorization".to_string(), basic_auth_header(user, pass));
        }
        headers
    }
}

#[derive(Deserialize)]
struct TestRailCaseDto {
    title: String,
    #[serde(default)]
    custom_steps: Option<String>,
    #[serde(default)]
    custom_expected: Option<String>,
}

#[async_trait]
impl Connector for TestRailConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some(self.domain.as_str()) {
            return Ok(None);
        }
        if url.path() != "/index.php" {
            return Ok(None);
        }
        // TestRail encodes the "real" path after `?` rather than as a
        // standard query string: `index.php?/cases/view/456`.
        let Some(raw_query) = url.as_url().query() else { return Ok(None) };
        let segments: Vec<&str> = raw_query.trim_start_matches('/').split('/').collect();
        if segments.len() != 3 || segments[0] != "cases" || segments[1] != "view" {
            return Ok(None);
        }
        let case_id: u64 = segments[2].parse().map_err(|_| GatewayError::unavailable())?;
        Ok(Some(Locator::TestRailCase(TestRailCaseLocator { domain: self.domain.clone(), case_id })))
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let Locator::TestRailCase(_) = locator else { return Err(GatewayError::unavailable()) };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: TestRailCaseDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

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
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: TestRailCaseDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut text = format!("# {}\n", dto.title);
        if let Some(steps) = dto.custom_steps {
            text.push_str(&format!("\n## Steps\n{steps}\n"));
        }
        if let Some(expected) = dto.custom_expected {
            text.push_str(&format!("\n## Expected\n{expected}\n"));
        }

        Ok(ObserveResult {
            bundle: Bundle::Fragment(Fragment::markdown(text)),
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
    async fn locator_recognizes_case_url() {
        let connector = TestRailConnector::new(
            Realm::decode("testrail"),
            "acme.testrail.io".to_string(),
            None,
            None,
            Arc::new(StubDownloader::new()),
        );
        let reference = Reference::Web(
            WebUrl::try_decode("https://acme.testrail.io/index.php?/cases/view/456").unwrap(),
        );
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::TestRailCase(l) if l.case_id == 456));
    }
}
