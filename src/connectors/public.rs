//! Public-web connector (§4.4, §8 scenario 5): ArXiv papers and YouTube
//! videos, identified without any credential. Registered before
//! `WebConnector` so these well-known hosts get typed locators rather than
//! falling through to the generic `WebPage` fallback.

use crate::connector::{ArXivPaperLocator, Connector, Locator, ObserveResult, PostProcessing, Reference, ResolveResult, YouTubeVideoLocator};
use crate::content::{Bundle, BundleFile, DownloadUrl, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::strings::MimeType;
use crate::uri::{Affordance, Realm, WebUrl};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PublicConnector {
    realm: Realm,
    downloader: Arc<dyn Downloader>,
}

impl PublicConnector {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        PublicConnector { realm: Realm::decode("public"), downloader }
    }
}

#[async_trait]
impl Connector for PublicConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        match url.host() {
            Some("arxiv.org") => {
                let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
                if segments.len() == 2 && matches!(segments[0], "abs" | "pdf" | "src") {
                    let paper_id = segments[1].trim_end_matches(".pdf").to_string();
                    Ok(Some(Locator::ArXivPaper(ArXivPaperLocator { paper_id })))
                } else {
                    Ok(None)
                }
            }
            Some("www.youtube.com") | Some("youtube.com") => {
                if let Some(video_id) = url.get_query("v") {
                    Ok(Some(Locator::YouTubeVideo(YouTubeVideoLocator { video_id })))
                } else {
                    Ok(None)
                }
            }
            Some("youtu.be") => {
                let video_id = url.path().trim_start_matches('/').to_string();
                if video_id.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Locator::YouTubeVideo(YouTubeVideoLocator { video_id })))
                }
            }
            _ => Ok(None),
        }
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let mut metadata = MetadataDelta::default();
        match locator {
            Locator::ArXivPaper(l) => metadata.name = FieldDelta::Set(l.paper_id.clone()),
            Locator::YouTubeVideo(l) => metadata.name = FieldDelta::Set(l.video_id.clone()),
            _ => return Err(GatewayError::unavailable()),
        }
        metadata.citation_url = locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        match (locator, observable) {
            (Locator::ArXivPaper(l), Affordance::Body) => self.observe_arxiv_body(l).await,
            (Locator::YouTubeVideo(_), Affordance::File) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                Ok(ObserveResult {
                    bundle: Bundle::BundleFile(BundleFile {
                        uri: locator.resource_uri(),
                        mime_type: MimeType::decode("video/mp4"),
                        download_url: DownloadUrl::Web(url),
                        expiry: None,
                        description: None,
                    }),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, ..Default::default() },
                })
            }
            _ => Err(GatewayError::bad_request(observable)),
        }
    }
}

impl PublicConnector {
    /// Try the LaTeX source archive first (`/src/{id}`), and fall back to
    /// the rendered PDF (`/pdf/{id}`) when no LaTeX source is published
    /// (§8 scenario 5). LaTeX source is preferred because it yields
    /// cleaner prose than OCR/PDF text extraction.
    async fn observe_arxiv_body(&self, locator: &crate::connector::ArXivPaperLocator) -> GatewayResult<ObserveResult> {
        let src_url = WebUrl::try_decode(&format!("https://arxiv.org/src/{}", locator.paper_id))?;
        let result = self.downloader.fetch_bytes(&src_url, None).await;
        let (bytes, source_kind) = match result {
            Ok((bytes, _, _)) => (bytes, "latex"),
            Err(_) => {
                let pdf_url = WebUrl::try_decode(&format!("https://arxiv.org/pdf/{}", locator.paper_id))?;
                let (bytes, _, _) = self.downloader.fetch_bytes(&pdf_url, None).await?;
                (bytes, "pdf")
            }
        };

        let text = if source_kind == "latex" {
            String::from_utf8_lossy(&bytes).to_string()
        } else {
            let doc = self
                .downloader
                .documents_read_blob(None, &MimeType::decode("application/pdf"), &bytes, &Default::default())
                .await?;
            doc.text
        };

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

    #[tokio::test]
    async fn locator_recognizes_arxiv_abs_url() {
        let connector = PublicConnector::new(Arc::new(StubDownloader::new()));
        let reference = Reference::Web(WebUrl::try_decode("https://arxiv.org/abs/2301.00001v2").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::ArXivPaper(l) if l.paper_id == "2301.00001v2"));
    }

    #[tokio::test]
    async fn locator_recognizes_youtube_watch_url() {
        let connector = PublicConnector::new(Arc::new(StubDownloader::new()));
        let reference = Reference::Web(WebUrl::try_decode("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap());
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::YouTubeVideo(l) if l.video_id == "dQw4w9WgXcQ"));
    }
}
