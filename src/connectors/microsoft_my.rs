//! Microsoft 365 "my" connector (§4.4): a signed-in user's own OneDrive
//! files, mail, and chat messages via Microsoft Graph. Unlike
//! `microsoft_org`, this realm has no app-only credential in config —
//! Graph only allows delegated (per-user) access to `/me/...`, so every
//! call requires the caller's own token via the per-request `Creds`
//! override (§6.7).

use crate::config::Creds;
use crate::connector::{
    Connector, Locator, MsChatMessageLocator, MsDriveFileLocator, MsEmailLocator, ObserveResult,
    PostProcessing, Reference, ResolveResult,
};
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

pub struct MicrosoftMyConnector {
    realm: Realm,
    domain: String,
    tenant_id: String,
    downloader: Arc<dyn Downloader>,
}

impl MicrosoftMyConnector {
    pub fn new(realm: Realm, domain: String, tenant_id: String, downloader: Arc<dyn Downloader>) -> Self {
        MicrosoftMyConnector { realm, domain, tenant_id, downloader }
    }

    fn headers(&self, creds: Option<&Creds>) -> GatewayResult<HashMap<String, String>> {
        let token = creds
            .and_then(|c| c.get(self.realm.as_str()))
            .ok_or_else(GatewayError::unavailable)?;
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        Ok(headers)
    }
}

#[derive(Deserialize)]
struct DriveItemDto {
    id: String,
    name: String,
    #[serde(rename = "parentReference")]
    parent_reference: ParentReferenceDto,
}

#[derive(Deserialize)]
struct ParentReferenceDto {
    #[serde(rename = "driveId")]
    drive_id: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct EmailDto {
    subject: String,
    body: EmailBodyDto,
}

#[derive(Deserialize)]
struct EmailBodyDto {
    content: String,
}

#[derive(Deserialize)]
struct ChatMessageDto {
    body: EmailBodyDto,
}

#[async_trait]
impl Connector for MicrosoftMyConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::External(uri) = reference else { return Ok(None) };
        if uri.realm() != &self.realm {
            return Ok(None);
        }
        let segments: Vec<&str> = uri.opaque().split('/').collect();
        match segments.as_slice() {
            ["email", message_id] => Ok(Some(Locator::MsEmail(MsEmailLocator {
                tenant_id: self.tenant_id.clone(),
                message_id: message_id.to_string(),
            }))),
            ["chat", channel_id, message_id] => Ok(Some(Locator::MsChatMessage(MsChatMessageLocator {
                tenant_id: self.tenant_id.clone(),
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
            }))),
            ["drive", item_id] => Ok(Some(Locator::MsDriveFile(MsDriveFileLocator {
                tenant_id: self.tenant_id.clone(),
                drive_id: String::new(),
                item_id: item_id.to_string(),
                item_path: Vec::new(),
            }))),
            _ => Ok(None),
        }
    }

    async fn resolve(&self, locator: &Locator, cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        match locator {
            Locator::MsDriveFile(l) => self.resolve_drive_file(l, cached).await,
            Locator::MsEmail(l) => {
                let url = WebUrl::try_decode(&format!("https://graph.microsoft.com/v1.0/me/messages/{}", l.message_id))?;
                let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None)?)).await?;
                let dto: EmailDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
                let mut metadata = MetadataDelta::default();
                metadata.name = FieldDelta::Set(dto.subject);
                Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
            }
            Locator::MsChatMessage(l) => {
                let mut metadata = MetadataDelta::default();
                metadata.name = FieldDelta::Set(format!("chat message {}", l.message_id));
                Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
            }
            _ => Err(GatewayError::unavailable()),
        }
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        if observable != Affordance::Body {
            return Err(GatewayError::bad_request(observable));
        }
        match locator {
            Locator::MsEmail(l) => {
                let url = WebUrl::try_decode(&format!("https://graph.microsoft.com/v1.0/me/messages/{}", l.message_id))?;
                let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None)?)).await?;
                let dto: EmailDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::plain(dto.body.content)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
                })
            }
            Locator::MsChatMessage(l) => {
                let url = WebUrl::try_decode(&format!(
                    "https://graph.microsoft.com/v1.0/chats/{}/messages/{}",
                    l.channel_id, l.message_id
                ))?;
                let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None)?)).await?;
                let dto: ChatMessageDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::plain(dto.body.content)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, ..Default::default() },
                })
            }
            Locator::MsDriveFile(l) => {
                let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
                let headers = self.headers(None)?;
                let token = headers.get("Authorization").map(|v| v.trim_start_matches("Bearer ").to_string());
                let doc = self
                    .downloader
                    .documents_read_download(&url, token.as_deref(), Some(&headers), &Default::default())
                    .await?;
                let _ = l;
                Ok(ObserveResult {
                    bundle: Bundle::Fragment(Fragment::markdown(doc.text)),
                    observed: None,
                    relations: Vec::new(),
                    post_processing: PostProcessing { cache: true, extract_label: true, ..Default::default() },
                })
            }
            _ => Err(GatewayError::bad_request(observable)),
        }
    }
}

impl MicrosoftMyConnector {
    /// A locator minted by `locator()` carries only the opaque item id;
    /// the drive id and path are filled in here from Graph's metadata
    /// response, since OneDrive permalinks never carry them directly.
    async fn resolve_drive_file(&self, l: &MsDriveFileLocator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let url = WebUrl::try_decode(&format!("https://graph.microsoft.com/v1.0/me/drive/items/{}", l.item_id))?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers(None)?)).await?;
        let dto: DriveItemDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut item_path: Vec<String> = dto
            .parent_reference
            .path
            .as_deref()
            .and_then(|p| p.split(':').nth(1))
            .map(|p| p.trim_matches('/').split('/').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        item_path.push(dto.name.clone());

        let mut metadata = MetadataDelta::default();
        metadata.name = FieldDelta::Set(dto.name);
        let resolved_locator = Locator::MsDriveFile(MsDriveFileLocator {
            tenant_id: l.tenant_id.clone(),
            drive_id: dto.parent_reference.drive_id,
            item_id: dto.id,
            item_path,
        });
        metadata.citation_url = resolved_locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::StubDownloader;
    use crate::uri::ExternalUri;

    #[tokio::test]
    async fn locator_recognizes_email_reference() {
        let connector = MicrosoftMyConnector::new(
            Realm::decode("microsoft_my"),
            "acme-my.sharepoint.com".to_string(),
            "tenant-1".to_string(),
            Arc::new(StubDownloader::new()),
        );
        let reference = Reference::External(ExternalUri::new(Realm::decode("microsoft_my"), "email/AAMk123"));
        let locator = connector.locator(&reference).await.unwrap().unwrap();
        assert!(matches!(locator, Locator::MsEmail(l) if l.message_id == "AAMk123"));
    }

    #[tokio::test]
    async fn locator_ignores_references_from_other_realms() {
        let connector = MicrosoftMyConnector::new(
            Realm::decode("microsoft_my"),
            "acme-my.sharepoint.com".to_string(),
            "tenant-1".to_string(),
            Arc::new(StubDownloader::new()),
        );
        let reference = Reference::External(ExternalUri::new(Realm::decode("jira"), "email/AAMk123"));
        assert!(connector.locator(&reference).await.unwrap().is_none());
    }
}
