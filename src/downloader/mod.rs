//! The Downloader service contract (§4.8): a typed wrapper around the
//! (externally owned, §6.8) document-parsing subservice and raw HTTP
//! byte/JSON/HEAD access.

mod http;
mod stub;

pub use http::HttpDownloader;
pub use stub::StubDownloader;

use crate::errors::GatewayResult;
use crate::strings::{FileName, MimeType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// How the document-parsing subservice rendered a downloaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMode {
    Data,
    Markdown,
    Plain,
}

/// The response shape the document-parsing subservice returns for both a
/// URL download and a raw blob upload (§4.8).
#[derive(Debug, Clone)]
pub struct DocumentsReadResponse {
    pub name: Option<FileName>,
    pub mime_type: MimeType,
    pub headers: HashMap<String, String>,
    pub mode: DocumentMode,
    pub text: String,
    pub blobs: HashMap<String, crate::strings::DataUri>,
}

/// Options threaded through to `documents_read_download`/`documents_read_blob`
/// (page ranges, OCR toggles, etc. are connector-specific and opaque here).
#[derive(Debug, Clone, Default)]
pub struct DocumentReadOptions {
    pub max_pages: Option<u32>,
}

/// The four primitives the core depends on from the external parsing and
/// HTTP subservices (§4.8). 401/403/404 responses MUST surface as
/// `UnavailableError`; other errors propagate as `DownloadError` carrying
/// the upstream status.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch_bytes(
        &self,
        url: &crate::uri::WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(Vec<u8>, MimeType, HashMap<String, String>)>;

    async fn fetch_head(
        &self,
        url: &crate::uri::WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<HashMap<String, String>>;

    async fn fetch_json(
        &self,
        url: &crate::uri::WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(Value, HashMap<String, String>)>;

    async fn documents_read_download(
        &self,
        url: &crate::uri::WebUrl,
        authorization: Option<&str>,
        headers: Option<&HashMap<String, String>>,
        options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse>;

    async fn documents_read_blob(
        &self,
        name: Option<&FileName>,
        mime_type: &MimeType,
        blob: &[u8],
        options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse>;
}
