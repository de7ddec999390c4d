//! An in-memory `Downloader` test double, keyed by URL string.
//!
//! Grounded on the teacher's own pattern of hand-rolled fixtures in its
//! `infrastructure` unit tests (static maps of canned responses instead of
//! live HTTP calls).

use crate::downloader::{DocumentMode, DocumentReadOptions, DocumentsReadResponse, Downloader};
use crate::errors::{GatewayError, GatewayResult};
use crate::strings::{FileName, MimeType};
use crate::uri::WebUrl;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone)]
pub struct StubBytesResponse {
    pub bytes: Vec<u8>,
    pub mime_type: MimeType,
    pub headers: HashMap<String, String>,
}

/// A fixed-response double: every method looks up its argument in a table
/// populated via `with_bytes`/`with_json`/`with_document`, and returns
/// `UnavailableError` for anything not registered.
#[derive(Default)]
pub struct StubDownloader {
    bytes: Mutex<HashMap<String, StubBytesResponse>>,
    json: Mutex<HashMap<String, (serde_json::Value, HashMap<String, String>)>>,
    documents: Mutex<HashMap<String, DocumentsReadResponse>>,
}

impl StubDownloader {
    pub fn new() -> Self {
        StubDownloader::default()
    }

    pub fn with_bytes(self, url: &str, response: StubBytesResponse) -> Self {
        self.bytes.lock().unwrap().insert(url.to_string(), response);
        self
    }

    pub fn with_json(self, url: &str, value: serde_json::Value, headers: HashMap<String, String>) -> Self {
        self.json.lock().unwrap().insert(url.to_string(), (value, headers));
        self
    }

    pub fn with_document(self, key: &str, response: DocumentsReadResponse) -> Self {
        self.documents.lock().unwrap().insert(key.to_string(), response);
        self
    }
}

#[async_trait]
impl Downloader for StubDownloader {
    async fn fetch_bytes(
        &self,
        url: &WebUrl,
        _headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(Vec<u8>, MimeType, HashMap<String, String>)> {
        self.bytes
            .lock()
            .unwrap()
            .get(url.as_url().as_str())
            .map(|r| (r.bytes.clone(), r.mime_type.clone(), r.headers.clone()))
            .ok_or(GatewayError::Unavailable)
    }

    async fn fetch_head(
        &self,
        url: &WebUrl,
        _headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<HashMap<String, String>> {
        self.bytes
            .lock()
            .unwrap()
            .get(url.as_url().as_str())
            .map(|r| r.headers.clone())
            .ok_or(GatewayError::Unavailable)
    }

    async fn fetch_json(
        &self,
        url: &WebUrl,
        _headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(serde_json::Value, HashMap<String, String>)> {
        self.json
            .lock()
            .unwrap()
            .get(url.as_url().as_str())
            .cloned()
            .ok_or(GatewayError::Unavailable)
    }

    async fn documents_read_download(
        &self,
        url: &WebUrl,
        _authorization: Option<&str>,
        _headers: Option<&HashMap<String, String>>,
        _options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse> {
        self.documents
            .lock()
            .unwrap()
            .get(url.as_url().as_str())
            .cloned()
            .ok_or(GatewayError::Unavailable)
    }

    async fn documents_read_blob(
        &self,
        name: Option<&FileName>,
        _mime_type: &MimeType,
        _blob: &[u8],
        _options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse> {
        let key = name.map(|n| n.as_str().to_string()).unwrap_or_default();
        self.documents
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(GatewayError::Unavailable)
    }
}
