//! The real `Downloader` implementation, built on `reqwest`.
//!
//! Grounded on `infrastructure/github.rs`'s `Client::builder()` timeout
//! configuration and exponential-backoff retry loop, generalized from a
//! single backend into the generic byte/JSON/HEAD primitives of §4.8.

use crate::downloader::{DocumentMode, DocumentReadOptions, DocumentsReadResponse, Downloader};
use crate::errors::{GatewayError, GatewayResult};
use crate::strings::{DataUri, FileName, MimeType, ValidatedStr};
use crate::uri::WebUrl;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// HTTP client wrapper with request timeouts and exponential-backoff retry
/// on 429/503, matching `GitHubRepository::execute_with_retry`.
pub struct HttpDownloader {
    client: Client,
    documents_endpoint: Option<WebUrl>,
}

impl HttpDownloader {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");
        HttpDownloader { client, documents_endpoint: None }
    }

    /// Point `documents_read_download`/`documents_read_blob` at the
    /// external document-parsing subservice's HTTP endpoint (§6.8); left
    /// unset in tests, which use `StubDownloader` instead.
    pub fn with_documents_endpoint(mut self, endpoint: WebUrl) -> Self {
        self.documents_endpoint = Some(endpoint);
        self
    }

    async fn execute_with_retry<F, Fut>(&self, mut operation: F) -> GatewayResult<Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let max_retries = 5;
        let mut delay_ms: u64 = 100;

        for attempt in 0..max_retries {
            let resp = operation()
                .await
                .map_err(|e| GatewayError::download(0, e.to_string()))?;

            let status = resp.status().as_u16();
            if (status == 429 || status == 503) && attempt < max_retries - 1 {
                let wait_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(delay_ms / 1000);
                warn!(attempt, wait_secs, "downloader request throttled, retrying");
                tokio::time::sleep(Duration::from_secs(wait_secs.max(1))).await;
                delay_ms = (delay_ms * 2).min(30_000);
                continue;
            }
            return Ok(resp);
        }

        Err(GatewayError::download(0, "exhausted retries"))
    }

    fn header_map(headers: Option<&HashMap<String, String>>) -> Vec<(String, String)> {
        headers
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn collect_response_headers(resp: &Response) -> HashMap<String, String> {
        resp.headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect()
    }

    fn response_mime(resp: &Response) -> MimeType {
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(';').next())
            .and_then(MimeType::try_decode)
            .unwrap_or_else(|| MimeType::decode("application/octet-stream"))
    }

    async fn check_status(resp: Response) -> GatewayResult<Response> {
        let status = resp.status().as_u16();
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(GatewayError::from_upstream_status(
                status,
                resp.text().await.unwrap_or_default(),
            ))
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch_bytes(
        &self,
        url: &WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(Vec<u8>, MimeType, HashMap<String, String>)> {
        let hdrs = Self::header_map(headers);
        let resp = self
            .execute_with_retry(|| {
                let mut req = self.client.get(url.as_url().as_str());
                for (k, v) in &hdrs {
                    req = req.header(k, v);
                }
                req.send()
            })
            .await?;
        let resp = Self::check_status(resp).await?;
        let mime = Self::response_mime(&resp);
        let response_headers = Self::collect_response_headers(&resp);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok((bytes.to_vec(), mime, response_headers))
    }

    async fn fetch_head(
        &self,
        url: &WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<HashMap<String, String>> {
        let hdrs = Self::header_map(headers);
        let resp = self
            .execute_with_retry(|| {
                let mut req = self.client.head(url.as_url().as_str());
                for (k, v) in &hdrs {
                    req = req.header(k, v);
                }
                req.send()
            })
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(Self::collect_response_headers(&resp))
    }

    async fn fetch_json(
        &self,
        url: &WebUrl,
        headers: Option<&HashMap<String, String>>,
    ) -> GatewayResult<(serde_json::Value, HashMap<String, String>)> {
        let hdrs = Self::header_map(headers);
        let resp = self
            .execute_with_retry(|| {
                let mut req = self.client.get(url.as_url().as_str());
                for (k, v) in &hdrs {
                    req = req.header(k, v);
                }
                req.send()
            })
            .await?;
        let resp = Self::check_status(resp).await?;
        let response_headers = Self::collect_response_headers(&resp);
        let json = resp
            .json()
            .await
            .map_err(|e| GatewayError::download(0, e.to_string()))?;
        Ok((json, response_headers))
    }

    async fn documents_read_download(
        &self,
        url: &WebUrl,
        authorization: Option<&str>,
        headers: Option<&HashMap<String, String>>,
        options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse> {
        let endpoint = self
            .documents_endpoint
            .clone()
            .ok_or_else(|| GatewayError::config("no documents-read endpoint configured"))?;
        let mut body = serde_json::json!({ "url": url.to_string(), "options": options_to_json(options) });
        if let Some(headers) = headers {
            body["headers"] = serde_json::to_value(headers).unwrap();
        }
        let mut req = self.client.post(endpoint.as_url().as_str()).json(&body);
        if let Some(auth) = authorization {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let resp = self
            .execute_with_retry(move || {
                let cloned = req.try_clone().expect("documents request is clonable");
                cloned.send()
            })
            .await?;
        let resp = Self::check_status(resp).await?;
        let parsed: DocumentsReadWireResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::download(0, e.to_string()))?;
        parsed.try_into_response()
    }

    async fn documents_read_blob(
        &self,
        name: Option<&FileName>,
        mime_type: &MimeType,
        blob: &[u8],
        options: &DocumentReadOptions,
    ) -> GatewayResult<DocumentsReadResponse> {
        let endpoint = self
            .documents_endpoint
            .clone()
            .ok_or_else(|| GatewayError::config("no documents-read endpoint configured"))?;
        let body = serde_json::json!({
            "name": name.map(|n| n.as_str().to_string()),
            "mime_type": mime_type.as_str(),
            "blob": STANDARD.encode(blob),
            "options": options_to_json(options),
        });
        let resp = self
            .execute_with_retry(|| self.client.post(endpoint.as_url().as_str()).json(&body).send())
            .await?;
        let resp = Self::check_status(resp).await?;
        let parsed: DocumentsReadWireResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::download(0, e.to_string()))?;
        parsed.try_into_response()
    }
}

fn options_to_json(options: &DocumentReadOptions) -> serde_json::Value {
    serde_json::json!({ "max_pages": options.max_pages })
}

#[derive(serde::Deserialize)]
struct DocumentsReadWireResponse {
    name: Option<String>,
    mime_type: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    mode: String,
    text: String,
    #[serde(default)]
    blobs: HashMap<String, String>,
}

impl DocumentsReadWireResponse {
    fn try_into_response(self) -> GatewayResult<DocumentsReadResponse> {
        let mode = match self.mode.as_str() {
            "data" => DocumentMode::Data,
            "markdown" => DocumentMode::Markdown,
            "plain" => DocumentMode::Plain,
            other => return Err(GatewayError::config(format!("unknown document mode: {other}"))),
        };
        let mime_type = MimeType::try_decode_result(&self.mime_type)?;
        let name = self.name.and_then(|n| FileName::try_decode_strict(&n));
        let blobs = self
            .blobs
            .into_iter()
            .map(|(k, v)| Ok((k, DataUri::try_decode(&v)?)))
            .collect::<GatewayResult<HashMap<_, _>>>()?;
        Ok(DocumentsReadResponse {
            name,
            mime_type,
            headers: self.headers,
            mode,
            text: self.text,
            blobs,
        })
    }
}
