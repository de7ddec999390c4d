//! MIME type classification and inline-data encoding helpers.
//!
//! Grounded on `base/strings/data.py`: a small classification table drives
//! `MimeType::mode()`, magic-byte sniffing backs `guess_from_bytes`, and
//! `DataUri`/`Base64Std`/`Base64Safe` wrap base64 payloads for inline
//! transport and filename-safe encoding respectively.

use crate::errors::GatewayError;
use crate::strings::validated::{validated_str, ValidatedStr};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use once_cell::sync::Lazy;
use std::collections::HashMap;

validated_str!(MimeType, r"^[a-zA-Z0-9][a-zA-Z0-9!#$&^_.+-]*/[a-zA-Z0-9][a-zA-Z0-9!#$&^_.+-]*$");

/// Broad content classification used to decide how a bundle is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeMode {
    Image,
    Markdown,
    Media,
    Spreadsheet,
    Plain,
    Document,
}

static MODE_TABLE: Lazy<HashMap<&'static str, MimeMode>> = Lazy::new(|| {
    use MimeMode::*;
    HashMap::from([
        ("text/markdown", Markdown),
        ("text/x-markdown", Markdown),
        ("text/plain", Plain),
        ("text/csv", Spreadsheet),
        ("application/vnd.ms-excel", Spreadsheet),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Spreadsheet,
        ),
        ("application/pdf", Document),
        ("application/msword", Document),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Document,
        ),
        ("audio/mpeg", Media),
        ("audio/wav", Media),
        ("video/mp4", Media),
        ("video/webm", Media),
    ])
});

const EXTENSION_OVERRIDES: &[(&str, &str)] = &[
    ("text/markdown", "md"),
    ("text/plain", "txt"),
    ("image/jpeg", "jpg"),
    ("image/svg+xml", "svg"),
];

/// Extension → MIME table backing `guess_from_filename`, the inverse of
/// `guess_ext` (§3.1 "mutual MIME↔extension translation"). Several
/// extensions may map to the same MIME (`md`/`markdown`); `guess_ext`
/// still returns one canonical extension per MIME.
const EXTENSION_TO_MIME: &[(&str, &str)] = &[
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("txt", "text/plain"),
    ("json", "application/json"),
    ("yml", "application/yaml"),
    ("yaml", "application/yaml"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("zip", "application/zip"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

const MIME_TYPES_USELESS: &[&str] = &["application/octet-stream", "binary/octet-stream"];

impl MimeType {
    /// Broad classification for rendering decisions; unknown types whose
    /// top-level is `image`/`video`/`audio` are still classified by prefix.
    pub fn mode(&self) -> MimeMode {
        if let Some(mode) = MODE_TABLE.get(self.as_str()) {
            return *mode;
        }
        if self.as_str().starts_with("image/") {
            MimeMode::Image
        } else if self.as_str().starts_with("video/") || self.as_str().starts_with("audio/") {
            MimeMode::Media
        } else {
            MimeMode::Plain
        }
    }

    pub fn is_text(&self) -> bool {
        self.as_str().starts_with("text/")
            || matches!(
                self.as_str(),
                "application/json" | "application/xml" | "application/yaml"
            )
    }

    pub fn is_useless(&self) -> bool {
        MIME_TYPES_USELESS.contains(&self.as_str())
    }

    /// The canonical file extension for this type, if one is known.
    pub fn guess_ext(&self) -> Option<&'static str> {
        if let Some((_, ext)) = EXTENSION_OVERRIDES.iter().find(|(mime, _)| *mime == self.as_str()) {
            return Some(ext);
        }
        let subtype = self.as_str().rsplit_once('/')?.1.trim_start_matches("x-");
        // Only a handful of subtypes double as valid extensions verbatim.
        if matches!(subtype, "png" | "gif" | "webp" | "pdf" | "json" | "html" | "css" | "zip") {
            Some(leak_str(subtype))
        } else {
            None
        }
    }

    /// Best-effort detection from the leading bytes of a payload (magic
    /// numbers / base64 prefixes for common image formats).
    pub fn guess_from_bytes(bytes: &[u8]) -> Option<MimeType> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(MimeType::decode("image/png"));
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(MimeType::decode("image/jpeg"));
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(MimeType::decode("image/gif"));
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(MimeType::decode("image/webp"));
        }
        if bytes.starts_with(b"%PDF") {
            return Some(MimeType::decode("application/pdf"));
        }
        None
    }

    pub fn guess_or_plain(info: Option<&str>) -> MimeType {
        info.and_then(|s| MimeType::try_decode(s))
            .unwrap_or_else(|| MimeType::decode("text/plain"))
    }

    /// The MIME type registered for a bare extension (no leading dot),
    /// case-insensitively, if one is known.
    pub fn guess_from_ext(ext: &str) -> Option<MimeType> {
        EXTENSION_TO_MIME
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, mime)| MimeType::decode(mime))
    }

    /// Classify a filename by its extension (§3.1); falls back to
    /// `text/plain` for unknown or missing extensions.
    pub fn guess_from_filename(name: &str) -> MimeType {
        name.rsplit_once('.')
            .and_then(|(_, ext)| Self::guess_from_ext(ext))
            .unwrap_or_else(|| MimeType::decode("text/plain"))
    }
}

fn leak_str(s: &str) -> &'static str {
    // Small, bounded set of inputs (see match above); leaking is cheap and
    // keeps `guess_ext`'s signature uniform with `EXTENSION_OVERRIDES`.
    Box::leak(s.to_string().into_boxed_str())
}

/// An RFC 2397 `data:` URI: `data:{mime};base64,{payload}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: MimeType,
    data: Vec<u8>,
}

impl DataUri {
    pub fn new(mime_type: MimeType, data: Vec<u8>) -> Self {
        DataUri { mime_type, data }
    }

    pub fn mime_type(&self) -> &MimeType {
        &self.mime_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn guess_ext(&self) -> Option<&'static str> {
        self.mime_type.guess_ext()
    }

    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        let rest = input.strip_prefix("data:").ok_or_else(|| invalid_data_uri(input))?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| invalid_data_uri(input))?;
        let mime_str = header.strip_suffix(";base64").ok_or_else(|| invalid_data_uri(input))?;
        let mime_type = MimeType::try_decode_result(mime_str)?;
        let data = STANDARD
            .decode(payload)
            .map_err(|_| invalid_data_uri(input))?;
        Ok(DataUri { mime_type, data })
    }

    /// A fixed 1x1 transparent PNG stub, used as a placeholder when real
    /// image content could not be fetched.
    pub fn stub() -> Self {
        const STUB_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk+A8AAQUBAScY42YAAAAASUVORK5CYII=";
        DataUri {
            mime_type: MimeType::decode("image/png"),
            data: STANDARD.decode(STUB_PNG_B64).unwrap(),
        }
    }
}

impl std::fmt::Display for DataUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

fn invalid_data_uri(input: &str) -> GatewayError {
    GatewayError::Validation {
        type_name: "DataUri",
        input: input.to_string(),
        regex: "data:{mime};base64,{payload}",
    }
}

/// Standard (`+`/`/`-alphabet) base64, padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Std(Vec<u8>);

impl Base64Std {
    pub fn new(data: Vec<u8>) -> Self {
        Base64Std(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn decode(s: &str) -> Result<Self, GatewayError> {
        STANDARD
            .decode(s)
            .map(Base64Std)
            .map_err(|_| GatewayError::config("invalid base64 payload"))
    }
}

/// URL- and filename-safe base64 (`-`/`_` alphabet, unpadded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Safe(Vec<u8>);

impl Base64Safe {
    pub fn new(data: Vec<u8>) -> Self {
        Base64Safe(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn decode(s: &str) -> Result<Self, GatewayError> {
        URL_SAFE_NO_PAD
            .decode(s)
            .map(Base64Safe)
            .map_err(|_| GatewayError::config("invalid base64 payload"))
    }

    /// Encode as a `FileName`-safe stem: translates `+`/`/` to `-`/`_`
    /// (already safe here, kept for symmetry with the original's
    /// `from_filename`/`as_filename` pair) and strips padding.
    pub fn as_filename_stem(&self) -> String {
        self.encode()
    }

    pub fn from_filename_stem(stem: &str) -> Result<Self, GatewayError> {
        Self::decode(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_mode_classification() {
        assert_eq!(MimeType::decode("text/markdown").mode(), MimeMode::Markdown);
        assert_eq!(MimeType::decode("image/png").mode(), MimeMode::Image);
        assert_eq!(MimeType::decode("application/octet-stream").mode(), MimeMode::Plain);
    }

    #[test]
    fn guess_from_filename_and_guess_ext_are_mutual() {
        let readme = MimeType::guess_from_filename("README.md");
        assert_eq!(readme.as_str(), "text/markdown");
        assert_eq!(readme.guess_ext(), Some("md"));
        assert_eq!(MimeType::guess_from_filename("NOTES").as_str(), "text/plain");
        assert_eq!(MimeType::guess_from_filename("diagram.PNG").as_str(), "image/png");
    }

    #[test]
    fn guess_from_bytes_detects_png() {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(MimeType::guess_from_bytes(&bytes).unwrap().as_str(), "image/png");
    }

    #[test]
    fn data_uri_roundtrip() {
        let uri = DataUri::new(MimeType::decode("text/plain"), b"hello".to_vec());
        let encoded = uri.to_string();
        let decoded = DataUri::try_decode(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), b"hello");
    }

    #[test]
    fn base64_safe_roundtrip() {
        let b = Base64Safe::new(b"hello world".to_vec());
        let stem = b.as_filename_stem();
        let decoded = Base64Safe::from_filename_stem(&stem).unwrap();
        assert_eq!(decoded.as_bytes(), b"hello world");
    }
}
