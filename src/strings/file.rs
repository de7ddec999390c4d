//! File name and path validated strings.
//!
//! Grounded on the original implementation's `FileName`/`FilePath` pair: a
//! name is `[a-zA-Z0-9\-._]+` but must contain at least one alphanumeric
//! character (bare punctuation like `...` is rejected, with the single
//! literal exception of `-`), and a path is a `/`-joined sequence of names.

use crate::errors::GatewayError;
use crate::strings::validated::{validated_str, ValidatedStr};
use unicode_normalization::UnicodeNormalization;

validated_str!(FileName, r"^[a-zA-Z0-9\-._]+$");

/// Multi-part extensions that must be matched as a unit rather than just the
/// final `.ext` component.
const COMPOUND_EXTENSIONS: &[&str] = &["tar.gz", "tar.bz2", "tar.xz"];

impl FileName {
    /// Reject names that are pure punctuation other than the literal `-`.
    fn has_alphanumeric(s: &str) -> bool {
        s == "-" || s.chars().any(|c| c.is_ascii_alphanumeric())
    }

    pub fn try_decode_strict(input: &str) -> Option<Self> {
        let candidate = <Self as ValidatedStr>::try_decode(input)?;
        if Self::has_alphanumeric(candidate.as_str()) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Normalize a loose, possibly-Unicode file name into a valid
    /// `FileName`: strip diacritics (NFKD decomposition, combining marks
    /// dropped), replace runs of disallowed characters with `_`, and reject
    /// the result if it is empty, `_`, `.`, or has no ASCII alphanumerics.
    pub fn normalize(input: &str) -> Result<Self, GatewayError> {
        let decomposed: String = input.nfkd().filter(|c| !is_combining_mark(*c)).collect();

        let mut out = String::with_capacity(decomposed.len());
        let mut last_was_sub = false;
        for c in decomposed.chars() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                out.push(c);
                last_was_sub = false;
            } else if !last_was_sub {
                out.push('_');
                last_was_sub = true;
            }
        }
        let trimmed = out.trim_matches('_');

        if trimmed.is_empty() || trimmed == "_" || trimmed == "." || !Self::has_alphanumeric(trimmed)
        {
            return Err(GatewayError::Validation {
                type_name: Self::TYPE_NAME,
                input: input.to_string(),
                regex: "non-empty, contains alphanumeric, not purely punctuation",
            });
        }

        Self::try_decode_strict(trimmed).ok_or_else(|| GatewayError::Validation {
            type_name: Self::TYPE_NAME,
            input: input.to_string(),
            regex: Self::pattern(),
        })
    }

    /// Parse a `Content-Disposition` header value for its `filename=` (or
    /// `filename*=`) parameter and normalize the result.
    pub fn from_http_headers(content_disposition: &str) -> Option<Self> {
        for part in content_disposition.split(';') {
            let part = part.trim();
            if let Some(rest) = part.strip_prefix("filename*=") {
                let value = rest.splitn(3, '\'').last().unwrap_or(rest);
                let decoded = percent_encoding::percent_decode_str(value)
                    .decode_utf8_lossy()
                    .into_owned();
                if let Ok(name) = Self::normalize(&decoded) {
                    return Some(name);
                }
            } else if let Some(rest) = part.strip_prefix("filename=") {
                let value = rest.trim_matches('"');
                if let Ok(name) = Self::normalize(value) {
                    return Some(name);
                }
            }
        }
        None
    }

    /// The file extension, including compound extensions such as `tar.gz`.
    /// Returns `None` if the name has no extension.
    pub fn ext(&self) -> Option<&str> {
        let s = self.as_str();
        for compound in COMPOUND_EXTENSIONS {
            if let Some(stripped) = s.strip_suffix(&format!(".{compound}")) {
                if !stripped.is_empty() {
                    return Some(compound);
                }
            }
        }
        let dot = s.rfind('.')?;
        if dot == 0 {
            return None;
        }
        Some(&s[dot + 1..])
    }

    /// The name with its extension replaced (or appended if none existed).
    pub fn with_ext(&self, ext: &str) -> FileName {
        let stem = match self.ext() {
            Some(existing) => self.as_str().strip_suffix(&format!(".{existing}")).unwrap(),
            None => self.as_str(),
        };
        FileName::decode(format!("{stem}.{ext}"))
    }
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// A `/`-separated sequence of `FileName` components, e.g. `docs/guide.md`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath(Vec<FileName>);

impl FilePath {
    pub fn new(parts: Vec<FileName>) -> Self {
        FilePath(parts)
    }

    pub fn try_decode(input: &str) -> Option<Self> {
        if input.is_empty() {
            return Some(FilePath(Vec::new()));
        }
        let parts: Option<Vec<FileName>> = input
            .split('/')
            .map(|segment| FileName::try_decode_strict(segment))
            .collect();
        parts.map(FilePath)
    }

    pub fn parts(&self) -> &[FileName] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The final component, if any.
    pub fn filename(&self) -> Option<&FileName> {
        self.0.last()
    }

    pub fn ext(&self) -> Option<&str> {
        self.filename().and_then(|f| f.ext())
    }

    pub fn with_ext(&self, ext: &str) -> FilePath {
        let mut parts = self.0.clone();
        if let Some(last) = parts.last_mut() {
            *last = last.with_ext(ext);
        }
        FilePath(parts)
    }

    /// True if `self` is `other`, or a descendant of `other`.
    pub fn is_child_or(&self, other: &FilePath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// Append further components, returning a new path.
    pub fn extend(&self, more: impl IntoIterator<Item = FileName>) -> FilePath {
        let mut parts = self.0.clone();
        parts.extend(more);
        FilePath(parts)
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("/");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pure_punctuation() {
        assert!(FileName::try_decode_strict("...").is_none());
        assert!(FileName::try_decode_strict("-").is_some());
    }

    #[test]
    fn normalize_strips_diacritics() {
        let name = FileName::normalize("café.md").unwrap();
        assert_eq!(name.as_str(), "cafe.md");
    }

    #[test]
    fn normalize_rejects_empty_result() {
        assert!(FileName::normalize("   ").is_err());
        assert!(FileName::normalize("!!!").is_err());
    }

    #[test]
    fn ext_handles_compound_extensions() {
        let name = FileName::decode("archive.tar.gz");
        assert_eq!(name.ext(), Some("tar.gz"));
        assert_eq!(name.with_ext("zip").as_str(), "archive.zip");
    }

    #[test]
    fn ext_handles_simple_extensions() {
        let name = FileName::decode("readme.md");
        assert_eq!(name.ext(), Some("md"));
    }

    #[test]
    fn path_is_child_or() {
        let root = FilePath::try_decode("docs").unwrap();
        let child = FilePath::try_decode("docs/guide.md").unwrap();
        assert!(child.is_child_or(&root));
        assert!(root.is_child_or(&root));
        assert!(!root.is_child_or(&child));
    }

    #[test]
    fn from_http_headers_parses_filename() {
        let name = FileName::from_http_headers(r#"attachment; filename="report.pdf""#).unwrap();
        assert_eq!(name.as_str(), "report.pdf");
    }
}
