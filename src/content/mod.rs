//! Bundle content types returned by `Connector::observe` and the
//! affordance/observation metadata that describes them (§3.4).

use crate::errors::GatewayError;
use crate::strings::{DataUri, MimeType};
use crate::uri::ResourceUri;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A blob key inside a `Fragment`: either `self://~` (the resource itself
/// is a single image) or `self://{FilePath}` (an embedded sub-blob).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentUri(String);

impl FragmentUri {
    pub const SELF: &'static str = "self://~";

    pub fn whole_resource() -> Self {
        FragmentUri(Self::SELF.to_string())
    }

    pub fn path(path: impl Into<String>) -> Self {
        FragmentUri(format!("self://{}", path.into()))
    }

    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        if input == Self::SELF || input.starts_with("self://") {
            Ok(FragmentUri(input.to_string()))
        } else {
            Err(GatewayError::Validation {
                type_name: "FragmentUri",
                input: input.to_string(),
                regex: "self://~ | self://{FilePath}",
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FragmentUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a `Fragment`'s `text` should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentMode {
    Data,
    Markdown,
    Plain,
}

/// The payload produced by observing a resource at a given affordance.
///
/// Exactly one variant corresponds to each `Affordance`: `Fragment` for
/// `$body`, `BundleCollection` for `$collection`, `BundleFile` for `$file`,
/// `BundlePlain` for `$plain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Bundle {
    Fragment(Fragment),
    BundleCollection(BundleCollection),
    BundleFile(BundleFile),
    BundlePlain(BundlePlain),
}

impl Bundle {
    pub fn mime_type(&self) -> Option<&MimeType> {
        match self {
            Bundle::Fragment(_) => None,
            Bundle::BundleCollection(_) => None,
            Bundle::BundleFile(f) => Some(&f.mime_type),
            Bundle::BundlePlain(p) => Some(&p.mime_type),
        }
    }

    pub fn uri(&self) -> Option<&ResourceUri> {
        match self {
            Bundle::Fragment(_) => None,
            Bundle::BundleCollection(c) => Some(&c.uri),
            Bundle::BundleFile(f) => Some(&f.uri),
            Bundle::BundlePlain(p) => Some(&p.uri),
        }
    }
}

/// The connector's default rendering of a resource: Markdown (or plain/data
/// text) plus the blobs it embeds, referenced by `![caption](self://...)`.
///
/// Invariant (§4.2, §6.2, §8): the set of `self://` references appearing in
/// `text` equals the set of `blobs` keys, exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub mode: FragmentMode,
    pub text: String,
    #[serde(default)]
    pub blobs: HashMap<FragmentUri, DataUri>,
}

impl Fragment {
    pub fn plain(text: impl Into<String>) -> Self {
        Fragment {
            mode: FragmentMode::Plain,
            text: strip_blank_edges(text.into()),
            blobs: HashMap::new(),
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Fragment {
            mode: FragmentMode::Markdown,
            text: strip_blank_edges(text.into()),
            blobs: HashMap::new(),
        }
    }

    /// The set of `self://` references found in `text`'s Markdown image
    /// embeds (`![caption](self://...)`), in first-occurrence order.
    pub fn embedded_refs(&self) -> Vec<FragmentUri> {
        let mut refs = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("](self://") {
            let after = &rest[start + 2..];
            if let Some(end) = after.find(')') {
                refs.push(FragmentUri(after[..end].to_string()));
                rest = &after[end + 1..];
            } else {
                break;
            }
        }
        refs
    }

    /// True when every blob key is referenced exactly once and every
    /// reference has a matching blob key (§6.2, §8 "Fragment embed
    /// invariant").
    pub fn is_well_formed(&self) -> bool {
        let refs = self.embedded_refs();
        if refs.len() != self.blobs.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        for r in &refs {
            if !self.blobs.contains_key(r) || !seen.insert(r.clone()) {
                return false;
            }
        }
        true
    }
}

/// Strip leading/trailing blank lines while preserving internal
/// indentation (§4.2).
fn strip_blank_edges(text: String) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    lines[start..end].join("\n")
}

/// An ordered list of child resources, as produced by `$collection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCollection {
    pub uri: ResourceUri,
    pub results: Vec<ResourceUri>,
}

/// `BundleFile.download_url` is either a URL to fetch from or an inline
/// data URI for small payloads already in hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DownloadUrl {
    Web(crate::uri::WebUrl),
    Data(DataUri),
}

/// A reference to downloadable bytes, as produced by `$file`. `expiry` is
/// set when `download_url` is a time-limited signed URL (§5
/// `EXPIRY_DOWNLOAD_URL`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFile {
    pub uri: ResourceUri,
    pub mime_type: MimeType,
    pub download_url: DownloadUrl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A flattened, formatting-free text rendering, as produced by `$plain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlePlain {
    pub uri: ResourceUri,
    pub mime_type: MimeType,
    pub text: String,
}

/// Describes one affordance a resource supports, surfaced in metadata so a
/// caller can discover what `$body`/`$collection`/`$file`/`$plain` offer
/// before fetching them (§3.4, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AffordanceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_observations: Vec<String>,
}

impl AffordanceInfo {
    /// Merge `update` onto `self`, field-by-field, later wins (§4.3
    /// "per-key later wins field-by-field").
    pub fn merge(&self, update: &AffordanceInfo) -> AffordanceInfo {
        AffordanceInfo {
            mime_type: update.mime_type.clone().or_else(|| self.mime_type.clone()),
            observations: if update.observations.is_empty() {
                self.observations.clone()
            } else {
                update.observations.clone()
            },
            sub_observations: if update.sub_observations.is_empty() {
                self.sub_observations.clone()
            } else {
                update.sub_observations.clone()
            },
        }
    }
}

/// One section of an observed affordance view: a named sub-observation
/// suffix (e.g. a page of a paginated `$collection`) plus its notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservationSection {
    pub suffix: String,
    pub info: AffordanceInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_embed_invariant_holds_for_well_formed_fragment() {
        let mut blobs = HashMap::new();
        blobs.insert(FragmentUri::whole_resource(), DataUri::stub());
        let fragment = Fragment {
            mode: FragmentMode::Markdown,
            text: "![cover](self://~)".to_string(),
            blobs,
        };
        assert!(fragment.is_well_formed());
    }

    #[test]
    fn fragment_embed_invariant_detects_missing_blob() {
        let fragment = Fragment {
            mode: FragmentMode::Markdown,
            text: "![cover](self://~)".to_string(),
            blobs: HashMap::new(),
        };
        assert!(!fragment.is_well_formed());
    }

    #[test]
    fn fragment_embed_invariant_detects_unreferenced_blob() {
        let mut blobs = HashMap::new();
        blobs.insert(FragmentUri::path("img/a.png"), DataUri::stub());
        let fragment = Fragment {
            mode: FragmentMode::Markdown,
            text: "no embeds here".to_string(),
            blobs,
        };
        assert!(!fragment.is_well_formed());
    }

    #[test]
    fn strip_blank_edges_preserves_indentation() {
        let text = strip_blank_edges("\n\n  indented\n  more\n\n".to_string());
        assert_eq!(text, "  indented\n  more");
    }
}
