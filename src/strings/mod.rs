//! Validated string newtypes shared across the URI, relation, and metadata
//! modules.
//!
//! Every validated string follows the same shape: a regex-backed `decode`
//! that panics on malformed input (used for compile-time-known constants and
//! values already validated upstream), a fallible `try_decode`, and — where
//! the original accepted loose input — a `normalize` that strips diacritics
//! and disallowed characters before validating.

mod data;
mod file;
mod validated;

pub use data::{Base64Safe, Base64Std, DataUri, MimeType};
pub use file::{FileName, FilePath};
pub use validated::{validated_str, ValidatedStr};
