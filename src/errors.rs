//! Error taxonomy for the gateway core.
//!
//! Mirrors the classification in the specification: resource availability,
//! bad requests against an affordance, upstream download failures, history
//! invariant violations, and connector registration/config errors. Within a
//! connector, best-effort lookups swallow transient errors and return empty
//! results; only the variants below escape to the coordinator and caller.

use crate::uri::Affordance;
use thiserror::Error;

/// The unified error type returned by the connector framework, resolution
/// coordinator, storage layer, and downloader service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The resource does not exist, is not accessible to the caller, or no
    /// connector could resolve it. Details are intentionally terse: callers
    /// must not be able to use error text to enumerate private resources.
    #[error("resource unavailable")]
    Unavailable,

    /// The requested affordance is not supported for this resource.
    #[error("affordance not supported: {affordance}")]
    BadRequest { affordance: Affordance },

    /// An upstream HTTP or parsing failure other than 401/403/404.
    #[error("download failed with status {status}: {message}")]
    Download { status: u16, message: String },

    /// A `ResourceHistory` invariant was violated, e.g. the first delta in
    /// the history did not set a locator.
    #[error("ingestion invariant violated: {0}")]
    Ingestion(String),

    /// A connector or service failed to register, e.g. a duplicate realm.
    #[error("configuration error: {0}")]
    Config(String),

    /// A validated string or URI failed to parse.
    #[error("invalid '{type_name}': {input:?} does not match {regex}")]
    Validation {
        type_name: &'static str,
        input: String,
        regex: &'static str,
    },
}

impl GatewayError {
    pub fn unavailable() -> Self {
        GatewayError::Unavailable
    }

    pub fn bad_request(affordance: Affordance) -> Self {
        GatewayError::BadRequest { affordance }
    }

    pub fn download(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Download {
            status,
            message: message.into(),
        }
    }

    pub fn ingestion(message: impl Into<String>) -> Self {
        GatewayError::Ingestion(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config(message.into())
    }

    /// True when an upstream HTTP status should be surfaced as `Unavailable`
    /// rather than propagated as a `Download` error (§4.8, §7).
    pub fn is_elided_status(status: u16) -> bool {
        matches!(status, 401 | 403 | 404)
    }

    /// Map a raw upstream status code into the appropriate error variant.
    pub fn from_upstream_status(status: u16, message: impl Into<String>) -> Self {
        if Self::is_elided_status(status) {
            GatewayError::Unavailable
        } else {
            GatewayError::download(status, message)
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
