//! Error taxonomy for the retrieval pipeline.
//!
//! Every failure that can cross a component boundary is classified here.
//! Transient kinds are retried locally (scraper, image downloads) with
//! bounded attempts; terminal kinds propagate to the HTTP boundary as a
//! structured payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the lookup pipeline.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// Upstream unreachable or timed out. Retried before being surfaced.
    #[error("site unavailable: {0}")]
    SiteUnavailable(String),

    /// The CAPTCHA resolver exhausted its attempts.
    #[error("captcha unsolvable: {0}")]
    CaptchaUnsolvable(String),

    /// The page did not have the expected structure. Never retried, since
    /// retrying cannot fix a layout change.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Unknown job or query.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed plate or state.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Browser process failure (launch, crashed page, stuck navigation).
    #[error("browser error: {0}")]
    Browser(String),
}

impl LookupError {
    /// Returns true if a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LookupError::SiteUnavailable(_) | LookupError::Browser(_)
        )
    }

    /// The wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::SiteUnavailable(_) => ErrorKind::SiteUnavailable,
            LookupError::CaptchaUnsolvable(_) => ErrorKind::CaptchaUnsolvable,
            LookupError::ParseError(_) => ErrorKind::ParseError,
            LookupError::NotFound(_) => ErrorKind::NotFound,
            LookupError::ValidationError(_) => ErrorKind::ValidationError,
            LookupError::Browser(_) => ErrorKind::SiteUnavailable,
        }
    }
}

/// Serializable error classification, used in job records and API payloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SiteUnavailable,
    CaptchaUnsolvable,
    ParseError,
    NotFound,
    ValidationError,
    /// Job was cancelled by the caller.
    Cancelled,
    /// Job was left running by a previous process and failed closed on restart.
    Interrupted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::SiteUnavailable => "SITE_UNAVAILABLE",
            ErrorKind::CaptchaUnsolvable => "CAPTCHA_UNSOLVABLE",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Interrupted => "INTERRUPTED",
        };
        write!(f, "{}", s)
    }
}
