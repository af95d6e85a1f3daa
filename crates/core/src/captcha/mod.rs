//! CAPTCHA resolution via an external solving service.
//!
//! The portal guards its search form with a reCAPTCHA challenge. When the
//! scraper detects one it hands the site key to a [`CaptchaSolver`], which
//! returns a response token to inject before resubmitting. Attempts are
//! bounded because every solve is a billed external call.

mod two_captcha;

pub use two_captcha::TwoCaptchaClient;

use async_trait::async_trait;

use crate::error::LookupError;

/// A reCAPTCHA challenge extracted from the portal page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The `data-sitekey` attribute of the challenge widget.
    pub site_key: String,
    /// URL of the page presenting the challenge.
    pub page_url: String,
}

impl Challenge {
    pub fn new(site_key: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            page_url: page_url.into(),
        }
    }
}

/// Trait for CAPTCHA solving backends.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve a challenge, returning the response token.
    ///
    /// Fails with [`LookupError::CaptchaUnsolvable`] once the bounded attempt
    /// budget is exhausted; never retries indefinitely.
    async fn resolve(&self, challenge: &Challenge) -> Result<String, LookupError>;
}
