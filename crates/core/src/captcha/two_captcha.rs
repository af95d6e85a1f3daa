//! 2captcha-style solving service client.
//!
//! Protocol: submit the challenge to `/in.php`, then poll `/res.php` until
//! the worker pool produces a token or the poll budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CaptchaConfig;
use crate::error::LookupError;

use super::{CaptchaSolver, Challenge};

/// The service reports "not ready yet" with this literal.
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Client for a 2captcha-compatible solving service.
pub struct TwoCaptchaClient {
    client: Client,
    config: CaptchaConfig,
}

impl TwoCaptchaClient {
    pub fn new(config: CaptchaConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    /// Submit the challenge, returning the service-side task id.
    async fn submit(&self, challenge: &Challenge) -> Result<String, LookupError> {
        let url = format!("{}/in.php", self.config.url.trim_end_matches('/'));
        let form = [
            ("key", self.config.api_key.as_str()),
            ("method", "userrecaptcha"),
            ("googlekey", challenge.site_key.as_str()),
            ("pageurl", challenge.page_url.as_str()),
            ("json", "1"),
        ];

        let response: SolverResponse = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| LookupError::SiteUnavailable(format!("solver submit: {}", e)))?
            .json()
            .await
            .map_err(|e| LookupError::ParseError(format!("solver submit response: {}", e)))?;

        match response.into_result() {
            SolverOutcome::Ready(id) => Ok(id),
            SolverOutcome::Pending => Err(LookupError::CaptchaUnsolvable(
                "solver rejected submission".to_string(),
            )),
            SolverOutcome::Error(msg) => Err(LookupError::CaptchaUnsolvable(format!(
                "solver submit failed: {}",
                msg
            ))),
        }
    }

    /// Poll for a solution until the budget runs out.
    async fn poll(&self, captcha_id: &str) -> Result<String, LookupError> {
        let url = format!("{}/res.php", self.config.url.trim_end_matches('/'));

        for attempt in 1..=self.config.max_polls {
            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;

            let response: SolverResponse = self
                .client
                .get(&url)
                .query(&[
                    ("key", self.config.api_key.as_str()),
                    ("action", "get"),
                    ("id", captcha_id),
                    ("json", "1"),
                ])
                .send()
                .await
                .map_err(|e| LookupError::SiteUnavailable(format!("solver poll: {}", e)))?
                .json()
                .await
                .map_err(|e| LookupError::ParseError(format!("solver poll response: {}", e)))?;

            match response.into_result() {
                SolverOutcome::Ready(token) => {
                    debug!(polls = attempt, "CAPTCHA solved");
                    return Ok(token);
                }
                SolverOutcome::Pending => {
                    debug!(
                        poll = attempt,
                        max = self.config.max_polls,
                        "CAPTCHA not ready"
                    );
                }
                SolverOutcome::Error(msg) => {
                    return Err(LookupError::CaptchaUnsolvable(format!(
                        "solver error: {}",
                        msg
                    )));
                }
            }
        }

        Err(LookupError::CaptchaUnsolvable(format!(
            "no solution after {} polls",
            self.config.max_polls
        )))
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaClient {
    async fn resolve(&self, challenge: &Challenge) -> Result<String, LookupError> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            debug!(
                attempt,
                max = self.config.max_attempts,
                site_key = %challenge.site_key,
                "Submitting CAPTCHA to solver"
            );

            let outcome = match self.submit(challenge).await {
                Ok(id) => self.poll(&id).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(token) => return Ok(token),
                Err(e) => {
                    warn!(attempt, error = %e, "CAPTCHA attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(LookupError::CaptchaUnsolvable(format!(
            "exhausted {} attempts: {}",
            self.config.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Wire format shared by `/in.php` and `/res.php` when `json=1`.
#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: i32,
    #[serde(default)]
    request: Option<String>,
    #[serde(default)]
    error_text: Option<String>,
}

enum SolverOutcome {
    Ready(String),
    Pending,
    Error(String),
}

impl SolverResponse {
    fn into_result(self) -> SolverOutcome {
        if self.status == 1 {
            return match self.request {
                Some(value) => SolverOutcome::Ready(value),
                None => SolverOutcome::Error("missing request field".to_string()),
            };
        }

        let message = self
            .request
            .or(self.error_text)
            .unwrap_or_else(|| "unknown error".to_string());

        if message == NOT_READY {
            SolverOutcome::Pending
        } else {
            SolverOutcome::Error(message)
        }
    }
}
