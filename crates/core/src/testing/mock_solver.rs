//! Mock CAPTCHA solver for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::captcha::{CaptchaSolver, Challenge};
use crate::error::LookupError;

/// Mock implementation of [`CaptchaSolver`].
///
/// Returns a configured token, or fails every resolve when none is set.
pub struct MockSolver {
    token: Arc<RwLock<Option<String>>>,
    challenges: Arc<RwLock<Vec<Challenge>>>,
}

impl MockSolver {
    pub fn new() -> Self {
        Self {
            token: Arc::new(RwLock::new(None)),
            challenges: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A solver that always succeeds with this token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
            challenges: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Configure the token returned by resolve.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Challenges submitted so far.
    pub async fn recorded_challenges(&self) -> Vec<Challenge> {
        self.challenges.read().await.clone()
    }
}

impl Default for MockSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptchaSolver for MockSolver {
    async fn resolve(&self, challenge: &Challenge) -> Result<String, LookupError> {
        self.challenges.write().await.push(challenge.clone());

        self.token.read().await.clone().ok_or_else(|| {
            LookupError::CaptchaUnsolvable("mock solver has no token configured".to_string())
        })
    }
}
