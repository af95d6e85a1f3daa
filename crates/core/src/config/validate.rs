use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Pool ceiling and retry budgets are non-zero
/// - Portal and open-data URLs are http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.pool.max_sessions == 0 {
        return Err(ConfigError::ValidationError(
            "pool.max_sessions cannot be 0".to_string(),
        ));
    }

    if config.portal.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "portal.max_attempts cannot be 0".to_string(),
        ));
    }

    if config.jobs.max_download_attempts == 0 || config.jobs.download_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "jobs retry/concurrency settings cannot be 0".to_string(),
        ));
    }

    for (name, url) in [
        ("portal.url", &config.portal.url),
        ("opendata.url", &config.opendata.url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "{} must be an http(s) URL",
                name
            )));
        }
    }

    if let Some(captcha) = &config.captcha {
        if captcha.api_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "captcha.api_key cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}
