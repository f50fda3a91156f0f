//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bot.token is required")]
    MissingBotToken,
    #[error("bot.api_url must start with http:// or https://, got '{0}'")]
    InvalidApiUrl(String),
    #[error("dispatch.wave_size must be at least 1")]
    ZeroWaveSize,
    #[error("dispatch.max_waves must be between 1 and 98, got {0}")]
    InvalidMaxWaves(i64),
    #[error("dispatch.timer_interval_secs must be at least 1")]
    ZeroTimerInterval,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bot.token.is_empty() {
        errors.push(ValidationError::MissingBotToken);
    }
    if !config.bot.api_url.starts_with("http://") && !config.bot.api_url.starts_with("https://") {
        errors.push(ValidationError::InvalidApiUrl(config.bot.api_url.clone()));
    }
    if config.dispatch.wave_size == 0 {
        errors.push(ValidationError::ZeroWaveSize);
    }
    // 99 is the exhausted sentinel; max_waves must stay below it.
    if config.dispatch.max_waves < 1 || config.dispatch.max_waves > 98 {
        errors.push(ValidationError::InvalidMaxWaves(config.dispatch.max_waves));
    }
    if config.dispatch.timer_interval_secs == 0 {
        errors.push(ValidationError::ZeroTimerInterval);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [bot]
            token = "secret"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_missing_token_rejected() {
        let mut config = base_config();
        config.bot.token.clear();
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::MissingBotToken))
        );
    }

    #[test]
    fn test_sentinel_clash_rejected() {
        let mut config = base_config();
        config.dispatch.max_waves = 99;
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidMaxWaves(99)))
        );
    }
}
