use reqwest::Url;

use super::{types::Config, ConfigError};
use crate::cache::MAX_VALUE_LEN;

/// Validate configuration
/// Currently validates:
/// - At least one source is configured
/// - Timeouts and cache age are not 0
/// - The cache budget can hold at least one regular value
/// - Base URLs are absolute http(s) URLs
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Source validation
    let sources = &config.sources;
    if !sources.yts.enabled && !sources.ibit.enabled {
        return Err(ConfigError::ValidationError(
            "at least one of sources.yts and sources.ibit must be enabled".to_string(),
        ));
    }
    if sources.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sources.timeout_secs cannot be 0".to_string(),
        ));
    }
    if sources.yts.enabled {
        validate_base_url("sources.yts.base_url", &sources.yts.base_url)?;
    }
    if sources.ibit.enabled {
        validate_base_url("sources.ibit.base_url", &sources.ibit.base_url)?;
    }

    // Cache validation
    if config.cache.max_age_secs == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_age_secs cannot be 0".to_string(),
        ));
    }
    if config.cache.max_bytes < MAX_VALUE_LEN {
        return Err(ConfigError::ValidationError(format!(
            "cache.max_bytes must be at least {}",
            MAX_VALUE_LEN
        )));
    }

    Ok(())
}

fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid URL: {}", field, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::ValidationError(format!(
            "{} must be an http or https URL",
            field
        )));
    }
    Ok(())
}
