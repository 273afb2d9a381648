use super::models::Config;
use crate::endpoints::Endpoints;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("backend.base_url is invalid: {0}")]
    InvalidBaseUrl(String),

    #[error("tracker.reconnect.initial_backoff_ms must be positive")]
    ZeroBackoff,

    #[error("tracker.reconnect.initial_backoff_ms ({initial}) exceeds max_backoff_ms ({max})")]
    BackoffOutOfOrder { initial: u64, max: u64 },

    #[error("download.file_name must be a plain, non-empty file name: '{0}'")]
    InvalidFileName(String),

    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_backend(config)?;
    validate_reconnect(config)?;
    validate_download(config)?;
    Ok(())
}

fn validate_backend(config: &Config) -> Result<(), ValidationError> {
    Endpoints::parse(&config.backend.base_url)
        .map_err(|e| ValidationError::InvalidBaseUrl(e.to_string()))?;

    let timeouts = [
        ("backend.connect_timeout_secs", config.backend.connect_timeout_secs),
        ("backend.request_timeout_secs", config.backend.request_timeout_secs),
    ];
    for (field, value) in timeouts {
        if value == Some(0) {
            return Err(ValidationError::ZeroTimeout {
                field: field.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_reconnect(config: &Config) -> Result<(), ValidationError> {
    let reconnect = &config.tracker.reconnect;

    if reconnect.initial_backoff_ms == 0 {
        return Err(ValidationError::ZeroBackoff);
    }

    if reconnect.initial_backoff_ms > reconnect.max_backoff_ms {
        return Err(ValidationError::BackoffOutOfOrder {
            initial: reconnect.initial_backoff_ms,
            max: reconnect.max_backoff_ms,
        });
    }

    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let name = &config.download.file_name;
    if name.trim().is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(ValidationError::InvalidFileName(name.clone()));
    }
    Ok(())
}
