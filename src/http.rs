//! Shared HTTP client for submission and retrieval

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackendConfig;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// HTTP client configuration
///
/// Timeouts are unset by default: a slow backend is absorbed by the
/// transport's own connection lifetime.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            request_timeout: None,
            user_agent: concat!("stembox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&BackendConfig> for HttpConfig {
    fn from(backend: &BackendConfig) -> Self {
        Self {
            connect_timeout: backend.connect_timeout_secs.map(Duration::from_secs),
            request_timeout: backend.request_timeout_secs.map(Duration::from_secs),
            user_agent: backend.user_agent.clone(),
        }
    }
}

/// Build a reqwest client from config
pub fn build_client(config: &HttpConfig) -> Result<Client, HttpError> {
    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| HttpError::Build(e.to_string()))
}

/// Best-effort human readable description of a reqwest failure
pub(crate) fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect to backend: {err}")
    } else {
        err.to_string()
    }
}
