use reqwest::StatusCode;
use thiserror::Error;

/// Message shown when the backend rejects a job with an empty body
pub const DEFAULT_REJECTION_MESSAGE: &str = "Processing failed";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Client-side precondition failure; no request was sent
    #[error("{0}")]
    Validation(String),
    /// The backend answered with a non-success status
    #[error("backend rejected job ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend accepted the job but the body did not carry a job id
    #[error("malformed job response: {0}")]
    MalformedResponse(String),
}

impl SubmitError {
    /// Text for the user-visible error slot.
    ///
    /// For rejections this is exactly what the backend said.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Validation(reason) => reason.clone(),
            SubmitError::Rejected { message, .. } => message.clone(),
            SubmitError::Transport(message) => message.clone(),
            SubmitError::MalformedResponse(message) => {
                format!("Unexpected response from backend: {message}")
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "VALIDATION",
            SubmitError::Rejected { .. } => "REJECTED",
            SubmitError::Transport(_) => "TRANSPORT",
            SubmitError::MalformedResponse(_) => "MALFORMED_RESPONSE",
        }
    }
}

/// Extract the user-facing message from a rejection body.
///
/// Plain text is surfaced as-is; a JSON object with a string `detail` field
/// yields that field; an empty body yields [`DEFAULT_REJECTION_MESSAGE`].
pub fn rejection_message(body: &str) -> String {
    if body.trim().is_empty() {
        return DEFAULT_REJECTION_MESSAGE.to_string();
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        if let Some(serde_json::Value::String(detail)) = map.get("detail") {
            return detail.clone();
        }
    }

    body.to_string()
}
