//! Job submission (`POST /process`)
//!
//! One call, one attempt: preconditions are checked locally, then a single
//! multipart request is sent. Retrying is the caller's decision.

mod error;
mod form;

pub use error::{DEFAULT_REJECTION_MESSAGE, SubmitError, rejection_message};
pub use form::{SubmissionRequest, SubmissionSource, guess_media_type};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::endpoints::Endpoints;
use crate::input::InputSelection;
use crate::job::JobId;
use crate::observability::Metrics;

pub type Result<T> = std::result::Result<T, SubmitError>;

/// Success body of `POST /process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAcceptedResponse {
    pub job_id: String,
}

/// Sends submissions to the backend
#[derive(Clone)]
pub struct JobSubmitter {
    client: Client,
    endpoints: Endpoints,
    metrics: Arc<Metrics>,
}

impl JobSubmitter {
    pub fn new(client: Client, endpoints: Endpoints, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            endpoints,
            metrics,
        }
    }

    /// Submit the selection and return the backend-assigned job id.
    ///
    /// ## Flow:
    /// 1. Validate the selection (no network on failure)
    /// 2. Build the multipart form (`stems` + `file` or `youtube_url`)
    /// 3. POST once; map the answer to a job id or a [`SubmitError`]
    pub async fn submit(&self, selection: &InputSelection) -> Result<JobId> {
        let result = self.submit_inner(selection).await;

        match &result {
            Ok(job_id) => {
                self.metrics.submission_accepted();
                info!(%job_id, stems = %selection.stems, "Job accepted");
            }
            Err(SubmitError::Validation(reason)) => {
                debug!(reason, "Submission blocked by validation");
            }
            Err(err) => {
                self.metrics.submission_failed();
                warn!(code = err.code(), error = %err, "Submission failed");
            }
        }

        result
    }

    async fn submit_inner(&self, selection: &InputSelection) -> Result<JobId> {
        let request = SubmissionRequest::prepare(selection).await?;
        let form = request.into_form()?;

        let url = self.endpoints.process();
        debug!(%url, "Sending submission");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(crate::http::describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| SubmitError::Transport(crate::http::describe(&e)))?;
            return Err(SubmitError::Rejected {
                status,
                message: rejection_message(&body),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SubmitError::Transport(crate::http::describe(&e)))?;

        let accepted: JobAcceptedResponse = serde_json::from_slice(&body)
            .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;

        if accepted.job_id.is_empty() {
            return Err(SubmitError::MalformedResponse("empty job_id".to_string()));
        }

        Ok(JobId::new(accepted.job_id))
    }
}
