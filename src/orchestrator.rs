//! Orchestrator: the submit → track → retrieve state machine
//!
//! ```text
//!  Editing ──submit──▶ Submitting ──ok──▶ Tracking ──"done"──▶ Done
//!     ▲                    │                  │                 │
//!     └──────failure───────┘                  └──────reset──────┘
//! ```
//!
//! Only one job is ever in flight: edits and submissions are refused outside
//! `Editing`, and `submit` holds `&mut self` for its whole duration. The last
//! submission failure lives inside `Phase::Editing` and is cleared by the
//! next submit.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::Config;
use crate::endpoints::Endpoints;
use crate::http::{HttpConfig, HttpError, build_client};
use crate::input::InputSelector;
use crate::job::{Job, JobId, JobStatus};
use crate::observability::Metrics;
use crate::retrieve::{ArtifactRetriever, RetrieveError, RetrievedBundle};
use crate::submit::{JobSubmitter, SubmitError};
use crate::tracker::{ChannelConnector, JobStatusTracker, ReconnectPolicy, WsConnector};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("input is locked while {0}")]
    SurfaceLocked(PhaseKind),
    #[error("job {0} is not done yet")]
    NotReady(JobId),
    #[error("no job is being tracked")]
    NoActiveJob,
    #[error("lost track of job {0} before it finished")]
    TrackingStalled(JobId),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid backend configuration: {0}")]
    Endpoint(#[from] crate::endpoints::EndpointError),
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Visible state of the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Input is editable; carries the most recent submission failure, if any
    Editing { last_failure: Option<SubmitError> },
    Submitting,
    Tracking(JobId),
    Done(JobId),
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Editing { .. } => PhaseKind::Editing,
            Phase::Submitting => PhaseKind::Submitting,
            Phase::Tracking(_) => PhaseKind::Tracking,
            Phase::Done(_) => PhaseKind::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Editing,
    Submitting,
    Tracking,
    Done,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PhaseKind::Editing => "editing",
            PhaseKind::Submitting => "submitting",
            PhaseKind::Tracking => "tracking",
            PhaseKind::Done => "done",
        };
        f.write_str(label)
    }
}

/// Composes selector, submitter, tracker and retriever
pub struct Orchestrator<C: ChannelConnector> {
    selector: InputSelector,
    submitter: JobSubmitter,
    tracker: JobStatusTracker<C>,
    retriever: ArtifactRetriever,
    phase: Phase,
    submitted_at: Option<DateTime<Utc>>,
    metrics: Arc<Metrics>,
}

impl Orchestrator<WsConnector> {
    /// Wire every component against the configured backend over WebSockets
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let endpoints = Endpoints::parse(&config.backend.base_url)?;
        let connector = WsConnector::new(endpoints.clone());
        Self::with_connector(config, connector)
    }
}

impl<C: ChannelConnector> Orchestrator<C> {
    /// Wire every component with a custom status channel transport
    pub fn with_connector(config: &Config, connector: C) -> Result<Self, SetupError> {
        let endpoints = Endpoints::parse(&config.backend.base_url)?;
        let client = build_client(&HttpConfig::from(&config.backend))?;
        let metrics = Arc::new(Metrics::new());

        let submitter = JobSubmitter::new(client.clone(), endpoints.clone(), metrics.clone());
        let retriever = ArtifactRetriever::new(client, endpoints, metrics.clone());
        let tracker = JobStatusTracker::new(
            connector,
            ReconnectPolicy::from(&config.tracker.reconnect),
            metrics.clone(),
        );

        Ok(Self::new(submitter, tracker, retriever, metrics))
    }

    pub fn new(
        submitter: JobSubmitter,
        tracker: JobStatusTracker<C>,
        retriever: ArtifactRetriever,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            selector: InputSelector::new(),
            submitter,
            tracker,
            retriever,
            phase: Phase::Editing { last_failure: None },
            submitted_at: None,
            metrics,
        }
    }

    /// Current phase, promoted to `Done` if the tracked job has finished
    pub fn phase(&mut self) -> &Phase {
        self.sync();
        &self.phase
    }

    pub fn selector(&self) -> &InputSelector {
        &self.selector
    }

    /// Mutable access to the input, only while editing
    pub fn edit(&mut self) -> Result<&mut InputSelector, OrchestratorError> {
        match self.phase {
            Phase::Editing { .. } => Ok(&mut self.selector),
            ref other => Err(OrchestratorError::SurfaceLocked(other.kind())),
        }
    }

    /// Whether a submit would pass the local preconditions right now
    pub fn can_submit(&self) -> bool {
        matches!(self.phase, Phase::Editing { .. }) && self.selector.selection().is_valid()
    }

    /// Text for the error slot
    pub fn error_message(&self) -> Option<String> {
        match &self.phase {
            Phase::Editing {
                last_failure: Some(err),
            } => Some(err.user_message()),
            _ => None,
        }
    }

    /// Live status of the tracked job
    pub fn status(&self) -> Option<JobStatus> {
        self.tracker.status()
    }

    /// Receiver notified on every status change of the tracked job
    pub fn subscribe(&self) -> Option<watch::Receiver<JobStatus>> {
        self.tracker.current().map(|s| s.subscribe())
    }

    pub fn job(&self) -> Option<Job> {
        let subscription = self.tracker.current()?;
        Some(Job {
            id: subscription.job_id().clone(),
            status: subscription.status(),
            submitted_at: self.submitted_at?,
        })
    }

    /// Retrieval becomes available only once the tracked status is terminal
    pub fn can_retrieve(&self) -> bool {
        matches!(self.phase, Phase::Tracking(_) | Phase::Done(_))
            && self.status().is_some_and(|s| s.is_terminal())
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Submit the current selection and start tracking the new job.
    ///
    /// On failure the surface returns to `Editing` with the error in the slot
    /// and the selection untouched.
    pub async fn submit(&mut self) -> Result<JobId, OrchestratorError> {
        if !matches!(self.phase, Phase::Editing { .. }) {
            return Err(OrchestratorError::SurfaceLocked(self.phase.kind()));
        }

        let pending = PendingSubmit::begin(&mut self.phase);
        debug!("Submitting selection");

        let selection = self.selector.selection().clone();
        match self.submitter.submit(&selection).await {
            Ok(job_id) => {
                self.submitted_at = Some(Utc::now());
                self.tracker.track(job_id.clone()).await;
                pending.finish(Phase::Tracking(job_id.clone()));
                Ok(job_id)
            }
            Err(err) => {
                pending.finish(Phase::Editing {
                    last_failure: Some(err.clone()),
                });
                Err(err.into())
            }
        }
    }

    /// Wait until the tracked job reaches the terminal status
    pub async fn wait_until_done(&mut self) -> Result<JobId, OrchestratorError> {
        let job_id = match &self.phase {
            Phase::Tracking(id) | Phase::Done(id) => id.clone(),
            _ => return Err(OrchestratorError::NoActiveJob),
        };

        let subscription = self
            .tracker
            .current()
            .ok_or(OrchestratorError::NoActiveJob)?;

        let outcome = subscription.wait_for_terminal().await;
        match outcome {
            Some(_) => {
                self.sync();
                Ok(job_id)
            }
            None => Err(OrchestratorError::TrackingStalled(job_id)),
        }
    }

    /// Download the finished job's bundle to `dest`
    pub async fn retrieve(&mut self, dest: &Path) -> Result<RetrievedBundle, OrchestratorError> {
        self.sync();
        match &self.phase {
            Phase::Done(job_id) => Ok(self.retriever.retrieve(job_id, dest).await?),
            Phase::Tracking(job_id) => Err(OrchestratorError::NotReady(job_id.clone())),
            _ => Err(OrchestratorError::NoActiveJob),
        }
    }

    /// Drop the current job and return to `Editing`, keeping the selection
    pub async fn reset(&mut self) {
        self.tracker.stop().await;
        self.submitted_at = None;
        if !matches!(self.phase, Phase::Editing { .. }) {
            info!(from = %self.phase.kind(), "Resetting to editing");
        }
        self.phase = Phase::Editing { last_failure: None };
    }

    fn sync(&mut self) {
        let terminal = self.tracker.status().is_some_and(|s| s.is_terminal());
        let finished = match &self.phase {
            Phase::Tracking(job_id) if terminal => Some(job_id.clone()),
            _ => None,
        };

        if let Some(job_id) = finished {
            info!(%job_id, "Job done, bundle available");
            self.phase = Phase::Done(job_id);
        }
    }
}

/// Holds the surface in `Submitting` for one request.
///
/// Dropping it unfinished (the submit future was cancelled) hands the surface
/// back to `Editing` with an empty error slot.
struct PendingSubmit<'a> {
    phase: &'a mut Phase,
    finished: bool,
}

impl<'a> PendingSubmit<'a> {
    fn begin(phase: &'a mut Phase) -> Self {
        *phase = Phase::Submitting;
        Self {
            phase,
            finished: false,
        }
    }

    fn finish(mut self, next: Phase) {
        *self.phase = next;
        self.finished = true;
    }
}

impl Drop for PendingSubmit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Submission cancelled, back to editing");
            *self.phase = Phase::Editing { last_failure: None };
        }
    }
}
