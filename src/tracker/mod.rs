//! Live job status tracking over a push channel
//!
//! ## Key Components
//!
//! - [`JobStatusTracker`] - owns at most one live channel, keyed by job id
//! - [`StatusSubscription`] - handle to the channel and its status value
//! - [`ChannelConnector`] - transport seam ([`WsConnector`], [`MockConnector`])
//! - [`ReconnectPolicy`] - backoff applied when the channel drops early
//!
//! Each subscription runs one background task holding the only writer of the
//! status value (a `watch` channel). Frames are applied in arrival order,
//! last write wins. Malformed frames are dropped without touching state.

mod channel;
mod message;
mod reconnect;

pub use channel::{
    ChannelConnector, ChannelError, MockConnector, MockFeed, MockFrame, StatusStream, WsConnector,
};
pub use message::parse_status_frame;
pub use reconnect::ReconnectPolicy;

use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::job::{JobId, JobStatus};
use crate::observability::Metrics;

/// Tracks the status of one job at a time
pub struct JobStatusTracker<C: ChannelConnector> {
    connector: Arc<C>,
    policy: ReconnectPolicy,
    metrics: Arc<Metrics>,
    current: Option<StatusSubscription>,
}

impl<C: ChannelConnector> JobStatusTracker<C> {
    pub fn new(connector: C, policy: ReconnectPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            connector: Arc::new(connector),
            policy,
            metrics,
            current: None,
        }
    }

    /// Start tracking `job_id`.
    ///
    /// Tracking the id already being tracked keeps the existing channel. A
    /// different id closes the old channel first; the new subscription starts
    /// at `queued` before any frame arrives.
    pub async fn track(&mut self, job_id: JobId) -> &StatusSubscription {
        if self.current.as_ref().is_some_and(|s| s.job_id == job_id) {
            debug!(%job_id, "Already tracking job");
        } else if let Some(previous) = self.current.take() {
            debug!(old = %previous.job_id, new = %job_id, "Switching tracked job");
            previous.close().await;
        }

        let subscription = match self.current.take() {
            Some(existing) => existing,
            None => self.spawn(job_id),
        };
        self.current.insert(subscription)
    }

    /// Close the current channel, if any. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(subscription) = self.current.take() {
            subscription.close().await;
        }
    }

    pub fn current(&self) -> Option<&StatusSubscription> {
        self.current.as_ref()
    }

    /// Status of the tracked job, if there is one
    pub fn status(&self) -> Option<JobStatus> {
        self.current.as_ref().map(StatusSubscription::status)
    }

    fn spawn(&self, job_id: JobId) -> StatusSubscription {
        let (status_tx, status_rx) = watch::channel(JobStatus::queued());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = ChannelTask {
            connector: self.connector.clone(),
            job_id: job_id.clone(),
            policy: self.policy.clone(),
            status: status_tx,
            metrics: self.metrics.clone(),
        };

        info!(%job_id, "Tracking job status");
        let handle = tokio::spawn(task.run(shutdown_rx));

        StatusSubscription {
            job_id,
            status: status_rx,
            shutdown: Some(shutdown_tx),
            task: Some(handle),
        }
    }
}

/// Live view of one job's status.
///
/// Dropping the subscription closes its channel.
pub struct StatusSubscription {
    job_id: JobId,
    status: watch::Receiver<JobStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StatusSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// A receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Whether the channel task is still running (connected or reconnecting)
    pub fn is_live(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the terminal status.
    ///
    /// Returns `None` if the channel gave up before the job finished.
    pub async fn wait_for_terminal(&self) -> Option<JobStatus> {
        let mut rx = self.status.clone();
        let status = match rx.wait_for(JobStatus::is_terminal).await {
            Ok(status) => (*status).clone(),
            Err(_) => return None,
        };
        Some(status)
    }

    /// Close the channel and wait for its task to finish
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(job_id = %self.job_id, error = %e, "Status channel task failed");
            }
        }
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

enum PumpOutcome {
    Shutdown,
    Terminal,
    /// `progressed` is set once the connection delivered a valid status frame
    Lost {
        error: Option<ChannelError>,
        progressed: bool,
    },
}

struct ChannelTask<C: ChannelConnector> {
    connector: Arc<C>,
    job_id: JobId,
    policy: ReconnectPolicy,
    status: watch::Sender<JobStatus>,
    metrics: Arc<Metrics>,
}

impl<C: ChannelConnector> ChannelTask<C> {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let job_id = &self.job_id;
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = &mut shutdown => return,
                result = self.connector.connect(job_id) => result,
            };

            match connected {
                Ok(mut stream) => {
                    match self.pump(stream.as_mut(), &mut shutdown).await {
                        PumpOutcome::Shutdown => {
                            debug!(%job_id, "Closing status channel");
                            stream.close().await;
                            return;
                        }
                        PumpOutcome::Terminal => {
                            debug!(%job_id, "Job finished, closing status channel");
                            stream.close().await;
                            return;
                        }
                        PumpOutcome::Lost { error, progressed } => {
                            // An accept-then-hang-up connection still spends budget
                            if progressed {
                                failures = 0;
                            }
                            match error {
                                Some(e) => warn!(%job_id, error = %e, "Status channel failed"),
                                None => warn!(%job_id, "Status channel closed before job finished"),
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(%job_id, error = %e, "Could not open status channel");
                }
            }

            failures += 1;
            let Some(delay) = self.policy.backoff(failures) else {
                warn!(%job_id, attempts = failures, "Giving up on status channel");
                return;
            };

            self.metrics.reconnect();
            info!(%job_id, attempt = failures, ?delay, "Reconnecting status channel");

            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(
        &self,
        stream: &mut dyn StatusStream,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> PumpOutcome {
        let mut progressed = false;

        loop {
            let frame = tokio::select! {
                _ = &mut *shutdown => return PumpOutcome::Shutdown,
                frame = stream.next_frame() => frame,
            };

            match frame {
                Some(Ok(text)) => {
                    let Some(status) = parse_status_frame(&text) else {
                        debug!(job_id = %self.job_id, "Ignoring malformed status frame");
                        continue;
                    };
                    progressed = true;
                    let terminal = status.is_terminal();
                    self.apply(status);
                    if terminal {
                        return PumpOutcome::Terminal;
                    }
                }
                Some(Err(e)) => {
                    return PumpOutcome::Lost {
                        error: Some(e),
                        progressed,
                    };
                }
                None => {
                    return PumpOutcome::Lost {
                        error: None,
                        progressed,
                    };
                }
            }
        }
    }

    /// Last write wins; repeating the current label notifies nobody
    fn apply(&self, status: JobStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });

        if changed {
            self.metrics.status_update();
            info!(job_id = %self.job_id, %status, "Job status changed");
        }
    }
}
