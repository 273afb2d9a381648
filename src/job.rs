//! Job identity and status values shared by the submitter, tracker and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status label every freshly tracked job starts with.
pub const QUEUED: &str = "queued";

/// The only status label the client treats as terminal.
pub const DONE: &str = "done";

/// Opaque job identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Backend-defined status label.
///
/// Apart from [`QUEUED`] (the initial value) and [`DONE`] (terminal), labels
/// are opaque and only used for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatus(String);

impl JobStatus {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn queued() -> Self {
        Self(QUEUED.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        self.0 == DONE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::queued()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of the job the orchestrator currently owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
