use serde_json::Value;

use crate::job::JobStatus;

/// Extract the status label from an inbound channel frame.
///
/// Anything that is not a JSON object with a string `status` field yields
/// `None` and must leave the tracked status untouched.
pub fn parse_status_frame(frame: &str) -> Option<JobStatus> {
    let value: Value = serde_json::from_str(frame).ok()?;
    match value.get("status")? {
        Value::String(label) if !label.is_empty() => Some(JobStatus::new(label.clone())),
        _ => None,
    }
}
