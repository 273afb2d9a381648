//! Input selection state: what the user wants processed and into how many stems.
//!
//! Pure state, no I/O. Preconditions are only checked when
//! [`InputSelection::validate`] is called (at submit time).

use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("stem count must be 2, 3 or 4, got {0}")]
    UnsupportedStemCount(u8),
    #[error("{payload} payload does not match {mode} mode")]
    PayloadMismatch {
        mode: InputMode,
        payload: &'static str,
    },
}

/// Where the media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// A local file uploaded with the request
    Upload,
    /// A remote video URL fetched by the backend
    #[default]
    LinkReference,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Upload => f.write_str("upload"),
            InputMode::LinkReference => f.write_str("link"),
        }
    }
}

/// Number of stems the backend should split the source into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemCount {
    /// Vocals + accompaniment
    Two,
    /// Vocals + drums + other
    Three,
    /// Vocals + bass + drums + other
    #[default]
    Four,
}

impl StemCount {
    pub fn as_u8(self) -> u8 {
        match self {
            StemCount::Two => 2,
            StemCount::Three => 3,
            StemCount::Four => 4,
        }
    }
}

impl TryFrom<u8> for StemCount {
    type Error = InputError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(StemCount::Two),
            3 => Ok(StemCount::Three),
            4 => Ok(StemCount::Four),
            other => Err(InputError::UnsupportedStemCount(other)),
        }
    }
}

impl fmt::Display for StemCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file chosen for upload. Path-backed handles are read lazily at submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    source: FileSource,
}

impl FileHandle {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Self {
            name,
            source: FileSource::Path(path),
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(data.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(path) => Some(path),
            FileSource::Memory(_) => None,
        }
    }

    /// Load the file contents.
    pub async fn read(&self) -> std::io::Result<Bytes> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
            FileSource::Memory(data) => Ok(data.clone()),
        }
    }
}

/// Mode-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    File(FileHandle),
    Url(String),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::File(_) => "file",
            Payload::Url(_) => "url",
        }
    }

    fn mode(&self) -> InputMode {
        match self {
            Payload::File(_) => InputMode::Upload,
            Payload::Url(_) => InputMode::LinkReference,
        }
    }
}

/// Snapshot of the selector state, consumed by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputSelection {
    pub mode: InputMode,
    pub payload: Option<Payload>,
    pub stems: StemCount,
}

/// Input that passed the submit preconditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedSource<'a> {
    File(&'a FileHandle),
    Url(&'a str),
}

impl InputSelection {
    /// Check the submit preconditions without touching the network.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<ValidatedSource<'_>, String> {
        match (self.mode, &self.payload) {
            (InputMode::Upload, Some(Payload::File(file))) => Ok(ValidatedSource::File(file)),
            (InputMode::Upload, _) => Err("Choose a file".to_string()),
            (InputMode::LinkReference, Some(Payload::Url(url))) if !url.trim().is_empty() => {
                Ok(ValidatedSource::Url(url.trim()))
            }
            (InputMode::LinkReference, _) => Err("Provide a video URL".to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Mutable form state behind the orchestrator's editing surface.
#[derive(Debug, Clone, Default)]
pub struct InputSelector {
    selection: InputSelection,
}

impl InputSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch input mode. The previous mode's payload is discarded.
    pub fn set_mode(&mut self, mode: InputMode) {
        if self.selection.mode == mode {
            return;
        }
        self.selection = InputSelection {
            mode,
            payload: None,
            stems: self.selection.stems,
        };
    }

    pub fn set_payload(&mut self, payload: Payload) -> Result<(), InputError> {
        if payload.mode() != self.selection.mode {
            return Err(InputError::PayloadMismatch {
                mode: self.selection.mode,
                payload: payload.kind(),
            });
        }
        self.selection = InputSelection {
            payload: Some(payload),
            ..self.selection.clone()
        };
        Ok(())
    }

    pub fn set_variant_count(&mut self, stems: StemCount) {
        self.selection = InputSelection {
            stems,
            ..self.selection.clone()
        };
    }

    pub fn selection(&self) -> &InputSelection {
        &self.selection
    }
}
