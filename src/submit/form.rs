//! Multipart form construction for `POST /process`

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use super::error::SubmitError;
use crate::input::{InputSelection, StemCount, ValidatedSource};

pub const FIELD_STEMS: &str = "stems";
pub const FIELD_FILE: &str = "file";
pub const FIELD_URL: &str = "youtube_url";

/// One submission, built from a validated selection.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub stems: StemCount,
    pub source: SubmissionSource,
}

#[derive(Debug, Clone)]
pub enum SubmissionSource {
    File { name: String, data: Bytes },
    Url(String),
}

impl SubmissionRequest {
    /// Check preconditions and load any file payload. Never touches the network.
    pub async fn prepare(selection: &InputSelection) -> Result<Self, SubmitError> {
        let source = match selection.validate().map_err(SubmitError::Validation)? {
            ValidatedSource::File(file) => {
                let data = file.read().await.map_err(|e| {
                    SubmitError::Validation(format!("Could not read {}: {}", file.name(), e))
                })?;
                SubmissionSource::File {
                    name: file.name().to_string(),
                    data,
                }
            }
            ValidatedSource::Url(url) => SubmissionSource::Url(url.to_string()),
        };

        Ok(Self {
            stems: selection.stems,
            source,
        })
    }

    /// Render as multipart: `stems` plus exactly one of `file` / `youtube_url`
    pub fn into_form(self) -> Result<Form, SubmitError> {
        let form = Form::new().text(FIELD_STEMS, self.stems.to_string());

        let form = match self.source {
            SubmissionSource::File { name, data } => {
                let media_type = guess_media_type(&name);
                let part = Part::bytes(data.to_vec())
                    .file_name(name)
                    .mime_str(media_type.as_ref())
                    .map_err(|e| SubmitError::Validation(format!("invalid media type: {e}")))?;
                form.part(FIELD_FILE, part)
            }
            SubmissionSource::Url(url) => form.text(FIELD_URL, url),
        };

        Ok(form)
    }
}

/// Guess the upload's media type from its extension.
///
/// Unknown extensions are sent as `application/octet-stream`.
pub fn guess_media_type(file_name: &str) -> mime::Mime {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let essence = match extension.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };

    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
