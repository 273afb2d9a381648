//! Result bundle download (`GET /download/stems/{job_id}`)
//!
//! The bundle is streamed into `<dest>.part` and renamed into place once
//! complete, so a failed download never leaves a truncated archive behind.

use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::endpoints::Endpoints;
use crate::job::JobId;
use crate::observability::Metrics;
use crate::submit::rejection_message;

/// File name the bundle is saved under when no other name is configured
pub const DEFAULT_BUNDLE_NAME: &str = "stems.zip";

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("download rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("download failed: {0}")]
    Transport(String),

    #[error("could not save bundle: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrieveError>;

/// A bundle saved to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedBundle {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Downloads result bundles. Performs no status check of its own.
#[derive(Clone)]
pub struct ArtifactRetriever {
    client: Client,
    endpoints: Endpoints,
    metrics: Arc<Metrics>,
}

impl ArtifactRetriever {
    pub fn new(client: Client, endpoints: Endpoints, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            endpoints,
            metrics,
        }
    }

    pub async fn retrieve(&self, job_id: &JobId, dest: &Path) -> Result<RetrievedBundle> {
        let url = self.endpoints.download(job_id.as_str());
        debug!(%job_id, %url, "Starting bundle download");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrieveError::Transport(crate::http::describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%job_id, status = status.as_u16(), "Bundle download rejected");
            return Err(RetrieveError::Rejected {
                status,
                message: rejection_message(&body),
            });
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(dest);
        let written = match write_body(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&partial, dest).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        self.metrics.bundle_retrieved();
        info!(%job_id, path = %dest.display(), bytes = written, "Bundle saved");

        Ok(RetrievedBundle {
            path: dest.to_path_buf(),
            bytes: written,
        })
    }
}

async fn write_body(response: &mut reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| RetrieveError::Transport(crate::http::describe(&e)))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.into());
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever(server: &MockServer) -> ArtifactRetriever {
        ArtifactRetriever::new(
            Client::new(),
            Endpoints::parse(&server.uri()).unwrap(),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/stems.zip")),
            PathBuf::from("/tmp/out/stems.zip.part")
        );
    }

    #[tokio::test]
    async fn test_retrieve_saves_bundle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/stems/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"PK\x03\x04zipdata".to_vec(), "application/zip"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("nested").join("stems.zip");

        let bundle = retriever(&server)
            .retrieve(&JobId::from("abc123"), &dest)
            .await
            .unwrap();

        assert_eq!(bundle.path, dest);
        assert_eq!(bundle.bytes, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK\x03\x04zipdata");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_retrieve_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/stems/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"detail":"File not found"}"#))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("stems.zip");

        let err = retriever(&server)
            .retrieve(&JobId::from("missing"), &dest)
            .await
            .unwrap_err();

        match err {
            RetrieveError::Rejected { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "File not found");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/stems/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory at the destination makes the rename fail
        let dest = temp_dir.path().join("stems.zip");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();

        let err = retriever(&server)
            .retrieve(&JobId::from("abc123"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::Io(_)));
        assert!(!partial_path(&dest).exists());
        assert!(dest.join("keep").exists());
    }

    #[tokio::test]
    async fn test_retrieve_transport_error() {
        let retriever = ArtifactRetriever::new(
            Client::new(),
            Endpoints::parse("http://127.0.0.1:1").unwrap(),
            Arc::new(Metrics::new()),
        );
        let temp_dir = TempDir::new().unwrap();

        let err = retriever
            .retrieve(&JobId::from("abc123"), &temp_dir.path().join("stems.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::Transport(_)));
    }
}
