//! Backend URL construction
//!
//! All three backend operations hang off a single configurable base URL.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid backend URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Resolved backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse and check a base URL (`http://host:port[/prefix]`).
    pub fn parse(base_url: &str) -> Result<Self, EndpointError> {
        let invalid = |reason: String| EndpointError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "scheme must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".to_string()));
        }

        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `POST {base}/process`
    pub fn process(&self) -> Url {
        self.join(&self.base, &["process"])
    }

    /// `{ws|wss}://{host}/ws/status/{job_id}`
    pub fn status(&self, job_id: &str) -> Url {
        let mut url = self.base.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always permitted by the url crate
        let _ = url.set_scheme(scheme);
        self.join(&url, &["ws", "status", job_id])
    }

    /// `GET {base}/download/stems/{job_id}`
    pub fn download(&self, job_id: &str) -> Url {
        self.join(&self.base, &["download", "stems", job_id])
    }

    fn join(&self, base: &Url, segments: &[&str]) -> Url {
        let mut url = base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_urls() {
        let endpoints = Endpoints::parse("http://localhost:8000").unwrap();
        assert_eq!(endpoints.process().as_str(), "http://localhost:8000/process");
        assert_eq!(
            endpoints.status("abc123").as_str(),
            "ws://localhost:8000/ws/status/abc123"
        );
        assert_eq!(
            endpoints.download("abc123").as_str(),
            "http://localhost:8000/download/stems/abc123"
        );
    }

    #[test]
    fn test_https_maps_to_wss() {
        let endpoints = Endpoints::parse("https://stems.example.com").unwrap();
        assert_eq!(
            endpoints.status("j1").as_str(),
            "wss://stems.example.com/ws/status/j1"
        );
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let endpoints = Endpoints::parse("http://host/api/").unwrap();
        assert_eq!(endpoints.process().as_str(), "http://host/api/process");
        assert_eq!(
            endpoints.download("x").as_str(),
            "http://host/api/download/stems/x"
        );
    }

    #[test]
    fn test_job_id_is_percent_encoded() {
        let endpoints = Endpoints::parse("http://host").unwrap();
        assert_eq!(
            endpoints.download("a/b c").as_str(),
            "http://host/download/stems/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(Endpoints::parse("ftp://host").is_err());
        assert!(Endpoints::parse("mailto:someone@example.com").is_err());
        assert!(Endpoints::parse("not a url").is_err());
    }
}
