use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use tracing::info;
use url::Url;

use crate::fs::write_atomically;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: Url, status: u16 },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to write download to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub remote_url: Url,
    pub destination: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub path: PathBuf,
    pub bytes: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Downloads the opt-out form export and stores it verbatim.
#[derive(Debug)]
pub struct Extractor {
    client: Client,
    config: ExtractConfig,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(NetworkError::Client)?;
        Ok(Self { client, config })
    }

    pub fn run(&self) -> Result<ExtractSummary, NetworkError> {
        let url = &self.config.remote_url;
        info!(url = %url, "downloading opt-out submissions");

        let http = |source| NetworkError::Http {
            url: url.clone(),
            source,
        };
        let response = self.client.get(url.clone()).send().map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(http)?;

        let path = &self.config.destination;
        write_atomically(path, &body).map_err(|source| NetworkError::Io {
            path: path.clone(),
            source,
        })?;

        let summary = ExtractSummary {
            path: path.clone(),
            bytes: body.len(),
            fetched_at: Utc::now(),
        };
        info!(
            path = %summary.path.display(),
            bytes = summary.bytes,
            "extraction finished"
        );
        Ok(summary)
    }
}
