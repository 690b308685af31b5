//! REST client for a running Chroma server

use crate::config::ClientSettings;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid client settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Chroma server at {url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

impl ClientError {
    fn request(url: &str, source: reqwest::Error) -> Self {
        ClientError::Request {
            url: url.to_string(),
            source,
        }
    }
}

const HEARTBEAT_V2: &str = "/api/v2/heartbeat";
const HEARTBEAT_V1: &str = "/api/v1/heartbeat";

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    #[serde(rename = "nanosecond heartbeat")]
    nanosecond_heartbeat: u64,
}

/// Handle to one Chroma server, owned by whoever created it
#[derive(Debug, Clone)]
pub struct ChromaClient {
    http: Client,
    settings: ClientSettings,
}

/// Validate `settings` and build a client. Nothing is contacted yet.
pub fn create_client(settings: ClientSettings) -> Result<ChromaClient, ClientError> {
    settings.validate()?;

    let http = Client::builder()
        .timeout(settings.timeout)
        .user_agent("analyzer-chroma/0.1")
        .build()
        .map_err(ClientError::Build)?;

    debug!(base_url = %settings.base_url(), "Chroma client created");
    Ok(ChromaClient { http, settings })
}

impl ChromaClient {
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn base_url(&self) -> String {
        self.settings.base_url()
    }

    /// Server clock in nanoseconds, proving the server is reachable.
    /// Chroma 1.x serves the v2 API; older servers only answer on v1.
    pub async fn heartbeat(&self) -> Result<u64, ClientError> {
        match self.heartbeat_at(HEARTBEAT_V2).await {
            Err(ClientError::Status {
                url,
                status: 404 | 410,
            }) => {
                debug!(%url, "v2 heartbeat not served, trying v1");
                self.heartbeat_at(HEARTBEAT_V1).await
            }
            result => result,
        }
    }

    async fn heartbeat_at(&self, path: &str) -> Result<u64, ClientError> {
        let url = format!("{}{path}", self.base_url());

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::request(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: HeartbeatResponse = response
            .json()
            .await
            .map_err(|source| ClientError::request(&url, source))?;

        info!(%url, heartbeat = body.nanosecond_heartbeat, "Chroma heartbeat");
        Ok(body.nanosecond_heartbeat)
    }
}
