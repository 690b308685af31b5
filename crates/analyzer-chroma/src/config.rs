//! Connection settings

use crate::client::ClientError;
use std::time::Duration;

/// The only API implementation that reaches a remote server
pub const FASTAPI_IMPL: &str = "chromadb.api.fastapi.FastAPI";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_impl: String,
    pub host: String,
    pub port: u16,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_impl: FASTAPI_IMPL.to_string(),
            host: "localhost".to_string(),
            port: 8000,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ClientSettings {
    /// Load settings from environment variables with defaults
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(api_impl) = std::env::var("CHROMA_API_IMPL") {
            settings.api_impl = api_impl;
        }

        if let Ok(host) = std::env::var("CHROMA_SERVER_HOST") {
            if !host.trim().is_empty() {
                settings.host = host;
            }
        }

        if let Ok(port) = std::env::var("CHROMA_SERVER_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                settings.port = port;
            }
        }

        settings
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_impl != FASTAPI_IMPL {
            return Err(ClientError::InvalidSettings(format!(
                "unsupported API implementation '{}' (expected '{FASTAPI_IMPL}')",
                self.api_impl
            )));
        }

        if self.host.trim().is_empty() {
            return Err(ClientError::InvalidSettings(
                "server host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(ClientError::InvalidSettings(
                "server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
