//! Service roles, addresses and the setup error taxonomy
//!
//! The orchestrator manages exactly two external services: the Chroma
//! vector-database server and the Node application server that talks to it.

pub mod config;

pub use config::{DEFAULT_NPM_PROGRAM, ParseReadinessPolicyError, ReadinessPolicy, SetupConfig};

use std::fmt;

/// Services supervised by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceRole {
    Database,
    AppServer,
}

impl ServiceRole {
    /// Startup order. The database always comes first.
    pub const STARTUP_ORDER: [ServiceRole; 2] = [ServiceRole::Database, ServiceRole::AppServer];

    pub fn default_port(&self) -> u16 {
        match self {
            ServiceRole::Database => 8000,
            ServiceRole::AppServer => 3001,
        }
    }

    pub fn process_name(&self) -> &'static str {
        match self {
            ServiceRole::Database => "chroma",
            ServiceRole::AppServer => "app-server",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.process_name())
    }
}

/// Host and port a service is expected to listen on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAddress {
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error types for the setup run
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Required runtime '{runtime}' is missing or unusable: {reason}")]
    MissingRuntime { runtime: String, reason: String },

    #[error("Installation step '{step}' failed: {stderr}")]
    InstallationFailure { step: String, stderr: String },

    #[error("Failed to start {role}: {source}")]
    StartupFailure {
        role: ServiceRole,
        source: anyhow::Error,
    },

    #[error("{role} did not become ready within {timeout_ms}ms")]
    ReadinessTimeout { role: ServiceRole, timeout_ms: u64 },

    #[error("{role} is already running (pid: {pid:?})")]
    AlreadyRunning { role: ServiceRole, pid: Option<u32> },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_roles() {
        assert_eq!(ServiceRole::Database.default_port(), 8000);
        assert_eq!(ServiceRole::AppServer.default_port(), 3001);
        assert_eq!(ServiceRole::Database.to_string(), "chroma");
        assert_eq!(
            ServiceRole::STARTUP_ORDER,
            [ServiceRole::Database, ServiceRole::AppServer]
        );
    }

    #[test]
    fn test_service_address() {
        let address = ServiceAddress::new("localhost", 8000);
        assert_eq!(address.to_string(), "localhost:8000");
        assert_eq!(address.http_url(), "http://localhost:8000");
    }
}
