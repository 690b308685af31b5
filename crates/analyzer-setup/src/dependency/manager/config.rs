//! Configuration for the setup run

use super::{ServiceAddress, ServiceRole, SetupError};
use crate::dependency::command::CommandSpec;
use crate::dependency::environment::RuntimeRequirement;
use crate::dependency::install::InstallStep;
use crate::dependency::process::ProcessConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// `npm` is a `.cmd` shim on Windows
pub const DEFAULT_NPM_PROGRAM: &str = if cfg!(windows) { "npm.cmd" } else { "npm" };

/// How the supervisor decides the database is ready for the app server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessPolicy {
    /// Poll a TCP connect against the database port until it succeeds
    #[default]
    Probe,
    /// Sleep for the fixed settle delay and hope for the best
    Settle,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown readiness policy '{0}' (expected 'probe' or 'settle')")]
pub struct ParseReadinessPolicyError(String);

impl FromStr for ReadinessPolicy {
    type Err = ParseReadinessPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "probe" => Ok(ReadinessPolicy::Probe),
            "settle" | "delay" => Ok(ReadinessPolicy::Settle),
            other => Err(ParseReadinessPolicyError(other.to_string())),
        }
    }
}

/// Configuration for the whole orchestration run
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Runtimes that must be present before anything is installed
    pub runtimes: Vec<RuntimeRequirement>,

    /// Directory holding the application server's package.json
    pub app_server_dir: PathBuf,

    /// Package manager used for the application server
    pub npm_program: String,

    /// Installer used for the vector-database dependency set
    pub pip_program: String,
    pub pip_packages: Vec<String>,

    /// Skip the installation phase entirely
    pub skip_install: bool,

    /// Vector-database server command and listening address
    pub db_program: String,
    pub db_host: String,
    pub db_port: u16,

    /// Application server listening address (assumed, never verified by the server itself)
    pub app_server_host: String,
    pub app_server_port: u16,

    /// Readiness handling between the two starts
    pub readiness: ReadinessPolicy,
    pub settle_delay: Duration,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,

    /// How long a freshly spawned child must survive to count as started
    pub spawn_grace: Duration,

    /// Tick of the idle loop once services are running
    pub idle_tick: Duration,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            runtimes: vec![RuntimeRequirement::node(), RuntimeRequirement::python()],
            app_server_dir: PathBuf::from("server"),
            npm_program: DEFAULT_NPM_PROGRAM.to_string(),
            pip_program: "pip".to_string(),
            pip_packages: vec!["chromadb".to_string(), "openai".to_string()],
            skip_install: false,
            db_program: "chroma".to_string(),
            db_host: "localhost".to_string(),
            db_port: ServiceRole::Database.default_port(),
            app_server_host: "localhost".to_string(),
            app_server_port: ServiceRole::AppServer.default_port(),
            readiness: ReadinessPolicy::Probe,
            settle_delay: Duration::from_secs(8),
            readiness_timeout: Duration::from_secs(30),
            readiness_interval: Duration::from_millis(500),
            spawn_grace: Duration::from_millis(100),
            idle_tick: Duration::from_secs(1),
        }
    }
}

impl SetupConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("CHROMA_HOST") {
            if !host.trim().is_empty() {
                config.db_host = host;
            }
        }

        if let Ok(port) = std::env::var("CHROMA_PORT") {
            if let Ok(port) = port.parse() {
                config.db_port = port;
            }
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                config.app_server_port = port;
            }
        }

        if let Ok(path) = std::env::var("APP_SERVER_DIR") {
            config.app_server_dir = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("SETUP_READINESS") {
            if let Ok(policy) = val.parse() {
                config.readiness = policy;
            }
        }

        if let Ok(secs) = std::env::var("SETUP_READINESS_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.readiness_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(secs) = std::env::var("SETUP_SETTLE_DELAY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.settle_delay = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("SETUP_SKIP_INSTALL") {
            config.skip_install = val.to_lowercase() != "false" && val != "0";
        }

        config
    }

    /// Get port for a specific service
    pub fn get_port(&self, role: ServiceRole) -> u16 {
        match role {
            ServiceRole::Database => self.db_port,
            ServiceRole::AppServer => self.app_server_port,
        }
    }

    /// Set port for a specific service
    pub fn set_port(&mut self, role: ServiceRole, port: u16) {
        match role {
            ServiceRole::Database => self.db_port = port,
            ServiceRole::AppServer => self.app_server_port = port,
        }
    }

    pub fn address(&self, role: ServiceRole) -> ServiceAddress {
        match role {
            ServiceRole::Database => ServiceAddress::new(&self.db_host, self.db_port),
            ServiceRole::AppServer => {
                ServiceAddress::new(&self.app_server_host, self.app_server_port)
            }
        }
    }

    /// Installation steps, in the order they must run
    pub fn install_steps(&self) -> Vec<InstallStep> {
        vec![
            InstallStep::new(
                "Installing application server dependencies",
                CommandSpec::new(&self.npm_program)
                    .with_args(["install"])
                    .with_working_dir(&self.app_server_dir),
            ),
            InstallStep::new(
                "Installing vector database dependencies",
                CommandSpec::new(&self.pip_program)
                    .with_args(["install"])
                    .with_args(&self.pip_packages),
            ),
        ]
    }

    /// Launch configuration for a service
    pub fn process_config(&self, role: ServiceRole) -> ProcessConfig {
        match role {
            ServiceRole::Database => {
                ProcessConfig::new(role.process_name().to_string(), self.db_program.clone())
                    .with_args(vec![
                        "run".to_string(),
                        "--host".to_string(),
                        self.db_host.clone(),
                        "--port".to_string(),
                        self.db_port.to_string(),
                    ])
                    .with_spawn_grace(self.spawn_grace)
            }
            ServiceRole::AppServer => {
                ProcessConfig::new(role.process_name().to_string(), self.npm_program.clone())
                    .with_args(vec!["start".to_string()])
                    .with_working_dir(self.app_server_dir.clone())
                    .with_env_var("PORT".to_string(), self.app_server_port.to_string())
                    .with_spawn_grace(self.spawn_grace)
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.db_port == 0 || self.app_server_port == 0 {
            return Err(SetupError::Config {
                message: "service ports must be greater than 0".to_string(),
            });
        }

        if self.db_port == self.app_server_port && self.db_host == self.app_server_host {
            return Err(SetupError::Config {
                message: format!(
                    "Port conflict: db_port ({}) and app_server_port ({}) cannot be the same",
                    self.db_port, self.app_server_port
                ),
            });
        }

        if self.app_server_dir.as_os_str().is_empty() {
            return Err(SetupError::Config {
                message: "app_server_dir cannot be empty".to_string(),
            });
        }

        if self.db_host.trim().is_empty() {
            return Err(SetupError::Config {
                message: "db_host cannot be empty".to_string(),
            });
        }

        if self.readiness == ReadinessPolicy::Probe
            && (self.readiness_timeout.is_zero() || self.readiness_interval.is_zero())
        {
            return Err(SetupError::Config {
                message: "readiness_timeout and readiness_interval must be greater than 0"
                    .to_string(),
            });
        }

        if self.idle_tick.is_zero() {
            return Err(SetupError::Config {
                message: "idle_tick must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
