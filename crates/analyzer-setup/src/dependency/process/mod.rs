//! Process management for supervised services
//!
//! This module spawns the long-running services, drains their output into
//! the log, and exposes termination and liveness through [`ServiceProcess`].

pub mod supervisor;

pub use supervisor::{ProcessHandle, ServiceHandles, ServiceSupervisor, SupervisedProcess};

use crate::dependency::health::ProcessHealth;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Process startup configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env_vars: Vec<(String, String)>,
    /// How long the child must stay alive after spawn to count as started
    pub spawn_grace: Duration,
}

impl ProcessConfig {
    pub fn new(name: String, command: String) -> Self {
        Self {
            name,
            command,
            args: Vec::new(),
            working_dir: None,
            env_vars: Vec::new(),
            spawn_grace: Duration::from_millis(100),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_env_var(mut self, key: String, value: String) -> Self {
        self.env_vars.push((key, value));
        self
    }

    pub fn with_spawn_grace(mut self, grace: Duration) -> Self {
        self.spawn_grace = grace;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start process '{name}': {source}")]
    StartupError { name: String, source: anyhow::Error },

    #[error("Failed to stop process '{name}' (pid: {pid}): {source}")]
    StopError {
        name: String,
        pid: u32,
        source: std::io::Error,
    },

    #[error("Invalid process configuration: {message}")]
    InvalidConfig { message: String },
}

/// A running service process the supervisor can signal and poll
pub trait ServiceProcess: Send {
    fn name(&self) -> &str;

    fn pid(&self) -> Option<u32>;

    /// Ask the process to exit. Does not wait and never escalates.
    fn terminate(&mut self) -> Result<()>;

    /// Non-blocking liveness check
    fn health(&mut self) -> ProcessHealth;
}

/// Spawns service processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, config: &ProcessConfig) -> Result<Box<dyn ServiceProcess>>;
}

/// Owns a spawned child and the tasks draining its output
pub struct ProcessGuard {
    process: Child,
    name: String,
    drains: Vec<JoinHandle<()>>,
    terminate_requested: bool,
}

impl ProcessGuard {
    pub fn new(mut process: Child, name: String) -> Self {
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = process.stdout.take() {
            drains.push(spawn_drain(name.clone(), "stdout", stdout));
        }
        if let Some(stderr) = process.stderr.take() {
            drains.push(spawn_drain(name.clone(), "stderr", stderr));
        }

        Self {
            process,
            name,
            drains,
            terminate_requested: false,
        }
    }
}

impl ServiceProcess for ProcessGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    fn terminate(&mut self) -> Result<()> {
        self.terminate_requested = true;

        // `id()` is None once the child has been reaped
        let Some(pid) = self.process.id() else {
            debug!(process_name = %self.name, "Process already exited, nothing to terminate");
            return Ok(());
        };

        info!(process_name = %self.name, pid, "Requesting process termination");

        #[cfg(unix)]
        {
            ProcessUtils::send_sigterm(pid).map_err(|source| {
                ProcessError::StopError {
                    name: self.name.clone(),
                    pid,
                    source,
                }
                .into()
            })
        }

        #[cfg(not(unix))]
        {
            self.process.start_kill().map_err(|source| {
                ProcessError::StopError {
                    name: self.name.clone(),
                    pid,
                    source,
                }
                .into()
            })
        }
    }

    fn health(&mut self) -> ProcessHealth {
        match self.process.try_wait() {
            Ok(None) => ProcessHealth::Running,
            Ok(Some(status)) => ProcessHealth::Exited(status.code()),
            Err(e) => {
                warn!(process_name = %self.name, error = %e, "Failed to poll process status");
                ProcessHealth::Unknown
            }
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        // A guard dropped without an explicit stop would orphan its child
        if !self.terminate_requested && self.health().is_running() {
            if let Err(e) = self.process.start_kill() {
                error!(
                    process_name = %self.name,
                    pid = ?self.process.id(),
                    error = %e,
                    "Failed to kill process during drop"
                );
            }
        }
        for drain in &self.drains {
            drain.abort();
        }
    }
}

/// Forward every line a child writes to the log so its pipes never fill up
fn spawn_drain<R>(name: String, stream: &'static str, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(target: "service_output", service = %name, stream, "{line}");
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(service = %name, stream, error = %e, "Output stream closed with error");
                    break;
                }
            }
        }
    })
}

/// `ProcessLauncher` that spawns real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn validate_config(config: &ProcessConfig) -> Result<()> {
        if config.name.is_empty() {
            return Err(ProcessError::InvalidConfig {
                message: "Process name cannot be empty".to_string(),
            }
            .into());
        }

        if config.command.is_empty() {
            return Err(ProcessError::InvalidConfig {
                message: "Process command cannot be empty".to_string(),
            }
            .into());
        }

        if let Some(working_dir) = &config.working_dir {
            if !working_dir.is_dir() {
                return Err(ProcessError::InvalidConfig {
                    message: format!(
                        "Working directory does not exist: {}",
                        working_dir.display()
                    ),
                }
                .into());
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn launch(&self, config: &ProcessConfig) -> Result<Box<dyn ServiceProcess>> {
        Self::validate_config(config)?;

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_dir) = &config.working_dir {
            command.current_dir(working_dir);
        }

        for (key, value) in &config.env_vars {
            command.env(key, value);
        }

        info!(
            process_name = %config.name,
            command = %config.command_line(),
            "Spawning process"
        );

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn process: {}", config.command))?;

        let mut guard = ProcessGuard::new(child, config.name.clone());

        // Wait a brief moment to catch children that die on startup
        tokio::time::sleep(config.spawn_grace).await;

        if let ProcessHealth::Exited(code) = guard.health() {
            return Err(ProcessError::StartupError {
                name: config.name.clone(),
                source: anyhow::anyhow!(
                    "Process exited immediately after startup (code: {code:?})"
                ),
            }
            .into());
        }

        info!(process_name = %config.name, pid = ?guard.pid(), "Process started");
        Ok(Box::new(guard))
    }
}

/// Utility functions for process management
pub struct ProcessUtils;

impl ProcessUtils {
    /// Send a signal to a process (Unix only)
    #[cfg(unix)]
    pub fn send_signal(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
        let pid = libc::pid_t::try_from(pid).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
        })?;

        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    /// Send SIGTERM to a process for graceful shutdown
    #[cfg(unix)]
    pub fn send_sigterm(pid: u32) -> std::io::Result<()> {
        Self::send_signal(pid, libc::SIGTERM)
    }
}
