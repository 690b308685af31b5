//! Supervision of the vector-database and application-server processes
//!
//! The supervisor is the only owner of the child processes. Callers get back
//! [`ServiceHandles`], plain identifiers they hand back to [`ServiceSupervisor::stop`].

use super::{ProcessLauncher, ServiceProcess};
use crate::dependency::health::{ProcessHealth, ReadinessProbe, wait_until_ready};
use crate::dependency::manager::{
    ReadinessPolicy, ServiceAddress, ServiceRole, SetupConfig, SetupError,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A service process owned by the supervisor
pub struct SupervisedProcess {
    pub role: ServiceRole,
    pub address: ServiceAddress,
    pub started_at: DateTime<Utc>,
    /// Recorded at spawn; the live pid disappears once the child is reaped
    spawn_pid: Option<u32>,
    process: Box<dyn ServiceProcess>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.spawn_pid
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            role: self.role,
            pid: self.spawn_pid,
            address: self.address.clone(),
            started_at: self.started_at,
        }
    }

    fn terminate(&mut self) {
        info!(
            role = %self.role,
            pid = ?self.spawn_pid,
            uptime_secs = self.uptime().num_seconds(),
            "Stopping service"
        );
        if let Err(e) = self.process.terminate() {
            error!(role = %self.role, error = %e, "Failed to request termination");
        }
    }
}

/// Identifies one started service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub role: ServiceRole,
    pub pid: Option<u32>,
    pub address: ServiceAddress,
    pub started_at: DateTime<Utc>,
}

/// Handles returned by [`ServiceSupervisor::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandles {
    pub database: ProcessHandle,
    pub app_server: ProcessHandle,
}

/// Starts, stops and polls the two services
pub struct ServiceSupervisor {
    config: SetupConfig,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn ReadinessProbe>,
    processes: BTreeMap<ServiceRole, SupervisedProcess>,
}

impl ServiceSupervisor {
    pub fn new(
        config: SetupConfig,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            config,
            launcher,
            probe,
            processes: BTreeMap::new(),
        }
    }

    /// Start the database, wait for it, then start the application server
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<ServiceHandles, SetupError> {
        let database = self.start_role(ServiceRole::Database).await?;

        if let Err(e) = self.await_readiness(ServiceRole::Database).await {
            self.stop_all();
            return Err(e);
        }

        let app_server = match self.start_role(ServiceRole::AppServer).await {
            Ok(handle) => handle,
            Err(e) => {
                self.stop_all();
                return Err(e);
            }
        };

        info!(
            database = %database.address,
            app_server = %app_server.address,
            "All services started"
        );

        Ok(ServiceHandles {
            database,
            app_server,
        })
    }

    /// Launch one service unless that role is already owned
    pub async fn start_role(&mut self, role: ServiceRole) -> Result<ProcessHandle, SetupError> {
        if let Some(existing) = self.processes.get(&role) {
            warn!(%role, pid = ?existing.pid(), "Refusing to start a duplicate process");
            return Err(SetupError::AlreadyRunning {
                role,
                pid: existing.pid(),
            });
        }

        let process_config = self.config.process_config(role);
        let address = self.config.address(role);
        info!(%role, %address, command = %process_config.command_line(), "Starting service");

        let process = self
            .launcher
            .launch(&process_config)
            .await
            .map_err(|source| SetupError::StartupFailure { role, source })?;

        let supervised = SupervisedProcess {
            role,
            address,
            started_at: Utc::now(),
            spawn_pid: process.pid(),
            process,
        };
        let handle = supervised.handle();
        self.processes.insert(role, supervised);

        Ok(handle)
    }

    async fn await_readiness(&self, role: ServiceRole) -> Result<(), SetupError> {
        match self.config.readiness {
            ReadinessPolicy::Settle => {
                info!(
                    %role,
                    settle_secs = self.config.settle_delay.as_secs_f64(),
                    "Waiting a fixed settle delay"
                );
                tokio::time::sleep(self.config.settle_delay).await;
                Ok(())
            }
            ReadinessPolicy::Probe => {
                let address = self.config.address(role);
                wait_until_ready(
                    self.probe.as_ref(),
                    &address,
                    self.config.readiness_interval,
                    self.config.readiness_timeout,
                )
                .await
                .map(|_| ())
                .ok_or(SetupError::ReadinessTimeout {
                    role,
                    timeout_ms: self.config.readiness_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Request termination of the handled processes without waiting for exit.
    /// Returns the roles that were signalled.
    pub fn stop(&mut self, handles: &ServiceHandles) -> Vec<ServiceRole> {
        // reverse of startup order
        [&handles.app_server, &handles.database]
            .into_iter()
            .filter_map(|handle| self.stop_handle(handle))
            .collect()
    }

    fn stop_handle(&mut self, handle: &ProcessHandle) -> Option<ServiceRole> {
        let owned_pid = self.processes.get(&handle.role).map(SupervisedProcess::pid);
        match owned_pid {
            None => {
                warn!(role = %handle.role, "No supervised process for handle");
                return None;
            }
            Some(pid) if pid != handle.pid => {
                warn!(
                    role = %handle.role,
                    handle_pid = ?handle.pid,
                    owned_pid = ?pid,
                    "Handle does not match the supervised process, ignoring"
                );
                return None;
            }
            Some(_) => {}
        }

        let mut supervised = self.processes.remove(&handle.role)?;
        supervised.terminate();
        Some(handle.role)
    }

    /// Terminate whatever is currently owned, used on aborted startups
    pub fn stop_all(&mut self) -> Vec<ServiceRole> {
        let mut stopped = Vec::with_capacity(self.processes.len());
        while let Some((role, mut supervised)) = self.processes.pop_last() {
            supervised.terminate();
            stopped.push(role);
        }
        stopped
    }

    /// Liveness of every owned process. Nothing is restarted.
    pub fn health(&mut self) -> BTreeMap<ServiceRole, ProcessHealth> {
        self.processes
            .iter_mut()
            .map(|(role, supervised)| (*role, supervised.process.health()))
            .collect()
    }

    /// Time since the role was launched, if it is owned
    pub fn uptime(&self, role: ServiceRole) -> Option<chrono::Duration> {
        self.processes.get(&role).map(SupervisedProcess::uptime)
    }

    pub fn is_running(&self, role: ServiceRole) -> bool {
        self.processes.contains_key(&role)
    }

    pub fn managed_process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }
}
