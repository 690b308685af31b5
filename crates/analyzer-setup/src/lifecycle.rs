//! Top-level orchestration: check, install, start, idle, shut down
//!
//! [`LifecycleController::run`] drives the whole setup and turns its outcome
//! into a process exit code. The interrupt future is observed during every
//! phase, so an operator interrupt never leaves started services orphaned.

use crate::dependency::{
    CommandRunner, DependencyInstaller, EnvironmentChecker, InstallOutcome, ProcessLauncher,
    ReadinessProbe, ServiceHandles, ServiceRole, ServiceSupervisor, SetupConfig, SetupError,
    SystemCommandRunner, SystemLauncher, TcpProbe,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, instrument, warn};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
/// Interrupted before services were running (128 + SIGINT)
pub const EXIT_INTERRUPTED: u8 = 130;

/// Phases of a setup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Checking,
    Installing,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    /// Forward-only, except that any state may fall to `Stopped`
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Checking, Installing)
            | (Installing, Starting)
            | (Starting, Running)
            | (Running, ShuttingDown) => true,
            _ => false,
        }
    }
}

/// Drives checker, installer and supervisor in order
pub struct LifecycleController {
    config: SetupConfig,
    checker: EnvironmentChecker,
    installer: DependencyInstaller,
    supervisor: ServiceSupervisor,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        config: SetupConfig,
        runner: Arc<dyn CommandRunner>,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        let checker = EnvironmentChecker::new(runner.clone(), config.runtimes.clone());
        let installer = DependencyInstaller::new(runner, config.install_steps());
        let supervisor = ServiceSupervisor::new(config.clone(), launcher, probe);

        Self {
            config,
            checker,
            installer,
            supervisor,
            state: LifecycleState::Checking,
            history: vec![LifecycleState::Checking],
        }
    }

    /// Controller wired to real processes and a TCP readiness probe
    pub fn from_config(config: SetupConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemCommandRunner),
            Arc::new(SystemLauncher),
            Arc::new(TcpProbe::default()),
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state the controller has been in, in order
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Unexpected lifecycle transition");
        }
        info!(from = ?self.state, to = ?next, "Lifecycle transition");
        self.state = next;
        self.history.push(next);
    }

    /// Run the whole setup until `shutdown` resolves; returns the exit code
    pub async fn run<F>(&mut self, shutdown: F) -> u8
    where
        F: Future<Output = ()>,
    {
        let shutdown = std::pin::pin!(shutdown);
        self.run_pinned(shutdown).await
    }

    async fn run_pinned<F>(&mut self, mut shutdown: Pin<&mut F>) -> u8
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = self.bring_up() => Some(result),
        };

        let handles = match outcome {
            None => {
                warn!(state = ?self.state, "Interrupted before services were running");
                let stopped = self.supervisor.stop_all();
                if !stopped.is_empty() {
                    info!(?stopped, "Stopped services started before the interrupt");
                }
                self.transition(LifecycleState::Stopped);
                return EXIT_INTERRUPTED;
            }
            Some(Err(e)) => {
                error!(state = ?self.state, error = %e, "Setup failed");
                self.supervisor.stop_all();
                self.transition(LifecycleState::Stopped);
                return EXIT_FAILURE;
            }
            Some(Ok(handles)) => handles,
        };

        self.transition(LifecycleState::Running);
        info!(
            database = %handles.database.address.http_url(),
            app_server = %handles.app_server.address.http_url(),
            "Services are running, press Ctrl+C to stop"
        );

        self.idle(shutdown).await;

        self.transition(LifecycleState::ShuttingDown);
        let stopped = self.supervisor.stop(&handles);
        info!(?stopped, "Services stopped");
        self.transition(LifecycleState::Stopped);

        EXIT_SUCCESS
    }

    /// Checking, installing and starting. Errors leave the state where they happened.
    async fn bring_up(&mut self) -> Result<ServiceHandles, SetupError> {
        self.check_environment().await?;
        self.transition(LifecycleState::Installing);
        self.install_dependencies().await?;
        self.transition(LifecycleState::Starting);
        self.supervisor.start().await
    }

    #[instrument(skip(self))]
    async fn check_environment(&mut self) -> Result<(), SetupError> {
        let results = self.checker.check_until_failure().await;
        match results.into_iter().find(|result| !result.passed) {
            None => Ok(()),
            Some(failed) => Err(SetupError::MissingRuntime {
                runtime: failed.runtime,
                reason: failed.reason.unwrap_or_default(),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn install_dependencies(&mut self) -> Result<(), SetupError> {
        if self.config.skip_install {
            info!("Skipping dependency installation");
            return Ok(());
        }

        let reports = self.installer.install_until_failure().await;
        match reports.into_iter().find(|report| !report.succeeded()) {
            None => Ok(()),
            Some(report) => {
                let stderr = match report.outcome {
                    InstallOutcome::Failed { stderr } => stderr,
                    InstallOutcome::Succeeded => String::new(),
                };
                Err(SetupError::InstallationFailure {
                    step: report.step.description,
                    stderr,
                })
            }
        }
    }

    /// Tick until interrupted, logging services that exited on their own
    async fn idle<F>(&mut self, mut shutdown: Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.idle_tick);
        let mut reported: BTreeSet<ServiceRole> = BTreeSet::new();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Interrupt received, shutting down services");
                    return;
                }
                _ = ticker.tick() => {
                    for (role, health) in self.supervisor.health() {
                        if !health.is_running() && reported.insert(role) {
                            let uptime_secs = self
                                .supervisor
                                .uptime(role)
                                .map(|uptime| uptime.num_seconds());
                            warn!(
                                %role,
                                ?health,
                                ?uptime_secs,
                                "Service is no longer running and will not be restarted"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
