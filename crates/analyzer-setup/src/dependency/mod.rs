//! Dependency management for the analyzer setup
//!
//! Everything the orchestrator needs before and while the services run:
//!
//! - [`environment`]: runtime presence checks (`node`, `python`)
//! - [`install`]: npm / pip installation steps
//! - [`process`]: spawning, draining and terminating service processes
//! - [`health`]: liveness and readiness of the services
//! - [`manager`]: service roles, configuration and the error taxonomy
//!
//! External collaborators (package managers, the Chroma server, the Node
//! application server) are reached only through their command lines and
//! listening ports. [`command::CommandRunner`], [`process::ProcessLauncher`] and
//! [`health::ReadinessProbe`] are the seams where tests substitute fakes.

pub mod command;
pub mod environment;
pub mod health;
pub mod install;
pub mod manager;
pub mod process;

// re-export main types for convenience
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use environment::{EnvironmentChecker, RuntimeCheckResult, RuntimeRequirement, Version};
pub use health::{ProcessHealth, ReadinessProbe, TcpProbe};
pub use install::{DependencyInstaller, InstallOutcome, InstallReport, InstallStep};
pub use manager::{
    DEFAULT_NPM_PROGRAM, ReadinessPolicy, ServiceAddress, ServiceRole, SetupConfig, SetupError,
};
pub use process::{
    ProcessConfig, ProcessGuard, ProcessHandle, ProcessLauncher, ServiceHandles, ServiceProcess,
    ServiceSupervisor, SystemLauncher,
};
