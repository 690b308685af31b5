//! Dependency installation through the ecosystems' own package managers
//!
//! Steps run strictly in order and the first failure aborts the rest.

use crate::dependency::command::{CommandRunner, CommandSpec};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One package-manager invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub description: String,
    pub command: CommandSpec,
}

impl InstallStep {
    pub fn new(description: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            description: description.into(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Succeeded,
    Failed { stderr: String },
}

/// Step paired with what happened when it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub step: InstallStep,
    pub outcome: InstallOutcome,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == InstallOutcome::Succeeded
    }
}

/// Runs the installation steps for both dependency sets
pub struct DependencyInstaller {
    runner: Arc<dyn CommandRunner>,
    steps: Vec<InstallStep>,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, steps: Vec<InstallStep>) -> Self {
        Self { runner, steps }
    }

    pub fn steps(&self) -> &[InstallStep] {
        &self.steps
    }

    /// Returns true only if every step succeeded
    pub async fn install_all(&self) -> bool {
        self.install_until_failure()
            .await
            .iter()
            .all(InstallReport::succeeded)
    }

    /// Run steps in order, stopping after the first failed one
    pub async fn install_until_failure(&self) -> Vec<InstallReport> {
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let outcome = self.run_step(step).await;
            let failed = outcome != InstallOutcome::Succeeded;

            reports.push(InstallReport {
                step: step.clone(),
                outcome,
            });

            if failed {
                break;
            }
        }

        reports
    }

    pub async fn run_step(&self, step: &InstallStep) -> InstallOutcome {
        info!(
            step = %step.description,
            command = %step.command.command_line(),
            "Running install step"
        );
        let started = Instant::now();

        let stderr = match self.runner.run(&step.command).await {
            Ok(output) if output.success() => {
                info!(
                    step = %step.description,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Install step completed successfully"
                );
                return InstallOutcome::Succeeded;
            }
            Ok(output) if output.stderr.trim().is_empty() => {
                format!("exited with {:?} and no error output", output.exit_code)
            }
            Ok(output) => output.stderr.trim().to_string(),
            Err(e) => e.to_string(),
        };

        error!(step = %step.description, stderr = %stderr, "Install step failed");
        InstallOutcome::Failed { stderr }
    }
}
