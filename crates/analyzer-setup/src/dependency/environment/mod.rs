//! Runtime environment checks
//!
//! Every required runtime is probed by running its version command. A
//! runtime passes when the command exits with code 0; the reported version is
//! extracted for the operator but only compared when a minimum is configured.

pub mod version;

pub use version::{Version, VersionError};

use crate::dependency::command::{CommandError, CommandRunner, CommandSpec};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A runtime that must be installed before dependencies can be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRequirement {
    /// Human readable runtime name
    pub name: String,
    /// Executables to try, in order; the first that passes wins
    pub candidates: Vec<String>,
    pub version_args: Vec<String>,
    pub minimum_version: Option<Version>,
    /// Where the operator can get the runtime from
    pub download_url: String,
}

impl RuntimeRequirement {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: vec![program.into()],
            version_args: vec!["--version".to_string()],
            minimum_version: None,
            download_url: String::new(),
        }
    }

    pub fn node() -> Self {
        Self::new("Node.js", "node").with_download_url("https://nodejs.org/")
    }

    pub fn python() -> Self {
        Self::new("Python", "python")
            .with_fallback("python3")
            .with_download_url("https://python.org/")
    }

    pub fn with_fallback(mut self, program: impl Into<String>) -> Self {
        self.candidates.push(program.into());
        self
    }

    pub fn with_minimum_version(mut self, version: Version) -> Self {
        self.minimum_version = Some(version);
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }
}

/// Outcome of checking one runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCheckResult {
    pub runtime: String,
    /// Executable that satisfied (or last failed) the check
    pub program: Option<String>,
    /// Raw version line reported by the runtime
    pub version: Option<String>,
    pub passed: bool,
    pub reason: Option<String>,
}

impl RuntimeCheckResult {
    fn passed(runtime: &str, program: &str, version: String) -> Self {
        Self {
            runtime: runtime.to_string(),
            program: Some(program.to_string()),
            version: Some(version),
            passed: true,
            reason: None,
        }
    }

    fn failed(runtime: &str, program: Option<&str>, reason: String) -> Self {
        Self {
            runtime: runtime.to_string(),
            program: program.map(str::to_string),
            version: None,
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Verifies required runtimes by invoking their version commands
pub struct EnvironmentChecker {
    runner: Arc<dyn CommandRunner>,
    requirements: Vec<RuntimeRequirement>,
}

impl EnvironmentChecker {
    pub fn new(runner: Arc<dyn CommandRunner>, requirements: Vec<RuntimeRequirement>) -> Self {
        Self {
            runner,
            requirements,
        }
    }

    pub fn requirements(&self) -> &[RuntimeRequirement] {
        &self.requirements
    }

    /// Returns true only if every required runtime passes
    pub async fn check_all(&self) -> bool {
        self.check_until_failure()
            .await
            .iter()
            .all(|result| result.passed)
    }

    /// Check runtimes in order, stopping at the first failure
    pub async fn check_until_failure(&self) -> Vec<RuntimeCheckResult> {
        info!(count = self.requirements.len(), "Checking required runtimes");

        let mut results = Vec::with_capacity(self.requirements.len());
        for requirement in &self.requirements {
            let result = self.check(requirement).await;
            let passed = result.passed;

            if passed {
                info!(
                    runtime = %result.runtime,
                    version = result.version.as_deref().unwrap_or("unknown"),
                    "Runtime available"
                );
            } else {
                error!(
                    runtime = %result.runtime,
                    reason = result.reason.as_deref().unwrap_or("unknown"),
                    download_url = %requirement.download_url,
                    "Runtime not found, install it before running setup"
                );
            }

            results.push(result);
            if !passed {
                break;
            }
        }

        results
    }

    /// Check a single runtime, trying each candidate executable in turn
    pub async fn check(&self, requirement: &RuntimeRequirement) -> RuntimeCheckResult {
        let mut last_failure = RuntimeCheckResult::failed(
            &requirement.name,
            None,
            "no candidate executables configured".to_string(),
        );

        for program in &requirement.candidates {
            let spec = CommandSpec::new(program).with_args(&requirement.version_args);

            let reason = match self.runner.run(&spec).await {
                Ok(output) if output.success() => {
                    // Python 2 printed its version to stderr
                    let reported = if output.stdout.trim().is_empty() {
                        output.stderr.trim()
                    } else {
                        output.stdout.trim()
                    };
                    match self.verify_minimum(requirement, reported) {
                        Ok(()) => {
                            return RuntimeCheckResult::passed(
                                &requirement.name,
                                program,
                                reported.to_string(),
                            );
                        }
                        Err(reason) => reason,
                    }
                }
                Ok(output) => format!(
                    "'{}' exited with {}",
                    spec.command_line(),
                    output
                        .exit_code
                        .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"))
                ),
                Err(CommandError::NotFound { program }) => {
                    format!("executable '{program}' not found")
                }
                Err(e) => e.to_string(),
            };

            warn!(
                runtime = %requirement.name,
                program = %program,
                reason = %reason,
                "Runtime candidate failed"
            );
            last_failure = RuntimeCheckResult::failed(&requirement.name, Some(program), reason);
        }

        last_failure
    }

    fn verify_minimum(
        &self,
        requirement: &RuntimeRequirement,
        reported: &str,
    ) -> Result<(), String> {
        let Some(minimum) = &requirement.minimum_version else {
            return Ok(());
        };

        match Version::extract(reported) {
            Some(found) if &found >= minimum => Ok(()),
            Some(found) => Err(format!("version {found} is older than required {minimum}")),
            None => Err(format!("could not read a version from '{reported}'")),
        }
    }
}
