//! One-shot command execution for version probes and package installers

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A program invocation with its arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Command line as an operator would type it
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("executable '{program}' not found")]
    NotFound { program: String },

    #[error("working directory '{}' does not exist", .dir.display())]
    MissingWorkingDir { dir: PathBuf },

    #[error("failed to run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs a command to completion and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// `CommandRunner` backed by real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.working_dir {
            if !dir.is_dir() {
                return Err(CommandError::MissingWorkingDir { dir: dir.clone() });
            }
            command.current_dir(dir);
        }

        debug!(command = %spec.command_line(), "Running command");

        let output = command.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CommandError::NotFound {
                program: spec.program.clone(),
            },
            _ => CommandError::Io {
                command: spec.command_line(),
                source: e,
            },
        })?;

        let output = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            command = %spec.command_line(),
            exit_code = ?output.exit_code,
            "Command finished"
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let spec = CommandSpec::new("pip").with_args(["install", "chromadb", "openai"]);
        assert_eq!(spec.command_line(), "pip install chromadb openai");
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let spec = CommandSpec::new("definitely-not-a-real-runtime-binary");
        let err = SystemCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_working_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::new("npm")
            .with_args(["install"])
            .with_working_dir(temp_dir.path().join("server"));

        let err = SystemCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::MissingWorkingDir { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let spec = CommandSpec::new("sh").with_args(["-c", "echo v1.2.3; echo oops >&2; exit 3"]);
        let output = SystemCommandRunner.run(&spec).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "v1.2.3");
        assert_eq!(output.stderr.trim(), "oops");
    }
}
