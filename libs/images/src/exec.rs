//! Host command execution.
//!
//! The resolver and container engine never spawn processes directly; they go
//! through [`CommandRunner`] so tests can script tool behavior.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stderr);
        }
        out.trim().to_string()
    }
}

/// Command execution errors.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program}: command not found")]
    NotFound { program: String },

    #[error("{program} exited with {}", failure_detail(.code, .output))]
    Failed {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn failure_detail(code: &Option<i32>, output: &str) -> String {
    let status = match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    };
    if output.is_empty() {
        status
    } else {
        format!("{status}: {output}")
    }
}

impl CommandError {
    /// Captured output of a command that ran and failed.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Runs host commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// A non-zero exit is an error carrying the combined output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;

    /// Resolve `program` on `PATH` without executing it.
    fn look_path(&self, program: &str) -> Option<PathBuf>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        debug!(program = %program, args = ?args, "Running command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    CommandError::NotFound {
                        program: program.to_string(),
                    }
                } else {
                    CommandError::Io {
                        program: program.to_string(),
                        source,
                    }
                }
            })?;

        let captured = CommandOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                output: captured.combined(),
            });
        }

        Ok(captured)
    }

    fn look_path(&self, program: &str) -> Option<PathBuf> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }

        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        assert_eq!(CommandOutput::new("out\n", "err\n").combined(), "out\nerr");
        assert_eq!(CommandOutput::new("", "err\n").combined(), "err");
        assert_eq!(CommandOutput::new("out", "").combined(), "out");
    }

    #[test]
    fn test_failed_error_message() {
        let err = CommandError::Failed {
            program: "docker".to_string(),
            code: Some(1),
            output: "manifest unknown".to_string(),
        };
        assert_eq!(err.to_string(), "docker exited with status 1: manifest unknown");
        assert_eq!(err.output(), Some("manifest unknown"));
    }

    #[test]
    fn test_failed_error_message_without_output() {
        let err = CommandError::Failed {
            program: "/bin/false".to_string(),
            code: Some(1),
            output: String::new(),
        };
        assert_eq!(err.to_string(), "/bin/false exited with status 1");

        let killed = CommandError::Failed {
            program: "docker".to_string(),
            code: None,
            output: String::new(),
        };
        assert_eq!(killed.to_string(), "docker exited with signal");
    }

    #[test]
    fn test_look_path_missing_program() {
        let runner = ProcessRunner::new();
        assert!(runner
            .look_path("kmirror-definitely-not-installed-tool")
            .is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_status() {
        let runner = ProcessRunner::new();

        let ok = runner.run("sh", &["-c", "echo hello"]).await.unwrap();
        assert_eq!(ok.stdout.trim(), "hello");

        let err = runner
            .run("sh", &["-c", "echo boom >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = ProcessRunner::new();
        let err = runner
            .run("kmirror-definitely-not-installed-tool", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }
}
