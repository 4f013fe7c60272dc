// src/command_executor.rs
//! Whitelisted shell command execution with timeout enforcement
//!
//! Command lines run through `/bin/sh -c` with a cleared environment and a
//! fixed PATH. Only command lines whose leading program is on the allow-list
//! are started. The rest of the line is interpreted by the shell, so callers
//! must quote or validate anything interpolated from rule arguments.

use crate::error::{Error, EACCES, EINVAL, EIO, ENOENT};
use std::collections::HashSet;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const SHELL: &str = "/bin/sh";
const SAFE_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Executes command lines with security controls and timeout enforcement
#[derive(Debug, Clone)]
pub struct SystemCommandExecutor {
    default_timeout: Duration,
    allowed_commands: HashSet<String>,
}

impl SystemCommandExecutor {
    /// Create executor with empty whitelist - must be configured before use
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create executor with custom timeout and empty whitelist
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: timeout,
            allowed_commands: HashSet::new(),
        }
    }

    pub fn allow_command(&mut self, command: impl Into<String>) {
        self.allowed_commands.insert(command.into());
    }

    pub fn allow_commands(&mut self, commands: &[&str]) {
        for cmd in commands {
            self.allowed_commands.insert(cmd.to_string());
        }
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.contains(command)
    }

    pub fn timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Leading program of a command line
    pub fn program_of(command_line: &str) -> Option<&str> {
        command_line.split_whitespace().next()
    }

    /// Run `command_line` through the shell and capture its output
    pub fn execute(
        &self,
        command_line: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        let program = Self::program_of(command_line).ok_or_else(|| CommandError::SecurityViolation {
            reason: "Empty command line".to_string(),
        })?;

        if !self.is_allowed(program) {
            return Err(CommandError::SecurityViolation {
                reason: format!("Command '{}' not in whitelist", program),
            });
        }

        let timeout_duration = timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();
        log::debug!("Executing '{}'", command_line);

        let mut child = Command::new(SHELL)
            .arg("-c")
            .arg(command_line)
            .env_clear()
            .env("PATH", SAFE_PATH)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CommandError::ProgramNotFound {
                    program: SHELL.to_string(),
                },
                std::io::ErrorKind::PermissionDenied => CommandError::PermissionDenied {
                    program: SHELL.to_string(),
                },
                _ => CommandError::ExecutionFailed {
                    program: program.to_string(),
                    reason: e.to_string(),
                },
            })?;

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe
        let stdout_reader = child.stdout.take().map(|mut out| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                buf
            })
        });

        let waited =
            wait_timeout::ChildExt::wait_timeout(&mut child, timeout_duration).map_err(|e| {
                CommandError::ExecutionFailed {
                    program: program.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = match waited {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout_ms: timeout_duration.as_millis() as u64,
                });
            }
        };

        let collect = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
            handle
                .and_then(|h| h.join().ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                .unwrap_or_default()
        };

        let output = CommandOutput {
            stdout: collect(stdout_reader),
            stderr: collect(stderr_reader),
            exit_code: status.code().unwrap_or(-1),
            duration: start.elapsed(),
        };
        log::debug!(
            "'{}' exited with {} after {:?}",
            program,
            output.exit_code,
            output.duration
        );
        Ok(output)
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Command execution output
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("Execution failed for '{program}': {reason}")]
    ExecutionFailed { program: String, reason: String },

    #[error("Command '{command}' failed with exit code {exit_code}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Command '{program}' timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("Permission denied: {program}")]
    PermissionDenied { program: String },

    #[error("Security violation: {reason}")]
    SecurityViolation { reason: String },
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        let code = match &e {
            CommandError::ProgramNotFound { .. } => ENOENT,
            CommandError::PermissionDenied { .. } => EACCES,
            CommandError::SecurityViolation { .. } => EINVAL,
            CommandError::ExecutionFailed { .. }
            | CommandError::NonZeroExit { .. }
            | CommandError::Timeout { .. } => EIO,
        };
        Error::new(e.to_string(), code)
    }
}
