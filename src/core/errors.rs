/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Worker execution errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Interpreter executable not found: {program}")]
    #[diagnostic(
        code(process::executable_not_found),
        help("Install the interpreter or point BROKER_INTERPRETER at its full path.")
    )]
    ExecutableNotFound { program: String },

    #[error("Worker timed out after {}ms", .timeout.as_millis())]
    #[diagnostic(
        code(process::timeout),
        help("The worker was terminated. Raise the timeout or split the script.")
    )]
    Timeout { timeout: Duration },

    #[error("Worker exited with code {code}")]
    #[diagnostic(
        code(process::nonzero_exit),
        help("Inspect the captured stderr for the interpreter's diagnostics.")
    )]
    NonZeroExit { code: i32, stderr: String },

    #[error("Failed to spawn worker: {0}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("Check system resources, permissions and the interpreter arguments.")
    )]
    SpawnFailed(String),

    #[error("Worker terminated by host signal {signal}")]
    #[diagnostic(
        code(process::interrupted),
        help("The host received a termination signal while the worker was running.")
    )]
    Interrupted { signal: String },

    #[error("Source text is empty")]
    #[diagnostic(code(process::empty_source))]
    EmptySource,

    #[error("Scratch file error: {0}")]
    #[diagnostic(
        code(process::scratch_file),
        help("Check that the scratch directory exists and is writable.")
    )]
    ScratchFile(String),
}

impl ProcessError {
    /// Short stable name of the failure kind, for logs and batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => "executable_not_found",
            Self::Timeout { .. } => "timeout",
            Self::NonZeroExit { .. } => "nonzero_exit",
            Self::SpawnFailed(_) => "spawn_failed",
            Self::Interrupted { .. } => "interrupted",
            Self::EmptySource => "empty_source",
            Self::ScratchFile(_) => "scratch_file",
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(
        code(config::invalid_env),
        help("Durations are given in whole milliseconds.")
    )]
    InvalidValue { key: &'static str, value: String },

    #[error("Cannot read config file {path}: {reason}")]
    #[diagnostic(code(config::unreadable))]
    Unreadable { path: String, reason: String },

    #[error("Malformed config file {path}: {reason}")]
    #[diagnostic(code(config::malformed))]
    Malformed { path: String, reason: String },
}

/// Unified broker error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum BrokerError {
    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Config error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(broker::io))]
    Io(#[from] std::io::Error),
}

/// Result type for worker execution
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_duration() {
        let err = ProcessError::Timeout {
            timeout: Duration::from_millis(100),
        };
        assert_eq!(err.to_string(), "Worker timed out after 100ms");
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_error_serialization() {
        let err = ProcessError::NonZeroExit {
            code: 3,
            stderr: "boom".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("nonzero_exit"));

        let back: ProcessError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_not_found_has_help() {
        let err = ProcessError::ExecutableNotFound {
            program: "sclang".to_string(),
        };
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("BROKER_INTERPRETER"));
    }
}
