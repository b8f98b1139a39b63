/*!
 * Broker Configuration
 *
 * Environment variables:
 * - BROKER_INTERPRETER: interpreter executable (default: sclang)
 * - BROKER_INTERPRETER_ARGS: extra arguments, whitespace separated
 * - BROKER_SCRATCH_DIR: directory for scratch files (default: OS temp dir)
 * - BROKER_SCRATCH_EXT: scratch file extension (default: scd)
 * - BROKER_TIMEOUT_MS: default worker timeout
 * - BROKER_BATCH_TIMEOUT_MS: shared batch timeout
 * - BROKER_KILL_GRACE_MS: shutdown grace period per worker
 */

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::limits::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for workers and shutdown
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BrokerConfig {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub scratch_dir: PathBuf,
    pub scratch_extension: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "default_timeout_ms")]
    pub default_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "batch_timeout_ms")]
    pub batch_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "kill_grace_ms")]
    pub kill_grace: Duration,
}

impl BrokerConfig {
    pub fn new() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interpreter_args: Vec::new(),
            scratch_dir: std::env::temp_dir(),
            scratch_extension: DEFAULT_SCRATCH_EXTENSION.to_string(),
            default_timeout: DEFAULT_EXEC_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(interpreter) = lookup("BROKER_INTERPRETER").filter(|v| !v.trim().is_empty()) {
            config.interpreter = interpreter;
        }
        if let Some(args) = lookup("BROKER_INTERPRETER_ARGS") {
            config.interpreter_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(dir) = lookup("BROKER_SCRATCH_DIR").filter(|v| !v.is_empty()) {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(ext) = lookup("BROKER_SCRATCH_EXT") {
            let ext = ext.trim_start_matches('.');
            if ext.is_empty() || ext.contains(std::path::is_separator) {
                return Err(ConfigError::InvalidValue {
                    key: "BROKER_SCRATCH_EXT",
                    value: ext.to_string(),
                });
            }
            config.scratch_extension = ext.to_string();
        }
        if let Some(timeout) = millis(&lookup, "BROKER_TIMEOUT_MS")? {
            config.default_timeout = timeout;
        }
        if let Some(timeout) = millis(&lookup, "BROKER_BATCH_TIMEOUT_MS")? {
            config.batch_timeout = timeout;
        }
        if let Some(grace) = millis(&lookup, "BROKER_KILL_GRACE_MS")? {
            config.kill_grace = grace;
        }

        Ok(config)
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    #[must_use]
    pub fn with_interpreter_args(mut self, args: Vec<String>) -> Self {
        self.interpreter_args = args;
        self
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_scratch_extension(mut self, ext: impl Into<String>) -> Self {
        self.scratch_extension = ext.into();
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn millis<F>(lookup: &F, key: &'static str) -> ConfigResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}
