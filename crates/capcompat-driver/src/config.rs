//! Per-implementation configuration (`runner.config.json`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// File name looked up in every implementation directory.
pub const CONFIG_FILE: &str = "runner.config.json";

const DEFAULT_START_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// How a started service is stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopStrategy {
    /// `POST <url>/shutdown`, expecting `202 Accepted`.
    #[default]
    Http,
    /// Kill the backing process.
    Signal,
}

/// Configuration of one implementation under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Program prefix, e.g. `go run ./cmd` or `node cli.js`.
    pub command: String,

    #[serde(default)]
    pub stop: StopStrategy,

    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// After an accepted shutdown request, how long the process may keep
    /// running before it is killed.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_start_timeout() -> u64 {
    DEFAULT_START_TIMEOUT_SECS
}

fn default_shutdown_grace() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

impl DriverConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stop: StopStrategy::default(),
            start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }

    /// Read `runner.config.json` from an implementation directory.
    pub fn load(base_path: &Path) -> Result<Self> {
        let path = base_path.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| DriverError::Config {
            path: path.clone(),
            source: Box::new(e),
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| DriverError::Config {
            path: path.clone(),
            source: Box::new(e),
        })?;

        tracing::debug!(path = %path.display(), command = %config.command, "loaded implementation config");
        Ok(config)
    }

    pub fn with_stop(mut self, stop: StopStrategy) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_start_timeout(mut self, secs: u64) -> Self {
        self.start_timeout_secs = secs;
        self
    }

    pub fn with_shutdown_grace(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Full argument vector: the command prefix split on whitespace,
    /// followed by `args` verbatim.
    pub fn argv<I, S>(&self, args: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv: Vec<String> = self.command.split_whitespace().map(String::from).collect();
        if argv.is_empty() {
            return Err(DriverError::EmptyCommand);
        }
        argv.extend(args.into_iter().map(Into::into));
        Ok(argv)
    }
}
