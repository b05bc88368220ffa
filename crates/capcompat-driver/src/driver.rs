//! The [`Driver`]: one implementation under test, bound to its directory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::DriverConfig;
use crate::error::Result;
use crate::lifecycle::Stoppable;

/// Drives one implementation through its process contract.
///
/// Owns the services it started; dropping the driver cancels any that
/// are still running.
pub struct Driver {
    name: String,
    pub(crate) cwd: PathBuf,
    pub(crate) config: DriverConfig,
    pub(crate) http: reqwest::Client,
    services: Mutex<HashMap<String, Box<dyn Stoppable>>>,
}

impl Driver {
    /// Load `runner.config.json` from `base_path` and bind a driver to it.
    pub fn load(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        let config = DriverConfig::load(base_path)?;
        Self::new(base_path, config)
    }

    /// Bind a driver to `cwd`.
    ///
    /// The control client never goes through a proxy; services listen on
    /// loopback.
    pub fn new(cwd: impl Into<PathBuf>, config: DriverConfig) -> Result<Self> {
        let cwd = cwd.into();
        let name = cwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| cwd.display().to_string());

        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            name,
            cwd,
            config,
            http,
            services: Mutex::new(HashMap::new()),
        })
    }

    /// Implementation label, the name of its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Ids of services started by this driver and not yet stopped.
    pub fn running_services(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn services(&self) -> MutexGuard<'_, HashMap<String, Box<dyn Stoppable>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("cwd", &self.cwd)
            .field("config", &self.config)
            .field("services", &self.running_services())
            .finish()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        let services = self
            .services
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !services.is_empty() {
            tracing::warn!(
                implementation = %self.name,
                count = services.len(),
                "canceling services that were never stopped"
            );
        }
        // Each handle cancels its process when dropped.
        services.clear();
    }
}
