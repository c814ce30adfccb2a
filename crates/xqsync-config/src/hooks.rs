//! Pluggable configuration hooks
//!
//! A run can install extra validation and cleanup by naming a hooks
//! implementation in `CONFIGURATION_HOOKS`. Names resolve through a
//! [`HooksRegistry`] of factories.

use crate::{keys, Configuration};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use xqsync_types::{Error, Result};

/// Name of the no-op hooks
pub const DEFAULT_HOOKS: &str = "default";
/// Name of the hooks that refuse self-targeting runs
pub const STRICT_HOOKS: &str = "strict";

/// Lifecycle hooks around [`Configuration`]
pub trait ConfigurationHooks: Send + Sync {
    /// Extra validation, run after the built-in checks
    fn validate(&self, _config: &Configuration) -> Result<()> {
        Ok(())
    }

    /// Called once when the configuration is closed
    fn on_close(&self, _config: &Configuration) {}
}

/// Builds a hooks instance
pub type HooksFactory = Arc<dyn Fn() -> Result<Arc<dyn ConfigurationHooks>> + Send + Sync>;

/// Hooks that add nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl ConfigurationHooks for DefaultHooks {}

/// Hooks that reject a run whose input and output are the same place
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictHooks;

impl ConfigurationHooks for StrictHooks {
    fn validate(&self, config: &Configuration) -> Result<()> {
        if let (Some(input), Some(output)) = (config.input_path(), config.output_path()) {
            if Path::new(input.trim_end_matches('/')) == Path::new(output.trim_end_matches('/')) {
                return Err(Error::config(format!(
                    "{} and {} name the same path '{}'",
                    keys::INPUT_PATH,
                    keys::OUTPUT_PATH,
                    input
                )));
            }
        }
        if let (Some(input), Some(output)) = (
            config.input_connection_string(),
            config.output_connection_string(),
        ) {
            if input.trim() == output.trim() {
                return Err(Error::config(format!(
                    "{} and {} name the same endpoint",
                    keys::INPUT_CONNECTION_STRING,
                    keys::OUTPUT_CONNECTION_STRING
                )));
            }
        }
        Ok(())
    }
}

/// Maps hooks names to factories
#[derive(Clone)]
pub struct HooksRegistry {
    factories: BTreeMap<String, HooksFactory>,
}

impl HooksRegistry {
    /// Registry with no entries
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ConfigurationHooks>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder-style [`HooksRegistry::register`]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ConfigurationHooks>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the hooks registered under `name`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ConfigurationHooks>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::HooksUnavailable {
                name: name.to_string(),
                message: format!("not registered (known: {})", self.names().join(", ")),
            })?;
        factory().map_err(|e| Error::HooksUnavailable {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for HooksRegistry {
    fn default() -> Self {
        Self::empty()
            .with(DEFAULT_HOOKS, || Ok(Arc::new(DefaultHooks) as Arc<dyn ConfigurationHooks>))
            .with(STRICT_HOOKS, || Ok(Arc::new(StrictHooks) as Arc<dyn ConfigurationHooks>))
    }
}

impl std::fmt::Debug for HooksRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HooksRegistry")
            .field("names", &self.names())
            .finish()
    }
}
