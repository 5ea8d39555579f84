//! Plugin registry
//!
//! Concurrency-safe catalog of plugin instances and their configuration.
//! Reads share a lock; mutations are serialized. Plugin code (initialize,
//! disconnect) always runs with the lock released, so a slow plugin stalls
//! only the single mutation that touches it.

use super::{Plugin, PluginConfig, PluginKind};
use crate::error::{AppError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// One row of the registry listing, with a single synthesized status
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub kind: PluginKind,
    pub data_source: String,
    pub enabled: bool,
    /// `"disabled"` when the config says so, otherwise the plugin's own
    /// health status string
    pub status: String,
}

#[derive(Default)]
struct RegistryInner {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    configs: HashMap<String, PluginConfig>,
}

/// Catalog of registered plugins plus their enabled/disabled configuration
#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name with a default (disabled)
    /// configuration. Fails if the name is already taken.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let mut inner = self.inner.write();

        if inner.plugins.contains_key(&name) {
            return Err(AppError::Plugin(format!(
                "plugin '{}' is already registered",
                name
            )));
        }

        info!(plugin = %name, "registered plugin");
        inner.configs.insert(name.clone(), PluginConfig::default());
        inner.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.inner
            .read()
            .plugins
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("plugin '{}'", name)))
    }

    pub fn config(&self, name: &str) -> Result<PluginConfig> {
        self.inner
            .read()
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("plugin '{}'", name)))
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.inner
            .read()
            .configs
            .get(name)
            .map(|c| c.enabled)
            .unwrap_or(false)
    }

    /// Apply a new configuration. The plugin is initialized with the
    /// candidate config first; on failure the old configuration stays in
    /// effect.
    pub async fn configure(&self, name: &str, config: PluginConfig) -> Result<()> {
        let plugin = self.get(name)?;

        // Lock released here: initialize may hit storage.
        plugin.initialize(&config).await?;

        let mut inner = self.inner.write();
        info!(plugin = name, enabled = config.enabled, "configured plugin");
        inner.configs.insert(name.to_string(), config);
        Ok(())
    }

    /// Enable a plugin, initializing it with its current settings
    pub async fn enable(&self, name: &str) -> Result<()> {
        let plugin = self.get(name)?;
        let mut config = self.config(name)?;
        config.enabled = true;

        plugin.initialize(&config).await?;

        let mut inner = self.inner.write();
        inner.configs.insert(name.to_string(), config);
        info!(plugin = name, "enabled plugin");
        Ok(())
    }

    /// Disable a plugin. A failed disconnect leaves the flag enabled so
    /// the registry never claims "enabled but disconnected".
    pub async fn disable(&self, name: &str) -> Result<()> {
        let plugin = self.get(name)?;

        plugin.disconnect().await?;

        let mut inner = self.inner.write();
        if let Some(config) = inner.configs.get_mut(name) {
            config.enabled = false;
        }
        info!(plugin = name, "disabled plugin");
        Ok(())
    }

    /// All registered plugins with one unambiguous status string each
    pub fn list(&self) -> Vec<PluginSummary> {
        let entries: Vec<(Arc<dyn Plugin>, PluginConfig)> = {
            let inner = self.inner.read();
            inner
                .plugins
                .values()
                .map(|p| {
                    let config = inner
                        .configs
                        .get(p.name())
                        .cloned()
                        .unwrap_or_default();
                    (Arc::clone(p), config)
                })
                .collect()
        };

        let mut summaries: Vec<PluginSummary> = entries
            .into_iter()
            .map(|(plugin, config)| {
                let status = if !config.enabled {
                    "disabled".to_string()
                } else {
                    plugin.health().status.as_str().to_string()
                };
                PluginSummary {
                    name: plugin.name().to_string(),
                    display_name: plugin.display_name().to_string(),
                    version: plugin.version().to_string(),
                    kind: plugin.kind(),
                    data_source: plugin.data_source().to_string(),
                    enabled: config.enabled,
                    status,
                }
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Enabled plugins only, for dispatch and refresh
    pub fn active_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let inner = self.inner.read();
        inner
            .plugins
            .values()
            .filter(|p| {
                inner
                    .configs
                    .get(p.name())
                    .map(|c| c.enabled)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// All registered plugins regardless of enablement
    pub fn all_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.inner.read().plugins.values().cloned().collect()
    }
}
