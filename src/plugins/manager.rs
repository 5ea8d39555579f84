//! Plugin manager façade
//!
//! The rest of the system talks to plugins through this type: manual-entry
//! dispatch, schema and health aggregation, refresh fan-out, and a
//! per-plugin TTL cache of account balances. The cache has its own lock so
//! a slow fetch never holds up registry reads.

use super::registry::PluginRegistry;
use super::{
    AccountSnapshot, BulkUpdateItem, BulkUpdateResult, Plugin, PluginHealth,
};
use crate::error::{AppError, Result};
use crate::schema::{ManualEntrySchema, Payload};
use crate::validation::ValidationResult;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Default memoization window for fetched balances
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
struct CachedAccounts {
    fetched_at: Instant,
    accounts: Vec<AccountSnapshot>,
}

/// Outcome of a refresh fan-out: per-plugin errors instead of fail-fast
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub errors: HashMap<String, String>,
}

/// Façade over the registry for dispatch and aggregation
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    cache: DashMap<String, CachedAccounts>,
    cache_ttl: Duration,
}

impl PluginManager {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self::with_cache_ttl(registry, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(registry: Arc<PluginRegistry>, cache_ttl: Duration) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            cache_ttl,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Look up a plugin and require it to be enabled for write dispatch
    fn enabled_plugin(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let plugin = self.registry.get(name)?;
        if !self.registry.is_enabled(name) {
            return Err(AppError::Plugin(format!("plugin '{}' is disabled", name)));
        }
        Ok(plugin)
    }

    /// Validate without writing; works for disabled plugins too
    pub fn validate_manual_entry(&self, name: &str, payload: &Payload) -> Result<ValidationResult> {
        let plugin = self.registry.get(name)?;
        plugin.validate_manual_entry(payload)
    }

    /// Dispatch a manual-entry submission; the plugin's own validation
    /// errors surface unmodified
    pub async fn process_manual_entry(&self, name: &str, payload: Payload) -> Result<i64> {
        let plugin = self.enabled_plugin(name)?;
        let id = plugin.process_manual_entry(payload).await?;
        self.invalidate_cache(name);
        Ok(id)
    }

    pub async fn update_manual_entry(&self, name: &str, id: i64, payload: Payload) -> Result<()> {
        let plugin = self.enabled_plugin(name)?;
        plugin.update_manual_entry(id, payload).await?;
        self.invalidate_cache(name);
        Ok(())
    }

    /// Bulk update through the plugin's optional secondary capability
    pub async fn bulk_update(
        &self,
        name: &str,
        items: Vec<BulkUpdateItem>,
    ) -> Result<BulkUpdateResult> {
        let plugin = self.enabled_plugin(name)?;
        let updater = plugin
            .as_bulk_updater()
            .ok_or_else(|| plugin.unsupported("bulk updates"))?;
        let result = updater.bulk_update_manual_entry(items).await?;
        self.invalidate_cache(name);
        Ok(result)
    }

    /// Manual-entry schemas of every capable plugin, keyed by name
    pub fn manual_entry_schemas(&self) -> HashMap<String, ManualEntrySchema> {
        let mut schemas = HashMap::new();
        for plugin in self.registry.all_plugins() {
            if !plugin.supports_manual_entry() {
                continue;
            }
            match plugin.manual_entry_schema() {
                Ok(schema) => {
                    schemas.insert(plugin.name().to_string(), schema);
                }
                Err(e) => {
                    error!(plugin = plugin.name(), error = %e, "schema aggregation failed");
                }
            }
        }
        schemas
    }

    pub fn manual_entry_schema(&self, name: &str) -> Result<ManualEntrySchema> {
        self.registry.get(name)?.manual_entry_schema()
    }

    /// Category-extended schema; only the misc plugin varies by category
    pub fn manual_entry_schema_for_category(
        &self,
        name: &str,
        category_id: i64,
    ) -> Result<ManualEntrySchema> {
        self.registry
            .get(name)?
            .manual_entry_schema_for_category(category_id)
    }

    /// Price staleness per enabled plugin, omitting plugins with no
    /// quoted records
    pub fn price_statuses(&self) -> HashMap<String, crate::pricing::PriceStatus> {
        let mut statuses = HashMap::new();
        for plugin in self.registry.active_plugins() {
            match plugin.price_status() {
                Ok(Some(status)) => {
                    statuses.insert(plugin.name().to_string(), status);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(plugin = plugin.name(), error = %e, "price status failed");
                }
            }
        }
        statuses
    }

    /// Health of every registered plugin, keyed by name
    pub fn plugin_health(&self) -> HashMap<String, PluginHealth> {
        self.registry
            .all_plugins()
            .into_iter()
            .map(|p| (p.name().to_string(), p.health()))
            .collect()
    }

    /// Refresh every enabled plugin, collecting per-plugin errors so one
    /// broken source does not block the others
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        for plugin in self.registry.active_plugins() {
            let name = plugin.name().to_string();
            match plugin.refresh().await {
                Ok(()) => {
                    self.invalidate_cache(&name);
                    report.refreshed.push(name);
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "refresh failed");
                    report.errors.insert(name, e.to_string());
                }
            }
        }

        info!(
            refreshed = report.refreshed.len(),
            failed = report.errors.len(),
            "refresh fan-out complete"
        );
        report
    }

    /// Account balances for one plugin, memoized for the cache TTL. A
    /// cache hit counts as a fresh fetch for aggregation purposes.
    pub async fn cached_accounts(&self, name: &str) -> Result<Vec<AccountSnapshot>> {
        if let Some(entry) = self.cache.get(name) {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                debug!(plugin = name, "account cache hit");
                return Ok(entry.accounts.clone());
            }
        }

        let plugin = self.enabled_plugin(name)?;
        let accounts = plugin.accounts().await?;
        self.cache.insert(
            name.to_string(),
            CachedAccounts {
                fetched_at: Instant::now(),
                accounts: accounts.clone(),
            },
        );
        Ok(accounts)
    }

    /// Balances across all enabled plugins, keyed by plugin name
    pub async fn all_balances(&self) -> Result<HashMap<String, Vec<AccountSnapshot>>> {
        let mut balances = HashMap::new();
        for plugin in self.registry.active_plugins() {
            let name = plugin.name().to_string();
            let accounts = self.cached_accounts(&name).await?;
            balances.insert(name, accounts);
        }
        Ok(balances)
    }

    pub fn invalidate_cache(&self, name: &str) {
        self.cache.remove(name);
    }
}
