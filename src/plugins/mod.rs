//! Data-source plugins
//!
//! Every adapter implements the [`Plugin`] capability contract. Adapters
//! that do not support manual entry keep the default "unsupported" answers
//! so callers can gate once on [`Plugin::supports_manual_entry`] and skip
//! the rest of the family.

pub mod brokerage;
pub mod cash;
pub mod crypto;
pub mod equity;
pub mod manager;
pub mod misc;
pub mod real_estate;
pub mod registry;
pub mod stocks;

use crate::accounts::AccountKey;
use crate::db::models::AssetRecord;
use crate::db::{Database, NewRecord};
use crate::error::{AppError, Result};
use crate::pricing::quotes::{fetch_price_or_zero, QuoteSource};
use crate::pricing::{self, PriceStatus};
use crate::schema::{record_to_json, CanonicalRecord, ManualEntrySchema, Payload};
use crate::validation::ValidationResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// How a plugin obtains its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Manual,
    Api,
    Scraping,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Manual => "manual",
            PluginKind::Api => "api",
            PluginKind::Scraping => "scraping",
        }
    }
}

/// Immutable plugin identity
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub description: String,
    pub kind: PluginKind,
    pub data_source: String,
}

/// Mutable per-plugin configuration, owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub enabled: bool,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            settings: serde_json::Map::new(),
        }
    }
}

impl PluginConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            settings: serde_json::Map::new(),
        }
    }
}

/// Health status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Active,
    Inactive,
    Error,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Active => "active",
            HealthStatus::Inactive => "inactive",
            HealthStatus::Error => "error",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Point-in-time request metrics
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Computed on demand, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct PluginHealth {
    pub status: HealthStatus,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub metrics: HealthMetrics,
}

/// Shared atomic counters every plugin embeds
#[derive(Debug, Default)]
pub struct PluginMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    last_update: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

impl PluginMetrics {
    pub fn record_success(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some(Utc::now());
    }

    pub fn record_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthMetrics {
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let success_rate = if requests == 0 {
            1.0
        } else {
            (requests - errors) as f64 / requests as f64
        };
        HealthMetrics {
            request_count: requests,
            error_count: errors,
            success_rate,
            last_update: *self.last_update.read(),
        }
    }
}

/// One item of a bulk partial-field update
#[derive(Debug, Clone)]
pub struct BulkUpdateItem {
    pub id: i64,
    pub changes: Payload,
}

/// Per-item failure detail, keyed by record id
#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateFailure {
    pub id: i64,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Aggregate outcome of a bulk update; a success shape even when some
/// items failed
#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BulkUpdateFailure>,
}

/// Per-account balance snapshot served (and cached) by the manager
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub account_id: i64,
    pub institution: String,
    pub name: String,
    pub total_value: f64,
    pub record_count: usize,
}

/// Optional bulk-edit capability, surfaced through
/// [`Plugin::as_bulk_updater`] instead of downcasting
#[async_trait]
pub trait BulkUpdater: Send + Sync {
    async fn bulk_update_manual_entry(
        &self,
        items: Vec<BulkUpdateItem>,
    ) -> Result<BulkUpdateResult>;
}

/// The capability contract every data-source adapter satisfies
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn kind(&self) -> PluginKind;
    fn data_source(&self) -> &'static str;

    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
            kind: self.kind(),
            data_source: self.data_source().to_string(),
        }
    }

    /// Idempotent setup. Must fail loudly when the default backing account
    /// cannot be created, since every later write depends on it.
    async fn initialize(&self, config: &PluginConfig) -> Result<()>;

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Cheap and synchronous; never blocks on network I/O
    fn is_healthy(&self) -> bool;

    fn health(&self) -> PluginHealth;

    fn supports_manual_entry(&self) -> bool {
        false
    }

    fn manual_entry_schema(&self) -> Result<ManualEntrySchema> {
        Err(self.unsupported("manual entry schema"))
    }

    /// Schema as a function of an optional category. Only the misc plugin
    /// overrides this; everyone else has a static schema.
    fn manual_entry_schema_for_category(&self, _category_id: i64) -> Result<ManualEntrySchema> {
        self.manual_entry_schema()
    }

    /// Deterministic and side-effect-free; safe to call repeatedly
    fn validate_manual_entry(&self, _payload: &Payload) -> Result<ValidationResult> {
        Err(self.unsupported("manual entry validation"))
    }

    async fn process_manual_entry(&self, _payload: Payload) -> Result<i64> {
        Err(self.unsupported("manual entry"))
    }

    async fn update_manual_entry(&self, _id: i64, _payload: Payload) -> Result<()> {
        Err(self.unsupported("manual entry update"))
    }

    /// Refresh cached prices/valuations for this plugin's records
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Staleness of this plugin's cached prices. `None` for plugins that
    /// carry no quoted records.
    fn price_status(&self) -> Result<Option<PriceStatus>> {
        Ok(None)
    }

    /// Balance snapshot per logical account, for aggregation
    async fn accounts(&self) -> Result<Vec<AccountSnapshot>> {
        Ok(Vec::new())
    }

    fn as_bulk_updater(&self) -> Option<&dyn BulkUpdater> {
        None
    }

    fn unsupported(&self, what: &str) -> AppError {
        AppError::Unsupported(format!(
            "plugin '{}' does not support {}",
            self.name(),
            what
        ))
    }
}

// ========== Shared write-path helpers ==========

/// Resolve the target account and insert a validated record, fetching the
/// current quote tolerantly when the plugin tracks a symbol.
pub(crate) async fn write_entry(
    db: &Database,
    quotes: &dyn QuoteSource,
    plugin: &str,
    key: &AccountKey,
    account_kind: &str,
    data_source: &str,
    record: &CanonicalRecord,
    quote_symbol: Option<&str>,
) -> Result<i64> {
    let account_id = crate::accounts::resolve(db, plugin, key, account_kind, data_source)?;

    let last_price = match quote_symbol {
        Some(symbol) => fetch_price_or_zero(quotes, symbol).await,
        None => 0.0,
    };

    let data = record_to_json(record);
    let id = db.insert_record(&NewRecord {
        plugin,
        account_id,
        data: &data,
        quote_symbol,
        last_price,
    })?;

    tracing::info!(plugin, account_id, record_id = id, "stored manual entry");
    Ok(id)
}

/// Overwrite an existing record's data after validation, re-quoting when
/// the plugin tracks a symbol so a symbol edit retargets future refreshes
pub(crate) async fn rewrite_entry(
    db: &Database,
    quotes: &dyn QuoteSource,
    plugin: &str,
    id: i64,
    record: &CanonicalRecord,
    quote_symbol: Option<&str>,
) -> Result<()> {
    let last_price = match quote_symbol {
        Some(symbol) => Some(fetch_price_or_zero(quotes, symbol).await),
        None => None,
    };

    let data = record_to_json(record);
    let affected = db.update_record(plugin, id, &data, quote_symbol, last_price)?;
    if affected == 0 {
        return Err(AppError::NotFound(format!(
            "record {} for plugin '{}'",
            id, plugin
        )));
    }
    Ok(())
}

/// Group a plugin's records into per-account balance snapshots
pub(crate) fn snapshot_accounts(
    db: &Database,
    plugin: &str,
    value_of: impl Fn(&AssetRecord) -> f64,
) -> Result<Vec<AccountSnapshot>> {
    let accounts = db.list_accounts(plugin)?;
    let records = db.list_records(plugin)?;

    let snapshots = accounts
        .into_iter()
        .map(|account| {
            let owned: Vec<&AssetRecord> = records
                .iter()
                .filter(|r| r.account_id == account.id)
                .collect();
            AccountSnapshot {
                account_id: account.id,
                institution: account.institution,
                name: account.name,
                total_value: owned.iter().map(|r| value_of(r)).sum(),
                record_count: owned.len(),
            }
        })
        .collect();

    Ok(snapshots)
}

/// Refresh cached prices for every record carrying a quote symbol.
///
/// Individual quote failures are tolerated; the refresh fails only when
/// nothing could be updated at all.
pub(crate) async fn refresh_prices(
    db: &Database,
    quotes: &dyn QuoteSource,
    plugin: &str,
) -> Result<()> {
    let records = db.list_records(plugin)?;
    let symboled: Vec<&AssetRecord> = records
        .iter()
        .filter(|r| r.quote_symbol.is_some())
        .collect();

    if symboled.is_empty() {
        return Ok(());
    }

    let mut updated = 0usize;
    let mut failed = 0usize;
    for record in &symboled {
        let symbol = record.quote_symbol.as_deref().unwrap_or_default();
        match quotes.latest_price(symbol).await {
            Ok(price) => {
                db.update_record_price(record.id, price)?;
                updated += 1;
            }
            Err(e) => {
                tracing::warn!(plugin, symbol, error = %e, "quote refresh failed");
                failed += 1;
            }
        }
    }

    if updated == 0 && failed > 0 {
        return Err(AppError::Plugin(format!(
            "refresh failed for all {} symbols of plugin '{}'",
            failed, plugin
        )));
    }

    tracing::info!(plugin, updated, failed, "price refresh complete");
    Ok(())
}

/// Configured refresh cadence the staleness annotations compare against
pub(crate) const PRICE_REFRESH_INTERVAL: chrono::Duration = chrono::Duration::minutes(15);

/// Staleness of the cached prices across a plugin's quoted records.
///
/// Timestamps come back in two shapes (RFC 3339 from inserts, SQLite
/// `datetime('now')` from updates); anything unparseable counts as "never
/// priced" and drives the aggregate toward a forced refresh.
pub(crate) fn price_status_for(
    db: &Database,
    plugin: &str,
    refresh_interval: chrono::Duration,
) -> Result<Option<PriceStatus>> {
    let records = db.list_records(plugin)?;
    let timestamps: Vec<Option<DateTime<Utc>>> = records
        .iter()
        .filter(|r| r.quote_symbol.is_some())
        .map(|r| r.price_updated_at.as_deref().and_then(parse_stored_timestamp))
        .collect();

    if timestamps.is_empty() {
        return Ok(None);
    }

    let now = Utc::now();
    Ok(Some(pricing::price_status(
        &timestamps,
        refresh_interval,
        pricing::is_market_open(now),
        now,
    )))
}

fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Default-account bootstrap shared by the manual plugins; the loud-failure
/// requirement of `initialize` rides on the `?`.
pub(crate) fn ensure_default_account(
    db: &Database,
    plugin: &str,
    kind: &str,
    data_source: &str,
) -> Result<i64> {
    crate::accounts::resolve(
        db,
        plugin,
        &AccountKey::new("Default", &format!("{} (default)", plugin)),
        kind,
        data_source,
    )
}

/// Health synthesis shared by the concrete plugins
pub(crate) fn health_from(
    initialized: &AtomicBool,
    metrics: &PluginMetrics,
    message: Option<String>,
) -> PluginHealth {
    let snapshot = metrics.snapshot();
    let status = if !initialized.load(Ordering::Relaxed) {
        HealthStatus::Inactive
    } else if snapshot.request_count > 0 && snapshot.success_rate < 0.5 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Active
    };

    PluginHealth {
        status,
        last_checked: Utc::now(),
        message,
        metrics: snapshot,
    }
}

/// Shared state embedded by every concrete plugin
pub(crate) struct PluginCore {
    pub db: Arc<Database>,
    pub quotes: Arc<dyn QuoteSource>,
    pub metrics: PluginMetrics,
    pub initialized: AtomicBool,
    pub default_account: parking_lot::RwLock<Option<i64>>,
}

impl PluginCore {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            db,
            quotes,
            metrics: PluginMetrics::default(),
            initialized: AtomicBool::new(false),
            default_account: parking_lot::RwLock::new(None),
        }
    }

    /// Standard initialize body: create the default account or fail loudly
    pub fn initialize(&self, plugin: &str, kind: &str, data_source: &str) -> Result<()> {
        let id = ensure_default_account(&self.db, plugin, kind, data_source).map_err(|e| {
            AppError::Plugin(format!(
                "plugin '{}' failed to create its default account: {}",
                plugin, e
            ))
        })?;
        *self.default_account.write() = Some(id);
        self.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn disconnect(&self) {
        self.initialized.store(false, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.initialized.load(Ordering::Relaxed) && self.default_account.read().is_some()
    }

    pub fn health(&self) -> PluginHealth {
        health_from(&self.initialized, &self.metrics, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_success_rate() {
        let metrics = PluginMetrics::default();
        assert_eq!(metrics.snapshot().success_rate, 1.0);

        metrics.record_success();
        metrics.record_success();
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 1);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(snapshot.last_update.is_some());
    }

    #[test]
    fn test_stored_timestamp_both_shapes_parse() {
        assert!(parse_stored_timestamp("2024-06-12T14:30:00+00:00").is_some());
        assert!(parse_stored_timestamp("2024-06-12 14:30:00").is_some());
        assert!(parse_stored_timestamp("noon-ish").is_none());
    }

    #[test]
    fn test_health_states() {
        let initialized = AtomicBool::new(false);
        let metrics = PluginMetrics::default();
        assert_eq!(
            health_from(&initialized, &metrics, None).status,
            HealthStatus::Inactive
        );

        initialized.store(true, Ordering::Relaxed);
        assert_eq!(
            health_from(&initialized, &metrics, None).status,
            HealthStatus::Active
        );

        metrics.record_error();
        metrics.record_error();
        metrics.record_error();
        metrics.record_success();
        assert_eq!(
            health_from(&initialized, &metrics, None).status,
            HealthStatus::Unhealthy
        );
    }
}
