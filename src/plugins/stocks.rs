//! Stock holdings plugin
//!
//! Holdings are keyed by (institution, symbol); a current quote is fetched
//! tolerantly at write time and refreshed in batch later.

use super::{
    refresh_prices, snapshot_accounts, write_entry, AccountSnapshot, BulkUpdateItem,
    BulkUpdateResult, BulkUpdater, Plugin, PluginConfig, PluginCore, PluginHealth, PluginKind,
};
use crate::accounts::AccountKey;
use crate::bulk;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::pricing::quotes::QuoteSource;
use crate::schema::{CanonicalRecord, FieldSpec, FieldType, ManualEntrySchema, Payload};
use crate::validation::{self, rules, ValidationResult};
use async_trait::async_trait;
use std::sync::Arc;

pub struct StocksPlugin {
    core: PluginCore,
}

impl StocksPlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "stocks",
            vec![
                FieldSpec::new("institution", FieldType::Text, "Brokerage")
                    .required()
                    .max_length(100),
                FieldSpec::new("symbol", FieldType::Text, "Ticker Symbol")
                    .required()
                    .pattern("^[A-Z.]{1,10}$"),
                FieldSpec::new("quantity", FieldType::Number, "Shares")
                    .required()
                    .min(0.0),
                FieldSpec::new("cost_basis", FieldType::Number, "Cost Basis Per Share").min(0.0),
                FieldSpec::new("purchase_date", FieldType::Date, "Purchase Date"),
            ],
        )
    }

    fn account_key(record: &CanonicalRecord) -> Result<AccountKey> {
        let institution = record
            .get("institution")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing institution".into()))?;
        let symbol = record
            .get("symbol")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing symbol".into()))?;
        Ok(AccountKey::new(institution, symbol))
    }

    fn require_valid(&self, payload: &Payload) -> Result<CanonicalRecord> {
        let result = self.validate_manual_entry(payload)?;
        if !result.valid {
            self.core.metrics.record_error();
            return Err(AppError::validation(result.errors));
        }
        Ok(result.data)
    }
}

#[async_trait]
impl Plugin for StocksPlugin {
    fn name(&self) -> &'static str {
        "stocks"
    }
    fn display_name(&self) -> &'static str {
        "Stock Holdings"
    }
    fn version(&self) -> &'static str {
        "1.4.1"
    }
    fn description(&self) -> &'static str {
        "Individual stock and ETF positions with live quote refresh"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core
            .initialize(self.name(), "brokerage", self.data_source())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.disconnect();
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.core.is_healthy()
    }

    fn health(&self) -> PluginHealth {
        self.core.health()
    }

    fn supports_manual_entry(&self) -> bool {
        true
    }

    fn manual_entry_schema(&self) -> Result<ManualEntrySchema> {
        Ok(Self::schema())
    }

    fn validate_manual_entry(&self, payload: &Payload) -> Result<ValidationResult> {
        Ok(validation::validate(
            &Self::schema(),
            payload,
            &[rules::no_far_future_dates],
        ))
    }

    async fn process_manual_entry(&self, payload: Payload) -> Result<i64> {
        let record = self.require_valid(&payload)?;
        let key = Self::account_key(&record)?;
        let symbol = record
            .get("symbol")
            .and_then(|v| v.as_text())
            .map(|s| s.to_string());

        let outcome = write_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            &key,
            "brokerage",
            self.data_source(),
            &record,
            symbol.as_deref(),
        )
        .await;

        match outcome {
            Ok(id) => {
                self.core.metrics.record_success();
                Ok(id)
            }
            Err(e) => {
                self.core.metrics.record_error();
                Err(e)
            }
        }
    }

    async fn update_manual_entry(&self, id: i64, payload: Payload) -> Result<()> {
        let record = self.require_valid(&payload)?;
        let symbol = record
            .get("symbol")
            .and_then(|v| v.as_text())
            .map(|s| s.to_string());

        let outcome = super::rewrite_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            id,
            &record,
            symbol.as_deref(),
        )
        .await;

        match outcome {
            Ok(()) => {
                self.core.metrics.record_success();
                Ok(())
            }
            Err(e) => {
                self.core.metrics.record_error();
                Err(e)
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        refresh_prices(&self.core.db, self.core.quotes.as_ref(), self.name()).await
    }

    fn price_status(&self) -> Result<Option<crate::pricing::PriceStatus>> {
        super::price_status_for(&self.core.db, self.name(), super::PRICE_REFRESH_INTERVAL)
    }

    async fn accounts(&self) -> Result<Vec<AccountSnapshot>> {
        snapshot_accounts(&self.core.db, self.name(), |r| {
            let quantity = r.data.get("quantity").and_then(|v| v.as_f64()).unwrap_or(0.0);
            quantity * r.last_price
        })
    }

    fn as_bulk_updater(&self) -> Option<&dyn BulkUpdater> {
        Some(self)
    }
}

#[async_trait]
impl BulkUpdater for StocksPlugin {
    async fn bulk_update_manual_entry(
        &self,
        items: Vec<BulkUpdateItem>,
    ) -> Result<BulkUpdateResult> {
        let validate = |payload: &Payload| {
            validation::validate(&Self::schema(), payload, &[rules::no_far_future_dates])
        };
        bulk::execute(&self.core.db, self.name(), &validate, &items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::StaticQuoteSource;
    use crate::schema::payload_from_json;
    use serde_json::json;

    fn plugin_with_quotes(pairs: &[(&str, f64)]) -> StocksPlugin {
        StocksPlugin::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(StaticQuoteSource::with_prices(pairs)),
        )
    }

    fn payload(value: serde_json::Value) -> Payload {
        payload_from_json(value.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_quote_stored_at_write_time() {
        let stocks = plugin_with_quotes(&[("AAPL", 212.5)]);
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        let id = stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "AAPL",
                "quantity": 10,
            })))
            .await
            .unwrap();

        let record = stocks.core.db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.last_price, 212.5);
        assert!(record.price_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_quote_failure_stores_zero_price() {
        let stocks = plugin_with_quotes(&[]);
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        let id = stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "ZZZZ",
                "quantity": 3,
            })))
            .await
            .unwrap();

        let record = stocks.core.db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.last_price, 0.0);
        assert!(record.price_updated_at.is_none());
    }

    #[tokio::test]
    async fn test_refresh_updates_cached_prices() {
        let quotes = Arc::new(StaticQuoteSource::with_prices(&[("AAPL", 200.0)]));
        let stocks = StocksPlugin::new(Arc::new(Database::in_memory().unwrap()), quotes.clone());
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        let id = stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "AAPL",
                "quantity": 10,
            })))
            .await
            .unwrap();

        quotes.set("AAPL", 215.0);
        stocks.refresh().await.unwrap();

        let record = stocks.core.db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.last_price, 215.0);
    }

    #[tokio::test]
    async fn test_symbol_change_reprices_and_retargets_refresh() {
        let quotes = Arc::new(StaticQuoteSource::with_prices(&[
            ("AAPL", 200.0),
            ("MSFT", 400.0),
        ]));
        let stocks = StocksPlugin::new(Arc::new(Database::in_memory().unwrap()), quotes.clone());
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        let id = stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "AAPL",
                "quantity": 10,
            })))
            .await
            .unwrap();

        stocks
            .update_manual_entry(
                id,
                payload(json!({
                    "institution": "Fidelity",
                    "symbol": "MSFT",
                    "quantity": 10,
                })),
            )
            .await
            .unwrap();

        // The update re-quotes under the new symbol immediately.
        let record = stocks.core.db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.quote_symbol.as_deref(), Some("MSFT"));
        assert_eq!(record.data["symbol"], json!("MSFT"));
        assert_eq!(record.last_price, 400.0);

        // And subsequent refreshes track the new symbol too.
        quotes.set("MSFT", 410.0);
        stocks.refresh().await.unwrap();
        let record = stocks.core.db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.last_price, 410.0);
    }

    #[tokio::test]
    async fn test_holding_value_uses_quantity_times_price() {
        let stocks = plugin_with_quotes(&[("VTI", 250.0)]);
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        stocks
            .process_manual_entry(payload(json!({
                "institution": "Vanguard",
                "symbol": "VTI",
                "quantity": 4,
            })))
            .await
            .unwrap();

        let snapshots = stocks.accounts().await.unwrap();
        let holding = snapshots.iter().find(|s| s.name == "VTI").unwrap();
        assert_eq!(holding.total_value, 1000.0);
    }

    #[tokio::test]
    async fn test_price_status_reflects_fresh_write() {
        let stocks = plugin_with_quotes(&[("AAPL", 212.5)]);
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        // No quoted records yet.
        assert!(stocks.price_status().unwrap().is_none());

        stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "AAPL",
                "quantity": 10,
            })))
            .await
            .unwrap();

        let status = stocks.price_status().unwrap().unwrap();
        assert_eq!(status.total_count, 1);
        assert_eq!(status.stale_count, 0);
        assert!(!status.force_refresh_needed);
    }

    #[tokio::test]
    async fn test_price_status_flags_never_priced_record() {
        // Quote lookup fails, so the record lands with no price timestamp.
        let stocks = plugin_with_quotes(&[]);
        stocks.initialize(&PluginConfig::enabled()).await.unwrap();

        stocks
            .process_manual_entry(payload(json!({
                "institution": "Fidelity",
                "symbol": "ZZZZ",
                "quantity": 3,
            })))
            .await
            .unwrap();

        let status = stocks.price_status().unwrap().unwrap();
        assert_eq!(status.stale_count, 1);
        assert!(status.force_refresh_needed);
    }

    #[tokio::test]
    async fn test_bulk_updater_exposed_via_capability_check() {
        let stocks = plugin_with_quotes(&[]);
        assert!(stocks.as_bulk_updater().is_some());
    }
}
