//! Vesting equity plugin (RSU/option grants)
//!
//! The schema carries the cross-field invariants that make this plugin
//! interesting: vested shares bounded by the grant total (with the unvested
//! remainder derived during validation) and grant dates ordered before
//! vesting starts. Grants are the primary bulk-edit target; vesting events
//! touch many rows at once.

use super::{
    snapshot_accounts, write_entry, AccountSnapshot, BulkUpdateItem, BulkUpdateResult,
    BulkUpdater, Plugin, PluginConfig, PluginCore, PluginHealth, PluginKind,
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

const CROSS_FIELD_RULES: &[validation::CrossFieldRule] = &[
    rules::vested_within_total,
    rules::grant_before_vesting,
    rules::no_far_future_dates,
];

pub struct EquityPlugin {
    core: PluginCore,
}

impl EquityPlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "equity",
            vec![
                FieldSpec::new("company", FieldType::Text, "Company")
                    .required()
                    .max_length(100),
                FieldSpec::new("grant_name", FieldType::Text, "Grant Name")
                    .required()
                    .max_length(100),
                FieldSpec::new("grant_type", FieldType::Select, "Grant Type")
                    .options(&["rsu", "iso", "nso", "espp"])
                    .default_value(serde_json::json!("rsu")),
                FieldSpec::new("total_shares", FieldType::Number, "Total Shares")
                    .required()
                    .min(0.0),
                FieldSpec::new("vested_shares", FieldType::Number, "Vested Shares")
                    .required()
                    .min(0.0),
                FieldSpec::new("strike_price", FieldType::Number, "Strike Price").min(0.0),
                FieldSpec::new("grant_date", FieldType::Date, "Grant Date").required(),
                FieldSpec::new("vest_start_date", FieldType::Date, "Vesting Start Date"),
                FieldSpec::new("symbol", FieldType::Text, "Ticker Symbol")
                    .pattern("^[A-Z.]{1,10}$"),
            ],
        )
    }

    fn validate(payload: &Payload) -> ValidationResult {
        validation::validate(&Self::schema(), payload, CROSS_FIELD_RULES)
    }

    fn account_key(record: &CanonicalRecord) -> Result<AccountKey> {
        let company = record
            .get("company")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing company".into()))?;
        let grant = record
            .get("grant_name")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing grant_name".into()))?;
        Ok(AccountKey::new(company, grant))
    }

    fn require_valid(&self, payload: &Payload) -> Result<CanonicalRecord> {
        let result = Self::validate(payload);
        if !result.valid {
            self.core.metrics.record_error();
            return Err(AppError::validation(result.errors));
        }
        Ok(result.data)
    }
}

#[async_trait]
impl Plugin for EquityPlugin {
    fn name(&self) -> &'static str {
        "equity"
    }
    fn display_name(&self) -> &'static str {
        "Vesting Equity"
    }
    fn version(&self) -> &'static str {
        "1.1.0"
    }
    fn description(&self) -> &'static str {
        "RSU and option grants with vesting schedules"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core
            .initialize(self.name(), "equity", self.data_source())
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
        Ok(Self::validate(payload))
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
            "equity",
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
        super::refresh_prices(&self.core.db, self.core.quotes.as_ref(), self.name()).await
    }

    fn price_status(&self) -> Result<Option<crate::pricing::PriceStatus>> {
        super::price_status_for(&self.core.db, self.name(), super::PRICE_REFRESH_INTERVAL)
    }

    async fn accounts(&self) -> Result<Vec<AccountSnapshot>> {
        // Vested shares at the last quote; unpriced grants contribute zero
        // until a refresh lands.
        snapshot_accounts(&self.core.db, self.name(), |r| {
            let vested = r
                .data
                .get("vested_shares")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            vested * r.last_price
        })
    }

    fn as_bulk_updater(&self) -> Option<&dyn BulkUpdater> {
        Some(self)
    }
}

#[async_trait]
impl BulkUpdater for EquityPlugin {
    async fn bulk_update_manual_entry(
        &self,
        items: Vec<BulkUpdateItem>,
    ) -> Result<BulkUpdateResult> {
        let validate = |payload: &Payload| Self::validate(payload);
        let result = bulk::execute(&self.core.db, self.name(), &validate, &items);
        match &result {
            Ok(_) => self.core.metrics.record_success(),
            Err(_) => self.core.metrics.record_error(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::StaticQuoteSource;
    use crate::schema::payload_from_json;
    use crate::validation::ErrorCode;
    use serde_json::json;

    fn plugin() -> EquityPlugin {
        EquityPlugin::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(StaticQuoteSource::new()),
        )
    }

    fn payload(value: serde_json::Value) -> Payload {
        payload_from_json(value.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_overvested_grant_rejected_with_invalid_range() {
        let equity = plugin();
        let result = equity
            .validate_manual_entry(&payload(json!({
                "company": "Acme",
                "grant_name": "2022 Grant",
                "total_shares": 1000,
                "vested_shares": 1100,
                "grant_date": "2022-01-15",
            })))
            .unwrap();

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "vested_shares" && e.code == ErrorCode::InvalidRange));
    }

    #[tokio::test]
    async fn test_valid_grant_derives_unvested_shares() {
        let equity = plugin();
        let result = equity
            .validate_manual_entry(&payload(json!({
                "company": "Acme",
                "grant_name": "2022 Grant",
                "total_shares": 1000,
                "vested_shares": 250,
                "grant_date": "2022-01-15",
            })))
            .unwrap();

        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(
            result.data.get("unvested_shares").and_then(|v| v.as_number()),
            Some(750.0)
        );
    }

    #[tokio::test]
    async fn test_grant_after_vest_start_rejected() {
        let equity = plugin();
        let result = equity
            .validate_manual_entry(&payload(json!({
                "company": "Acme",
                "grant_name": "2024 Grant",
                "total_shares": 100,
                "vested_shares": 0,
                "grant_date": "2024-06-01",
                "vest_start_date": "2024-01-01",
            })))
            .unwrap();

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "vest_start_date" && e.code == ErrorCode::InvalidDateOrder));
    }

    #[tokio::test]
    async fn test_stored_record_contains_derived_field() {
        let equity = plugin();
        equity.initialize(&PluginConfig::enabled()).await.unwrap();

        let id = equity
            .process_manual_entry(payload(json!({
                "company": "Acme",
                "grant_name": "2022 Grant",
                "total_shares": 1000,
                "vested_shares": 250,
                "grant_date": "2022-01-15",
            })))
            .await
            .unwrap();

        let record = equity.core.db.get_record("equity", id).unwrap().unwrap();
        assert_eq!(record.data["unvested_shares"], json!(750.0));
    }

    #[tokio::test]
    async fn test_bulk_vesting_event_across_grants() {
        let equity = plugin();
        equity.initialize(&PluginConfig::enabled()).await.unwrap();

        let mut ids = Vec::new();
        for (grant, total) in [("2022 Grant", 1000), ("2023 Grant", 400)] {
            let id = equity
                .process_manual_entry(payload(json!({
                    "company": "Acme",
                    "grant_name": grant,
                    "total_shares": total,
                    "vested_shares": 0,
                    "grant_date": "2022-01-15",
                })))
                .await
                .unwrap();
            ids.push(id);
        }

        let items = vec![
            BulkUpdateItem {
                id: ids[0],
                changes: payload(json!({"vested_shares": 250})),
            },
            BulkUpdateItem {
                id: ids[1],
                changes: payload(json!({"vested_shares": 100})),
            },
        ];
        let result = equity.bulk_update_manual_entry(items).await.unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 0);

        let record = equity.core.db.get_record("equity", ids[0]).unwrap().unwrap();
        assert_eq!(record.data["unvested_shares"], json!(750.0));
    }
}
