//! Real estate plugin

use super::{
    snapshot_accounts, write_entry, AccountSnapshot, Plugin, PluginConfig, PluginCore,
    PluginHealth, PluginKind,
};
use crate::accounts::AccountKey;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::pricing::quotes::QuoteSource;
use crate::schema::{CanonicalRecord, FieldSpec, FieldType, ManualEntrySchema, Payload};
use crate::validation::{self, rules, ValidationResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Properties are single logical holdings, so the identifying tuple is the
/// property name under one synthetic institution.
const INSTITUTION: &str = "Real Estate";

pub struct RealEstatePlugin {
    core: PluginCore,
}

impl RealEstatePlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "real_estate",
            vec![
                FieldSpec::new("property_name", FieldType::Text, "Property Name")
                    .required()
                    .max_length(100),
                FieldSpec::new("property_type", FieldType::Select, "Property Type")
                    .options(&["primary_home", "rental", "vacation", "land", "commercial"])
                    .default_value(json!("primary_home")),
                FieldSpec::new("address", FieldType::Text, "Address").max_length(200),
                FieldSpec::new("current_value", FieldType::Number, "Current Value")
                    .required()
                    .min(0.0),
                FieldSpec::new("outstanding_debt", FieldType::Number, "Outstanding Mortgage")
                    .min(0.0)
                    .default_value(json!(0.0)),
                FieldSpec::new("purchase_price", FieldType::Number, "Purchase Price").min(0.0),
                FieldSpec::new("purchase_date", FieldType::Date, "Purchase Date"),
            ],
        )
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
impl Plugin for RealEstatePlugin {
    fn name(&self) -> &'static str {
        "real_estate"
    }
    fn display_name(&self) -> &'static str {
        "Real Estate"
    }
    fn version(&self) -> &'static str {
        "1.0.2"
    }
    fn description(&self) -> &'static str {
        "Properties with value and mortgage tracking"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core
            .initialize(self.name(), "property", self.data_source())
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
            &[rules::debt_within_value, rules::no_far_future_dates],
        ))
    }

    async fn process_manual_entry(&self, payload: Payload) -> Result<i64> {
        let record = self.require_valid(&payload)?;
        let name = record
            .get("property_name")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing property_name".into()))?;
        let key = AccountKey::new(INSTITUTION, name);

        let outcome = write_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            &key,
            "property",
            self.data_source(),
            &record,
            None,
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
        let outcome = super::rewrite_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            id,
            &record,
            None,
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

    async fn accounts(&self) -> Result<Vec<AccountSnapshot>> {
        // Equity position: value net of the mortgage.
        snapshot_accounts(&self.core.db, self.name(), |r| {
            let value = r
                .data
                .get("current_value")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let debt = r
                .data
                .get("outstanding_debt")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            value - debt
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::StaticQuoteSource;
    use crate::schema::payload_from_json;
    use crate::validation::ErrorCode;

    fn plugin() -> RealEstatePlugin {
        RealEstatePlugin::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(StaticQuoteSource::new()),
        )
    }

    fn payload(value: serde_json::Value) -> Payload {
        payload_from_json(value.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_mortgage_above_value_rejected() {
        let plugin = plugin();
        let result = plugin
            .validate_manual_entry(&payload(json!({
                "property_name": "Lakeside Condo",
                "current_value": 400000,
                "outstanding_debt": 450000,
            })))
            .unwrap();

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "outstanding_debt" && e.code == ErrorCode::InvalidRange));
    }

    #[tokio::test]
    async fn test_net_equity_in_snapshot() {
        let plugin = plugin();
        plugin.initialize(&PluginConfig::enabled()).await.unwrap();

        plugin
            .process_manual_entry(payload(json!({
                "property_name": "Lakeside Condo",
                "current_value": 400000,
                "outstanding_debt": 250000,
            })))
            .await
            .unwrap();

        let snapshots = plugin.accounts().await.unwrap();
        let condo = snapshots
            .iter()
            .find(|s| s.name == "Lakeside Condo")
            .unwrap();
        assert_eq!(condo.total_value, 150000.0);
    }

    #[tokio::test]
    async fn test_missing_debt_defaults_to_zero() {
        let plugin = plugin();
        let result = plugin
            .validate_manual_entry(&payload(json!({
                "property_name": "Cabin",
                "current_value": 120000,
            })))
            .unwrap();

        assert!(result.valid);
        assert_eq!(
            result
                .data
                .get("outstanding_debt")
                .and_then(|v| v.as_number()),
            Some(0.0)
        );
    }
}
