//! Cash accounts plugin (checking, savings, CDs)

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

pub struct CashPlugin {
    core: PluginCore,
}

impl CashPlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "cash",
            vec![
                FieldSpec::new("institution", FieldType::Text, "Institution")
                    .required()
                    .max_length(100),
                FieldSpec::new("account_name", FieldType::Text, "Account Name")
                    .required()
                    .max_length(100),
                FieldSpec::new("account_type", FieldType::Select, "Account Type")
                    .options(&["checking", "savings", "money_market", "cd"])
                    .default_value(json!("checking")),
                FieldSpec::new("balance", FieldType::Number, "Balance")
                    .required()
                    .min(0.0),
                FieldSpec::new("currency", FieldType::Select, "Currency")
                    .options(&["USD", "EUR", "GBP", "CAD"])
                    .default_value(json!("USD")),
                FieldSpec::new("interest_rate", FieldType::Number, "Interest Rate (%)")
                    .min(0.0)
                    .max(100.0),
                FieldSpec::new("notes", FieldType::Text, "Notes").max_length(500),
            ],
        )
    }

    fn account_key(record: &CanonicalRecord) -> Result<AccountKey> {
        let institution = record
            .get("institution")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing institution".into()))?;
        let name = record
            .get("account_name")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing account_name".into()))?;
        Ok(AccountKey::new(institution, name))
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
impl Plugin for CashPlugin {
    fn name(&self) -> &'static str {
        "cash"
    }
    fn display_name(&self) -> &'static str {
        "Cash Accounts"
    }
    fn version(&self) -> &'static str {
        "1.2.0"
    }
    fn description(&self) -> &'static str {
        "Self-reported cash balances: checking, savings, money market, CDs"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core.initialize(self.name(), "cash", self.data_source())
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

        let outcome = write_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            &key,
            "cash",
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
        snapshot_accounts(&self.core.db, self.name(), |r| {
            r.data.get("balance").and_then(|v| v.as_f64()).unwrap_or(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::StaticQuoteSource;
    use crate::schema::payload_from_json;
    use crate::validation::ErrorCode;

    fn plugin() -> CashPlugin {
        CashPlugin::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(StaticQuoteSource::new()),
        )
    }

    fn payload(value: serde_json::Value) -> Payload {
        payload_from_json(value.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_process_resolves_same_account_on_resubmission() {
        let cash = plugin();
        cash.initialize(&PluginConfig::enabled()).await.unwrap();

        let entry = payload(json!({
            "institution": "Chase Bank",
            "account_name": "Primary Checking",
            "balance": "1200.50",
        }));

        let first = cash.process_manual_entry(entry.clone()).await.unwrap();
        let second = cash.process_manual_entry(entry).await.unwrap();

        let a = cash.core.db.get_record("cash", first).unwrap().unwrap();
        let b = cash.core.db.get_record("cash", second).unwrap().unwrap();
        assert_eq!(a.account_id, b.account_id);
    }

    #[tokio::test]
    async fn test_invalid_entry_never_reaches_storage() {
        let cash = plugin();
        cash.initialize(&PluginConfig::enabled()).await.unwrap();

        let err = cash
            .process_manual_entry(payload(json!({
                "institution": "Chase Bank",
                "account_name": "Checking",
                "balance": "not-a-number",
            })))
            .await
            .unwrap_err();

        match err {
            AppError::Validation(v) => {
                assert_eq!(v.errors[0].code, ErrorCode::InvalidNumber)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(cash.core.db.list_records("cash").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_is_side_effect_free() {
        let cash = plugin();
        cash.initialize(&PluginConfig::enabled()).await.unwrap();

        let entry = payload(json!({
            "institution": "Chase Bank",
            "account_name": "Checking",
            "balance": 50,
        }));
        cash.validate_manual_entry(&entry).unwrap();
        cash.validate_manual_entry(&entry).unwrap();

        assert!(cash.core.db.list_records("cash").unwrap().is_empty());
        // Only the default account from initialize exists.
        assert_eq!(cash.core.db.list_accounts("cash").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_accounts_snapshot_sums_balances() {
        let cash = plugin();
        cash.initialize(&PluginConfig::enabled()).await.unwrap();

        for balance in [100.0, 250.0] {
            cash.process_manual_entry(payload(json!({
                "institution": "Chase Bank",
                "account_name": "Checking",
                "balance": balance,
            })))
            .await
            .unwrap();
        }

        let snapshots = cash.accounts().await.unwrap();
        let checking = snapshots
            .iter()
            .find(|s| s.name == "Checking")
            .expect("checking account snapshot");
        assert_eq!(checking.total_value, 350.0);
        assert_eq!(checking.record_count, 2);
    }
}
