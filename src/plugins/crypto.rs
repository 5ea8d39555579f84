//! Crypto holdings plugin

use super::{
    refresh_prices, snapshot_accounts, write_entry, AccountSnapshot, Plugin, PluginConfig,
    PluginCore, PluginHealth, PluginKind,
};
use crate::accounts::AccountKey;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::pricing::quotes::QuoteSource;
use crate::schema::{CanonicalRecord, FieldSpec, FieldType, ManualEntrySchema, Payload};
use crate::validation::{self, rules, ValidationResult};
use async_trait::async_trait;
use std::sync::Arc;

pub struct CryptoPlugin {
    core: PluginCore,
}

impl CryptoPlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "crypto",
            vec![
                FieldSpec::new("exchange", FieldType::Text, "Exchange or Wallet")
                    .required()
                    .max_length(100),
                FieldSpec::new("symbol", FieldType::Text, "Asset Symbol")
                    .required()
                    .pattern("^[A-Z0-9]{2,10}$"),
                FieldSpec::new("quantity", FieldType::Number, "Quantity")
                    .required()
                    .min(0.0),
                FieldSpec::new("wallet_address", FieldType::Text, "Wallet Address")
                    .min_length(10)
                    .max_length(100),
                FieldSpec::new("acquired_date", FieldType::Date, "Acquired Date"),
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
impl Plugin for CryptoPlugin {
    fn name(&self) -> &'static str {
        "crypto"
    }
    fn display_name(&self) -> &'static str {
        "Crypto Holdings"
    }
    fn version(&self) -> &'static str {
        "1.3.0"
    }
    fn description(&self) -> &'static str {
        "Cryptocurrency balances across exchanges and wallets"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core
            .initialize(self.name(), "crypto", self.data_source())
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
        let exchange = record
            .get("exchange")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing exchange".into()))?;
        let symbol = record
            .get("symbol")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing symbol".into()))?
            .to_string();
        let key = AccountKey::new(exchange, &symbol);

        let outcome = write_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            &key,
            "crypto",
            self.data_source(),
            &record,
            Some(&symbol),
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
}
