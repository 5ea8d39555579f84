//! Brokerage connection plugin (API-sourced, no manual entry)
//!
//! Positions arrive from the upstream brokerage API, so the whole
//! manual-entry family keeps its default "unsupported" answers. Callers
//! that gate on [`Plugin::supports_manual_entry`] skip this plugin without
//! ever seeing those errors.

use super::{
    snapshot_accounts, AccountSnapshot, Plugin, PluginConfig, PluginCore, PluginHealth,
    PluginKind,
};
use crate::db::Database;
use crate::error::Result;
use crate::pricing::quotes::QuoteSource;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BrokeragePlugin {
    core: PluginCore,
}

impl BrokeragePlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }
}

#[async_trait]
impl Plugin for BrokeragePlugin {
    fn name(&self) -> &'static str {
        "brokerage"
    }
    fn display_name(&self) -> &'static str {
        "Brokerage Accounts"
    }
    fn version(&self) -> &'static str {
        "1.0.0"
    }
    fn description(&self) -> &'static str {
        "Investment accounts synced from a brokerage API"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Api
    }
    fn data_source(&self) -> &'static str {
        "api"
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

    async fn refresh(&self) -> Result<()> {
        let outcome =
            super::refresh_prices(&self.core.db, self.core.quotes.as_ref(), self.name()).await;
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
            let quantity = r.data.get("quantity").and_then(|v| v.as_f64()).unwrap_or(0.0);
            quantity * r.last_price
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::pricing::StaticQuoteSource;
    use crate::schema::Payload;

    fn plugin() -> BrokeragePlugin {
        BrokeragePlugin::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(StaticQuoteSource::new()),
        )
    }

    #[tokio::test]
    async fn test_manual_entry_family_is_unsupported() {
        let brokerage = plugin();
        assert!(!brokerage.supports_manual_entry());

        assert!(matches!(
            brokerage.manual_entry_schema(),
            Err(AppError::Unsupported(_))
        ));
        assert!(matches!(
            brokerage.validate_manual_entry(&Payload::new()),
            Err(AppError::Unsupported(_))
        ));
        assert!(matches!(
            brokerage.process_manual_entry(Payload::new()).await,
            Err(AppError::Unsupported(_))
        ));
        assert!(matches!(
            brokerage.update_manual_entry(1, Payload::new()).await,
            Err(AppError::Unsupported(_))
        ));
        assert!(brokerage.as_bulk_updater().is_none());
    }

    #[tokio::test]
    async fn test_initialize_creates_default_account() {
        let brokerage = plugin();
        assert!(!brokerage.is_healthy());

        brokerage.initialize(&PluginConfig::enabled()).await.unwrap();
        assert!(brokerage.is_healthy());
        assert_eq!(brokerage.core.db.list_accounts("brokerage").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_no_records_is_ok() {
        let brokerage = plugin();
        brokerage.initialize(&PluginConfig::enabled()).await.unwrap();
        brokerage.refresh().await.unwrap();
        assert_eq!(brokerage.health().metrics.error_count, 0);
    }
}
