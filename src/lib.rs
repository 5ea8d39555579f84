//! Net-worth aggregation core
//!
//! Data-source plugins (cash, stocks, equity grants, real estate, crypto,
//! miscellaneous assets, brokerage connections) register with a central
//! [`plugins::registry::PluginRegistry`]; the
//! [`plugins::manager::PluginManager`] routes schema lookups, manual-entry
//! validation and writes, bulk updates, and cached balance aggregation
//! across the enabled plugins. Manual entries are validated against
//! declarative [`schema::ManualEntrySchema`]s before anything touches the
//! SQLite store.

pub mod accounts;
pub mod bulk;
pub mod db;
pub mod error;
pub mod plugins;
pub mod pricing;
pub mod schema;
pub mod validation;

pub use error::{AppError, ErrorResponse, Result};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries embedding this crate
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "networth_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
