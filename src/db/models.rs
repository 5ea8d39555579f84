//! Database row models

use serde::{Deserialize, Serialize};

/// A deduplicated logical account one plugin's records attach to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub plugin: String,
    pub institution: String,
    pub name: String,
    pub kind: String,
    pub data_source: String,
    pub external_id: String,
    pub created_at: String,
}

/// One canonical record row; `data` holds the validated JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub plugin: String,
    pub account_id: i64,
    pub data: serde_json::Value,
    pub quote_symbol: Option<String>,
    pub last_price: f64,
    pub price_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A miscellaneous-asset category; `custom_fields` is a JSON array of
/// field specs appended to the misc plugin's schema at request time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetCategory {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub custom_fields: serde_json::Value,
}
