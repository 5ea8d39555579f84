//! Quote/valuation boundary
//!
//! The core calls out for a current price when a record is created or
//! refreshed. A quote failure never aborts a write; the record is stored
//! with a zero price and corrected by a later refresh.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;

/// Source of current prices/valuations for symbols
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<f64>;
}

/// HTTP quote client hitting a `GET {base}/quote?symbol=X` endpoint
pub struct HttpQuoteSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
}

impl HttpQuoteSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(AppError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?;

        let quote: QuoteResponse = response.json().await?;
        if !quote.price.is_finite() || quote.price < 0.0 {
            return Err(AppError::Plugin(format!(
                "quote source returned an invalid price for {}",
                symbol
            )));
        }
        Ok(quote.price)
    }
}

/// Fixed price table; used in tests and as an offline fallback
#[derive(Default)]
pub struct StaticQuoteSource {
    prices: RwLock<HashMap<String, f64>>,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(pairs: &[(&str, f64)]) -> Self {
        let source = Self::new();
        for (symbol, price) in pairs {
            source.set(symbol, *price);
        }
        source
    }

    pub fn set(&self, symbol: &str, price: f64) {
        self.prices.write().insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("quote for symbol '{}'", symbol)))
    }
}

/// Fetch a price, tolerating failure: logs a warning and returns 0.0 so
/// the caller's write proceeds.
pub async fn fetch_price_or_zero(quotes: &dyn QuoteSource, symbol: &str) -> f64 {
    match quotes.latest_price(symbol).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!(symbol, error = %e, "quote lookup failed, storing zero price");
            0.0
        }
    }
}
