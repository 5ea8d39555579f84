//! Pricing: staleness policy, market-hours clock, quote boundary

pub mod market_hours;
pub mod quotes;
pub mod staleness;

pub use market_hours::is_market_open;
pub use quotes::{HttpQuoteSource, QuoteSource, StaticQuoteSource};
pub use staleness::{decide, price_status, PriceStatus, StalenessDecision};
