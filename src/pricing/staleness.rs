//! Price-staleness policy
//!
//! Pure decision logic shared by the live read path (annotating responses
//! with staleness metadata) and the batch refresh path (deciding whether to
//! call the quote provider at all). Performs no I/O.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Hard ceiling on cache age while the market is open
const OPEN_MARKET_CEILING: Duration = Duration::minutes(30);

/// Hard ceiling on cache age while the market is closed
const CLOSED_MARKET_CEILING: Duration = Duration::hours(12);

/// Outcome of one staleness decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StalenessDecision {
    pub stale: bool,
    pub force_refresh_needed: bool,
}

/// Classify a cache entry.
///
/// `None` for `last_update` means no cache entry exists at all: stale and
/// force-refresh both hold. Otherwise `stale` compares the age against the
/// configured interval, while `force_refresh_needed` applies the hard
/// ceilings independent of configuration.
pub fn decide(
    last_update: Option<DateTime<Utc>>,
    refresh_interval: Duration,
    market_open: bool,
    now: DateTime<Utc>,
) -> StalenessDecision {
    let last_update = match last_update {
        Some(t) => t,
        None => {
            return StalenessDecision {
                stale: true,
                force_refresh_needed: true,
            }
        }
    };

    let age = now - last_update;
    let stale = age > refresh_interval;
    let ceiling = if market_open {
        OPEN_MARKET_CEILING
    } else {
        CLOSED_MARKET_CEILING
    };

    StalenessDecision {
        stale,
        force_refresh_needed: age > ceiling,
    }
}

/// Derived per-query price status across a set of cached prices
#[derive(Debug, Clone, Serialize)]
pub struct PriceStatus {
    pub stale_count: usize,
    pub total_count: usize,
    /// Age of the oldest cached price, in seconds; None when nothing is cached
    pub cache_age_secs: Option<i64>,
    pub market_open: bool,
    pub cache_stale: bool,
    pub force_refresh_needed: bool,
}

/// Compute the aggregate price status over individual cache timestamps.
///
/// The aggregate decision is driven by the oldest entry, the most
/// conservative choice; `stale_count` counts entries individually.
pub fn price_status(
    timestamps: &[Option<DateTime<Utc>>],
    refresh_interval: Duration,
    market_open: bool,
    now: DateTime<Utc>,
) -> PriceStatus {
    let stale_count = timestamps
        .iter()
        .filter(|t| decide(**t, refresh_interval, market_open, now).stale)
        .count();

    let oldest = if timestamps.is_empty() {
        None
    } else if timestamps.iter().any(|t| t.is_none()) {
        // A record with no cached price at all dominates the decision.
        None
    } else {
        timestamps.iter().filter_map(|t| *t).min()
    };

    let aggregate = if timestamps.is_empty() {
        StalenessDecision {
            stale: false,
            force_refresh_needed: false,
        }
    } else {
        decide(oldest, refresh_interval, market_open, now)
    };

    PriceStatus {
        stale_count,
        total_count: timestamps.len(),
        cache_age_secs: oldest.map(|t| (now - t).num_seconds()),
        market_open,
        cache_stale: aggregate.stale,
        force_refresh_needed: aggregate.force_refresh_needed,
    }
}
