//! Market-hours clock
//!
//! Supplies the market-open signal the staleness policy takes as input.
//! Regular NYSE session only: weekdays 9:30-16:00 America/New_York.
//! Exchange holidays are not modeled; a holiday reads as "open", which only
//! makes the staleness policy more eager, never less.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;

pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let local = New_York.from_utc_datetime(&now.naive_utc());

    match local.weekday() {
        Weekday::Sat | Weekday::Sun => return false,
        _ => {}
    }

    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let time = local.time();

    time >= open && time < close
}
