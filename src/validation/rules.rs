//! Shared cross-field rule library
//!
//! Plugins compose these into their `validate_manual_entry` call so the
//! mechanical coercion lives in one place and each plugin only declares its
//! semantic constraints.

use super::{ErrorCode, FieldError};
use crate::schema::{CanonicalRecord, CanonicalValue};
use chrono::{Datelike, NaiveDate, Utc};

/// Maximum forward horizon for any user-entered date
const MAX_FUTURE_YEARS: i32 = 10;

/// `vested` must not exceed `total`; on success the derived difference is
/// written back under `derived_name` so writers never recompute it.
pub fn quantity_within_total(
    vested_field: &'static str,
    total_field: &'static str,
    derived_name: &'static str,
) -> impl Fn(&mut CanonicalRecord, &mut Vec<FieldError>) {
    move |data, errors| {
        let vested = data.get(vested_field).and_then(|v| v.as_number());
        let total = data.get(total_field).and_then(|v| v.as_number());
        if let (Some(vested), Some(total)) = (vested, total) {
            if vested > total {
                errors.push(FieldError::new(
                    vested_field,
                    &format!("{} cannot exceed {}", vested_field, total_field),
                    ErrorCode::InvalidRange,
                ));
            } else {
                data.insert(
                    derived_name.to_string(),
                    CanonicalValue::Number(total - vested),
                );
            }
        }
    }
}

/// Vesting-grant rule: `vested_shares <= total_shares`, deriving
/// `unvested_shares` on success.
pub fn vested_within_total(data: &mut CanonicalRecord, errors: &mut Vec<FieldError>) {
    quantity_within_total("vested_shares", "total_shares", "unvested_shares")(data, errors)
}

/// `earlier` must be on or before `later`; the error lands on `later`.
fn check_date_order(
    data: &CanonicalRecord,
    errors: &mut Vec<FieldError>,
    earlier: &str,
    later: &str,
) {
    let first = data.get(earlier).and_then(|v| v.as_date());
    let second = data.get(later).and_then(|v| v.as_date());
    if let (Some(first), Some(second)) = (first, second) {
        if first > second {
            errors.push(FieldError::new(
                later,
                &format!("{} cannot be before {}", later, earlier),
                ErrorCode::InvalidDateOrder,
            ));
        }
    }
}

/// Grant date must precede (or equal) the vesting start date.
pub fn grant_before_vesting(data: &mut CanonicalRecord, errors: &mut Vec<FieldError>) {
    check_date_order(data, errors, "grant_date", "vest_start_date");
}

/// No date field may lie more than ten years in the future.
pub fn no_far_future_dates(data: &mut CanonicalRecord, errors: &mut Vec<FieldError>) {
    let today = Utc::now().date_naive();
    let horizon = add_years(today, MAX_FUTURE_YEARS);

    let offenders: Vec<String> = data
        .iter()
        .filter_map(|(name, value)| match value {
            CanonicalValue::Date(d) if *d > horizon => Some(name.clone()),
            _ => None,
        })
        .collect();

    for field in offenders {
        errors.push(FieldError::new(
            &field,
            &format!("{} is more than {} years in the future", field, MAX_FUTURE_YEARS),
            ErrorCode::InvalidRange,
        ));
    }
}

/// `outstanding_debt` must not exceed `current_value` (mortgages, loans
/// against assets).
pub fn debt_within_value(data: &mut CanonicalRecord, errors: &mut Vec<FieldError>) {
    let debt = data.get("outstanding_debt").and_then(|v| v.as_number());
    let value = data.get("current_value").and_then(|v| v.as_number());
    if let (Some(debt), Some(value)) = (debt, value) {
        if debt > value {
            errors.push(FieldError::new(
                "outstanding_debt",
                "outstanding_debt cannot exceed current_value",
                ErrorCode::InvalidRange,
            ));
        }
    }
}

fn add_years(date: NaiveDate, years: i32) -> NaiveDate {
    // Feb 29 clamps to Feb 28 in non-leap target years.
    NaiveDate::from_ymd_opt(date.year() + years, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(date.year() + years, date.month(), 28))
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_with_numbers(pairs: &[(&str, f64)]) -> CanonicalRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CanonicalValue::Number(*v)))
            .collect()
    }

    #[test]
    fn test_vested_over_total_is_invalid_range() {
        let mut data = record_with_numbers(&[("vested_shares", 1100.0), ("total_shares", 1000.0)]);
        let mut errors = Vec::new();
        vested_within_total(&mut data, &mut errors);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "vested_shares");
        assert_eq!(errors[0].code, ErrorCode::InvalidRange);
        assert!(data.get("unvested_shares").is_none());
    }

    #[test]
    fn test_vested_within_total_derives_unvested() {
        let mut data = record_with_numbers(&[("vested_shares", 250.0), ("total_shares", 1000.0)]);
        let mut errors = Vec::new();
        vested_within_total(&mut data, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(
            data.get("unvested_shares"),
            Some(&CanonicalValue::Number(750.0))
        );
    }

    #[test]
    fn test_grant_after_vest_start_is_invalid_date_order() {
        let mut data = CanonicalRecord::new();
        data.insert(
            "grant_date".to_string(),
            CanonicalValue::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        );
        data.insert(
            "vest_start_date".to_string(),
            CanonicalValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        );

        let mut errors = Vec::new();
        grant_before_vesting(&mut data, &mut errors);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "vest_start_date");
        assert_eq!(errors[0].code, ErrorCode::InvalidDateOrder);
    }

    #[test]
    fn test_far_future_date_rejected() {
        let mut data = CanonicalRecord::new();
        let far = Utc::now().date_naive() + Duration::days(366 * 11);
        data.insert("vest_start_date".to_string(), CanonicalValue::Date(far));

        let mut errors = Vec::new();
        no_far_future_dates(&mut data, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "vest_start_date");
    }

    #[test]
    fn test_near_future_date_allowed() {
        let mut data = CanonicalRecord::new();
        let near = Utc::now().date_naive() + Duration::days(365);
        data.insert("vest_start_date".to_string(), CanonicalValue::Date(near));

        let mut errors = Vec::new();
        no_far_future_dates(&mut data, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_debt_exceeding_value_rejected() {
        let mut data =
            record_with_numbers(&[("outstanding_debt", 500000.0), ("current_value", 400000.0)]);
        let mut errors = Vec::new();
        debt_within_value(&mut data, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "outstanding_debt");
    }
}
