//! Schema-driven validation and type coercion
//!
//! One engine serves every plugin: presence checks, numeric/date coercion,
//! declarative range/shape constraints from the field specs, then the
//! plugin's own cross-field rules. All errors are accumulated so a client
//! can fix everything in one round trip.

pub mod rules;

use crate::schema::{
    CanonicalRecord, CanonicalValue, FieldSpec, FieldType, FieldValue, ManualEntrySchema, Payload,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Machine-readable validation error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Required,
    InvalidNumber,
    InvalidType,
    InvalidFormat,
    InvalidRange,
    MinLength,
    MaxLength,
    Pattern,
    InvalidOption,
    InvalidDateOrder,
}

/// One field-level validation error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: ErrorCode,
}

impl FieldError {
    pub fn new(field: &str, message: &str, code: ErrorCode) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
            code,
        }
    }
}

/// Outcome of validating one payload against one schema
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
    pub data: CanonicalRecord,
}

impl ValidationResult {
    fn from_parts(errors: Vec<FieldError>, data: CanonicalRecord) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            data,
        }
    }
}

/// A cross-field semantic rule.
///
/// Rules run only after per-field validation, see the canonical record of
/// every field that coerced cleanly, and may write derived fields back into
/// it (e.g. `unvested_shares`).
pub type CrossFieldRule = fn(&mut CanonicalRecord, &mut Vec<FieldError>);

/// Validate a payload against a schema plus plugin-specific rules.
///
/// This is the only path from loosely-typed input to a [`CanonicalRecord`];
/// plugins never call their write paths unless the result is valid.
pub fn validate(
    schema: &ManualEntrySchema,
    payload: &Payload,
    cross_field_rules: &[CrossFieldRule],
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut data = CanonicalRecord::new();

    for spec in &schema.fields {
        validate_field(spec, payload.get(&spec.name), &mut data, &mut errors);
    }

    for rule in cross_field_rules {
        rule(&mut data, &mut errors);
    }

    ValidationResult::from_parts(errors, data)
}

fn validate_field(
    spec: &FieldSpec,
    value: Option<&FieldValue>,
    data: &mut CanonicalRecord,
    errors: &mut Vec<FieldError>,
) {
    // Absent, null, and empty string are the same absence.
    let provided = value.filter(|v| !v.is_absent());

    let value = match provided {
        Some(v) => v,
        None => {
            if spec.required {
                errors.push(FieldError::new(
                    &spec.name,
                    &format!("{} is required", spec.label),
                    ErrorCode::Required,
                ));
            } else if let Some(default) = &spec.default {
                if let Some(canonical) = default_to_canonical(spec, default) {
                    data.insert(spec.name.clone(), canonical);
                }
            }
            return;
        }
    };

    let canonical = match spec.field_type {
        FieldType::Number => coerce_number(spec, value, errors),
        FieldType::Date => coerce_date(spec, value, errors),
        FieldType::Bool => coerce_bool(spec, value, errors),
        FieldType::Text | FieldType::Select => coerce_text(spec, value, errors),
    };

    if let Some(canonical) = canonical {
        data.insert(spec.name.clone(), canonical);
    }
}

fn default_to_canonical(spec: &FieldSpec, default: &serde_json::Value) -> Option<CanonicalValue> {
    match (spec.field_type, default) {
        (FieldType::Number, serde_json::Value::Number(n)) => {
            n.as_f64().map(CanonicalValue::Number)
        }
        (FieldType::Bool, serde_json::Value::Bool(b)) => Some(CanonicalValue::Bool(*b)),
        (FieldType::Text | FieldType::Select, serde_json::Value::String(s)) => {
            Some(CanonicalValue::Text(s.clone()))
        }
        (FieldType::Date, serde_json::Value::String(s)) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(CanonicalValue::Date)
        }
        _ => None,
    }
}

fn coerce_number(
    spec: &FieldSpec,
    value: &FieldValue,
    errors: &mut Vec<FieldError>,
) -> Option<CanonicalValue> {
    let number = match value {
        FieldValue::Number(n) => {
            if n.is_finite() {
                Some(*n)
            } else {
                errors.push(FieldError::new(
                    &spec.name,
                    &format!("{} must be a valid number", spec.label),
                    ErrorCode::InvalidNumber,
                ));
                None
            }
        }
        FieldValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                errors.push(FieldError::new(
                    &spec.name,
                    &format!("{} must be a valid number", spec.label),
                    ErrorCode::InvalidNumber,
                ));
                None
            }
        },
        _ => {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} has an invalid type", spec.label),
                ErrorCode::InvalidType,
            ));
            None
        }
    }?;

    let mut in_range = true;
    if let Some(min) = spec.min {
        if number < min {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be at least {}", spec.label, min),
                ErrorCode::InvalidRange,
            ));
            in_range = false;
        }
    }
    if let Some(max) = spec.max {
        if number > max {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be at most {}", spec.label, max),
                ErrorCode::InvalidRange,
            ));
            in_range = false;
        }
    }

    in_range.then_some(CanonicalValue::Number(number))
}

fn coerce_date(
    spec: &FieldSpec,
    value: &FieldValue,
    errors: &mut Vec<FieldError>,
) -> Option<CanonicalValue> {
    match value {
        FieldValue::Text(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(date) => Some(CanonicalValue::Date(date)),
            Err(_) => {
                errors.push(FieldError::new(
                    &spec.name,
                    &format!("{} must be a date in YYYY-MM-DD format", spec.label),
                    ErrorCode::InvalidFormat,
                ));
                None
            }
        },
        _ => {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be a date in YYYY-MM-DD format", spec.label),
                ErrorCode::InvalidFormat,
            ));
            None
        }
    }
}

fn coerce_bool(
    spec: &FieldSpec,
    value: &FieldValue,
    errors: &mut Vec<FieldError>,
) -> Option<CanonicalValue> {
    match value {
        FieldValue::Bool(b) => Some(CanonicalValue::Bool(*b)),
        // Form submissions send booleans as strings.
        FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(CanonicalValue::Bool(true)),
            "false" | "0" | "no" => Some(CanonicalValue::Bool(false)),
            _ => {
                errors.push(FieldError::new(
                    &spec.name,
                    &format!("{} must be true or false", spec.label),
                    ErrorCode::InvalidType,
                ));
                None
            }
        },
        _ => {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be true or false", spec.label),
                ErrorCode::InvalidType,
            ));
            None
        }
    }
}

fn coerce_text(
    spec: &FieldSpec,
    value: &FieldValue,
    errors: &mut Vec<FieldError>,
) -> Option<CanonicalValue> {
    let text = match value {
        FieldValue::Text(s) => s.trim().to_string(),
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Bool(_) | FieldValue::Null => {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} has an invalid type", spec.label),
                ErrorCode::InvalidType,
            ));
            return None;
        }
    };

    let mut ok = true;

    if let Some(min_len) = spec.min_length {
        if text.chars().count() < min_len {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be at least {} characters", spec.label, min_len),
                ErrorCode::MinLength,
            ));
            ok = false;
        }
    }
    if let Some(max_len) = spec.max_length {
        if text.chars().count() > max_len {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be at most {} characters", spec.label, max_len),
                ErrorCode::MaxLength,
            ));
            ok = false;
        }
    }
    if let Some(pattern) = &spec.pattern {
        // Specs are authored in-crate; an unparseable pattern is a bug we
        // surface as a failed match rather than a panic.
        let matched = regex::Regex::new(pattern)
            .map(|re| re.is_match(&text))
            .unwrap_or(false);
        if !matched {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} has an invalid format", spec.label),
                ErrorCode::Pattern,
            ));
            ok = false;
        }
    }
    if spec.field_type == FieldType::Select && !spec.options.is_empty() {
        if !spec.options.iter().any(|o| o == &text) {
            errors.push(FieldError::new(
                &spec.name,
                &format!("{} must be one of: {}", spec.label, spec.options.join(", ")),
                ErrorCode::InvalidOption,
            ));
            ok = false;
        }
    }

    ok.then_some(CanonicalValue::Text(text))
}
