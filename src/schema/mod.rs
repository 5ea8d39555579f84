//! Manual-entry schema types and the loosely-typed payload boundary
//!
//! Raw submissions arrive as JSON objects whose values may be strings,
//! numbers, or booleans depending on whether they came from a form post or
//! a native JSON client. `Payload::from_json` is the single place that
//! ambiguity is decoded into the closed [`FieldValue`] sum type; everything
//! downstream pattern-matches on it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single loosely-typed field value as submitted by a client
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Whether the value counts as "not provided": null or empty string
    pub fn is_absent(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => {
                FieldValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            // Arrays have no field semantics here; stringify so validation
            // can reject them with a type error instead of panicking.
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// A raw manual-entry submission after the one-step decode
pub type Payload = BTreeMap<String, FieldValue>;

/// Decode a JSON object into a [`Payload`].
///
/// Nested objects are flattened one level using dotted keys
/// (`custom_fields.color`), which is how category custom fields arrive.
pub fn payload_from_json(obj: &serde_json::Map<String, serde_json::Value>) -> Payload {
    let mut payload = Payload::new();
    for (key, value) in obj {
        match value {
            serde_json::Value::Object(inner) => {
                for (inner_key, inner_value) in inner {
                    payload.insert(
                        format!("{}.{}", key, inner_key),
                        FieldValue::from(inner_value),
                    );
                }
            }
            _ => {
                payload.insert(key.clone(), FieldValue::from(value));
            }
        }
    }
    payload
}

/// Semantic type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Date,
    Select,
}

/// Declarative description of one input field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, label: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            required: false,
            default: None,
            options: Vec::new(),
            pattern: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Ordered field list describing one plugin's manual-entry form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualEntrySchema {
    pub plugin: String,
    pub fields: Vec<FieldSpec>,
}

impl ManualEntrySchema {
    pub fn new(plugin: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            plugin: plugin.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A fully validated, type-coerced value
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CanonicalValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CanonicalValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CanonicalValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON representation used for storage (dates as YYYY-MM-DD strings)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CanonicalValue::Text(s) => serde_json::Value::String(s.clone()),
            CanonicalValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CanonicalValue::Bool(b) => serde_json::Value::Bool(*b),
            CanonicalValue::Date(d) => {
                serde_json::Value::String(d.format("%Y-%m-%d").to_string())
            }
            CanonicalValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// The validated record passed to storage; keys are schema field names
pub type CanonicalRecord = BTreeMap<String, CanonicalValue>;

/// Serialize a canonical record to its stored JSON form
pub fn record_to_json(record: &CanonicalRecord) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Reconstruct a loosely-typed payload from a stored record's JSON.
///
/// Used by the bulk coordinator to merge partial changes over the current
/// row before re-validating the whole thing.
pub fn payload_from_stored(data: &serde_json::Value) -> Payload {
    match data {
        serde_json::Value::Object(obj) => payload_from_json(obj),
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_decode_covers_json_shapes() {
        let obj = json!({
            "name": "Primary Checking",
            "balance": 1250.75,
            "shares": "100",
            "active": true,
            "notes": null,
        });
        let payload = payload_from_json(obj.as_object().unwrap());

        assert_eq!(
            payload.get("name"),
            Some(&FieldValue::Text("Primary Checking".to_string()))
        );
        assert_eq!(payload.get("balance"), Some(&FieldValue::Number(1250.75)));
        assert_eq!(
            payload.get("shares"),
            Some(&FieldValue::Text("100".to_string()))
        );
        assert_eq!(payload.get("active"), Some(&FieldValue::Bool(true)));
        assert_eq!(payload.get("notes"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_nested_object_flattens_with_dotted_keys() {
        let obj = json!({
            "name": "Watch",
            "custom_fields": { "brand": "Omega", "year": 1998 },
        });
        let payload = payload_from_json(obj.as_object().unwrap());

        assert_eq!(
            payload.get("custom_fields.brand"),
            Some(&FieldValue::Text("Omega".to_string()))
        );
        assert_eq!(
            payload.get("custom_fields.year"),
            Some(&FieldValue::Number(1998.0))
        );
    }

    #[test]
    fn test_absence_detection() {
        assert!(FieldValue::Null.is_absent());
        assert!(FieldValue::Text(String::new()).is_absent());
        assert!(FieldValue::Text("   ".to_string()).is_absent());
        assert!(!FieldValue::Text("0".to_string()).is_absent());
        assert!(!FieldValue::Number(0.0).is_absent());
        assert!(!FieldValue::Bool(false).is_absent());
    }

    #[test]
    fn test_canonical_record_json_round_trip() {
        let mut record = CanonicalRecord::new();
        record.insert(
            "name".to_string(),
            CanonicalValue::Text("Condo".to_string()),
        );
        record.insert("value".to_string(), CanonicalValue::Number(450000.0));
        record.insert(
            "purchase_date".to_string(),
            CanonicalValue::Date(NaiveDate::from_ymd_opt(2021, 3, 15).unwrap()),
        );

        let json = record_to_json(&record);
        assert_eq!(json["purchase_date"], json!("2021-03-15"));

        let payload = payload_from_stored(&json);
        assert_eq!(
            payload.get("purchase_date"),
            Some(&FieldValue::Text("2021-03-15".to_string()))
        );
        assert_eq!(payload.get("value"), Some(&FieldValue::Number(450000.0)));
    }

    #[test]
    fn test_field_spec_builder() {
        let spec = FieldSpec::new("symbol", FieldType::Text, "Ticker Symbol")
            .required()
            .max_length(10)
            .pattern("^[A-Z.]+$");

        assert!(spec.required);
        assert_eq!(spec.max_length, Some(10));
        assert_eq!(spec.pattern.as_deref(), Some("^[A-Z.]+$"));
    }
}
