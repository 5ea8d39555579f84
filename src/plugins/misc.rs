//! Miscellaneous assets plugin (collectibles, vehicles, jewelry, ...)
//!
//! The only plugin whose schema is not static: a category row may define
//! custom fields, and the effective schema is a deterministic function of
//! (plugin, optional category id). Validated custom-field values are stored
//! nested under `custom_fields` in the canonical record.

use super::{
    snapshot_accounts, write_entry, AccountSnapshot, Plugin, PluginConfig, PluginCore,
    PluginHealth, PluginKind,
};
use crate::accounts::AccountKey;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::pricing::quotes::QuoteSource;
use crate::schema::{
    CanonicalRecord, CanonicalValue, FieldSpec, FieldType, ManualEntrySchema, Payload,
};
use crate::validation::{self, rules, ErrorCode, FieldError, ValidationResult};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const INSTITUTION: &str = "Personal";
const CUSTOM_PREFIX: &str = "custom_fields.";

pub struct MiscPlugin {
    core: PluginCore,
}

impl MiscPlugin {
    pub fn new(db: Arc<Database>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            core: PluginCore::new(db, quotes),
        }
    }

    fn base_schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "misc",
            vec![
                FieldSpec::new("name", FieldType::Text, "Asset Name")
                    .required()
                    .max_length(100),
                FieldSpec::new("category_id", FieldType::Number, "Category").min(1.0),
                FieldSpec::new("current_value", FieldType::Number, "Current Value")
                    .required()
                    .min(0.0),
                FieldSpec::new("outstanding_debt", FieldType::Number, "Loan Against Asset")
                    .min(0.0)
                    .default_value(json!(0.0)),
                FieldSpec::new("purchase_date", FieldType::Date, "Purchase Date"),
                FieldSpec::new("description", FieldType::Text, "Description").max_length(500),
            ],
        )
    }

    /// Base schema extended with the category's custom fields
    fn schema_for(&self, category_id: i64) -> Result<ManualEntrySchema> {
        let category = self
            .core
            .db
            .get_category(category_id)?
            .ok_or_else(|| AppError::NotFound(format!("asset category {}", category_id)))?;

        let custom: Vec<FieldSpec> = serde_json::from_value(category.custom_fields)?;
        let mut schema = Self::base_schema();
        schema.fields.extend(custom);
        Ok(schema)
    }

    /// Custom fields may arrive nested (`custom_fields.brand` after the
    /// payload flattening) or flat; normalize to the schema's plain names.
    fn normalize(payload: &Payload) -> Payload {
        payload
            .iter()
            .map(|(key, value)| {
                let key = key.strip_prefix(CUSTOM_PREFIX).unwrap_or(key).to_string();
                (key, value.clone())
            })
            .collect()
    }

    /// A fractional id must not silently round to a neighbouring category.
    fn category_id_of(payload: &Payload) -> std::result::Result<Option<i64>, FieldError> {
        let not_integral = || {
            FieldError::new(
                "category_id",
                "Category id must be a whole number",
                ErrorCode::InvalidNumber,
            )
        };
        match payload.get("category_id") {
            Some(crate::schema::FieldValue::Number(n)) => {
                if n.is_finite() && n.fract() == 0.0 {
                    Ok(Some(*n as i64))
                } else {
                    Err(not_integral())
                }
            }
            Some(crate::schema::FieldValue::Text(s)) if !s.trim().is_empty() => {
                s.trim().parse::<i64>().map(Some).map_err(|_| not_integral())
            }
            _ => Ok(None),
        }
    }

    /// Regroup validated custom-field values under a nested map so the
    /// stored record keeps base fields and category fields separate.
    fn nest_custom_fields(schema: &ManualEntrySchema, mut record: CanonicalRecord) -> CanonicalRecord {
        let base_names: Vec<String> = Self::base_schema()
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect();
        let custom_names: Vec<String> = schema
            .fields
            .iter()
            .filter(|f| !base_names.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();

        if custom_names.is_empty() {
            return record;
        }

        let mut custom = BTreeMap::new();
        for name in custom_names {
            if let Some(value) = record.remove(&name) {
                custom.insert(name, value);
            }
        }
        if !custom.is_empty() {
            record.insert("custom_fields".to_string(), CanonicalValue::Map(custom));
        }
        record
    }

    fn validate_payload(&self, payload: &Payload) -> Result<(ValidationResult, ManualEntrySchema)> {
        let normalized = Self::normalize(payload);
        let schema = match Self::category_id_of(&normalized) {
            Ok(Some(category_id)) => self.schema_for(category_id)?,
            Ok(None) => Self::base_schema(),
            Err(error) => {
                // Validate what we can against the base schema and report
                // the bad category id alongside any other field errors.
                let schema = Self::base_schema();
                let mut result = validation::validate(
                    &schema,
                    &normalized,
                    &[rules::debt_within_value, rules::no_far_future_dates],
                );
                result.errors.push(error);
                result.valid = false;
                return Ok((result, schema));
            }
        };
        let result = validation::validate(
            &schema,
            &normalized,
            &[rules::debt_within_value, rules::no_far_future_dates],
        );
        Ok((result, schema))
    }

    fn require_valid(&self, payload: &Payload) -> Result<CanonicalRecord> {
        let (result, schema) = self.validate_payload(payload)?;
        if !result.valid {
            self.core.metrics.record_error();
            return Err(AppError::validation(result.errors));
        }
        Ok(Self::nest_custom_fields(&schema, result.data))
    }
}

#[async_trait]
impl Plugin for MiscPlugin {
    fn name(&self) -> &'static str {
        "misc"
    }
    fn display_name(&self) -> &'static str {
        "Other Assets"
    }
    fn version(&self) -> &'static str {
        "1.0.0"
    }
    fn description(&self) -> &'static str {
        "Miscellaneous assets with category-specific custom fields"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Manual
    }
    fn data_source(&self) -> &'static str {
        "manual"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        self.core.initialize(self.name(), "other", self.data_source())
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

    fn supports_manual_entry(&self) -> bool {
        true
    }

    fn manual_entry_schema(&self) -> Result<ManualEntrySchema> {
        Ok(Self::base_schema())
    }

    fn manual_entry_schema_for_category(&self, category_id: i64) -> Result<ManualEntrySchema> {
        self.schema_for(category_id)
    }

    fn validate_manual_entry(&self, payload: &Payload) -> Result<ValidationResult> {
        self.validate_payload(payload).map(|(result, _)| result)
    }

    async fn process_manual_entry(&self, payload: Payload) -> Result<i64> {
        let record = self.require_valid(&payload)?;
        let name = record
            .get("name")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::Internal("validated record missing name".into()))?;
        let key = AccountKey::new(INSTITUTION, name);

        let outcome = write_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            &key,
            "other",
            self.data_source(),
            &record,
            None,
        )
        .await;

        match outcome {
            Ok(id) => {
                self.core.metrics.record_success();
                Ok(id)
            }
            Err(e) => {
                self.core.metrics.record_error();
                Err(e)
            }
        }
    }

    async fn update_manual_entry(&self, id: i64, payload: Payload) -> Result<()> {
        let record = self.require_valid(&payload)?;
        let outcome = super::rewrite_entry(
            &self.core.db,
            self.core.quotes.as_ref(),
            self.name(),
            id,
            &record,
            None,
        )
        .await;

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
            let value = r
                .data
                .get("current_value")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let debt = r
                .data
                .get("outstanding_debt")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            value - debt
        })
    }
}
