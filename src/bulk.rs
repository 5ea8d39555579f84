//! Bulk update coordinator
//!
//! Applies a batch of partial-field edits inside one transaction. Each item
//! is merged over the current row and re-validated in full, so a partial
//! edit cannot sneak past a cross-field invariant involving untouched
//! fields. Items fail independently; the transaction commits when at least
//! one item succeeded and rolls back otherwise.

use crate::db::{get_record_tx, update_record_tx, Database};
use crate::error::{AppError, Result};
use crate::plugins::{BulkUpdateFailure, BulkUpdateItem, BulkUpdateResult};
use crate::schema::{payload_from_stored, record_to_json, Payload};
use crate::validation::ValidationResult;
use tracing::info;

/// Run a bulk update for one plugin's records.
///
/// `validate` must be pure (no storage access): the connection lock is held
/// for the duration of the transaction.
pub fn execute(
    db: &Database,
    plugin: &str,
    validate: &dyn Fn(&Payload) -> ValidationResult,
    items: &[BulkUpdateItem],
) -> Result<BulkUpdateResult> {
    // An empty batch is a no-op, not a failure.
    if items.is_empty() {
        return Ok(BulkUpdateResult {
            success_count: 0,
            failure_count: 0,
            failures: Vec::new(),
        });
    }

    let mut conn = db.lock();
    let tx = conn.transaction()?;

    let mut failures: Vec<BulkUpdateFailure> = Vec::new();
    let mut success_count = 0usize;

    for item in items {
        let record = match get_record_tx(&tx, plugin, item.id)? {
            Some(record) => record,
            None => {
                failures.push(BulkUpdateFailure {
                    id: item.id,
                    error: "record not found".to_string(),
                    fields: Vec::new(),
                });
                continue;
            }
        };

        // Reconstruct the full payload: current row first, changes win.
        let mut merged = payload_from_stored(&record.data);
        for (key, value) in &item.changes {
            merged.insert(key.clone(), value.clone());
        }

        let result = validate(&merged);
        if !result.valid {
            let fields = result.errors.iter().map(|e| e.field.clone()).collect();
            let message = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            failures.push(BulkUpdateFailure {
                id: item.id,
                error: message,
                fields,
            });
            continue;
        }

        // An edited symbol must be stored so later refreshes quote the new
        // one; the price itself catches up on the next refresh.
        let quote_symbol = result
            .data
            .get("symbol")
            .and_then(|v| v.as_text())
            .map(|s| s.to_string())
            .or_else(|| record.quote_symbol.clone());

        let data = record_to_json(&result.data);
        let affected =
            update_record_tx(&tx, plugin, item.id, &data, quote_symbol.as_deref(), None)?;
        if affected == 0 {
            // Row vanished between fetch and write.
            failures.push(BulkUpdateFailure {
                id: item.id,
                error: "record disappeared during update".to_string(),
                fields: Vec::new(),
            });
            continue;
        }

        success_count += 1;
    }

    if success_count == 0 {
        tx.rollback()?;
        return Err(AppError::Plugin(format!(
            "bulk update for plugin '{}' failed for all {} items",
            plugin,
            items.len()
        )));
    }

    tx.commit()?;
    info!(
        plugin,
        success = success_count,
        failed = failures.len(),
        "bulk update committed"
    );

    Ok(BulkUpdateResult {
        success_count,
        failure_count: failures.len(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewRecord;
    use crate::schema::{payload_from_json, FieldSpec, FieldType, ManualEntrySchema};
    use crate::validation::{self, rules};
    use serde_json::json;

    fn grant_schema() -> ManualEntrySchema {
        ManualEntrySchema::new(
            "equity",
            vec![
                FieldSpec::new("grant_name", FieldType::Text, "Grant Name").required(),
                FieldSpec::new("total_shares", FieldType::Number, "Total Shares")
                    .required()
                    .min(0.0),
                FieldSpec::new("vested_shares", FieldType::Number, "Vested Shares")
                    .required()
                    .min(0.0),
            ],
        )
    }

    fn validate_grant(payload: &Payload) -> ValidationResult {
        validation::validate(&grant_schema(), payload, &[rules::vested_within_total])
    }

    fn seed(db: &Database, name: &str, total: f64, vested: f64) -> i64 {
        db.insert_account_if_absent("equity", "Acme", "Grants", "equity", "manual")
            .unwrap();
        let account = db
            .find_account("equity", "Acme", "Grants", "manual")
            .unwrap()
            .unwrap();
        db.insert_record(&NewRecord {
            plugin: "equity",
            account_id: account.id,
            data: &json!({
                "grant_name": name,
                "total_shares": total,
                "vested_shares": vested,
                "unvested_shares": total - vested,
            }),
            quote_symbol: None,
            last_price: 0.0,
        })
        .unwrap()
    }

    fn changes(value: serde_json::Value) -> Payload {
        payload_from_json(value.as_object().unwrap())
    }

    #[test]
    fn test_partial_failure_commits_the_rest() {
        let db = Database::in_memory().unwrap();
        let first = seed(&db, "2022 Grant", 1000.0, 200.0);
        let third = seed(&db, "2023 Grant", 500.0, 0.0);

        let items = vec![
            BulkUpdateItem {
                id: first,
                changes: changes(json!({"vested_shares": 300})),
            },
            BulkUpdateItem {
                id: 9999,
                changes: changes(json!({"vested_shares": 10})),
            },
            BulkUpdateItem {
                id: third,
                changes: changes(json!({"vested_shares": 125})),
            },
        ];

        let result = execute(&db, "equity", &validate_grant, &items).unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failures[0].id, 9999);
        assert!(result.failures[0].error.contains("not found"));

        // The two valid changes are durably committed.
        let record = db.get_record("equity", first).unwrap().unwrap();
        assert_eq!(record.data["vested_shares"], json!(300.0));
        assert_eq!(record.data["unvested_shares"], json!(700.0));
        let record = db.get_record("equity", third).unwrap().unwrap();
        assert_eq!(record.data["vested_shares"], json!(125.0));
    }

    #[test]
    fn test_total_failure_rolls_back_and_errors() {
        let db = Database::in_memory().unwrap();
        let existing = seed(&db, "2022 Grant", 1000.0, 200.0);

        let items = vec![
            BulkUpdateItem {
                id: 111,
                changes: changes(json!({"vested_shares": 1})),
            },
            BulkUpdateItem {
                id: 222,
                changes: changes(json!({"vested_shares": 2})),
            },
            BulkUpdateItem {
                id: 333,
                changes: changes(json!({"vested_shares": 3})),
            },
        ];

        let result = execute(&db, "equity", &validate_grant, &items);
        assert!(result.is_err());

        // Untouched record unchanged.
        let record = db.get_record("equity", existing).unwrap().unwrap();
        assert_eq!(record.data["vested_shares"], json!(200.0));
    }

    #[test]
    fn test_merged_record_revalidated_against_cross_field_rule() {
        let db = Database::in_memory().unwrap();
        let id = seed(&db, "2022 Grant", 1000.0, 200.0);
        let other = seed(&db, "2023 Grant", 500.0, 0.0);

        // 1100 vested against the stored total of 1000 must fail even
        // though total_shares itself is untouched.
        let items = vec![
            BulkUpdateItem {
                id,
                changes: changes(json!({"vested_shares": 1100})),
            },
            BulkUpdateItem {
                id: other,
                changes: changes(json!({"vested_shares": 50})),
            },
        ];

        let result = execute(&db, "equity", &validate_grant, &items).unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failures[0].id, id);
        assert!(result.failures[0].fields.contains(&"vested_shares".to_string()));

        let record = db.get_record("equity", id).unwrap().unwrap();
        assert_eq!(record.data["vested_shares"], json!(200.0));
    }

    #[test]
    fn test_empty_batch_is_a_successful_no_op() {
        let db = Database::in_memory().unwrap();
        let existing = seed(&db, "2022 Grant", 1000.0, 200.0);

        let result = execute(&db, "equity", &validate_grant, &[]).unwrap();
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failure_count, 0);
        assert!(result.failures.is_empty());

        let record = db.get_record("equity", existing).unwrap().unwrap();
        assert_eq!(record.data["vested_shares"], json!(200.0));
    }

    #[test]
    fn test_symbol_edit_rewrites_quote_symbol() {
        let db = Database::in_memory().unwrap();
        db.insert_account_if_absent("stocks", "Vanguard", "AAPL", "brokerage", "manual")
            .unwrap();
        let account = db
            .find_account("stocks", "Vanguard", "AAPL", "manual")
            .unwrap()
            .unwrap();
        let id = db
            .insert_record(&NewRecord {
                plugin: "stocks",
                account_id: account.id,
                data: &json!({"symbol": "AAPL", "quantity": 10.0}),
                quote_symbol: Some("AAPL"),
                last_price: 200.0,
            })
            .unwrap();

        let schema = ManualEntrySchema::new(
            "stocks",
            vec![
                FieldSpec::new("symbol", FieldType::Text, "Symbol").required(),
                FieldSpec::new("quantity", FieldType::Number, "Quantity")
                    .required()
                    .min(0.0),
            ],
        );
        let validate = move |payload: &Payload| validation::validate(&schema, payload, &[]);

        let items = vec![BulkUpdateItem {
            id,
            changes: changes(json!({"symbol": "MSFT"})),
        }];
        let result = execute(&db, "stocks", &validate, &items).unwrap();
        assert_eq!(result.success_count, 1);

        let record = db.get_record("stocks", id).unwrap().unwrap();
        assert_eq!(record.quote_symbol.as_deref(), Some("MSFT"));
        assert_eq!(record.data["symbol"], json!("MSFT"));
    }

    #[test]
    fn test_failures_correlate_by_id() {
        let db = Database::in_memory().unwrap();
        let good = seed(&db, "2022 Grant", 1000.0, 200.0);

        let items = vec![
            BulkUpdateItem {
                id: 777,
                changes: changes(json!({"vested_shares": 5})),
            },
            BulkUpdateItem {
                id: good,
                changes: changes(json!({"vested_shares": 250})),
            },
        ];

        let result = execute(&db, "equity", &validate_grant, &items).unwrap();
        let failed_ids: Vec<i64> = result.failures.iter().map(|f| f.id).collect();
        assert_eq!(failed_ids, vec![777]);
    }
}
