//! Asset record queries

use super::models::AssetRecord;
use crate::error::Result;
use rusqlite::{params, Connection};

pub struct NewRecord<'a> {
    pub plugin: &'a str,
    pub account_id: i64,
    pub data: &'a serde_json::Value,
    pub quote_symbol: Option<&'a str>,
    pub last_price: f64,
}

/// Insert a canonical record, returning its id
pub fn insert_record(conn: &Connection, record: &NewRecord<'_>) -> Result<i64> {
    let price_updated_at = if record.last_price > 0.0 {
        Some(chrono::Utc::now().to_rfc3339())
    } else {
        None
    };

    conn.execute(
        "INSERT INTO asset_records (plugin, account_id, data, quote_symbol, last_price, price_updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.plugin,
            record.account_id,
            record.data.to_string(),
            record.quote_symbol,
            record.last_price,
            price_updated_at,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Fetch one record by id, scoped to a plugin
pub fn get_record(conn: &Connection, plugin: &str, id: i64) -> Result<Option<AssetRecord>> {
    let result = conn.query_row(
        "SELECT id, plugin, account_id, data, quote_symbol, last_price, price_updated_at,
                created_at, updated_at
         FROM asset_records WHERE id = ?1 AND plugin = ?2",
        params![id, plugin],
        map_record,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Overwrite a record's data and quote symbol (and optionally its price),
/// returning the number of rows affected.
///
/// The symbol is always rewritten: an update that changes a holding's
/// symbol must retarget later price refreshes, not keep pricing the old
/// one. A zero price clears the price timestamp so the record reads as
/// never priced under the new symbol.
pub fn update_record(
    conn: &Connection,
    plugin: &str,
    id: i64,
    data: &serde_json::Value,
    quote_symbol: Option<&str>,
    last_price: Option<f64>,
) -> Result<usize> {
    let affected = match last_price {
        Some(price) => {
            let price_updated_at = if price > 0.0 {
                Some(chrono::Utc::now().to_rfc3339())
            } else {
                None
            };
            conn.execute(
                "UPDATE asset_records
                 SET data = ?1, quote_symbol = ?2, last_price = ?3, price_updated_at = ?4,
                     updated_at = datetime('now')
                 WHERE id = ?5 AND plugin = ?6",
                params![
                    data.to_string(),
                    quote_symbol,
                    price,
                    price_updated_at,
                    id,
                    plugin
                ],
            )?
        }
        None => conn.execute(
            "UPDATE asset_records SET data = ?1, quote_symbol = ?2, updated_at = datetime('now')
             WHERE id = ?3 AND plugin = ?4",
            params![data.to_string(), quote_symbol, id, plugin],
        )?,
    };
    Ok(affected)
}

/// Update only the cached price on a record
pub fn update_record_price(conn: &Connection, id: i64, price: f64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE asset_records
         SET last_price = ?1, price_updated_at = datetime('now'), updated_at = datetime('now')
         WHERE id = ?2",
        params![price, id],
    )?;
    Ok(affected)
}

/// List all records owned by one plugin
pub fn list_records(conn: &Connection, plugin: &str) -> Result<Vec<AssetRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, plugin, account_id, data, quote_symbol, last_price, price_updated_at,
                created_at, updated_at
         FROM asset_records WHERE plugin = ?1 ORDER BY id",
    )?;

    let records = stmt
        .query_map([plugin], map_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Delete one record, returning whether a row was removed
pub fn delete_record(conn: &Connection, plugin: &str, id: i64) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM asset_records WHERE id = ?1 AND plugin = ?2",
        params![id, plugin],
    )?;
    Ok(affected > 0)
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetRecord> {
    let raw: String = row.get(3)?;
    let data = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
    Ok(AssetRecord {
        id: row.get(0)?,
        plugin: row.get(1)?,
        account_id: row.get(2)?,
        data,
        quote_symbol: row.get(4)?,
        last_price: row.get(5)?,
        price_updated_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
