//! Asset category queries (misc plugin custom fields)

use super::models::AssetCategory;
use crate::error::Result;
use rusqlite::{params, Connection};

pub fn get_category(conn: &Connection, id: i64) -> Result<Option<AssetCategory>> {
    let result = conn.query_row(
        "SELECT id, name, icon, custom_fields FROM asset_categories WHERE id = ?1",
        params![id],
        map_category,
    );

    match result {
        Ok(category) => Ok(Some(category)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn create_category(
    conn: &Connection,
    name: &str,
    icon: Option<&str>,
    custom_fields: &serde_json::Value,
) -> Result<AssetCategory> {
    conn.execute(
        "INSERT INTO asset_categories (name, icon, custom_fields) VALUES (?1, ?2, ?3)",
        params![name, icon, custom_fields.to_string()],
    )?;

    let id = conn.last_insert_rowid();
    Ok(AssetCategory {
        id,
        name: name.to_string(),
        icon: icon.map(|s| s.to_string()),
        custom_fields: custom_fields.clone(),
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<AssetCategory>> {
    let mut stmt =
        conn.prepare("SELECT id, name, icon, custom_fields FROM asset_categories ORDER BY name")?;

    let categories = stmt
        .query_map([], map_category)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(categories)
}

fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetCategory> {
    let raw: String = row.get(3)?;
    let custom_fields =
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::Array(Vec::new()));
    Ok(AssetCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        custom_fields,
    })
}
