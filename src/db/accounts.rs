//! Account identity queries

use super::models::Account;
use crate::error::Result;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Find an account by its logical identifying tuple
pub fn find_account(
    conn: &Connection,
    plugin: &str,
    institution: &str,
    name: &str,
    data_source: &str,
) -> Result<Option<Account>> {
    let result = conn.query_row(
        "SELECT id, plugin, institution, name, kind, data_source, external_id, created_at
         FROM accounts
         WHERE plugin = ?1 AND institution = ?2 AND name = ?3 AND data_source = ?4",
        params![plugin, institution, name, data_source],
        map_account,
    );

    match result {
        Ok(account) => Ok(Some(account)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert an account row for the tuple if none exists.
///
/// `ON CONFLICT DO NOTHING` plus the table's UNIQUE constraint makes a
/// concurrent identical insert harmless; the caller re-selects afterwards.
pub fn insert_account_if_absent(
    conn: &Connection,
    plugin: &str,
    institution: &str,
    name: &str,
    kind: &str,
    data_source: &str,
) -> Result<()> {
    let external_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO accounts (plugin, institution, name, kind, data_source, external_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(plugin, institution, name, data_source) DO NOTHING",
        params![plugin, institution, name, kind, data_source, external_id],
    )?;
    Ok(())
}

/// List all accounts owned by one plugin
pub fn list_accounts(conn: &Connection, plugin: &str) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, plugin, institution, name, kind, data_source, external_id, created_at
         FROM accounts WHERE plugin = ?1 ORDER BY institution, name",
    )?;

    let accounts = stmt
        .query_map([plugin], map_account)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(accounts)
}

fn map_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        plugin: row.get(1)?,
        institution: row.get(2)?,
        name: row.get(3)?,
        kind: row.get(4)?,
        data_source: row.get(5)?,
        external_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}
