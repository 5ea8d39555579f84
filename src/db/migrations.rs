//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_accounts", CREATE_ACCOUNTS_TABLE)?;
    run_migration(conn, "002_asset_records", CREATE_ASSET_RECORDS_TABLE)?;
    run_migration(conn, "003_asset_categories", CREATE_ASSET_CATEGORIES_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

// The UNIQUE constraint backs the account resolver's find-or-create:
// concurrent identical submissions cannot create duplicate accounts.
const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plugin TEXT NOT NULL,
    institution TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    data_source TEXT NOT NULL,
    external_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(plugin, institution, name, data_source)
);
CREATE INDEX IF NOT EXISTS idx_accounts_plugin ON accounts(plugin);
"#;

const CREATE_ASSET_RECORDS_TABLE: &str = r#"
CREATE TABLE asset_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plugin TEXT NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    data TEXT NOT NULL,
    quote_symbol TEXT,
    last_price REAL NOT NULL DEFAULT 0,
    price_updated_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_asset_records_plugin ON asset_records(plugin);
CREATE INDEX IF NOT EXISTS idx_asset_records_account ON asset_records(account_id);
"#;

const CREATE_ASSET_CATEGORIES_TABLE: &str = r#"
CREATE TABLE asset_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    icon TEXT,
    custom_fields TEXT NOT NULL DEFAULT '[]'
);
"#;
