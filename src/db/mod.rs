//! SQLite storage module
//!
//! One connection behind a mutex; the per-area query modules take a plain
//! `&Connection` so they compose inside the bulk coordinator's transaction.

mod accounts;
mod categories;
mod migrations;
pub mod models;
mod records;

pub use records::NewRecord;

use crate::error::Result;
use models::{Account, AssetCategory, AssetRecord};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    /// Exclusive access to the underlying connection.
    ///
    /// The bulk coordinator holds this across its whole transaction.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    // ========== Account Methods ==========

    pub fn find_account(
        &self,
        plugin: &str,
        institution: &str,
        name: &str,
        data_source: &str,
    ) -> Result<Option<Account>> {
        let conn = self.conn.lock();
        accounts::find_account(&conn, plugin, institution, name, data_source)
    }

    pub fn insert_account_if_absent(
        &self,
        plugin: &str,
        institution: &str,
        name: &str,
        kind: &str,
        data_source: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        accounts::insert_account_if_absent(&conn, plugin, institution, name, kind, data_source)
    }

    pub fn list_accounts(&self, plugin: &str) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        accounts::list_accounts(&conn, plugin)
    }

    // ========== Record Methods ==========

    pub fn insert_record(&self, record: &NewRecord<'_>) -> Result<i64> {
        let conn = self.conn.lock();
        records::insert_record(&conn, record)
    }

    pub fn get_record(&self, plugin: &str, id: i64) -> Result<Option<AssetRecord>> {
        let conn = self.conn.lock();
        records::get_record(&conn, plugin, id)
    }

    pub fn update_record(
        &self,
        plugin: &str,
        id: i64,
        data: &serde_json::Value,
        quote_symbol: Option<&str>,
        last_price: Option<f64>,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        records::update_record(&conn, plugin, id, data, quote_symbol, last_price)
    }

    pub fn update_record_price(&self, id: i64, price: f64) -> Result<usize> {
        let conn = self.conn.lock();
        records::update_record_price(&conn, id, price)
    }

    pub fn list_records(&self, plugin: &str) -> Result<Vec<AssetRecord>> {
        let conn = self.conn.lock();
        records::list_records(&conn, plugin)
    }

    pub fn delete_record(&self, plugin: &str, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        records::delete_record(&conn, plugin, id)
    }

    // ========== Category Methods ==========

    pub fn get_category(&self, id: i64) -> Result<Option<AssetCategory>> {
        let conn = self.conn.lock();
        categories::get_category(&conn, id)
    }

    pub fn create_category(
        &self,
        name: &str,
        icon: Option<&str>,
        custom_fields: &serde_json::Value,
    ) -> Result<AssetCategory> {
        let conn = self.conn.lock();
        categories::create_category(&conn, name, icon, custom_fields)
    }

    pub fn list_categories(&self) -> Result<Vec<AssetCategory>> {
        let conn = self.conn.lock();
        categories::list_categories(&conn)
    }
}

// Re-export the per-area query functions for transaction-scoped callers.
pub(crate) use records::{get_record as get_record_tx, update_record as update_record_tx};
