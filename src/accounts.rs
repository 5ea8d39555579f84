//! Account resolution
//!
//! Every submitted record attaches to a deduplicated logical account
//! identified by (plugin, institution, name, data source). Repeated
//! submissions for the same holding must land on the same account row.

use crate::db::Database;
use crate::error::{AppError, Result};
use tracing::info;

/// The logical identifying tuple for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub institution: String,
    pub name: String,
}

impl AccountKey {
    pub fn new(institution: &str, name: &str) -> Self {
        Self {
            institution: institution.to_string(),
            name: name.to_string(),
        }
    }
}

/// Find or create the account for `key`, returning its id.
///
/// Lookup then insert-if-absent; the accounts table's UNIQUE constraint
/// makes the insert a no-op when a concurrent identical submission got
/// there first, and the re-select picks up whichever row won.
pub fn resolve(
    db: &Database,
    plugin: &str,
    key: &AccountKey,
    kind: &str,
    data_source: &str,
) -> Result<i64> {
    if let Some(account) = db.find_account(plugin, &key.institution, &key.name, data_source)? {
        return Ok(account.id);
    }

    db.insert_account_if_absent(plugin, &key.institution, &key.name, kind, data_source)?;

    let account = db
        .find_account(plugin, &key.institution, &key.name, data_source)?
        .ok_or_else(|| {
            AppError::Internal(format!(
                "account for {}/{} disappeared after insert",
                key.institution, key.name
            ))
        })?;

    info!(
        plugin,
        institution = %key.institution,
        account = %key.name,
        id = account.id,
        "created account"
    );

    Ok(account.id)
}
