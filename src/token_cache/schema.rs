//! SQLite schema for the shared token cache.

use anyhow::{bail, Result};
use rusqlite::Connection;
use tracing::info;

/// Offset added to `PRAGMA user_version`, so a file created by something else
/// is not mistaken for a token cache.
pub const BASE_DB_VERSION: i64 = 77_000;

pub const TOKEN_CACHE_SCHEMA_VERSION: i64 = 2;

const CREATE_TOKEN_CACHE_TABLE_V1: &str = "CREATE TABLE IF NOT EXISTS token_cache (
    tenant_id TEXT PRIMARY KEY,
    token TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int))
)";

/// At most one holder per tenant may be talking to the identity endpoint.
const CREATE_MINT_LEASE_TABLE_V2: &str = "CREATE TABLE IF NOT EXISTS mint_lease (
    tenant_id TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
)";

/// Creates the schema on a fresh file, upgrades an older one, or rejects a
/// file whose version is unknown.
///
/// Safe to run concurrently from several processes opening the same file.
pub fn ensure_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let raw_version: i64 = tx.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

    let version = if raw_version == 0 {
        tx.execute(CREATE_TOKEN_CACHE_TABLE_V1, [])?;
        1
    } else {
        raw_version - BASE_DB_VERSION
    };
    if !(1..=TOKEN_CACHE_SCHEMA_VERSION).contains(&version) {
        bail!(
            "Token cache database version {} is not supported (expected at most {})",
            version,
            TOKEN_CACHE_SCHEMA_VERSION
        );
    }

    if version < 2 {
        if raw_version != 0 {
            info!("Migrating token cache schema from version {} to 2", version);
        }
        tx.execute(CREATE_MINT_LEASE_TABLE_V2, [])?;
    }
    if version < TOKEN_CACHE_SCHEMA_VERSION {
        tx.execute(
            &format!(
                "PRAGMA user_version = {}",
                BASE_DB_VERSION + TOKEN_CACHE_SCHEMA_VERSION
            ),
            [],
        )?;
    }

    tx.commit()?;
    Ok(())
}
