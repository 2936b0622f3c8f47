use super::schema::ensure_schema;
use super::{CachedToken, TokenCache, TokenCacheError};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Token cache stored in a SQLite file.
///
/// Every process that opens the same file observes the same credential state,
/// which is what the multi-process execution mode relies on.
pub struct SqliteTokenCache {
    conn: Mutex<Connection>,
}

impl SqliteTokenCache {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open token cache database {:?}", path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            info!("Token cache at {:?} running with journal mode {}", path, mode);
        }
        ensure_schema(&mut conn).context("Failed to prepare token cache schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Raw entry lookup without expiry checks.
    pub fn peek(&self, tenant_id: &str) -> Result<Option<CachedToken>, TokenCacheError> {
        let conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT token, expires_at_ms FROM token_cache WHERE tenant_id = ?1",
                params![tenant_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(token, expires_at_ms)| CachedToken {
            token,
            expires_at: from_millis(expires_at_ms),
        }))
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl TokenCache for SqliteTokenCache {
    fn get(&self, tenant_id: &str) -> Result<Option<String>, TokenCacheError> {
        let mut conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        let now_ms = Utc::now().timestamp_millis();

        // Evict and read under one write lock so no other process interleaves
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let evicted = tx.execute(
            "DELETE FROM token_cache WHERE tenant_id = ?1 AND expires_at_ms <= ?2",
            params![tenant_id, now_ms],
        )?;
        let token = tx
            .query_row(
                "SELECT token FROM token_cache WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        tx.commit()?;

        if evicted > 0 {
            info!("[{}] Expired token evicted from cache", tenant_id);
        }
        Ok(token)
    }

    fn set(
        &self,
        tenant_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenCacheError> {
        let conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        conn.execute(
            "INSERT INTO token_cache (tenant_id, token, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET
                token = excluded.token,
                expires_at_ms = excluded.expires_at_ms,
                updated_at = cast(strftime('%s','now') as int)",
            params![tenant_id, token, expires_at.timestamp_millis()],
        )?;
        let ttl = (expires_at - Utc::now()).num_seconds();
        info!("[{}] Token stored (expires in {}s)", tenant_id, ttl);
        Ok(())
    }

    fn invalidate(&self, tenant_id: &str) -> Result<(), TokenCacheError> {
        let conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        let removed = conn.execute(
            "DELETE FROM token_cache WHERE tenant_id = ?1",
            params![tenant_id],
        )?;
        if removed > 0 {
            info!("[{}] Token removed from cache", tenant_id);
        }
        Ok(())
    }

    fn try_lease(
        &self,
        tenant_id: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, TokenCacheError> {
        let conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        // The upsert only overwrites an expired lease or one we already hold
        let claimed = conn.execute(
            "INSERT INTO mint_lease (tenant_id, holder, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET
                holder = excluded.holder,
                expires_at_ms = excluded.expires_at_ms
             WHERE mint_lease.expires_at_ms <= ?4 OR mint_lease.holder = excluded.holder",
            params![
                tenant_id,
                holder,
                expires_at.timestamp_millis(),
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(claimed > 0)
    }

    fn release_lease(&self, tenant_id: &str, holder: &str) -> Result<(), TokenCacheError> {
        let conn = self.conn.lock().map_err(|_| TokenCacheError::Poisoned)?;
        conn.execute(
            "DELETE FROM mint_lease WHERE tenant_id = ?1 AND holder = ?2",
            params![tenant_id, holder],
        )?;
        Ok(())
    }
}
