//! Database handle over SQLite via sqlx.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::contact_store::ContactStore;
use crate::error::StoreError;
use crate::group_store::GroupStore;
use crate::legacy;
use crate::local_user_store::LocalUserStore;
use crate::provisional_user_key_store::ProvisionalUserKeyStore;
use crate::resource_key_store::ResourceKeyStore;
use crate::trustchain_store::TrustchainStore;

/// Central store handle. Cheap to clone (pool is Arc internally).
///
/// The pool is capped at one connection: the session is the single writer,
/// and SQLite serializes anyway. WAL and foreign keys are configured at
/// connection time, not in a migration, because SQLite refuses to switch
/// journal modes inside a transaction and sqlx wraps every migration in one.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `db_path`, run pending migrations,
    /// then run the legacy base64-to-blob upgrade if the on-disk data
    /// predates raw binary columns.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        Self::open_with(opts).await
    }

    /// Fully in-memory database, for tests and ephemeral sessions. The
    /// single connection must never be recycled: a fresh connection would
    /// be a fresh, empty database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?
            .foreign_keys(true);
        Self::open_with(opts).await
    }

    async fn open_with(opts: SqliteConnectOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let store = Self { pool };
        legacy::upgrade(&store).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── Typed views ──────────────────────────────────────────────────────────

    pub fn contacts(&self) -> ContactStore {
        ContactStore::new(self.clone())
    }

    pub fn local_user(&self) -> LocalUserStore {
        LocalUserStore::new(self.clone())
    }

    pub fn groups(&self) -> GroupStore {
        GroupStore::new(self.clone())
    }

    pub fn resource_keys(&self) -> ResourceKeyStore {
        ResourceKeyStore::new(self.clone())
    }

    pub fn provisional_user_keys(&self) -> ProvisionalUserKeyStore {
        ProvisionalUserKeyStore::new(self.clone())
    }

    pub fn trustchain(&self) -> TrustchainStore {
        TrustchainStore::new(self.clone())
    }
}

/// Convert a BLOB column into a fixed-size type.
pub(crate) fn blob<T>(bytes: &[u8]) -> Result<T, StoreError>
where
    T: for<'a> TryFrom<&'a [u8], Error = cv_crypto::CryptoError>,
{
    T::try_from(bytes).map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::Store;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let store = Store::open_in_memory().await.expect("open store");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource_keys")
            .fetch_one(store.pool())
            .await
            .expect("query empty table");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn open_on_disk_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covault.db");
        {
            let store = Store::open(&path).await.expect("first open");
            sqlx::query("INSERT INTO resource_keys (resource_id, symmetric_key) VALUES (?, ?)")
                .bind(vec![1u8; 16])
                .bind(vec![2u8; 32])
                .execute(store.pool())
                .await
                .expect("insert");
        }
        let store = Store::open(&path).await.expect("reopen");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource_keys")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
