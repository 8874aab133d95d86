//! Legacy on-disk format upgrade.
//!
//! Early builds stored binary values as base64 TEXT. Current schemas use raw
//! BLOBs throughout. The `versions` table records, per table, which data
//! format its rows use: absent or 0 means base64 text, 1 means raw bytes.
//! The upgrade rewrites affected rows in one transaction and bumps the
//! recorded versions, so it runs exactly once per database.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sqlx::Row;
use tracing::info;

use crate::db::Store;
use crate::error::StoreError;

const RAW_BYTES_VERSION: i64 = 1;

/// Tables with binary columns, with the columns to rewrite.
const BINARY_TABLES: &[(&str, &[&str])] = &[
    ("trustchain", &["hash", "author", "payload", "signature"]),
    ("trustchain_indexes", &["resource_id", "hash"]),
    ("contacts", &["user_id", "last_user_key"]),
    (
        "devices",
        &["id", "user_id", "public_signature_key", "public_encryption_key"],
    ),
    ("user_keys", &["public_encryption_key", "private_encryption_key"]),
    ("resource_keys", &["resource_id", "symmetric_key"]),
    (
        "provisional_user_keys",
        &[
            "app_public_signature_key",
            "provider_public_signature_key",
            "app_public_encryption_key",
            "app_private_encryption_key",
            "provider_public_encryption_key",
            "provider_private_encryption_key",
        ],
    ),
];

pub async fn upgrade(store: &Store) -> Result<(), StoreError> {
    let mut tx = store.pool().begin().await?;

    for (table, columns) in BINARY_TABLES {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM versions WHERE name = ?")
                .bind(table)
                .fetch_optional(&mut *tx)
                .await?;

        let is_empty: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
            .fetch_one(&mut *tx)
            .await?;

        match version {
            Some(v) if v >= RAW_BYTES_VERSION => continue,
            // No recorded version and no rows: a fresh table, just stamp it.
            None if is_empty == 0 => {}
            _ => {
                info!(table, "upgrading base64 columns to raw bytes");
                rewrite_table(&mut tx, table, columns).await?;
            }
        }

        sqlx::query("INSERT OR REPLACE INTO versions (name, version) VALUES (?, ?)")
            .bind(table)
            .bind(RAW_BYTES_VERSION)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn rewrite_table(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    columns: &[&str],
) -> Result<(), StoreError> {
    let column_list = columns.join(", ");
    let rows = sqlx::query(&format!("SELECT rowid, {column_list} FROM \"{table}\""))
        .fetch_all(&mut **tx)
        .await?;

    for row in rows {
        let rowid: i64 = row.get("rowid");
        for column in columns {
            // NULLs (optional columns) and non-text values stay untouched;
            // SQLite columns are dynamically typed so pre-upgrade rows hold
            // TEXT where post-upgrade rows hold BLOBs.
            let Ok(text) = row.try_get::<String, _>(*column) else {
                continue;
            };
            let bytes = STANDARD.decode(text.as_bytes()).map_err(|e| {
                StoreError::Corrupt(format!("{table}.{column} is not valid base64: {e}"))
            })?;
            sqlx::query(&format!("UPDATE \"{table}\" SET {column} = ? WHERE rowid = ?"))
                .bind(bytes)
                .bind(rowid)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}
