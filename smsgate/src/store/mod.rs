//! SQLite-backed message store.
//!
//! A single append-only `messages` table keyed by `message_id`. The primary
//! key constraint is the only mechanism that makes ingestion idempotent: a
//! repeated insert fails inside SQLite and is reported as a duplicate.
//!
//! ```text
//! insert ──► INSERT INTO messages ──► Created
//!                     │
//!                     └─ unique violation ──► Duplicate
//! ```

pub mod query;
pub mod stats;
pub mod types;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::util::format_ts;

pub use query::{MessageFilter, Pagination, QueryError, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use stats::TOP_SENDERS_LIMIT;
pub use types::{InsertOutcome, Message, Page, SenderCount, Stats, StoredMessage};

/// Schema statements, applied in order. Each one is idempotent.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id  TEXT PRIMARY KEY,
        from_msisdn TEXT NOT NULL,
        to_msisdn   TEXT NOT NULL,
        ts          TEXT NOT NULL,
        text        TEXT,
        created_at  TEXT NOT NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages (ts);",
    "CREATE INDEX IF NOT EXISTS idx_messages_from ON messages (from_msisdn);",
];

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported database url {0:?}: only sqlite is supported")]
    UnsupportedUrl(String),

    #[error("failed to create database directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row {message_id}: {reason}")]
    CorruptRow { message_id: String, reason: String },
}

/// Handle to the message database. Cheap to clone.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Open (and create if missing) the SQLite database behind `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let path = sqlite_path(database_url)?;

        if let Some(parent) = path.as_ref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // Every pooled connection to an in-memory database would see its own
        // copy, so keep exactly one alive.
        let (max_connections, pool_options) = match path {
            Some(_) => {
                let max = max_connections.max(1);
                (max, SqlitePoolOptions::new().max_connections(max))
            }
            None => (
                1,
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None),
            ),
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        info!(
            in_memory = path.is_none(),
            max_connections = max_connections,
            "database_connected"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in MIGRATIONS {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!(statements = MIGRATIONS.len(), "database_migrated");
        Ok(())
    }

    /// Round-trip a trivial query. Used by the readiness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a message unless its `message_id` is already stored.
    ///
    /// The existence check and the write are one statement, so concurrent
    /// inserts of the same id produce exactly one `Created`.
    pub async fn insert(&self, message: &Message) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (message_id, from_msisdn, to_msisdn, ts, text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.message_id)
        .bind(&message.from_msisdn)
        .bind(&message.to_msisdn)
        .bind(format_ts(message.ts))
        .bind(message.text.as_deref())
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(message_id = %message.message_id, "message_already_stored");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database_closed");
    }
}

/// Extract the filesystem path from a sqlite URL. `None` means in-memory.
fn sqlite_path(database_url: &str) -> Result<Option<PathBuf>, StoreError> {
    let rest = database_url
        .strip_prefix("sqlite:")
        .ok_or_else(|| StoreError::UnsupportedUrl(database_url.to_string()))?;

    let rest = rest.trim_start_matches("//");
    let rest = rest.split('?').next().unwrap_or_default();

    if rest.is_empty() || rest == ":memory:" {
        return Ok(None);
    }

    Ok(Some(PathBuf::from(rest)))
}


#[cfg(test)]
mod tests {
    use super::test_support::{message, temp_store};
    use super::*;

    async fn row_count(store: &MessageStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[test]
    fn test_sqlite_path() {
        assert_eq!(
            sqlite_path("sqlite:///tmp/app.db").unwrap(),
            Some(PathBuf::from("/tmp/app.db"))
        );
        assert_eq!(
            sqlite_path("sqlite://./data/app.db").unwrap(),
            Some(PathBuf::from("./data/app.db"))
        );
        assert_eq!(
            sqlite_path("sqlite:app.db?mode=rwc").unwrap(),
            Some(PathBuf::from("app.db"))
        );
        assert_eq!(sqlite_path("sqlite::memory:").unwrap(), None);
        assert!(matches!(
            sqlite_path("postgres://localhost/db"),
            Err(StoreError::UnsupportedUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("app.db");
        let url = format!("sqlite://{}", nested.display());

        let store = MessageStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();

        assert!(nested.exists());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, store) = temp_store().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='messages'",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["messages".to_string()]);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = MessageStore::connect("sqlite::memory:", 8).await.unwrap();
        store.migrate().await.unwrap();

        let msg = message("m1", "+15551234", "+15559999", "2024-01-01T00:00:00Z");
        assert_eq!(store.insert(&msg).await.unwrap(), InsertOutcome::Created);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let (_dir, store) = temp_store().await;
        let msg = message("m1", "+15551234", "+15559999", "2024-01-01T00:00:00Z");

        assert_eq!(store.insert(&msg).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert(&msg).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_does_not_mutate_existing_row() {
        let (_dir, store) = temp_store().await;
        let original = message("m1", "+15551234", "+15559999", "2024-01-01T00:00:00Z");
        store.insert(&original).await.unwrap();

        let mut changed = message("m1", "+19998887", "+10000000", "2025-01-01T00:00:00Z");
        changed.text = None;
        assert_eq!(store.insert(&changed).await.unwrap(), InsertOutcome::Duplicate);

        let (from, text): (String, Option<String>) =
            sqlx::query_as("SELECT from_msisdn, text FROM messages WHERE message_id = 'm1'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(from, "+15551234");
        assert_eq!(text.as_deref(), Some("text for m1"));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_create_once() {
        let (_dir, store) = temp_store().await;
        let msg = message("race", "+15551234", "+15559999", "2024-01-01T00:00:00Z");

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let msg = msg.clone();
            tokio::spawn(async move { store.insert(&msg).await.unwrap() })
        });

        let outcomes: Vec<InsertOutcome> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let created = outcomes.iter().filter(|o| **o == InsertOutcome::Created).count();
        assert_eq!(created, 1);
        assert_eq!(outcomes.len() - created, 7);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_an_error() {
        let (_dir, store) = temp_store().await;
        store.close().await;

        let msg = message("m1", "+15551234", "+15559999", "2024-01-01T00:00:00Z");
        assert!(matches!(
            store.insert(&msg).await,
            Err(StoreError::Database(_))
        ));
        assert!(store.ping().await.is_err());
    }

    #[test]
    fn test_insert_outcome_labels() {
        assert_eq!(InsertOutcome::Created.as_str(), "created");
        assert_eq!(InsertOutcome::Duplicate.as_str(), "duplicate");
    }
}
