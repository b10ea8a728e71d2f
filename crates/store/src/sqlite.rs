//! SQLite composition store.
//!
//! A single `compositions` table. A partial unique index allows at most one
//! `active` row per caller, and `save` supersedes then inserts inside one
//! transaction, so readers never observe zero or two active documents.

use async_trait::async_trait;
use chrono::Utc;
use promptloom_core::{
    CallerId, CompositionRecord, CompositionStatus, CompositionStore, NewComposition, StoreError,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed [`CompositionStore`].
pub struct SqliteCompositionStore {
    pool: SqlitePool,
    /// Serializes writers from this process; the unique index covers the rest
    write_lock: Mutex<()>,
}

impl SqliteCompositionStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite composition store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS compositions (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                caller_id    TEXT NOT NULL,
                document     TEXT NOT NULL,
                summary      TEXT NOT NULL DEFAULT '',
                trigger_name TEXT NOT NULL,
                metadata     TEXT NOT NULL DEFAULT 'null',
                status       TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("compositions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_compositions_one_active
            ON compositions(caller_id) WHERE status = 'active'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("active index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_compositions_caller ON compositions(caller_id, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("caller index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<CompositionRecord, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let caller_id: String = row.try_get("caller_id").map_err(|e| column("caller_id", e))?;
        let document: String = row.try_get("document").map_err(|e| column("document", e))?;
        let summary: String = row.try_get("summary").map_err(|e| column("summary", e))?;
        let trigger: String = row
            .try_get("trigger_name")
            .map_err(|e| column("trigger_name", e))?;
        let metadata: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;
        let status: String = row.try_get("status").map_err(|e| column("status", e))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| column("created_at", e))?;

        let status = match status.as_str() {
            "active" => CompositionStatus::Active,
            "superseded" => CompositionStatus::Superseded,
            other => {
                return Err(StoreError::QueryFailed(format!(
                    "unknown composition status '{other}'"
                )));
            }
        };

        Ok(CompositionRecord {
            id,
            caller_id: CallerId(caller_id),
            document: serde_json::from_str(&document)
                .map_err(|e| StoreError::QueryFailed(format!("document JSON: {e}")))?,
            summary,
            trigger,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            status,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::QueryFailed(format!("created_at: {e}")))?,
        })
    }
}

#[async_trait]
impl CompositionStore for SqliteCompositionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, composition: NewComposition) -> Result<CompositionRecord, StoreError> {
        let document = serde_json::to_string(&composition.document)
            .map_err(|e| StoreError::Storage(format!("Document serialization: {e}")))?;
        let metadata = serde_json::to_string(&composition.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let superseded = sqlx::query(
            "UPDATE compositions SET status = 'superseded' WHERE caller_id = ?1 AND status = 'active'",
        )
        .bind(composition.caller_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE failed: {e}")))?
        .rows_affected();

        let record = CompositionRecord {
            id: Uuid::new_v4().to_string(),
            caller_id: composition.caller_id,
            document: composition.document,
            summary: composition.summary,
            trigger: composition.trigger,
            metadata: composition.metadata,
            status: CompositionStatus::Active,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO compositions (id, caller_id, document, summary, trigger_name, metadata, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(record.caller_id.as_str())
        .bind(&document)
        .bind(&record.summary)
        .bind(&record.trigger)
        .bind(&metadata)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                StoreError::Conflict(format!("concurrent active composition: {e}"))
            } else {
                StoreError::Storage(format!("INSERT failed: {e}"))
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(
            caller_id = %record.caller_id,
            superseded,
            "Stored composition {}", record.id
        );
        Ok(record)
    }

    async fn active_for(&self, caller: &CallerId) -> Result<Option<CompositionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM compositions WHERE caller_id = ?1 AND status = 'active' LIMIT 1",
        )
        .bind(caller.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("active lookup: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn history(&self, caller: &CallerId) -> Result<Vec<CompositionRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM compositions WHERE caller_id = ?1 ORDER BY seq ASC")
            .bind(caller.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("history: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
