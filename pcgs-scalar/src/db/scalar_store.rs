//! Persistence contract and SQLite store

use async_trait::async_trait;
use pcgs_common::{Error, Result, ScalarEntry, ScalarLevel};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Course-scoped entry storage
#[async_trait]
pub trait ScalarStore: Send + Sync {
    /// All entries of a course, empty for an unknown course
    async fn load(&self, course_id: &str) -> Result<Vec<ScalarEntry>>;

    /// Replace every entry of a course in one atomic step
    async fn save(&self, course_id: &str, entries: &[ScalarEntry]) -> Result<()>;

    /// Courses that have at least one entry
    async fn list_courses(&self) -> Result<Vec<String>>;
}

/// SQLite-backed store using the `scalar_entries` table
#[derive(Clone)]
pub struct SqliteScalarStore {
    pool: SqlitePool,
}

impl SqliteScalarStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ScalarStore for SqliteScalarStore {
    async fn load(&self, course_id: &str) -> Result<Vec<ScalarEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, level, serial, text, order_index, parent_serial, metadata
            FROM scalar_entries
            WHERE course_id = ?
            ORDER BY level, parent_serial, order_index
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let guid: String = row.get("guid");
            let id = Uuid::parse_str(&guid)
                .map_err(|e| Error::Internal(format!("Invalid entry guid '{}': {}", guid, e)))?;

            let level: String = row.get("level");
            let level: ScalarLevel = level.parse()?;

            let order_index: i64 = row.get("order_index");
            let order_index = u32::try_from(order_index).map_err(|_| {
                Error::Internal(format!("Invalid order_index {} for entry {}", order_index, guid))
            })?;

            let metadata: String = row.get("metadata");
            let metadata: BTreeMap<String, serde_json::Value> = serde_json::from_str(&metadata)
                .map_err(|e| Error::Internal(format!("Failed to deserialize metadata: {}", e)))?;

            entries.push(ScalarEntry {
                id,
                level,
                serial: row.get("serial"),
                text: row.get("text"),
                order_index,
                parent_serial: row.get("parent_serial"),
                metadata,
            });
        }

        debug!(course_id = %course_id, entries = entries.len(), "Loaded scalar entries");
        Ok(entries)
    }

    async fn save(&self, course_id: &str, entries: &[ScalarEntry]) -> Result<()> {
        // Serialize before opening the transaction
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in entries {
            let metadata = serde_json::to_string(&entry.metadata)
                .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;
            prepared.push((entry, metadata));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM scalar_entries WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        for (entry, metadata) in &prepared {
            sqlx::query(
                r#"
                INSERT INTO scalar_entries (
                    guid, course_id, level, serial, text,
                    order_index, parent_serial, metadata, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(entry.id.to_string())
            .bind(course_id)
            .bind(entry.level.as_str())
            .bind(&entry.serial)
            .bind(&entry.text)
            .bind(entry.order_index as i64)
            .bind(&entry.parent_serial)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(course_id = %course_id, entries = entries.len(), "Saved scalar entries");
        Ok(())
    }

    async fn list_courses(&self) -> Result<Vec<String>> {
        let courses: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT course_id FROM scalar_entries ORDER BY course_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(courses)
    }
}
