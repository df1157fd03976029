//! Shared fixtures for pcgs-scalar integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pcgs_common::db::init_database;
use pcgs_common::{Result, ScalarEntry};
use pcgs_scalar::{MemoryScalarStore, ScalarStore, SqliteScalarStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Temporary database with the PCGS schema applied
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("pcgs.db");
    let pool = init_database(&db_path).await.expect("database init");
    (temp_dir, pool)
}

pub async fn sqlite_store() -> (TempDir, Arc<SqliteScalarStore>) {
    let (dir, pool) = create_test_db().await;
    (dir, Arc::new(SqliteScalarStore::new(pool)))
}

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Header row for the standard B..K layout, column A left blank
pub fn standard_headers() -> Vec<String> {
    row(&[
        "",
        "CLO No",
        "CLO",
        "Topic No",
        "Topic",
        "Subtopic No",
        "Subtopic",
        "Lesson No",
        "Lesson",
        "PC No",
        "Performance Criteria",
    ])
}

/// Store whose saves take `delay`, holding the course lock meanwhile
pub struct SlowStore {
    inner: MemoryScalarStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryScalarStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl ScalarStore for SlowStore {
    async fn load(&self, course_id: &str) -> Result<Vec<ScalarEntry>> {
        self.inner.load(course_id).await
    }

    async fn save(&self, course_id: &str, entries: &[ScalarEntry]) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(course_id, entries).await
    }

    async fn list_courses(&self) -> Result<Vec<String>> {
        self.inner.list_courses().await
    }
}
