//! Integration tests for database initialization

use pcgs_common::db::init::{current_schema_version, init_database, SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("pcgs.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("pcgs.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_version_recorded_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("pcgs.db");

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(current_schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_scalar_entries_unique_per_course_level_serial() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("pcgs.db")).await.unwrap();

    let insert = "INSERT INTO scalar_entries (guid, course_id, level, serial, text, order_index) VALUES (?, ?, 'CLO', '1', 'Analyze threats', 0)";

    sqlx::query(insert).bind("a").bind("course-1").execute(&pool).await.unwrap();
    // Same serial in another course is fine
    sqlx::query(insert).bind("b").bind("course-2").execute(&pool).await.unwrap();

    let duplicate = sqlx::query(insert).bind("c").bind("course-1").execute(&pool).await;
    assert!(duplicate.is_err(), "Duplicate serial within a course should violate UNIQUE");
}

#[tokio::test]
async fn test_scalar_entries_rejects_unknown_level() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("pcgs.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO scalar_entries (guid, course_id, level, serial, text, order_index) VALUES ('x', 'c', 'Module', '1', 't', 0)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}
