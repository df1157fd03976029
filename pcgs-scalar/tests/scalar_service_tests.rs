//! Integration tests for ScalarService
//!
//! Covers the course lock, commit-or-restore behaviour, ordering density,
//! cascades and the Bloom's-verb pass against both store implementations.

mod helpers;

use helpers::{sqlite_store, SlowStore};
use pcgs_common::{Error, ScalarLevel, StructuralError};
use pcgs_scalar::validators::blooms::{META_CAPITALIZED_AT, META_ORIGINAL_TEXT, META_STATUS, META_VERB};
use pcgs_scalar::{AdvisoryWarning, MemoryScalarStore, ScalarService, ScalarStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const COURSE: &str = "SEC-101";

fn order_of(entries: &[pcgs_common::ScalarEntry]) -> Vec<(String, u32)> {
    entries
        .iter()
        .map(|e| (e.serial.clone(), e.order_index))
        .collect()
}

async fn seeded(service: &ScalarService) {
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "Analyze threat patterns", None)
        .await
        .unwrap();
    service
        .add_entry(COURSE, ScalarLevel::Topic, "1.1", "Threat actors", Some("1"))
        .await
        .unwrap();
    service
        .add_entry(COURSE, ScalarLevel::Topic, "1.2", "Attack surfaces", Some("1"))
        .await
        .unwrap();
    service
        .add_entry(COURSE, ScalarLevel::Subtopic, "1.1.1", "Insiders", Some("1.1"))
        .await
        .unwrap();
}

// ============================================================================
// Structure
// ============================================================================

#[tokio::test]
async fn test_duplicate_clo_is_rejected_and_nothing_changes() {
    let store = Arc::new(MemoryScalarStore::new());
    let service = ScalarService::new(store.clone());

    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "Analyze threat patterns", None)
        .await
        .unwrap();
    let err = service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "Evaluate controls", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Structural(StructuralError::DuplicateSerial { .. })
    ));
    assert_eq!(store.save_count(), 1);
    let entry = service.get_entry(COURSE, "1").await.unwrap();
    assert_eq!(entry.text, "Analyze threat patterns");
}

#[tokio::test]
async fn test_orphan_and_malformed_adds_are_rejected() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));

    let orphan = service
        .add_entry(COURSE, ScalarLevel::Topic, "3.1", "Orphan", Some("3"))
        .await
        .unwrap_err();
    assert!(matches!(
        orphan,
        Error::Structural(StructuralError::OrphanParent { .. })
    ));

    let malformed = service
        .add_entry(COURSE, ScalarLevel::Clo, "1.1", "Too deep", None)
        .await
        .unwrap_err();
    assert!(matches!(
        malformed,
        Error::Structural(StructuralError::MalformedSerial { .. })
    ));

    assert!(service.snapshot(COURSE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_course_id_is_invalid_input() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    let err = service.listing("  ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_unknown_courses_are_not_cached() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    for i in 0..50 {
        let course = format!("MISSING-{}", i);
        assert!(service.snapshot(&course).await.unwrap().is_empty());
        assert_eq!(service.delete_entry(&course, "1").await.unwrap(), 0);
    }
    assert_eq!(service.cached_course_count().await, 0);

    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "Analyze threat patterns", None)
        .await
        .unwrap();
    assert_eq!(service.cached_course_count().await, 1);

    // Deleting the last entry empties the course and releases it
    assert_eq!(service.delete_entry(COURSE, "1").await.unwrap(), 1);
    assert_eq!(service.cached_course_count().await, 0);
    assert!(service.snapshot(COURSE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_new_entries_append_to_siblings() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    let topics = service
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    assert_eq!(
        order_of(&topics),
        vec![("1.1".to_string(), 0), ("1.2".to_string(), 1)]
    );
    assert_eq!(
        service
            .next_serial(COURSE, ScalarLevel::Topic, Some("1"))
            .await
            .unwrap(),
        "1.3"
    );
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_reorder_topics_persists() {
    let (_dir, store) = sqlite_store().await;
    let service = ScalarService::new(store.clone());
    seeded(&service).await;

    service
        .reorder_siblings(
            COURSE,
            ScalarLevel::Topic,
            Some("1"),
            &["1.2".to_string(), "1.1".to_string()],
        )
        .await
        .unwrap();

    // A fresh service loads the persisted order
    let reloaded = ScalarService::new(store);
    let topics = reloaded
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    assert_eq!(
        order_of(&topics),
        vec![("1.2".to_string(), 0), ("1.1".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_reorder_with_same_order_does_not_save() {
    let store = Arc::new(MemoryScalarStore::new());
    let service = ScalarService::new(store.clone());
    seeded(&service).await;
    let saves = store.save_count();

    let order = vec!["1.1".to_string(), "1.2".to_string()];
    service
        .reorder_siblings(COURSE, ScalarLevel::Topic, Some("1"), &order)
        .await
        .unwrap();
    service
        .reorder_siblings(COURSE, ScalarLevel::Topic, Some("1"), &order)
        .await
        .unwrap();

    assert_eq!(store.save_count(), saves);
}

#[tokio::test]
async fn test_reorder_rejects_partial_permutation() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    let err = service
        .reorder_siblings(COURSE, ScalarLevel::Topic, Some("1"), &["1.2".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Structural(StructuralError::InvalidPermutation { .. })
    ));

    let topics = service
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    assert_eq!(topics[0].serial, "1.1");
}

#[tokio::test]
async fn test_move_up_and_down_at_edges() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    assert!(!service.move_entry_up(COURSE, "1.1").await.unwrap());
    assert!(service.move_entry_down(COURSE, "1.1").await.unwrap());
    assert!(!service.move_entry_down(COURSE, "1.1").await.unwrap());

    let topics = service
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    assert_eq!(
        order_of(&topics),
        vec![("1.2".to_string(), 0), ("1.1".to_string(), 1)]
    );
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_keeps_sibling_order_dense() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;
    service
        .add_entry(COURSE, ScalarLevel::Topic, "1.3", "Mitigations", Some("1"))
        .await
        .unwrap();

    assert_eq!(service.delete_entry(COURSE, "1.2").await.unwrap(), 1);

    let topics = service
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    assert_eq!(
        order_of(&topics),
        vec![("1.1".to_string(), 0), ("1.3".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_delete_cascades_to_descendants() {
    let (_dir, store) = sqlite_store().await;
    let service = ScalarService::new(store.clone());
    seeded(&service).await;
    service
        .add_entry(COURSE, ScalarLevel::Clo, "2", "Evaluate controls", None)
        .await
        .unwrap();

    assert_eq!(service.delete_entry(COURSE, "1").await.unwrap(), 4);

    let remaining = store.load(COURSE).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].serial, "2");
    assert_eq!(remaining[0].order_index, 0);
}

#[tokio::test]
async fn test_delete_absent_serial_is_a_no_op() {
    let store = Arc::new(MemoryScalarStore::new());
    let service = ScalarService::new(store.clone());
    seeded(&service).await;
    let saves = store.save_count();

    assert_eq!(service.delete_entry(COURSE, "9").await.unwrap(), 0);
    assert_eq!(store.save_count(), saves);
}

#[tokio::test]
async fn test_clear_level_drops_level_and_below() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    assert_eq!(
        service.clear_level(COURSE, ScalarLevel::Topic).await.unwrap(),
        3
    );
    let counts = service.counts(COURSE).await.unwrap();
    assert_eq!(counts[&ScalarLevel::Clo], 1);
    assert_eq!(counts[&ScalarLevel::Topic], 0);
    assert_eq!(counts[&ScalarLevel::Subtopic], 0);

    assert_eq!(service.clear(COURSE).await.unwrap(), 1);
    assert!(service.list_courses().await.unwrap().is_empty());
}

// ============================================================================
// Updates and Bloom's pass
// ============================================================================

#[tokio::test]
async fn test_lowercase_verb_is_capitalized_with_audit() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "analyze threat patterns", None)
        .await
        .unwrap();

    let entry = service.get_entry(COURSE, "1").await.unwrap();
    assert_eq!(entry.text, "Analyze threat patterns");
    assert_eq!(entry.metadata[META_STATUS], json!("valid"));
    assert_eq!(entry.metadata[META_VERB], json!("Analyze"));
    assert_eq!(
        entry.metadata[META_ORIGINAL_TEXT],
        json!("analyze threat patterns")
    );
    assert!(entry.metadata.contains_key(META_CAPITALIZED_AT));
}

#[tokio::test]
async fn test_validate_all_clos_is_idempotent() {
    let store = Arc::new(MemoryScalarStore::new());
    let service = ScalarService::new(store.clone());
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "analyze threat patterns", None)
        .await
        .unwrap();
    service
        .add_entry(COURSE, ScalarLevel::Clo, "2", "Analize logs", None)
        .await
        .unwrap();
    let saves = store.save_count();

    let first = service.validate_all_clos(COURSE).await.unwrap();
    let second = service.validate_all_clos(COURSE).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![AdvisoryWarning::BloomsVerbMissing {
            serial: "2".to_string(),
            word: "Analize".to_string(),
            suggestion: Some("Analyze".to_string()),
        }]
    );
    assert_eq!(store.save_count(), saves);
    assert_eq!(
        service.get_entry(COURSE, "1").await.unwrap().text,
        "Analyze threat patterns"
    );
}

#[tokio::test]
async fn test_quoted_or_bracketed_verbs_are_recognized() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "\"Analyze\" threat patterns", None)
        .await
        .unwrap();
    service
        .add_entry(COURSE, ScalarLevel::Clo, "2", "(analyze) threat patterns", None)
        .await
        .unwrap();

    assert!(service.validate_all_clos(COURSE).await.unwrap().is_empty());

    let quoted = service.get_entry(COURSE, "1").await.unwrap();
    assert_eq!(quoted.text, "\"Analyze\" threat patterns");
    assert_eq!(quoted.metadata[META_STATUS], json!("valid"));

    let bracketed = service.get_entry(COURSE, "2").await.unwrap();
    assert_eq!(bracketed.text, "(Analyze) threat patterns");
    assert_eq!(bracketed.metadata[META_VERB], json!("Analyze"));
    assert_eq!(
        bracketed.metadata[META_ORIGINAL_TEXT],
        json!("(analyze) threat patterns")
    );
}

#[tokio::test]
async fn test_update_text_reruns_blooms_and_clears_audit() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "analyze threat patterns", None)
        .await
        .unwrap();

    let updated = service
        .update_entry(COURSE, "1", Some("Learn about threats"), None)
        .await
        .unwrap();

    assert_eq!(updated.text, "Learn about threats");
    assert_eq!(updated.metadata[META_STATUS], json!("warning"));
    assert!(!updated.metadata.contains_key(META_ORIGINAL_TEXT));
    assert!(!updated.metadata.contains_key(META_CAPITALIZED_AT));
    assert!(!updated.metadata.contains_key(META_VERB));
}

#[tokio::test]
async fn test_update_metadata_merges_and_null_removes() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    let mut patch = BTreeMap::new();
    patch.insert("duration_minutes".to_string(), json!(45));
    patch.insert("owner".to_string(), json!("curriculum"));
    service
        .update_entry(COURSE, "1.1", None, Some(patch))
        .await
        .unwrap();

    let mut removal = BTreeMap::new();
    removal.insert("owner".to_string(), Value::Null);
    let entry = service
        .update_entry(COURSE, "1.1", None, Some(removal))
        .await
        .unwrap();

    assert_eq!(entry.text, "Threat actors");
    assert_eq!(entry.metadata.get("duration_minutes"), Some(&json!(45)));
    assert!(!entry.metadata.contains_key("owner"));
}

#[tokio::test]
async fn test_update_missing_or_blank_fails() {
    let service = ScalarService::new(Arc::new(MemoryScalarStore::new()));
    seeded(&service).await;

    assert!(matches!(
        service.update_entry(COURSE, "7", Some("x"), None).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        service.update_entry(COURSE, "1.1", Some("   "), None).await,
        Err(Error::Structural(StructuralError::EmptyText { .. }))
    ));
    assert_eq!(
        service.get_entry(COURSE, "1.1").await.unwrap().text,
        "Threat actors"
    );
}

// ============================================================================
// Atomicity and locking
// ============================================================================

#[tokio::test]
async fn test_failed_save_leaves_memory_untouched() {
    let store = Arc::new(MemoryScalarStore::new());
    let service = ScalarService::new(store.clone());
    seeded(&service).await;
    let before = service.snapshot(COURSE).await.unwrap();

    store.set_fail_saves(true);
    assert!(service.delete_entry(COURSE, "1").await.is_err());
    assert!(service
        .reorder_siblings(
            COURSE,
            ScalarLevel::Topic,
            Some("1"),
            &["1.2".to_string(), "1.1".to_string()],
        )
        .await
        .is_err());
    assert_eq!(service.snapshot(COURSE).await.unwrap(), before);

    store.set_fail_saves(false);
    assert_eq!(service.delete_entry(COURSE, "1.2").await.unwrap(), 1);
}

#[tokio::test]
async fn test_lock_timeout_when_course_is_busy() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(500)));
    let service = Arc::new(
        ScalarService::new(store).with_lock_timeout(Duration::from_millis(50)),
    );

    let busy = Arc::clone(&service);
    let first = tokio::spawn(async move {
        busy.add_entry(COURSE, ScalarLevel::Clo, "1", "Analyze threat patterns", None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = service
        .add_entry(COURSE, ScalarLevel::Clo, "2", "Evaluate controls", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout { waited_ms: 50, .. }));

    // Other courses are not blocked
    let other = service
        .snapshot("NET-200")
        .await
        .unwrap();
    assert!(other.is_empty());

    first.await.unwrap().unwrap();
    assert_eq!(service.snapshot(COURSE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_adds_serialize_per_course() {
    let service = Arc::new(ScalarService::new(Arc::new(MemoryScalarStore::new())));
    service
        .add_entry(COURSE, ScalarLevel::Clo, "1", "Analyze threat patterns", None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 1..=10 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .add_entry(
                    COURSE,
                    ScalarLevel::Topic,
                    &format!("1.{}", i),
                    &format!("Topic {}", i),
                    Some("1"),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let topics = service
        .siblings(COURSE, ScalarLevel::Topic, Some("1"))
        .await
        .unwrap();
    let mut positions: Vec<u32> = topics.iter().map(|t| t.order_index).collect();
    positions.sort_unstable();
    assert_eq!(positions, (0..10).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_collection_loads_lazily_from_store() {
    let (_dir, store) = sqlite_store().await;
    {
        let writer = ScalarService::new(store.clone());
        seeded(&writer).await;
    }

    let reader = ScalarService::new(store);
    let listing = reader.listing(COURSE).await.unwrap();
    let serials: Vec<&str> = listing.entries.iter().map(|e| e.serial.as_str()).collect();
    assert_eq!(serials, vec!["1", "1.1", "1.1.1", "1.2"]);
    assert_eq!(reader.list_courses().await.unwrap(), vec![COURSE.to_string()]);
}
