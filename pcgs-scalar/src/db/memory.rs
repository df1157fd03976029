//! In-process store

use super::ScalarStore;
use async_trait::async_trait;
use pcgs_common::{Error, Result, ScalarEntry};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Keeps entries in memory; can be told to fail saves
#[derive(Default)]
pub struct MemoryScalarStore {
    courses: RwLock<BTreeMap<String, Vec<ScalarEntry>>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryScalarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail until switched off again
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScalarStore for MemoryScalarStore {
    async fn load(&self, course_id: &str) -> Result<Vec<ScalarEntry>> {
        Ok(self
            .courses
            .read()
            .await
            .get(course_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, course_id: &str, entries: &[ScalarEntry]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!(
                "injected save failure for course '{}'",
                course_id
            )));
        }

        let mut courses = self.courses.write().await;
        if entries.is_empty() {
            courses.remove(course_id);
        } else {
            courses.insert(course_id.to_string(), entries.to_vec());
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_courses(&self) -> Result<Vec<String>> {
        Ok(self.courses.read().await.keys().cloned().collect())
    }
}
