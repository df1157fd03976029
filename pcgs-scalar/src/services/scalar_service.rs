//! Course-scoped scalar service
//!
//! Wraps one `ScalarCollection` per course with a `tokio::sync::RwLock`.
//! Mutations take the write lock (bounded by the configured timeout), work on
//! a clone, persist it, and only then swap it in. A failed validation or save
//! leaves both memory and store as they were, and readers never observe a
//! half-applied cascade or reorder.
//!
//! Collections are loaded from the store on first use. A course whose
//! collection is empty is dropped from the cache once no caller holds it,
//! so lookups of unknown course ids do not accumulate.

use crate::db::ScalarStore;
use crate::models::{AdvisoryWarning, ImportOutcome, ScalarCollection, ScalarListing};
use crate::services::scalar_importer::{ImportOptions, ScalarImporter};
use crate::services::tabular_source::TabularSource;
use crate::validators::BloomsValidator;
use pcgs_common::config::TomlConfig;
use pcgs_common::{EntryId, Error, Lexicon, Result, ScalarEntry, ScalarLevel};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default wait for a course write lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

type CourseSlot = Arc<RwLock<Option<ScalarCollection>>>;

pub struct ScalarService {
    store: Arc<dyn ScalarStore>,
    courses: Mutex<HashMap<String, CourseSlot>>,
    blooms: BloomsValidator,
    importer: ScalarImporter,
    lock_timeout: Duration,
}

impl ScalarService {
    pub fn new(store: Arc<dyn ScalarStore>) -> Self {
        Self {
            store,
            courses: Mutex::new(HashMap::new()),
            blooms: BloomsValidator::new(),
            importer: ScalarImporter::new(Lexicon::builtin()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Service configured from the TOML settings and a prepared lexicon
    pub fn from_config(store: Arc<dyn ScalarStore>, config: &TomlConfig, lexicon: Arc<Lexicon>) -> Self {
        Self::new(store)
            .with_lock_timeout(Duration::from_millis(config.engine.lock_timeout_ms))
            .with_blooms(BloomsValidator::with_auto_capitalize(config.blooms.auto_capitalize))
            .with_importer(ScalarImporter::new(lexicon).with_options(ImportOptions::from_config(&config.import)))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_blooms(mut self, blooms: BloomsValidator) -> Self {
        self.blooms = blooms;
        self
    }

    pub fn with_importer(mut self, importer: ScalarImporter) -> Self {
        self.importer = importer;
        self
    }

    pub fn store(&self) -> &Arc<dyn ScalarStore> {
        &self.store
    }

    async fn slot(&self, course_id: &str) -> Result<CourseSlot> {
        if course_id.trim().is_empty() {
            return Err(Error::InvalidInput("course id is empty".to_string()));
        }
        let mut courses = self.courses.lock().await;
        Ok(courses.entry(course_id.to_string()).or_default().clone())
    }

    /// Forget an empty course nobody else is holding; `slot` clones under the
    /// same mutex, so a strong count of one means no waiter can exist
    async fn release_if_empty(&self, course_id: &str) {
        let mut courses = self.courses.lock().await;
        let idle_and_empty = courses.get(course_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .try_read()
                    .map(|guard| guard.as_ref().map_or(true, ScalarCollection::is_empty))
                    .unwrap_or(false)
        });
        if idle_and_empty {
            courses.remove(course_id);
            debug!(course_id = %course_id, "Released empty course slot");
        }
    }

    /// Number of courses currently held in memory
    pub async fn cached_course_count(&self) -> usize {
        self.courses.lock().await.len()
    }

    async fn write_guard(&self, course_id: &str) -> Result<OwnedRwLockWriteGuard<Option<ScalarCollection>>> {
        let slot = self.slot(course_id).await?;
        tokio::time::timeout(self.lock_timeout, slot.write_owned())
            .await
            .map_err(|_| {
                warn!(course_id = %course_id, "Timed out waiting for course lock");
                Error::LockTimeout {
                    course_id: course_id.to_string(),
                    waited_ms: self.lock_timeout.as_millis() as u64,
                }
            })
    }

    async fn load_collection(&self, course_id: &str) -> Result<ScalarCollection> {
        let entries = self.store.load(course_id).await?;
        let collection = ScalarCollection::from_entries(entries).map_err(|e| {
            Error::Internal(format!("stored scalar for course '{}' is inconsistent: {}", course_id, e))
        })?;
        debug!(course_id = %course_id, entries = collection.len(), "Loaded course scalar");
        Ok(collection)
    }

    /// Run `op` on a copy of the course collection and commit it if it changed
    async fn mutate<T, F>(&self, course_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut ScalarCollection) -> Result<T>,
    {
        let result = self.mutate_slot(course_id, op).await;
        self.release_if_empty(course_id).await;
        result
    }

    async fn mutate_slot<T, F>(&self, course_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut ScalarCollection) -> Result<T>,
    {
        let mut guard = self.write_guard(course_id).await?;
        let current = match guard.take() {
            Some(collection) => collection,
            None => self.load_collection(course_id).await?,
        };

        let mut working = current.clone();
        let outcome = op(&mut working);
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                *guard = Some(current);
                return Err(e);
            }
        };

        if working != current {
            if let Err(e) = self.store.save(course_id, &working.to_entries()).await {
                *guard = Some(current);
                return Err(e);
            }
            *guard = Some(working);
        } else {
            *guard = Some(current);
        }
        Ok(value)
    }

    /// Owned copy of the course collection
    pub async fn snapshot(&self, course_id: &str) -> Result<ScalarCollection> {
        let result = self.snapshot_slot(course_id).await;
        self.release_if_empty(course_id).await;
        result
    }

    async fn snapshot_slot(&self, course_id: &str) -> Result<ScalarCollection> {
        let slot = self.slot(course_id).await?;
        {
            let guard = tokio::time::timeout(self.lock_timeout, slot.read())
                .await
                .map_err(|_| Error::LockTimeout {
                    course_id: course_id.to_string(),
                    waited_ms: self.lock_timeout.as_millis() as u64,
                })?;
            if let Some(collection) = guard.as_ref() {
                return Ok(collection.clone());
            }
        }

        let mut guard = self.write_guard(course_id).await?;
        if guard.is_none() {
            *guard = Some(self.load_collection(course_id).await?);
        }
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| Error::Internal(format!("course '{}' failed to load", course_id)))
    }

    /// Add an entry at the end of its siblings; CLOs get the Bloom's pass
    pub async fn add_entry(
        &self,
        course_id: &str,
        level: ScalarLevel,
        serial: &str,
        text: &str,
        parent_serial: Option<&str>,
    ) -> Result<EntryId> {
        let blooms = &self.blooms;
        let id = self
            .mutate(course_id, |collection| {
                let id = collection.add(level, serial, text, parent_serial.map(str::to_string))?;
                if let Some(entry) = collection.get_mut(serial) {
                    if let Some(warning) = blooms.apply(entry) {
                        warn!(course_id = %course_id, "{}", warning);
                    }
                }
                Ok(id)
            })
            .await?;

        debug!(course_id = %course_id, level = %level, serial = %serial, "Added scalar entry");
        Ok(id)
    }

    /// Change text and/or merge metadata (a `null` value removes a key)
    pub async fn update_entry(
        &self,
        course_id: &str,
        serial: &str,
        new_text: Option<&str>,
        new_metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<ScalarEntry> {
        let blooms = &self.blooms;
        self.mutate(course_id, |collection| {
            let text_changed = match (new_text, collection.get(serial)) {
                (Some(text), Some(entry)) => entry.text != text,
                _ => false,
            };
            collection.update(serial, new_text, new_metadata.as_ref())?;

            let entry = collection
                .get_mut(serial)
                .ok_or_else(|| Error::NotFound(format!("scalar entry '{}'", serial)))?;
            if text_changed && entry.level == ScalarLevel::Clo {
                BloomsValidator::clear_audit(entry);
                if let Some(warning) = blooms.apply(entry) {
                    warn!(course_id = %course_id, "{}", warning);
                }
            }
            Ok(entry.clone())
        })
        .await
    }

    /// Remove an entry and its descendants; absent serials remove nothing
    pub async fn delete_entry(&self, course_id: &str, serial: &str) -> Result<usize> {
        let removed = self
            .mutate(course_id, |collection| Ok(collection.remove(serial)))
            .await?;
        debug!(course_id = %course_id, serial = %serial, removed, "Deleted scalar entry");
        Ok(removed)
    }

    /// Set sibling order from an exact permutation of their serials
    pub async fn reorder_siblings(
        &self,
        course_id: &str,
        level: ScalarLevel,
        parent_serial: Option<&str>,
        order: &[String],
    ) -> Result<()> {
        self.mutate(course_id, |collection| {
            collection.reorder(level, parent_serial, order)?;
            Ok(())
        })
        .await
    }

    pub async fn move_entry_up(&self, course_id: &str, serial: &str) -> Result<bool> {
        self.mutate(course_id, |collection| collection.move_up(serial))
            .await
    }

    pub async fn move_entry_down(&self, course_id: &str, serial: &str) -> Result<bool> {
        self.mutate(course_id, |collection| collection.move_down(serial))
            .await
    }

    /// Remove a whole level and everything beneath it
    pub async fn clear_level(&self, course_id: &str, level: ScalarLevel) -> Result<usize> {
        self.mutate(course_id, |collection| Ok(collection.clear_level(level)))
            .await
    }

    /// Remove every entry of the course
    pub async fn clear(&self, course_id: &str) -> Result<usize> {
        self.mutate(course_id, |collection| Ok(collection.clear()))
            .await
    }

    /// Re-run the Bloom's pass on every CLO
    ///
    /// Never fails on a missing verb; persists only when an annotation or
    /// capitalization changed.
    pub async fn validate_all_clos(&self, course_id: &str) -> Result<Vec<AdvisoryWarning>> {
        let blooms = &self.blooms;
        self.mutate(course_id, |collection| Ok(annotate_clos(blooms, collection)))
            .await
    }

    /// Bulk import from a tabular source
    ///
    /// An empty course keeps whatever rows were accepted. A course that
    /// already has entries is replaced only when no row was rejected;
    /// otherwise it is left untouched and `committed` is false.
    pub async fn import<S>(
        &self,
        course_id: &str,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome>
    where
        S: TabularSource + ?Sized,
    {
        let parsed = self.importer.parse(source, cancel).await?;
        let mut collection = parsed.collection;
        let mut warnings = parsed.warnings;
        warnings.extend(annotate_clos(&self.blooms, &mut collection));

        let mut outcome = ImportOutcome {
            accepted: collection.to_entries(),
            rejected: parsed.rejected,
            warnings,
            committed: false,
            rows_read: parsed.rows_read,
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("import into '{}' cancelled before commit", course_id)));
        }

        let mut guard = self.write_guard(course_id).await?;
        let current = match guard.take() {
            Some(existing) => existing,
            None => self.load_collection(course_id).await?,
        };

        let commit = if collection.is_empty() {
            false
        } else if current.is_empty() {
            true
        } else {
            outcome.rejected.is_empty()
        };

        if commit {
            if let Err(e) = self.store.save(course_id, &outcome.accepted).await {
                *guard = Some(current);
                return Err(e);
            }
            *guard = Some(collection);
            outcome.committed = true;
        } else {
            *guard = Some(current);
        }
        drop(guard);
        self.release_if_empty(course_id).await;

        if outcome.committed {
            info!(
                course_id = %course_id,
                rows = outcome.rows_read,
                accepted = outcome.accepted_count(),
                rejected = outcome.rejected_count(),
                "Scalar import committed"
            );
        } else {
            warn!(
                course_id = %course_id,
                rows = outcome.rows_read,
                accepted = outcome.accepted_count(),
                rejected = outcome.rejected_count(),
                "Scalar import not committed"
            );
        }
        Ok(outcome)
    }

    pub async fn listing(&self, course_id: &str) -> Result<ScalarListing> {
        Ok(self.snapshot(course_id).await?.listing())
    }

    pub async fn entries_at(&self, course_id: &str, level: ScalarLevel) -> Result<Vec<ScalarEntry>> {
        let snapshot = self.snapshot(course_id).await?;
        Ok(snapshot.entries_at(level).into_iter().cloned().collect())
    }

    pub async fn siblings(
        &self,
        course_id: &str,
        level: ScalarLevel,
        parent_serial: Option<&str>,
    ) -> Result<Vec<ScalarEntry>> {
        let snapshot = self.snapshot(course_id).await?;
        Ok(snapshot
            .siblings(level, parent_serial)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn get_entry(&self, course_id: &str, serial: &str) -> Result<ScalarEntry> {
        self.snapshot(course_id)
            .await?
            .get(serial)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("scalar entry '{}'", serial)))
    }

    /// Suggested serial for the next entry under `parent_serial`
    pub async fn next_serial(
        &self,
        course_id: &str,
        level: ScalarLevel,
        parent_serial: Option<&str>,
    ) -> Result<String> {
        self.snapshot(course_id).await?.next_serial(level, parent_serial)
    }

    pub async fn counts(&self, course_id: &str) -> Result<BTreeMap<ScalarLevel, usize>> {
        Ok(self.snapshot(course_id).await?.counts())
    }

    pub async fn list_courses(&self) -> Result<Vec<String>> {
        self.store.list_courses().await
    }

    pub fn blooms_suggestions(&self, n: usize) -> Vec<String> {
        BloomsValidator::suggestions(n)
    }
}

fn annotate_clos(blooms: &BloomsValidator, collection: &mut ScalarCollection) -> Vec<AdvisoryWarning> {
    let serials: Vec<String> = collection
        .entries_at(ScalarLevel::Clo)
        .into_iter()
        .map(|e| e.serial.clone())
        .collect();

    let mut warnings = Vec::new();
    for serial in serials {
        if let Some(entry) = collection.get_mut(&serial) {
            if let Some(warning) = blooms.apply(entry) {
                warnings.push(warning);
            }
        }
    }
    warnings
}
