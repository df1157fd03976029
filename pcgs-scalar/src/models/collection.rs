//! Scalar collection: one course's entries plus the consistency rules
//!
//! Every mutating method either succeeds and leaves the collection
//! consistent, or fails and leaves it untouched:
//! - every non-CLO entry's parent exists one level up
//! - serials are unique (the fixed depth table makes them unique per level)
//! - sibling `order_index` values are exactly `0..n-1`
//! - removal cascades to every serial-prefixed descendant
//!
//! The collection has no locking or persistence; `ScalarService` wraps it
//! for that.

use pcgs_common::scalar::is_descendant_of;
use pcgs_common::{EntryId, Error, Result, ScalarEntry, ScalarLevel, StructuralError};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Label used for the parent of top-level (CLO) siblings in messages
const ROOT_LABEL: &str = "course root";

/// Entries of one course keyed by serial
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarCollection {
    entries: BTreeMap<String, ScalarEntry>,
}

/// Entries of one level in tree order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelView {
    pub level: ScalarLevel,
    pub entries: Vec<ScalarEntry>,
}

/// Read model for rendering: array order is render order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarListing {
    /// Depth-first: each CLO followed by its subtree, siblings by order index
    pub entries: Vec<ScalarEntry>,
    pub levels: Vec<LevelView>,
}

impl ScalarCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a collection from stored entries, checking every invariant
    ///
    /// Stored order indexes are kept as-is; they must already be dense.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ScalarEntry>,
    ) -> std::result::Result<Self, StructuralError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.validate_self()?;
            if map.contains_key(&entry.serial) {
                return Err(StructuralError::DuplicateSerial {
                    level: entry.level,
                    serial: entry.serial,
                });
            }
            map.insert(entry.serial.clone(), entry);
        }

        for entry in map.values() {
            if let Some(parent) = &entry.parent_serial {
                if !map.contains_key(parent) {
                    return Err(StructuralError::OrphanParent {
                        level: entry.level,
                        serial: entry.serial.clone(),
                        parent_serial: parent.clone(),
                    });
                }
            }
        }

        let mut groups: HashMap<(ScalarLevel, Option<&str>), Vec<u32>> = HashMap::new();
        for entry in map.values() {
            groups
                .entry((entry.level, entry.parent_serial.as_deref()))
                .or_default()
                .push(entry.order_index);
        }
        for ((level, parent), mut indexes) in groups {
            indexes.sort_unstable();
            let dense = indexes.iter().enumerate().all(|(i, idx)| *idx as usize == i);
            if !dense {
                return Err(StructuralError::InvalidPermutation {
                    level,
                    parent: parent.unwrap_or(ROOT_LABEL).to_string(),
                    reason: format!("stored order indexes {:?} are not 0..{}", indexes, indexes.len()),
                });
            }
        }

        Ok(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, serial: &str) -> Option<&ScalarEntry> {
        self.entries.get(serial)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.entries.contains_key(serial)
    }

    /// Mutable access for annotation passes that never touch structure
    pub(crate) fn get_mut(&mut self, serial: &str) -> Option<&mut ScalarEntry> {
        self.entries.get_mut(serial)
    }

    /// Create and append an entry at the end of its sibling sequence
    pub fn add(
        &mut self,
        level: ScalarLevel,
        serial: impl Into<String>,
        text: impl Into<String>,
        parent_serial: Option<String>,
    ) -> std::result::Result<EntryId, StructuralError> {
        self.insert(ScalarEntry::new(level, serial, text, parent_serial))
    }

    /// Append a prepared entry; its id and metadata are kept, its order index
    /// is assigned here.
    pub fn insert(&mut self, mut entry: ScalarEntry) -> std::result::Result<EntryId, StructuralError> {
        entry.validate_self()?;

        if self.entries.contains_key(&entry.serial) {
            return Err(StructuralError::DuplicateSerial {
                level: entry.level,
                serial: entry.serial,
            });
        }

        if let Some(parent) = &entry.parent_serial {
            if !self.entries.contains_key(parent) {
                return Err(StructuralError::OrphanParent {
                    level: entry.level,
                    serial: entry.serial.clone(),
                    parent_serial: parent.clone(),
                });
            }
        }

        entry.order_index = self.sibling_count(entry.level, entry.parent_serial.as_deref()) as u32;
        let id = entry.id;
        self.entries.insert(entry.serial.clone(), entry);
        Ok(id)
    }

    /// Change text and/or metadata; structure is never touched
    ///
    /// Metadata is merged key by key; a `null` value removes the key.
    pub fn update(
        &mut self,
        serial: &str,
        new_text: Option<&str>,
        metadata_patch: Option<&BTreeMap<String, Value>>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(serial)
            .ok_or_else(|| Error::NotFound(format!("scalar entry '{}'", serial)))?;

        if let Some(text) = new_text {
            if text.trim().is_empty() {
                return Err(StructuralError::EmptyText {
                    level: entry.level,
                    serial: entry.serial.clone(),
                }
                .into());
            }
        }

        if let Some(text) = new_text {
            entry.text = text.to_string();
        }
        if let Some(patch) = metadata_patch {
            for (key, value) in patch {
                if value.is_null() {
                    entry.metadata.remove(key);
                } else {
                    entry.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Remove an entry and all its descendants; returns how many went
    ///
    /// An absent serial removes nothing.
    pub fn remove(&mut self, serial: &str) -> usize {
        let (level, parent) = match self.entries.get(serial) {
            Some(entry) => (entry.level, entry.parent_serial.clone()),
            None => return 0,
        };

        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|s| s.as_str() == serial || is_descendant_of(s, serial))
            .cloned()
            .collect();
        for s in &doomed {
            self.entries.remove(s);
        }

        self.redensify(level, parent.as_deref());
        doomed.len()
    }

    /// Remove every entry at `level` and below
    pub fn clear_level(&mut self, level: ScalarLevel) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.level < level);
        before - self.entries.len()
    }

    /// Remove everything
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Siblings sharing `(level, parent)`, by order index
    pub fn siblings(&self, level: ScalarLevel, parent: Option<&str>) -> Vec<&ScalarEntry> {
        let mut siblings: Vec<&ScalarEntry> = self
            .entries
            .values()
            .filter(|e| e.level == level && e.parent_serial.as_deref() == parent)
            .collect();
        siblings.sort_by_key(|e| e.order_index);
        siblings
    }

    fn sibling_count(&self, level: ScalarLevel, parent: Option<&str>) -> usize {
        self.entries
            .values()
            .filter(|e| e.level == level && e.parent_serial.as_deref() == parent)
            .count()
    }

    fn redensify(&mut self, level: ScalarLevel, parent: Option<&str>) {
        let ordered: Vec<String> = self
            .siblings(level, parent)
            .into_iter()
            .map(|e| e.serial.clone())
            .collect();
        for (position, serial) in ordered.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(serial) {
                entry.order_index = position as u32;
            }
        }
    }

    /// Assign sibling positions from `order`, which must be an exact
    /// permutation of the current sibling serials.
    pub fn reorder(
        &mut self,
        level: ScalarLevel,
        parent: Option<&str>,
        order: &[String],
    ) -> std::result::Result<(), StructuralError> {
        let invalid = |reason: String| StructuralError::InvalidPermutation {
            level,
            parent: parent.unwrap_or(ROOT_LABEL).to_string(),
            reason,
        };

        match (level, parent) {
            (ScalarLevel::Clo, Some(p)) => {
                return Err(invalid(format!("CLOs have no parent, got '{}'", p)));
            }
            (ScalarLevel::Clo, None) | (_, Some(_)) => {}
            (_, None) => return Err(invalid("parent serial is required".to_string())),
        }

        let current: HashSet<&str> = self
            .siblings(level, parent)
            .into_iter()
            .map(|e| e.serial.as_str())
            .collect();

        let mut seen = HashSet::new();
        for serial in order {
            if !seen.insert(serial.as_str()) {
                return Err(invalid(format!("'{}' listed more than once", serial)));
            }
            if !current.contains(serial.as_str()) {
                return Err(invalid(format!("'{}' is not one of the siblings", serial)));
            }
        }
        if order.len() != current.len() {
            return Err(invalid(format!(
                "expected {} siblings, got {}",
                current.len(),
                order.len()
            )));
        }

        for (position, serial) in order.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(serial) {
                entry.order_index = position as u32;
            }
        }
        Ok(())
    }

    /// Swap an entry with its previous sibling; false when already first
    pub fn move_up(&mut self, serial: &str) -> Result<bool> {
        self.shift(serial, -1)
    }

    /// Swap an entry with its next sibling; false when already last
    pub fn move_down(&mut self, serial: &str) -> Result<bool> {
        self.shift(serial, 1)
    }

    fn shift(&mut self, serial: &str, delta: isize) -> Result<bool> {
        let entry = self
            .entries
            .get(serial)
            .ok_or_else(|| Error::NotFound(format!("scalar entry '{}'", serial)))?;
        let level = entry.level;
        let parent = entry.parent_serial.clone();

        let mut order: Vec<String> = self
            .siblings(level, parent.as_deref())
            .into_iter()
            .map(|e| e.serial.clone())
            .collect();
        let from = entry.order_index as isize;
        let to = from + delta;
        if to < 0 || to >= order.len() as isize {
            return Ok(false);
        }
        order.swap(from as usize, to as usize);
        self.reorder(level, parent.as_deref(), &order)?;
        Ok(true)
    }

    /// Next free serial under `parent`: one past the highest numeric last
    /// segment among the siblings.
    pub fn next_serial(&self, level: ScalarLevel, parent: Option<&str>) -> Result<String> {
        match (level, parent) {
            (ScalarLevel::Clo, Some(p)) => {
                return Err(Error::InvalidInput(format!("CLOs have no parent, got '{}'", p)));
            }
            (ScalarLevel::Clo, None) => {}
            (_, None) => {
                return Err(Error::InvalidInput(format!("{} needs a parent serial", level)));
            }
            (_, Some(p)) => {
                let parent_ok = self
                    .entries
                    .get(p)
                    .map(|e| Some(e.level) == level.parent())
                    .unwrap_or(false);
                if !parent_ok {
                    return Err(StructuralError::OrphanParent {
                        level,
                        serial: format!("{}.?", p),
                        parent_serial: p.to_string(),
                    }
                    .into());
                }
            }
        }

        let siblings = self.siblings(level, parent);
        let highest = siblings
            .iter()
            .filter_map(|e| e.serial.rsplit('.').next())
            .filter_map(|segment| segment.parse::<u32>().ok())
            .max();
        let next = match highest {
            Some(n) => n.saturating_add(1),
            None => siblings.len() as u32 + 1,
        };

        Ok(match parent {
            Some(p) => format!("{}.{}", p, next),
            None => next.to_string(),
        })
    }

    /// Entry count per level, every level present
    pub fn counts(&self) -> BTreeMap<ScalarLevel, usize> {
        let mut counts: BTreeMap<ScalarLevel, usize> =
            ScalarLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for entry in self.entries.values() {
            *counts.entry(entry.level).or_default() += 1;
        }
        counts
    }

    /// Depth-first render order
    pub fn tree_order(&self) -> Vec<&ScalarEntry> {
        let mut children: HashMap<Option<&str>, Vec<&ScalarEntry>> = HashMap::new();
        for entry in self.entries.values() {
            children
                .entry(entry.parent_serial.as_deref())
                .or_default()
                .push(entry);
        }
        for group in children.values_mut() {
            group.sort_by_key(|e| e.order_index);
        }

        let mut ordered = Vec::with_capacity(self.entries.len());
        let mut stack: Vec<&ScalarEntry> = children
            .get(&None)
            .map(|roots| roots.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(entry) = stack.pop() {
            ordered.push(entry);
            if let Some(kids) = children.get(&Some(entry.serial.as_str())) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        ordered
    }

    /// Entries of one level in tree order
    pub fn entries_at(&self, level: ScalarLevel) -> Vec<&ScalarEntry> {
        self.tree_order()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    /// Owned copy of every entry in tree order
    pub fn to_entries(&self) -> Vec<ScalarEntry> {
        self.tree_order().into_iter().cloned().collect()
    }

    pub fn listing(&self) -> ScalarListing {
        let entries = self.to_entries();
        let levels = ScalarLevel::ALL
            .iter()
            .map(|level| LevelView {
                level: *level,
                entries: entries.iter().filter(|e| e.level == *level).cloned().collect(),
            })
            .collect();
        ScalarListing { entries, levels }
    }
}
