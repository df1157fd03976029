//! Scalar entry model
//!
//! The scalar is the five-level course structure:
//! CLO → Topic → Subtopic → Lesson → Performance Criteria.
//!
//! Each entry carries a dotted serial whose depth is fixed by its level
//! (CLO `1`, Topic `1.1`, Subtopic `1.1.1`, Lesson `1.1.1.1`,
//! Performance Criteria `1.1.1.1.1`). The prefix of the serial up to the
//! last segment is the parent's serial.
//!
//! This module only checks an entry against itself. Sibling ordering,
//! uniqueness and parent existence belong to the collection.

use crate::error::StructuralError;
use crate::lexicon::LexId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier assigned to an entry when it is created
pub type EntryId = Uuid;

/// Hierarchical level within the course scalar, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarLevel {
    #[serde(rename = "CLO")]
    Clo,
    Topic,
    Subtopic,
    Lesson,
    PerformanceCriteria,
}

impl ScalarLevel {
    /// All levels from outermost to innermost
    pub const ALL: [ScalarLevel; 5] = [
        ScalarLevel::Clo,
        ScalarLevel::Topic,
        ScalarLevel::Subtopic,
        ScalarLevel::Lesson,
        ScalarLevel::PerformanceCriteria,
    ];

    /// Number of serial segments an entry at this level carries
    pub fn depth(self) -> usize {
        match self {
            ScalarLevel::Clo => 1,
            ScalarLevel::Topic => 2,
            ScalarLevel::Subtopic => 3,
            ScalarLevel::Lesson => 4,
            ScalarLevel::PerformanceCriteria => 5,
        }
    }

    /// Level one step outward, `None` for CLO
    pub fn parent(self) -> Option<ScalarLevel> {
        match self {
            ScalarLevel::Clo => None,
            ScalarLevel::Topic => Some(ScalarLevel::Clo),
            ScalarLevel::Subtopic => Some(ScalarLevel::Topic),
            ScalarLevel::Lesson => Some(ScalarLevel::Subtopic),
            ScalarLevel::PerformanceCriteria => Some(ScalarLevel::Lesson),
        }
    }

    /// Level one step inward, `None` for Performance Criteria
    pub fn child(self) -> Option<ScalarLevel> {
        match self {
            ScalarLevel::Clo => Some(ScalarLevel::Topic),
            ScalarLevel::Topic => Some(ScalarLevel::Subtopic),
            ScalarLevel::Subtopic => Some(ScalarLevel::Lesson),
            ScalarLevel::Lesson => Some(ScalarLevel::PerformanceCriteria),
            ScalarLevel::PerformanceCriteria => None,
        }
    }

    /// Level whose fixed depth equals `depth`
    pub fn from_depth(depth: usize) -> Option<ScalarLevel> {
        ScalarLevel::ALL.into_iter().find(|level| level.depth() == depth)
    }

    /// Canonical lexicon id naming this level
    pub fn lex_id(self) -> LexId {
        match self {
            ScalarLevel::Clo => LexId::Clo,
            ScalarLevel::Topic => LexId::ScTopic,
            ScalarLevel::Subtopic => LexId::ScSubtopic,
            ScalarLevel::Lesson => LexId::ScLesson,
            ScalarLevel::PerformanceCriteria => LexId::ScPc,
        }
    }

    /// Level named by a lexicon id, `None` for non-structural ids
    pub fn from_lex_id(id: LexId) -> Option<ScalarLevel> {
        ScalarLevel::ALL.into_iter().find(|level| level.lex_id() == id)
    }

    /// Stable string form used in storage and messages
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarLevel::Clo => "CLO",
            ScalarLevel::Topic => "Topic",
            ScalarLevel::Subtopic => "Subtopic",
            ScalarLevel::Lesson => "Lesson",
            ScalarLevel::PerformanceCriteria => "PerformanceCriteria",
        }
    }
}

impl fmt::Display for ScalarLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalarLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown scalar level: {}", s)))
    }
}

/// Number of dot-separated segments in a serial
pub fn serial_depth(serial: &str) -> usize {
    serial.split('.').count()
}

/// Serial of the enclosing entry, `None` for a single-segment serial
pub fn parent_of(serial: &str) -> Option<&str> {
    serial.rsplit_once('.').map(|(prefix, _)| prefix)
}

/// True when `serial` lies strictly below `ancestor` in the hierarchy
pub fn is_descendant_of(serial: &str, ancestor: &str) -> bool {
    serial.len() > ancestor.len()
        && serial.starts_with(ancestor)
        && serial.as_bytes()[ancestor.len()] == b'.'
}

/// One node in the course scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEntry {
    pub id: EntryId,
    pub level: ScalarLevel,
    pub serial: String,
    pub text: String,
    /// Zero-based position among siblings sharing `level` and `parent_serial`
    pub order_index: u32,
    pub parent_serial: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ScalarEntry {
    /// Create an unplaced entry (order index 0, empty metadata)
    pub fn new(
        level: ScalarLevel,
        serial: impl Into<String>,
        text: impl Into<String>,
        parent_serial: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            serial: serial.into(),
            text: text.into(),
            order_index: 0,
            parent_serial,
            metadata: BTreeMap::new(),
        }
    }

    /// Create an entry whose parent serial is derived from its own serial
    pub fn with_derived_parent(
        level: ScalarLevel,
        serial: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let serial = serial.into();
        let parent = match level {
            ScalarLevel::Clo => None,
            _ => parent_of(&serial).map(str::to_string),
        };
        Self::new(level, serial, text, parent)
    }

    /// Check serial format, depth, parent prefix and text, ignoring siblings
    pub fn validate_self(&self) -> Result<(), StructuralError> {
        let malformed = |reason: String| StructuralError::MalformedSerial {
            level: self.level,
            serial: self.serial.clone(),
            reason,
        };

        if self.serial.is_empty() {
            return Err(malformed("serial is empty".to_string()));
        }

        for segment in self.serial.split('.') {
            if segment.is_empty() {
                return Err(malformed("serial contains an empty segment".to_string()));
            }
            if segment.chars().any(char::is_whitespace) {
                return Err(malformed("serial contains whitespace".to_string()));
            }
        }

        let depth = serial_depth(&self.serial);
        if depth != self.level.depth() {
            return Err(malformed(format!(
                "depth {} does not match {} depth {}",
                depth,
                self.level,
                self.level.depth()
            )));
        }

        match (self.level, self.parent_serial.as_deref()) {
            (ScalarLevel::Clo, Some(parent)) => {
                return Err(malformed(format!("CLO cannot have parent '{}'", parent)));
            }
            (ScalarLevel::Clo, None) => {}
            (_, None) => {
                return Err(malformed("missing parent serial".to_string()));
            }
            (_, Some(parent)) => {
                if parent_of(&self.serial) != Some(parent) {
                    return Err(malformed(format!(
                        "prefix does not match parent serial '{}'",
                        parent
                    )));
                }
            }
        }

        if self.text.trim().is_empty() {
            return Err(StructuralError::EmptyText {
                level: self.level,
                serial: self.serial.clone(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for ScalarEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.chars().count() > 50 {
            let head: String = self.text.chars().take(50).collect();
            write!(f, "{}: {}...", self.serial, head)
        } else {
            write!(f, "{}: {}", self.serial, self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_depths_are_fixed() {
        let depths: Vec<usize> = ScalarLevel::ALL.iter().map(|l| l.depth()).collect();
        assert_eq!(depths, vec![1, 2, 3, 4, 5]);
        assert_eq!(ScalarLevel::from_depth(3), Some(ScalarLevel::Subtopic));
        assert_eq!(ScalarLevel::from_depth(6), None);
    }

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(ScalarLevel::Clo < ScalarLevel::Topic);
        assert!(ScalarLevel::Lesson < ScalarLevel::PerformanceCriteria);
        assert_eq!(ScalarLevel::Topic.parent(), Some(ScalarLevel::Clo));
        assert_eq!(ScalarLevel::PerformanceCriteria.child(), None);
    }

    #[test]
    fn test_level_serde_names() {
        assert_eq!(serde_json::to_string(&ScalarLevel::Clo).unwrap(), "\"CLO\"");
        assert_eq!(
            serde_json::to_string(&ScalarLevel::PerformanceCriteria).unwrap(),
            "\"PerformanceCriteria\""
        );
        assert_eq!("topic".parse::<ScalarLevel>().unwrap(), ScalarLevel::Topic);
        assert!("Module".parse::<ScalarLevel>().is_err());
    }

    #[test]
    fn test_level_lex_id_round_trip() {
        for level in ScalarLevel::ALL {
            assert_eq!(ScalarLevel::from_lex_id(level.lex_id()), Some(level));
        }
        assert_eq!(ScalarLevel::from_lex_id(LexId::CName), None);
    }

    #[test]
    fn test_parent_and_descendant_helpers() {
        assert_eq!(parent_of("1.2.3"), Some("1.2"));
        assert_eq!(parent_of("1"), None);
        assert!(is_descendant_of("1.2.3", "1.2"));
        assert!(is_descendant_of("1.2.3", "1"));
        assert!(!is_descendant_of("1.20", "1.2"));
        assert!(!is_descendant_of("1.2", "1.2"));
    }

    #[test]
    fn test_validate_self_accepts_well_formed_entries() {
        let clo = ScalarEntry::with_derived_parent(ScalarLevel::Clo, "1", "Identify threats");
        assert!(clo.validate_self().is_ok());

        let pc = ScalarEntry::with_derived_parent(
            ScalarLevel::PerformanceCriteria,
            "1.2.1.3.4",
            "Lists three indicators",
        );
        assert_eq!(pc.parent_serial.as_deref(), Some("1.2.1.3"));
        assert!(pc.validate_self().is_ok());
    }

    #[test]
    fn test_validate_self_rejects_depth_mismatch() {
        let entry = ScalarEntry::with_derived_parent(ScalarLevel::Lesson, "1.1.1", "Intro lesson");
        match entry.validate_self() {
            Err(StructuralError::MalformedSerial { level, serial, .. }) => {
                assert_eq!(level, ScalarLevel::Lesson);
                assert_eq!(serial, "1.1.1");
            }
            other => panic!("expected MalformedSerial, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_self_rejects_bad_segments() {
        for serial in ["", "1..2", "1.", "1. 2"] {
            let entry = ScalarEntry::new(ScalarLevel::Topic, serial, "Text", Some("1".to_string()));
            assert!(
                matches!(entry.validate_self(), Err(StructuralError::MalformedSerial { .. })),
                "serial {:?} should be malformed",
                serial
            );
        }
    }

    #[test]
    fn test_validate_self_rejects_parent_mismatch() {
        let entry = ScalarEntry::new(ScalarLevel::Topic, "2.1", "Topic", Some("1".to_string()));
        assert!(matches!(
            entry.validate_self(),
            Err(StructuralError::MalformedSerial { .. })
        ));

        let clo = ScalarEntry::new(ScalarLevel::Clo, "1", "Analyze", Some("0".to_string()));
        assert!(clo.validate_self().is_err());

        let orphan = ScalarEntry::new(ScalarLevel::Topic, "1.1", "Topic", None);
        assert!(orphan.validate_self().is_err());
    }

    #[test]
    fn test_validate_self_rejects_blank_text() {
        let entry = ScalarEntry::with_derived_parent(ScalarLevel::Clo, "1", "   ");
        assert_eq!(
            entry.validate_self(),
            Err(StructuralError::EmptyText {
                level: ScalarLevel::Clo,
                serial: "1".to_string()
            })
        );
    }

    #[test]
    fn test_display_truncates_long_text() {
        let entry = ScalarEntry::with_derived_parent(
            ScalarLevel::Clo,
            "1",
            "This is a very long text that should be truncated in the string representation",
        );
        let shown = entry.to_string();
        assert!(shown.starts_with("1: "));
        assert!(shown.ends_with("..."));

        let short = ScalarEntry::with_derived_parent(ScalarLevel::Clo, "2", "Short");
        assert_eq!(short.to_string(), "2: Short");
    }
}
