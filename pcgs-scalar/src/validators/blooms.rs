//! Bloom's-verb validator for Course Learning Objectives
//!
//! A CLO should open with a Bloom's taxonomy performance verb
//! ("Analyze threat patterns"). The check is advisory: a CLO without a verb
//! is stored as written and annotated with a warning.
//!
//! When the verb is recognized but not in title case ("analyze ...") the
//! validator rewrites it once and keeps the text it replaced in
//! `blooms_original_text`, with the time in `blooms_capitalized_at`.
//! Running the pass again on the rewritten text changes nothing.

use crate::models::AdvisoryWarning;
use pcgs_common::time::{audit_stamp, now};
use pcgs_common::{ScalarEntry, ScalarLevel};
use serde_json::Value;
use tracing::debug;

pub const META_STATUS: &str = "blooms_status";
pub const META_VERB: &str = "blooms_verb";
pub const META_OFFENDING_WORD: &str = "blooms_offending_word";
pub const META_ORIGINAL_TEXT: &str = "blooms_original_text";
pub const META_CAPITALIZED_AT: &str = "blooms_capitalized_at";

/// Minimum Jaro-Winkler similarity for a "did you mean" hint
const SUGGESTION_THRESHOLD: f64 = 0.88;

/// Curated performance verbs across the six Bloom's levels (remember,
/// understand, apply, analyze, evaluate, create). Sorted, unique, uppercase.
pub const BLOOMS_VERBS: &[&str] = &[
    "ANALYSE", "ANALYZE", "APPLY", "APPRAISE", "ARGUE", "ARRANGE", "ASSEMBLE", "ASSESS",
    "BREAKDOWN", "BUILD", "CALCULATE", "CATEGORIZE", "CHANGE", "CHOOSE", "CLASSIFY",
    "COMBINE", "COMPARE", "COMPLETE", "COMPOSE", "COMPUTE", "CONCLUDE", "CONSTRUCT",
    "CONTRAST", "CREATE", "CRITICIZE", "CRITIQUE", "DEBATE", "DECIDE", "DEFEND", "DEFINE",
    "DEMONSTRATE", "DESCRIBE", "DESIGN", "DEVELOP", "DEVISE", "DIAGRAM", "DIFFERENTIATE",
    "DISCRIMINATE", "DISCUSS", "DISTINGUISH", "DRAMATIZE", "EMPLOY", "ESTIMATE", "EVALUATE",
    "EXAMINE", "EXECUTE", "EXPERIMENT", "EXPLAIN", "EXTEND", "FORMULATE", "GENERATE",
    "HYPOTHESIZE", "IDENTIFY", "ILLUSTRATE", "IMPLEMENT", "INFER", "INSPECT", "INTEGRATE",
    "INTERPRET", "INVENT", "INVESTIGATE", "JUDGE", "JUSTIFY", "LABEL", "LIST", "MAKE",
    "MATCH", "MEASURE", "MODIFY", "NAME", "OPERATE", "ORGANIZE", "ORIGINATE", "OUTLINE",
    "PARAPHRASE", "PLAN", "PRACTICE", "PREDICT", "PREPARE", "PRIORITIZE", "PRODUCE",
    "PROPOSE", "QUESTION", "RANK", "RATE", "REARRANGE", "RECALL", "RECOGNIZE", "RECOMMEND",
    "RECONSTRUCT", "RELATE", "REORGANIZE", "REPRODUCE", "RESEARCH", "REVIEW", "REVISE",
    "REWRITE", "SCHEDULE", "SCORE", "SELECT", "SEPARATE", "SHOW", "SKETCH", "SOLVE",
    "STATE", "SUMMARIZE", "SUPPORT", "SYNTHESIZE", "TEST", "USE", "VALIDATE", "VALUE",
    "VERIFY", "WRITE",
];

/// Result of checking one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Text opens with a known verb; `capitalized_text` is set when the verb
    /// is not already in title case.
    Valid {
        verb: String,
        capitalized_text: Option<String>,
    },
    /// First word is not a known verb (empty for blank text)
    Warning { word: String },
    /// Only CLOs are checked
    NotApplicable,
}

/// Bloom's-verb checker and annotator
#[derive(Debug, Clone)]
pub struct BloomsValidator {
    auto_capitalize: bool,
}

impl Default for BloomsValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomsValidator {
    pub fn new() -> Self {
        Self {
            auto_capitalize: true,
        }
    }

    pub fn with_auto_capitalize(auto_capitalize: bool) -> Self {
        Self { auto_capitalize }
    }

    pub fn auto_capitalize(&self) -> bool {
        self.auto_capitalize
    }

    pub fn is_verb(word: &str) -> bool {
        BLOOMS_VERBS
            .binary_search(&word.to_uppercase().as_str())
            .is_ok()
    }

    pub fn check(&self, entry: &ScalarEntry) -> ValidationOutcome {
        if entry.level != ScalarLevel::Clo {
            return ValidationOutcome::NotApplicable;
        }
        Self::check_text(&entry.text)
    }

    /// Check objective text as if it belonged to a CLO
    pub fn check_text(text: &str) -> ValidationOutcome {
        let Some((start, word)) = first_word(text) else {
            return ValidationOutcome::Warning {
                word: String::new(),
            };
        };

        if !Self::is_verb(word) {
            return ValidationOutcome::Warning {
                word: word.to_string(),
            };
        }

        let title = title_case(word);
        let capitalized_text = if title == word {
            None
        } else {
            let mut rewritten = String::with_capacity(text.len());
            rewritten.push_str(&text[..start]);
            rewritten.push_str(&title);
            rewritten.push_str(&text[start + word.len()..]);
            Some(rewritten)
        };

        ValidationOutcome::Valid {
            verb: title,
            capitalized_text,
        }
    }

    /// Annotate a CLO in place and return its warning, if any
    ///
    /// Non-CLO entries are left untouched.
    pub fn apply(&self, entry: &mut ScalarEntry) -> Option<AdvisoryWarning> {
        match self.check(entry) {
            ValidationOutcome::NotApplicable => None,
            ValidationOutcome::Valid {
                verb,
                capitalized_text,
            } => {
                if let (true, Some(rewritten)) = (self.auto_capitalize, capitalized_text) {
                    debug!(serial = %entry.serial, verb = %verb, "Capitalizing Bloom's verb");
                    let original = std::mem::replace(&mut entry.text, rewritten);
                    entry
                        .metadata
                        .insert(META_ORIGINAL_TEXT.to_string(), Value::String(original));
                    entry.metadata.insert(
                        META_CAPITALIZED_AT.to_string(),
                        Value::String(audit_stamp(now())),
                    );
                }
                entry
                    .metadata
                    .insert(META_STATUS.to_string(), Value::from("valid"));
                entry.metadata.insert(META_VERB.to_string(), Value::String(verb));
                entry.metadata.remove(META_OFFENDING_WORD);
                None
            }
            ValidationOutcome::Warning { word } => {
                entry
                    .metadata
                    .insert(META_STATUS.to_string(), Value::from("warning"));
                entry
                    .metadata
                    .insert(META_OFFENDING_WORD.to_string(), Value::String(word.clone()));
                entry.metadata.remove(META_VERB);
                Some(AdvisoryWarning::BloomsVerbMissing {
                    serial: entry.serial.clone(),
                    suggestion: Self::closest_verb(&word),
                    word,
                })
            }
        }
    }

    /// Drop the capitalization audit, used when the objective is rewritten
    pub fn clear_audit(entry: &mut ScalarEntry) {
        entry.metadata.remove(META_ORIGINAL_TEXT);
        entry.metadata.remove(META_CAPITALIZED_AT);
    }

    /// First `n` verbs alphabetically, title case
    pub fn suggestions(n: usize) -> Vec<String> {
        BLOOMS_VERBS.iter().take(n).map(|v| title_case(v)).collect()
    }

    /// Nearest curated verb to a misspelled word
    pub fn closest_verb(word: &str) -> Option<String> {
        if word.len() < 3 {
            return None;
        }
        let upper = word.to_uppercase();
        BLOOMS_VERBS
            .iter()
            .map(|verb| (strsim::jaro_winkler(&upper, verb), *verb))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, verb)| title_case(verb))
    }
}

/// Byte offset and slice of the first word, without surrounding punctuation
/// such as quotes, brackets or a trailing colon
fn first_word(text: &str) -> Option<(usize, &str)> {
    let token_start = text.len() - text.trim_start().len();
    let token = text[token_start..].split_whitespace().next()?;

    let core_start = token
        .char_indices()
        .find(|(_, c)| c.is_alphanumeric())
        .map(|(i, _)| i)?;
    let core = token[core_start..].trim_end_matches(|c: char| !c.is_alphanumeric());
    if core.is_empty() {
        return None;
    }
    Some((token_start + core_start, core))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
