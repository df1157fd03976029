//! Export field projection
//!
//! Flattens a course scalar into canonical fields in render order. A
//! renderer pairs each field with `TemplateProfiles::resolve` to find where
//! the value goes; no document I/O happens here.

use crate::models::ScalarCollection;
use crate::templates::TemplateProfiles;
use pcgs_common::{LexId, Result};
use serde::Serialize;
use serde_json::Value;

/// One value addressed by its canonical id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalField {
    pub lex_id: LexId,
    pub serial: String,
    pub value: String,
}

/// A field bound to a profile's placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundField {
    pub placeholder: String,
    pub serial: String,
    pub value: String,
}

/// Fields for every entry, in listing order
///
/// Each entry yields its level field first, then every metadata value stored
/// under a canonical id token (imported pass-through columns such as
/// `C_DURATION`). Other metadata keys are not canonical fields.
pub fn canonical_fields(collection: &ScalarCollection) -> Vec<CanonicalField> {
    let mut fields = Vec::new();
    for entry in collection.tree_order() {
        fields.push(CanonicalField {
            lex_id: entry.level.lex_id(),
            serial: entry.serial.clone(),
            value: entry.text.clone(),
        });
        for (key, value) in &entry.metadata {
            let Ok(lex_id) = key.parse::<LexId>() else {
                continue;
            };
            fields.push(CanonicalField {
                lex_id,
                serial: entry.serial.clone(),
                value: match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            });
        }
    }
    fields
}

/// Canonical fields resolved against a profile; fails on the first field
/// the profile does not map
pub fn bind_fields(
    collection: &ScalarCollection,
    profiles: &TemplateProfiles,
    profile: &str,
) -> Result<Vec<BoundField>> {
    canonical_fields(collection)
        .into_iter()
        .map(|field| {
            Ok(BoundField {
                placeholder: profiles.resolve(profile, field.lex_id)?.to_string(),
                serial: field.serial,
                value: field.value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::INSTITUTION_A_PROFILE;
    use pcgs_common::ScalarLevel;

    fn course() -> ScalarCollection {
        let mut c = ScalarCollection::new();
        c.add(ScalarLevel::Clo, "1", "Analyze threat patterns", None).unwrap();
        c.add(ScalarLevel::Clo, "2", "Evaluate controls", None).unwrap();
        c.add(ScalarLevel::Topic, "1.1", "Threat actors", Some("1".into())).unwrap();
        c
    }

    #[test]
    fn test_fields_follow_listing_order() {
        let fields = canonical_fields(&course());
        let serials: Vec<&str> = fields.iter().map(|f| f.serial.as_str()).collect();
        assert_eq!(serials, vec!["1", "1.1", "2"]);
        assert_eq!(fields[1].lex_id, LexId::ScTopic);
        assert_eq!(fields[1].value, "Threat actors");
    }

    #[test]
    fn test_bind_fields_with_profile() {
        let bound = bind_fields(&course(), &TemplateProfiles::builtin(), INSTITUTION_A_PROFILE).unwrap();
        assert_eq!(bound[0].placeholder, "LearningOutcome");
        assert_eq!(bound[1].placeholder, "ModuleTitle");
        assert!(bind_fields(&course(), &TemplateProfiles::builtin(), "nope").is_err());
    }

    #[test]
    fn test_canonical_metadata_follows_its_entry() {
        let mut c = course();
        let mut patch = std::collections::BTreeMap::new();
        patch.insert("C_DURATION".to_string(), Value::from("3 Days"));
        patch.insert("blooms_status".to_string(), Value::from("valid"));
        patch.insert("Room".to_string(), Value::from("B12"));
        c.update("1", None, Some(&patch)).unwrap();

        let fields = canonical_fields(&c);
        let first: Vec<(LexId, &str)> = fields
            .iter()
            .filter(|f| f.serial == "1")
            .map(|f| (f.lex_id, f.value.as_str()))
            .collect();
        assert_eq!(
            first,
            vec![
                (LexId::Clo, "Analyze threat patterns"),
                (LexId::CDuration, "3 Days"),
            ]
        );
        assert_eq!(fields[2].serial, "1.1");
    }
}
