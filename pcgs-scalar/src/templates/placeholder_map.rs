//! Profile name → (Lex ID → placeholder) maps
//!
//! Renderers ask for the placeholder of a canonical field under a profile;
//! they never see the institution-specific names directly. Two profiles are
//! built in. Further profiles (or overrides of the built-in ones) come from
//! `[profiles.<name>]` tables in the config, keyed by any term the lexicon
//! understands.

use pcgs_common::{Error, LexId, Lexicon, ReferentialError, Result};
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_PROFILE: &str = "default";
pub const INSTITUTION_A_PROFILE: &str = "institution-a";

const INSTITUTION_A: &[(LexId, &str)] = &[
    (LexId::CName, "CourseTitle"),
    (LexId::CCode, "CourseCode"),
    (LexId::CLevel, "CourseLevel"),
    (LexId::CDuration, "CourseDuration"),
    (LexId::CDesc, "CourseSummary"),
    (LexId::CDev, "PreparedBy"),
    (LexId::Clo, "LearningOutcome"),
    (LexId::ScTopic, "ModuleTitle"),
    (LexId::ScSubtopic, "ElementTitle"),
    (LexId::ScLesson, "SessionTitle"),
    (LexId::ScPc, "PerformanceCriterion"),
    (LexId::SlTitle, "SlideHeading"),
    (LexId::SlBody, "SlideContent"),
    (LexId::SlBullets, "SlidePoints"),
    (LexId::TplSlideNo, "PageNumber"),
    (LexId::TplFooterLeft, "FooterCourse"),
    (LexId::TplFooterRight, "FooterCopyright"),
];

/// Immutable set of placeholder profiles
#[derive(Debug, Clone)]
pub struct TemplateProfiles {
    profiles: BTreeMap<String, BTreeMap<LexId, String>>,
}

impl Default for TemplateProfiles {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateProfiles {
    /// `default` maps every id to its own token; `institution-a` covers the
    /// structure, course header and slide basics.
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            DEFAULT_PROFILE.to_string(),
            LexId::all().map(|id| (id, id.as_str().to_string())).collect(),
        );
        profiles.insert(
            INSTITUTION_A_PROFILE.to_string(),
            INSTITUTION_A
                .iter()
                .map(|(id, placeholder)| (*id, placeholder.to_string()))
                .collect(),
        );
        Self { profiles }
    }

    /// Built-in profiles plus configured ones
    ///
    /// Keys are raw terms normalized through `lexicon`; an unknown key or an
    /// empty placeholder is a configuration error. A configured profile that
    /// shares a built-in name overrides it key by key.
    pub fn from_config(
        configured: &BTreeMap<String, BTreeMap<String, String>>,
        lexicon: &Lexicon,
    ) -> Result<Self> {
        let mut merged = Self::builtin();
        for (name, mappings) in configured {
            let profile = merged.profiles.entry(name.clone()).or_default();
            for (term, placeholder) in mappings {
                let id = lexicon.normalize(term).map_err(|_| {
                    Error::Config(format!("profile '{}' maps unknown term '{}'", name, term))
                })?;
                if placeholder.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "profile '{}' maps '{}' to an empty placeholder",
                        name, term
                    )));
                }
                profile.insert(id, placeholder.clone());
            }
            debug!(profile = %name, mappings = profile.len(), "Loaded template profile");
        }
        Ok(merged)
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Every mapping of a profile
    pub fn mappings(&self, profile: &str) -> Result<&BTreeMap<LexId, String>> {
        self.profiles.get(profile).ok_or_else(|| {
            ReferentialError::UnknownProfile {
                profile: profile.to_string(),
            }
            .into()
        })
    }

    /// Placeholder for one field
    pub fn resolve(&self, profile: &str, field: LexId) -> Result<&str> {
        self.mappings(profile)?
            .get(&field)
            .map(String::as_str)
            .ok_or_else(|| {
                ReferentialError::UnmappedField {
                    profile: profile.to_string(),
                    field: field.as_str().to_string(),
                }
                .into()
            })
    }

    /// Pair each value with its placeholder, stopping at the first unmapped
    /// field
    pub fn bind<'a, I>(&self, profile: &str, fields: I) -> Result<Vec<(String, String)>>
    where
        I: IntoIterator<Item = (LexId, &'a str)>,
    {
        fields
            .into_iter()
            .map(|(id, value)| Ok((self.resolve(profile, id)?.to_string(), value.to_string())))
            .collect()
    }
}
