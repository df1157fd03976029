//! Template placeholder profiles

pub mod placeholder_map;

pub use placeholder_map::{TemplateProfiles, DEFAULT_PROFILE, INSTITUTION_A_PROFILE};
