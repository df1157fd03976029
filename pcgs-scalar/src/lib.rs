//! pcgs-scalar library interface
//!
//! The scalar engine: consistency and ordering rules for the five-level
//! course structure, course-scoped locking and persistence, spreadsheet
//! import, Bloom's-verb validation, template placeholder profiles and export
//! field projection.

pub mod db;
pub mod export;
pub mod models;
pub mod services;
pub mod templates;
pub mod validators;

pub use crate::db::{MemoryScalarStore, ScalarStore, SqliteScalarStore};
pub use crate::models::{AdvisoryWarning, ImportOutcome, RowError, ScalarCollection, ScalarListing};
pub use crate::services::{GridSource, HeaderMode, ScalarImporter, ScalarService, TabularSource};
pub use crate::templates::TemplateProfiles;
