//! # PCGS Common Library
//!
//! Shared code for the PCGS course-authoring services including:
//! - Error taxonomy (structural, referential, whole-operation failures)
//! - Configuration loading and root folder resolution
//! - Canonical term registry (the lexicon)
//! - Scalar entry model
//! - Database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod lexicon;
pub mod scalar;
pub mod time;

pub use error::{Error, ReferentialError, Result, StructuralError};
pub use lexicon::{LexId, Lexicon};
pub use scalar::{EntryId, ScalarEntry, ScalarLevel};
