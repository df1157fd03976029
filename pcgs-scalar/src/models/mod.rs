//! Data models for the scalar engine

pub mod collection;
pub mod import_result;

pub use collection::{LevelView, ScalarCollection, ScalarListing};
pub use import_result::{AdvisoryWarning, ImportOutcome, RowError};
