//! Scalar services

pub mod scalar_importer;
pub mod scalar_service;
pub mod tabular_source;
pub mod xlsx_source;

pub use scalar_importer::{HeaderMode, ImportOptions, ParsedImport, ScalarImporter};
pub use scalar_service::ScalarService;
pub use tabular_source::{GridSource, SourceRow, TabularSource};
