//! Scalar persistence
//!
//! `ScalarStore` is the only contract the engine needs from storage: load a
//! course's entries and replace them atomically.

pub mod memory;
pub mod scalar_store;

pub use memory::MemoryScalarStore;
pub use scalar_store::{ScalarStore, SqliteScalarStore};
