//! Advisory validators
//!
//! Validators annotate entries and report `AdvisoryWarning`s. They never
//! reject a mutation.

pub mod blooms;

pub use blooms::{BloomsValidator, ValidationOutcome};
