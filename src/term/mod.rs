//! Term module
//!
//! Canonical glossary terms, their version ledger, and the content diff engine.

pub mod diff;
pub mod ledger;
pub mod models;

pub use diff::{DiffEngine, FieldChange, VersionComparison};
pub use ledger::{check_history, VersionEntry, VersionSummary};
pub use models::*;
