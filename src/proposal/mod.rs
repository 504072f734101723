//! Proposal module - requests to create or change terms
//!
//! Holds the proposal model, the review status machine, and the audit trail.

mod audit;
mod models;

pub use audit::{replay, trail_for, AuditEvent, AuditEventType};
pub use models::*;
