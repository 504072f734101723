//! Term Governance Engine
//!
//! Owns every state-changing path of the glossary: the proposal status
//! machine, materializing approved proposals into terms and ledger rows,
//! administrative term edits, and the audit trail that goes with each.

mod engine;

pub use engine::{ApprovalOutcome, GovernanceEngine, NewTerm, ProposalDetail, TermEdit};

use crate::auth::Capability;
use crate::proposal::{AuditEventType, ProposalStatus};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("{0} not found")]
    NotFound(String),

    /// The action is not legal from the proposal's current, non-terminal status
    #[error("Cannot record {action} on a proposal that is {status}")]
    InvalidTransition {
        action: AuditEventType,
        status: ProposalStatus,
    },

    /// A terminal transition lost the race, or was retried after completion
    #[error("Proposal has already been {status}")]
    AlreadyReviewed { status: ProposalStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not permitted: {0}")]
    PermissionDenied(String),

    #[error("Authentication required to {0}")]
    Unauthenticated(Capability),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;
