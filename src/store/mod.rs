//! Persistence contract for the governance engine
//!
//! Every write the engine performs goes through one of the all-or-nothing
//! operations here. Proposal transitions are conditional on the proposal's
//! current status and revision, and term content updates are conditional on the term's
//! current version, so concurrent callers (in one process or many) can never
//! both win.

pub mod memory;
pub mod postgres;

use crate::proposal::{AuditEvent, Proposal, ProposalStatus};
use crate::term::{Term, TermFilter, VersionEntry};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A term mutation committed together with its ledger row
#[derive(Debug, Clone)]
pub enum TermWrite {
    /// Insert a term at version 1 with ledger entry #1
    Create { term: Term, entry: VersionEntry },
    /// Replace a term's content, only if it is still at `expected_version`
    Update {
        term: Term,
        expected_version: i32,
        entry: VersionEntry,
    },
    /// Replace metadata only; no version change and no ledger row
    Metadata { term: Term },
}

impl TermWrite {
    pub fn term(&self) -> &Term {
        match self {
            TermWrite::Create { term, .. } => term,
            TermWrite::Update { term, .. } => term,
            TermWrite::Metadata { term } => term,
        }
    }
}

/// A proposal status change and everything that commits with it
#[derive(Debug, Clone)]
pub struct Transition {
    /// The proposal as it should read after the commit
    pub proposal: Proposal,
    /// The commit only applies if the stored status still equals this
    pub expected_status: ProposalStatus,
    /// It also requires the stored revision to still equal this
    pub expected_revision: i64,
    pub event: AuditEvent,
    pub term_write: Option<TermWrite>,
}

impl Transition {
    /// Move `current` to `next`, guarded on the status and revision that were read
    pub fn step(current: &Proposal, next: Proposal, event: AuditEvent) -> Self {
        Self {
            proposal: next,
            expected_status: current.status,
            expected_revision: current.revision,
            event,
            term_write: None,
        }
    }

    pub fn with_term_write(mut self, write: TermWrite) -> Self {
        self.term_write = Some(write);
        self
    }

    /// Why this transition cannot apply to a proposal stored at
    /// `status`/`revision`, if anything
    pub fn refused_by(&self, status: ProposalStatus, revision: i64) -> Option<CommitOutcome> {
        if status != self.expected_status {
            Some(CommitOutcome::StatusMismatch(status))
        } else if revision != self.expected_revision {
            Some(CommitOutcome::RevisionMismatch { current: revision })
        } else {
            None
        }
    }
}

/// Result of a conditional commit. Anything other than `Committed` means
/// nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The proposal moved on before this commit; carries the stored status
    StatusMismatch(ProposalStatus),
    /// Same status, but the proposal was changed and returned to it since it was read
    RevisionMismatch { current: i64 },
    /// The proposal no longer exists
    ProposalMissing,
    /// The term is no longer at the expected version
    TermVersionMismatch { current: i32 },
    /// The term to update does not exist
    TermMissing,
    /// Another term already uses this name
    DuplicateName(String),
}

#[async_trait]
pub trait GlossaryStore: Send + Sync {
    // ── Terms ──

    async fn get_term(&self, id: Uuid) -> StoreResult<Option<Term>>;
    async fn find_term_by_name(&self, name: &str) -> StoreResult<Option<Term>>;
    async fn list_terms(&self, filter: &TermFilter) -> StoreResult<Vec<Term>>;
    /// Direct administrative write, outside any proposal
    async fn write_term(&self, write: TermWrite) -> StoreResult<CommitOutcome>;

    // ── Version ledger ──

    /// All entries for a term, ascending by version number
    async fn term_history(&self, term_id: Uuid) -> StoreResult<Vec<VersionEntry>>;
    async fn term_version(&self, term_id: Uuid, version: i32) -> StoreResult<Option<VersionEntry>>;

    // ── Proposals ──

    /// Insert a new proposal together with its opening audit event
    async fn insert_proposal(&self, proposal: &Proposal, event: &AuditEvent) -> StoreResult<()>;
    async fn get_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>>;
    /// Newest first
    async fn list_proposals(&self, status: Option<ProposalStatus>) -> StoreResult<Vec<Proposal>>;
    /// Remove a proposal and its trail. Returns false if it did not exist.
    async fn delete_proposal(&self, id: Uuid) -> StoreResult<bool>;
    async fn commit_transition(&self, transition: Transition) -> StoreResult<CommitOutcome>;

    // ── Audit trail ──

    /// Events for a proposal in recorded order
    async fn audit_events(&self, proposal_id: Uuid) -> StoreResult<Vec<AuditEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{AuditEventType, ProposalKind};
    use crate::term::models::sample_content;

    fn approval_of(proposal: &Proposal) -> Transition {
        Transition::step(
            proposal,
            proposal.reviewed(ProposalStatus::Approved, "rita", None),
            AuditEvent::record(proposal.id, AuditEventType::Approved, "rita", None),
        )
    }

    #[test]
    fn test_step_guards_on_what_was_read() {
        let proposal = Proposal::new(ProposalKind::New, sample_content("Phase Gate"), None, "alice");
        let transition = approval_of(&proposal);

        assert_eq!(transition.expected_status, ProposalStatus::Pending);
        assert_eq!(transition.expected_revision, 1);
        assert_eq!(transition.proposal.revision, 2);
        assert!(transition.term_write.is_none());
    }

    #[test]
    fn test_refused_by_checks_status_before_revision() {
        let proposal = Proposal::new(ProposalKind::New, sample_content("Phase Gate"), None, "alice");
        let transition = approval_of(&proposal);

        assert_eq!(transition.refused_by(ProposalStatus::Pending, 1), None);
        assert_eq!(
            transition.refused_by(ProposalStatus::Rejected, 2),
            Some(CommitOutcome::StatusMismatch(ProposalStatus::Rejected))
        );
        // Sent back and resubmitted: same status, newer revision
        assert_eq!(
            transition.refused_by(ProposalStatus::Pending, 3),
            Some(CommitOutcome::RevisionMismatch { current: 3 })
        );
    }
}
