//! In-memory glossary store
//!
//! All collections live behind one lock, so a commit that touches a
//! proposal, its trail, a term and the ledger is applied as a single unit.

use crate::proposal::{AuditEvent, Proposal, ProposalStatus};
use crate::store::{CommitOutcome, GlossaryStore, StoreResult, TermWrite, Transition};
use crate::term::{Term, TermFilter, VersionEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    terms: HashMap<Uuid, Term>,
    /// Term ID -> entries in version order
    ledger: HashMap<Uuid, Vec<VersionEntry>>,
    proposals: HashMap<Uuid, Proposal>,
    /// Proposal ID -> events in append order
    events: HashMap<Uuid, Vec<AuditEvent>>,
}

impl Inner {
    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.terms
            .values()
            .any(|t| Some(t.id) != except && t.content.name.eq_ignore_ascii_case(name))
    }

    /// Why `write` cannot be applied, if anything
    fn check_term_write(&self, write: &TermWrite) -> Option<CommitOutcome> {
        match write {
            TermWrite::Create { term, .. } => {
                if self.name_taken(&term.content.name, None) {
                    return Some(CommitOutcome::DuplicateName(term.content.name.clone()));
                }
            }
            TermWrite::Update { term, expected_version, .. } => {
                let Some(current) = self.terms.get(&term.id) else {
                    return Some(CommitOutcome::TermMissing);
                };
                if current.version != *expected_version {
                    return Some(CommitOutcome::TermVersionMismatch { current: current.version });
                }
                if self.name_taken(&term.content.name, Some(term.id)) {
                    return Some(CommitOutcome::DuplicateName(term.content.name.clone()));
                }
            }
            TermWrite::Metadata { term } => {
                if !self.terms.contains_key(&term.id) {
                    return Some(CommitOutcome::TermMissing);
                }
            }
        }
        None
    }

    fn apply_term_write(&mut self, write: TermWrite) {
        match write {
            TermWrite::Create { term, entry } | TermWrite::Update { term, entry, .. } => {
                self.ledger.entry(term.id).or_default().push(entry);
                self.terms.insert(term.id, term);
            }
            TermWrite::Metadata { term } => {
                self.terms.insert(term.id, term);
            }
        }
    }
}

/// Thread-safe in-memory store
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GlossaryStore for MemoryStore {
    async fn get_term(&self, id: Uuid) -> StoreResult<Option<Term>> {
        let inner = self.inner.read().await;
        Ok(inner.terms.get(&id).cloned())
    }

    async fn find_term_by_name(&self, name: &str) -> StoreResult<Option<Term>> {
        let inner = self.inner.read().await;
        Ok(inner
            .terms
            .values()
            .find(|t| t.content.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_terms(&self, filter: &TermFilter) -> StoreResult<Vec<Term>> {
        let inner = self.inner.read().await;
        let mut terms: Vec<Term> = inner.terms.values().filter(|t| filter.matches(t)).cloned().collect();
        terms.sort_by_key(|t| t.content.name.to_lowercase());
        Ok(terms)
    }

    async fn write_term(&self, write: TermWrite) -> StoreResult<CommitOutcome> {
        let mut inner = self.inner.write().await;
        if let Some(outcome) = inner.check_term_write(&write) {
            return Ok(outcome);
        }
        debug!("Writing term {} at v{}", write.term().id, write.term().version);
        inner.apply_term_write(write);
        Ok(CommitOutcome::Committed)
    }

    async fn term_history(&self, term_id: Uuid) -> StoreResult<Vec<VersionEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.ledger.get(&term_id).cloned().unwrap_or_default())
    }

    async fn term_version(&self, term_id: Uuid, version: i32) -> StoreResult<Option<VersionEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledger
            .get(&term_id)
            .and_then(|entries| entries.iter().find(|e| e.version_number == version).cloned()))
    }

    async fn insert_proposal(&self, proposal: &Proposal, event: &AuditEvent) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.proposals.insert(proposal.id, proposal.clone());
        inner.events.insert(proposal.id, vec![event.clone()]);
        Ok(())
    }

    async fn get_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>> {
        let inner = self.inner.read().await;
        Ok(inner.proposals.get(&id).cloned())
    }

    async fn list_proposals(&self, status: Option<ProposalStatus>) -> StoreResult<Vec<Proposal>> {
        let inner = self.inner.read().await;
        let mut proposals: Vec<Proposal> = inner
            .proposals
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(proposals)
    }

    async fn delete_proposal(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        inner.events.remove(&id);
        Ok(inner.proposals.remove(&id).is_some())
    }

    async fn commit_transition(&self, transition: Transition) -> StoreResult<CommitOutcome> {
        let mut inner = self.inner.write().await;

        let Some(stored) = inner.proposals.get(&transition.proposal.id) else {
            return Ok(CommitOutcome::ProposalMissing);
        };
        if let Some(outcome) = transition.refused_by(stored.status, stored.revision) {
            return Ok(outcome);
        }
        if let Some(write) = &transition.term_write {
            if let Some(outcome) = inner.check_term_write(write) {
                return Ok(outcome);
            }
        }

        // Every check passed; nothing below can fail
        let Transition { proposal, event, term_write, .. } = transition;
        if let Some(write) = term_write {
            inner.apply_term_write(write);
        }
        inner.events.entry(proposal.id).or_default().push(event);
        inner.proposals.insert(proposal.id, proposal);
        Ok(CommitOutcome::Committed)
    }

    async fn audit_events(&self, proposal_id: Uuid) -> StoreResult<Vec<AuditEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.get(&proposal_id).cloned().unwrap_or_default())
    }
}
