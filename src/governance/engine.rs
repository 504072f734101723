//! Governance Engine
//!
//! Validates every transition against the proposal status machine, consults
//! the permission gate first, and hands the store one conditional commit per
//! action. Losing a race is reported, never repaired.

use crate::auth::{Caller, Capability, Decision, DenyReason, Identity, PermissionGate};
use crate::governance::{GovernanceError, GovernanceResult};
use crate::proposal::{
    replay, trail_for, AuditEvent, AuditEventType, Proposal, ProposalDraft, ProposalKind, ProposalStatus,
    ProposalSummary, Resubmission,
};
use crate::store::{CommitOutcome, GlossaryStore, TermWrite, Transition};
use crate::term::{
    check_history, CategoryCount, ContentField, ContentPatch, DiffEngine, FieldChange, Term, TermContent,
    TermFilter, TermMetadataUpdate, TermStatus, VersionComparison, VersionEntry, Visibility,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A proposal with its trail and, for edits, how it compares to the live term
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDetail {
    pub proposal: Proposal,
    pub events: Vec<AuditEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_term_version: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Vec<FieldChange>>,
}

/// Result of a successful approval
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub proposal: Proposal,
    pub term: Term,
    /// Fields where the reviewer's edits differ from the proposal
    pub edited_fields: Vec<ContentField>,
}

/// Administrative term creation
#[derive(Debug, Clone)]
pub struct NewTerm {
    pub content: TermContent,
    pub status: Option<TermStatus>,
    pub visibility: Option<Visibility>,
    pub owner: Option<String>,
    pub change_note: Option<String>,
}

/// Administrative content edit
#[derive(Debug, Clone)]
pub struct TermEdit {
    pub patch: ContentPatch,
    pub change_note: Option<String>,
    /// When set, the edit only applies if the term is still at this version
    pub expected_version: Option<i32>,
}

pub struct GovernanceEngine {
    store: Arc<dyn GlossaryStore>,
    gate: Arc<dyn PermissionGate>,
}

fn required_comment(comment: &str, action: &str) -> GovernanceResult<String> {
    let trimmed = comment.trim();
    if trimmed.is_empty() {
        return Err(GovernanceError::Validation(format!("A comment is required to {}", action)));
    }
    Ok(trimmed.to_string())
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// The error for recording `action` against a proposal in `status`
fn refusal(status: ProposalStatus, action: AuditEventType) -> GovernanceError {
    if status.is_terminal() && action.is_terminal() {
        GovernanceError::AlreadyReviewed { status }
    } else {
        GovernanceError::InvalidTransition { action, status }
    }
}

fn proposal_not_found(id: Uuid) -> GovernanceError {
    GovernanceError::NotFound(format!("Proposal {}", id))
}

fn term_not_found(id: Uuid) -> GovernanceError {
    GovernanceError::NotFound(format!("Term {}", id))
}

impl GovernanceEngine {
    pub fn new(store: Arc<dyn GlossaryStore>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { store, gate }
    }

    // =========================================================================
    // GUARDS
    // =========================================================================

    fn authorize<'a>(&self, caller: &'a Caller, capability: Capability) -> GovernanceResult<&'a Identity> {
        match (self.gate.check(caller.identity(), capability), caller.identity()) {
            (Decision::Allow, Some(identity)) => Ok(identity),
            (Decision::Allow, None) | (Decision::Deny(DenyReason::Unauthenticated), _) => {
                Err(GovernanceError::Unauthenticated(capability))
            }
            (Decision::Deny(DenyReason::InsufficientRole), identity) => {
                let role = identity.map(|i| i.role.to_string()).unwrap_or_default();
                warn!("Denied {} to {:?} (role {})", capability, identity.map(|i| &i.id), role);
                Err(GovernanceError::PermissionDenied(format!(
                    "The {} role cannot {}",
                    role, capability
                )))
            }
        }
    }

    fn require_submitter(identity: &Identity, proposal: &Proposal) -> GovernanceResult<()> {
        if identity.id != proposal.submitted_by {
            warn!("{} tried to act on proposal {} submitted by {}", identity.id, proposal.id, proposal.submitted_by);
            return Err(GovernanceError::PermissionDenied(
                "Only the original submitter can do this".to_string(),
            ));
        }
        Ok(())
    }

    fn check_step(proposal: &Proposal, action: AuditEventType) -> GovernanceResult<ProposalStatus> {
        proposal
            .status
            .after(action)
            .ok_or_else(|| refusal(proposal.status, action))
    }

    async fn load_proposal(&self, id: Uuid) -> GovernanceResult<Proposal> {
        self.store.get_proposal(id).await?.ok_or_else(|| proposal_not_found(id))
    }

    async fn load_term(&self, id: Uuid) -> GovernanceResult<Term> {
        self.store.get_term(id).await?.ok_or_else(|| term_not_found(id))
    }

    /// Load a term the caller is allowed to see. Hidden terms read as absent.
    async fn visible_term(&self, caller: &Caller, id: Uuid) -> GovernanceResult<Term> {
        let term = self.load_term(id).await?;
        if caller.identity().is_none() && term.visibility != Visibility::Public {
            return Err(term_not_found(id));
        }
        Ok(term)
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> GovernanceResult<()> {
        match self.store.find_term_by_name(name).await? {
            Some(existing) if Some(existing.id) != except => Err(GovernanceError::Conflict(format!(
                "A term named '{}' already exists",
                existing.content.name
            ))),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Hand a transition to the store and translate a refused commit
    async fn commit(&self, transition: Transition) -> GovernanceResult<Proposal> {
        let proposal = transition.proposal.clone();
        let action = transition.event.event_type;
        let actor = transition.event.actor_id.clone();

        match self.store.commit_transition(transition).await? {
            CommitOutcome::Committed => {
                info!("Proposal {} -> {} ({} by {})", proposal.id, proposal.status, action, actor);
                Ok(proposal)
            }
            CommitOutcome::StatusMismatch(status) => {
                warn!("Proposal {} changed to {} before {} could commit", proposal.id, status, action);
                if status.after(action).is_none() {
                    Err(refusal(status, action))
                } else {
                    Err(GovernanceError::Conflict(format!(
                        "Proposal moved to {} while this request was in flight",
                        status
                    )))
                }
            }
            CommitOutcome::RevisionMismatch { current } => {
                warn!("Proposal {} reached revision {} before {} could commit", proposal.id, current, action);
                Err(GovernanceError::Conflict(format!(
                    "Proposal was updated (revision {}) while this request was in flight",
                    current
                )))
            }
            CommitOutcome::ProposalMissing => Err(proposal_not_found(proposal.id)),
            CommitOutcome::TermVersionMismatch { current } => Err(GovernanceError::Conflict(format!(
                "Term moved to version {} while this request was in flight",
                current
            ))),
            CommitOutcome::TermMissing => Err(GovernanceError::NotFound(format!(
                "Term {}",
                proposal.kind.term_id().unwrap_or_default()
            ))),
            CommitOutcome::DuplicateName(name) => Err(GovernanceError::Conflict(format!(
                "A term named '{}' already exists",
                name
            ))),
        }
    }

    async fn write_term(&self, write: TermWrite) -> GovernanceResult<Term> {
        let term = write.term().clone();
        match self.store.write_term(write).await? {
            CommitOutcome::Committed => Ok(term),
            CommitOutcome::TermVersionMismatch { current } => Err(GovernanceError::Conflict(format!(
                "Term is at version {}, not {}",
                current,
                term.version - 1
            ))),
            CommitOutcome::DuplicateName(name) => Err(GovernanceError::Conflict(format!(
                "A term named '{}' already exists",
                name
            ))),
            CommitOutcome::TermMissing => Err(term_not_found(term.id)),
            other => Err(GovernanceError::Conflict(format!("Term write refused: {:?}", other))),
        }
    }

    // =========================================================================
    // PROPOSALS
    // =========================================================================

    /// Record a new proposal. The submitter is always the caller.
    pub async fn create_proposal(&self, caller: &Caller, draft: ProposalDraft) -> GovernanceResult<Proposal> {
        let identity = self.authorize(caller, Capability::Propose)?;

        let content = draft.content.normalized();
        content.validate().map_err(GovernanceError::Validation)?;

        let kind = match draft.term_id {
            Some(term_id) => {
                let term = self.load_term(term_id).await?;
                if DiffEngine::changed_fields(&term.content, &content).is_empty() {
                    return Err(GovernanceError::Validation(
                        "Proposed content is identical to the current term".to_string(),
                    ));
                }
                self.ensure_name_free(&content.name, Some(term_id)).await?;
                ProposalKind::Edit {
                    term_id,
                    base_version: term.version,
                }
            }
            None => {
                self.ensure_name_free(&content.name, None).await?;
                ProposalKind::New
            }
        };

        let proposal = Proposal::new(kind, content, optional_text(draft.changes_summary), identity.id.clone());
        let event = AuditEvent::submitted(&proposal);
        self.store.insert_proposal(&proposal, &event).await?;

        info!(
            "Created {} proposal '{}' (id: {}) by {}",
            proposal.kind.as_str(),
            proposal.content.name,
            proposal.id,
            identity.id
        );
        Ok(proposal)
    }

    pub async fn list_proposals(
        &self,
        caller: &Caller,
        status: Option<ProposalStatus>,
    ) -> GovernanceResult<Vec<ProposalSummary>> {
        self.authorize(caller, Capability::View)?;
        let proposals = self.store.list_proposals(status).await?;
        debug!("Listed {} proposals (status filter: {:?})", proposals.len(), status);
        Ok(proposals.iter().map(ProposalSummary::from).collect())
    }

    /// A proposal with its audit trail; never changes proposal state
    pub async fn get_proposal(&self, caller: &Caller, id: Uuid) -> GovernanceResult<ProposalDetail> {
        self.authorize(caller, Capability::View)?;
        let proposal = self.load_proposal(id).await?;

        let events = trail_for(&proposal, self.store.audit_events(id).await?);
        if let Err(problem) = replay(&events) {
            warn!("Audit trail for proposal {} is inconsistent: {}", id, problem);
        }

        let (current_term_version, comparison) = match proposal.kind {
            ProposalKind::Edit { term_id, .. } => match self.store.get_term(term_id).await? {
                Some(term) => (
                    Some(term.version),
                    Some(DiffEngine::compare(&term.content, &proposal.content)),
                ),
                None => (None, None),
            },
            ProposalKind::New => (None, None),
        };

        Ok(ProposalDetail {
            proposal,
            events,
            current_term_version,
            comparison,
        })
    }

    /// Remove a proposal and its trail entirely
    pub async fn delete_proposal(&self, caller: &Caller, id: Uuid) -> GovernanceResult<()> {
        let identity = self.authorize(caller, Capability::Administer)?;
        if !self.store.delete_proposal(id).await? {
            return Err(proposal_not_found(id));
        }
        info!("Deleted proposal {} (by {})", id, identity.id);
        Ok(())
    }

    /// Explicitly move a pending proposal into review
    pub async fn start_review(&self, caller: &Caller, id: Uuid) -> GovernanceResult<Proposal> {
        let identity = self.authorize(caller, Capability::Review)?;
        let proposal = self.load_proposal(id).await?;
        let next = Self::check_step(&proposal, AuditEventType::ReviewStarted)?;

        self.commit(Transition::step(
            &proposal,
            proposal.with_status(next),
            AuditEvent::record(id, AuditEventType::ReviewStarted, identity.id.clone(), None),
        ))
        .await
    }

    pub async fn request_changes(&self, caller: &Caller, id: Uuid, comment: &str) -> GovernanceResult<Proposal> {
        let identity = self.authorize(caller, Capability::Review)?;
        let comment = required_comment(comment, "request changes")?;
        let proposal = self.load_proposal(id).await?;
        let next = Self::check_step(&proposal, AuditEventType::ChangesRequested)?;

        self.commit(Transition::step(
            &proposal,
            proposal.reviewed(next, &identity.id, Some(comment.clone())),
            AuditEvent::record(id, AuditEventType::ChangesRequested, identity.id.clone(), Some(comment)),
        ))
        .await
    }

    /// Merge the submitter's updates and send the proposal back to the queue
    pub async fn resubmit(&self, caller: &Caller, id: Uuid, update: Resubmission) -> GovernanceResult<Proposal> {
        let identity = self.authorize(caller, Capability::Propose)?;
        let proposal = self.load_proposal(id).await?;
        Self::require_submitter(identity, &proposal)?;
        let next = Self::check_step(&proposal, AuditEventType::Resubmitted)?;

        let content = proposal.content.overlay(&update.fields).normalized();
        content.validate().map_err(GovernanceError::Validation)?;
        if !content.name.eq_ignore_ascii_case(&proposal.content.name) {
            self.ensure_name_free(&content.name, proposal.kind.term_id()).await?;
        }

        let summary = optional_text(update.changes_summary);
        let resubmitted = Proposal {
            content,
            changes_summary: summary.clone().or_else(|| proposal.changes_summary.clone()),
            status: next,
            updated_at: Utc::now(),
            revision: proposal.revision + 1,
            ..proposal.clone()
        };

        self.commit(Transition::step(
            &proposal,
            resubmitted,
            AuditEvent::record(id, AuditEventType::Resubmitted, identity.id.clone(), summary),
        ))
        .await
    }

    /// Approve a proposal, materializing it into the term store.
    ///
    /// `reviewer_edits` overlay the proposal's content for the term write
    /// only; the stored proposal keeps what the submitter sent.
    pub async fn approve(
        &self,
        caller: &Caller,
        id: Uuid,
        reviewer_edits: Option<ContentPatch>,
        comment: Option<String>,
    ) -> GovernanceResult<ApprovalOutcome> {
        let identity = self.authorize(caller, Capability::Review)?;
        let proposal = self.load_proposal(id).await?;
        let next = Self::check_step(&proposal, AuditEventType::Approved)?;

        let approved_content = match &reviewer_edits {
            Some(edits) if !edits.is_empty() => proposal.content.overlay(edits).normalized(),
            _ => proposal.content.clone(),
        };
        approved_content.validate().map_err(GovernanceError::Validation)?;
        let edited_fields = DiffEngine::changed_fields(&proposal.content, &approved_content);

        let change_note = Some(
            proposal
                .changes_summary
                .clone()
                .unwrap_or_else(|| format!("Approved proposal {}", id)),
        );

        let term_write = match proposal.kind {
            ProposalKind::New => {
                let term = Term::new(
                    approved_content,
                    TermStatus::Canonical,
                    Visibility::default(),
                    Some(proposal.submitted_by.clone()),
                );
                let entry = VersionEntry::snapshot(&term, change_note, identity.id.clone());
                TermWrite::Create { term, entry }
            }
            ProposalKind::Edit { term_id, .. } => {
                let current = self.load_term(term_id).await?;
                let term = current.next_version(approved_content);
                let entry = VersionEntry::snapshot(&term, change_note, identity.id.clone());
                TermWrite::Update {
                    term,
                    expected_version: current.version,
                    entry,
                }
            }
        };
        let term = term_write.term().clone();

        let comment = optional_text(comment);
        let event = AuditEvent::record(id, AuditEventType::Approved, identity.id.clone(), comment.clone())
            .with_edits(edited_fields.clone());
        let approved_with_edits = event.approved_with_edits();
        let proposal = self
            .commit(
                Transition::step(&proposal, proposal.reviewed(next, &identity.id, comment), event)
                    .with_term_write(term_write),
            )
            .await?;

        if approved_with_edits {
            info!(
                "Term '{}' is now v{} (approved with edits to {:?})",
                term.content.name, term.version, edited_fields
            );
        } else {
            info!("Term '{}' is now v{}", term.content.name, term.version);
        }
        Ok(ApprovalOutcome {
            proposal,
            term,
            edited_fields,
        })
    }

    pub async fn reject(&self, caller: &Caller, id: Uuid, comment: &str) -> GovernanceResult<Proposal> {
        let identity = self.authorize(caller, Capability::Review)?;
        let comment = required_comment(comment, "reject")?;
        let proposal = self.load_proposal(id).await?;
        let next = Self::check_step(&proposal, AuditEventType::Rejected)?;

        self.commit(Transition::step(
            &proposal,
            proposal.reviewed(next, &identity.id, Some(comment.clone())),
            AuditEvent::record(id, AuditEventType::Rejected, identity.id.clone(), Some(comment)),
        ))
        .await
    }

    pub async fn withdraw(&self, caller: &Caller, id: Uuid, comment: Option<String>) -> GovernanceResult<Proposal> {
        // Any role may withdraw its own proposal
        let identity = self.authorize(caller, Capability::View)?;
        let proposal = self.load_proposal(id).await?;
        Self::require_submitter(identity, &proposal)?;
        let next = Self::check_step(&proposal, AuditEventType::Withdrawn)?;

        self.commit(Transition::step(
            &proposal,
            proposal.with_status(next),
            AuditEvent::record(id, AuditEventType::Withdrawn, identity.id.clone(), optional_text(comment)),
        ))
        .await
    }

    // =========================================================================
    // TERMS (administrative writes)
    // =========================================================================

    pub async fn create_term(&self, caller: &Caller, new_term: NewTerm) -> GovernanceResult<Term> {
        let identity = self.authorize(caller, Capability::Administer)?;
        let content = new_term.content.normalized();
        content.validate().map_err(GovernanceError::Validation)?;
        self.ensure_name_free(&content.name, None).await?;

        let term = Term::new(
            content,
            new_term.status.unwrap_or(TermStatus::Canonical),
            new_term.visibility.unwrap_or_default(),
            optional_text(new_term.owner).or_else(|| Some(identity.id.clone())),
        );
        let note = optional_text(new_term.change_note).or_else(|| Some("Created".to_string()));
        let entry = VersionEntry::snapshot(&term, note, identity.id.clone());

        let term = self.write_term(TermWrite::Create { term, entry }).await?;
        info!("Created term '{}' (id: {}) by {}", term.content.name, term.id, identity.id);
        Ok(term)
    }

    /// Direct content edit; appends exactly one ledger entry
    pub async fn edit_term(&self, caller: &Caller, id: Uuid, edit: TermEdit) -> GovernanceResult<Term> {
        let identity = self.authorize(caller, Capability::Administer)?;
        if edit.patch.is_empty() {
            return Err(GovernanceError::Validation("No content fields supplied".to_string()));
        }
        let current = self.load_term(id).await?;
        if let Some(expected) = edit.expected_version {
            if expected != current.version {
                return Err(GovernanceError::Conflict(format!(
                    "Term is at version {}, not {}",
                    current.version, expected
                )));
            }
        }

        let content = current.content.overlay(&edit.patch).normalized();
        content.validate().map_err(GovernanceError::Validation)?;
        let changed = DiffEngine::changed_fields(&current.content, &content);
        if changed.is_empty() {
            return Err(GovernanceError::Validation(
                "Edit does not change any content field".to_string(),
            ));
        }

        let term = current.next_version(content);
        let entry = VersionEntry::snapshot(&term, optional_text(edit.change_note), identity.id.clone());
        let term = self
            .write_term(TermWrite::Update {
                term,
                expected_version: current.version,
                entry,
            })
            .await?;

        info!("Edited term {} to v{} ({:?}) by {}", term.id, term.version, changed, identity.id);
        Ok(term)
    }

    /// Status, visibility and owner changes; not versioned
    pub async fn update_term_metadata(
        &self,
        caller: &Caller,
        id: Uuid,
        update: TermMetadataUpdate,
    ) -> GovernanceResult<Term> {
        let identity = self.authorize(caller, Capability::Administer)?;
        if update.is_empty() {
            return Err(GovernanceError::Validation("No metadata fields supplied".to_string()));
        }
        let current = self.load_term(id).await?;
        let term = Term {
            status: update.status.unwrap_or(current.status),
            visibility: update.visibility.unwrap_or(current.visibility),
            owner: match update.owner {
                Some(owner) => optional_text(Some(owner)),
                None => current.owner.clone(),
            },
            updated_at: Utc::now(),
            ..current
        };

        let term = self.write_term(TermWrite::Metadata { term }).await?;
        info!("Updated metadata of term {} by {}", term.id, identity.id);
        Ok(term)
    }

    // =========================================================================
    // TERMS (reads)
    // =========================================================================

    /// Anonymous callers only ever see public terms
    pub async fn list_terms(&self, caller: &Caller, filter: TermFilter) -> GovernanceResult<Vec<Term>> {
        let mut filter = filter;
        if caller.identity().is_none() {
            match filter.visibility {
                Some(v) if v != Visibility::Public => return Ok(Vec::new()),
                _ => filter.visibility = Some(Visibility::Public),
            }
        }
        let terms = self.store.list_terms(&filter).await?;
        debug!("Listed {} terms", terms.len());
        Ok(terms)
    }

    pub async fn list_categories(&self, caller: &Caller) -> GovernanceResult<Vec<CategoryCount>> {
        let terms = self.list_terms(caller, TermFilter::default()).await?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for term in &terms {
            *counts.entry(term.content.category.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(category, term_count)| CategoryCount { category, term_count })
            .collect())
    }

    pub async fn get_term(&self, caller: &Caller, id: Uuid) -> GovernanceResult<Term> {
        self.visible_term(caller, id).await
    }

    /// The full version ledger of a term, oldest first
    pub async fn term_history(&self, caller: &Caller, id: Uuid) -> GovernanceResult<Vec<VersionEntry>> {
        let term = self.visible_term(caller, id).await?;
        let entries = self.store.term_history(id).await?;
        if let Err(problem) = check_history(&entries, term.version) {
            warn!("Version ledger for term {} is inconsistent: {}", id, problem);
        }
        Ok(entries)
    }

    /// One reconstructed past version
    pub async fn term_version(&self, caller: &Caller, id: Uuid, version: i32) -> GovernanceResult<VersionEntry> {
        self.visible_term(caller, id).await?;
        self.store
            .term_version(id, version)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("Version {} of term {}", version, id)))
    }

    pub async fn compare_versions(
        &self,
        caller: &Caller,
        id: Uuid,
        from_version: i32,
        to_version: i32,
    ) -> GovernanceResult<VersionComparison> {
        let from = self.term_version(caller, id, from_version).await?;
        let to = self.term_version(caller, id, to_version).await?;
        Ok(VersionComparison {
            from_version,
            to_version,
            changed_fields: DiffEngine::changed_fields(&from.snapshot, &to.snapshot),
            changes: DiffEngine::compare(&from.snapshot, &to.snapshot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, RoleGate};
    use crate::store::MemoryStore;
    use crate::term::models::sample_content;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        engine: Arc<GovernanceEngine>,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(GovernanceEngine::new(store.clone(), Arc::new(RoleGate)));
        Harness { engine, store }
    }

    fn as_role(id: &str, role: Role) -> Caller {
        Caller::authenticated(Identity::new(id, role))
    }

    fn alice() -> Caller {
        as_role("alice", Role::Contributor)
    }

    fn reviewer() -> Caller {
        as_role("rita", Role::Reviewer)
    }

    fn admin() -> Caller {
        as_role("root", Role::Admin)
    }

    fn new_draft(name: &str) -> ProposalDraft {
        ProposalDraft {
            term_id: None,
            content: sample_content(name),
            changes_summary: Some("Introduce the term".to_string()),
        }
    }

    async fn seeded_term(h: &Harness) -> Term {
        h.engine
            .create_term(
                &admin(),
                NewTerm {
                    content: sample_content("Phase Gate"),
                    status: None,
                    visibility: Some(Visibility::Public),
                    owner: None,
                    change_note: None,
                },
            )
            .await
            .unwrap()
    }

    fn edit_draft(term: &Term, definition: &str) -> ProposalDraft {
        let mut content = term.content.clone();
        content.definition = definition.to_string();
        ProposalDraft {
            term_id: Some(term.id),
            content,
            changes_summary: None,
        }
    }

    async fn event_types(h: &Harness, id: Uuid) -> Vec<AuditEventType> {
        h.store
            .audit_events(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn test_approving_new_proposal_creates_canonical_term() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(proposal.submitted_by, "alice");

        let outcome = h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap();

        assert_eq!(outcome.term.version, 1);
        assert_eq!(outcome.term.status, TermStatus::Canonical);
        assert_eq!(outcome.term.content, proposal.content);
        assert!(outcome.edited_fields.is_empty());
        assert_eq!(outcome.proposal.status, ProposalStatus::Approved);
        assert_eq!(outcome.proposal.reviewed_by.as_deref(), Some("rita"));

        let history = h.store.term_history(outcome.term.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version_number, 1);
        assert_eq!(
            event_types(&h, proposal.id).await,
            vec![AuditEventType::Submitted, AuditEventType::Approved]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_have_exactly_one_winner() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        let id = proposal.id;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = h.engine.clone();
                tokio::spawn(async move { engine.approve(&reviewer(), id, None, None).await })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(
            loser,
            GovernanceError::AlreadyReviewed { status: ProposalStatus::Approved }
        ));

        let terms = h.store.list_terms(&TermFilter::default()).await.unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(h.store.term_history(terms[0].id).await.unwrap().len(), 1);
        assert_eq!(
            event_types(&h, proposal.id).await,
            vec![AuditEventType::Submitted, AuditEventType::Approved]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_approve_and_reject_race_leaves_one_terminal_event() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        let id = proposal.id;

        let approver = h.engine.clone();
        let rejecter = h.engine.clone();
        let (approved, rejected) = tokio::join!(
            tokio::spawn(async move { approver.approve(&reviewer(), id, None, None).await.map(|_| ()) }),
            tokio::spawn(async move { rejecter.reject(&reviewer(), id, "Duplicate").await.map(|_| ()) }),
        );
        let (approved, rejected) = (approved.unwrap(), rejected.unwrap());
        assert!(approved.is_ok() != rejected.is_ok());

        let events = event_types(&h, proposal.id).await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());

        let terms = h.store.list_terms(&TermFilter::default()).await.unwrap();
        assert_eq!(terms.len(), usize::from(approved.is_ok()));
    }

    #[tokio::test]
    async fn test_approving_edit_appends_one_ledger_entry() {
        let h = harness();
        let term = seeded_term(&h).await;
        let original_definition = term.content.definition.clone();

        let proposal = h
            .engine
            .create_proposal(&alice(), edit_draft(&term, "A formal go/no-go review"))
            .await
            .unwrap();
        assert_eq!(proposal.kind, ProposalKind::Edit { term_id: term.id, base_version: 1 });

        let outcome = h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap();
        assert_eq!(outcome.term.version, 2);
        assert_eq!(outcome.term.content.definition, "A formal go/no-go review");

        let history = h.engine.term_history(&admin(), term.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot.definition, original_definition);
        assert_eq!(history[1].snapshot, outcome.term.content);
        assert_ok!(check_history(&history, outcome.term.version));
    }

    #[tokio::test]
    async fn test_approve_with_edits_records_edited_fields() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        let edits = ContentPatch {
            definition: Some("A formal go/no-go review".to_string()),
            // Same value as proposed; must not count as an edit
            category: Some(proposal.content.category.clone()),
            ..Default::default()
        };

        let outcome = h
            .engine
            .approve(&reviewer(), proposal.id, Some(edits), Some("Tightened wording".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.edited_fields, vec![ContentField::Definition]);
        assert_eq!(outcome.term.content.definition, "A formal go/no-go review");

        // The stored proposal keeps the submitter's content
        let stored = h.store.get_proposal(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.content, proposal.content);

        let events = h.store.audit_events(proposal.id).await.unwrap();
        let approval = events.last().unwrap();
        assert!(approval.approved_with_edits());
        assert_eq!(approval.edited_fields, vec![ContentField::Definition]);
        assert_eq!(approval.comment.as_deref(), Some("Tightened wording"));
    }

    #[tokio::test]
    async fn test_resubmit_requires_changes_requested() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();

        let err = h.engine.resubmit(&alice(), proposal.id, Resubmission::default()).await.unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidTransition { action: AuditEventType::Resubmitted, status: ProposalStatus::Pending }
        ));

        let err = h.engine.resubmit(&alice(), Uuid::new_v4(), Resubmission::default()).await.unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resubmit_merges_fields_and_returns_to_pending() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        h.engine.start_review(&reviewer(), proposal.id).await.unwrap();
        let sent_back = h
            .engine
            .request_changes(&reviewer(), proposal.id, "Add a counter-example")
            .await
            .unwrap();
        assert_eq!(sent_back.status, ProposalStatus::ChangesRequested);
        assert_eq!(sent_back.review_comment.as_deref(), Some("Add a counter-example"));

        let update = Resubmission {
            fields: ContentPatch {
                examples_bad: Some(vec!["Gate the phase".to_string()]),
                ..Default::default()
            },
            changes_summary: Some("Added counter-example".to_string()),
        };
        let resubmitted = h.engine.resubmit(&alice(), proposal.id, update).await.unwrap();

        assert_eq!(resubmitted.status, ProposalStatus::Pending);
        assert_eq!(resubmitted.content.examples_bad, vec!["Gate the phase".to_string()]);
        assert_eq!(resubmitted.content.definition, proposal.content.definition);
        assert_eq!(resubmitted.changes_summary.as_deref(), Some("Added counter-example"));

        let events = h.store.audit_events(proposal.id).await.unwrap();
        assert_eq!(replay(&events), Ok(ProposalStatus::Pending));
        assert_eq!(
            events.iter().map(|e| e.event_type).collect::<Vec<_>>(),
            vec![
                AuditEventType::Submitted,
                AuditEventType::ReviewStarted,
                AuditEventType::ChangesRequested,
                AuditEventType::Resubmitted,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_comment_fails_validation_without_side_effects() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();

        let err = h.engine.reject(&reviewer(), proposal.id, "   ").await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        let err = h.engine.request_changes(&reviewer(), proposal.id, "").await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));

        let stored = h.store.get_proposal(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Pending);
        assert_eq!(event_types(&h, proposal.id).await, vec![AuditEventType::Submitted]);
    }

    #[tokio::test]
    async fn test_terminal_proposals_refuse_every_action() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        h.engine.reject(&reviewer(), proposal.id, "Out of scope").await.unwrap();

        let err = h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyReviewed { status: ProposalStatus::Rejected }));
        let err = h.engine.withdraw(&alice(), proposal.id, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyReviewed { .. }));
        let err = h.engine.request_changes(&reviewer(), proposal.id, "Why?").await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidTransition { .. }));
        let err = h.engine.start_review(&reviewer(), proposal.id).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidTransition { .. }));

        assert_eq!(
            event_types(&h, proposal.id).await,
            vec![AuditEventType::Submitted, AuditEventType::Rejected]
        );
    }

    #[tokio::test]
    async fn test_withdraw_is_submitter_only() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();

        let err = h.engine.withdraw(&as_role("mallory", Role::Admin), proposal.id, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied(_)));

        let withdrawn = h
            .engine
            .withdraw(&alice(), proposal.id, Some("Duplicate of another".to_string()))
            .await
            .unwrap();
        assert_eq!(withdrawn.status, ProposalStatus::Withdrawn);
        assert_err!(h.engine.withdraw(&alice(), proposal.id, None).await);
    }

    #[tokio::test]
    async fn test_downgraded_submitter_can_still_withdraw() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();

        let viewer_alice = as_role("alice", Role::Viewer);
        let withdrawn = assert_ok!(h.engine.withdraw(&viewer_alice, proposal.id, None).await);
        assert_eq!(withdrawn.status, ProposalStatus::Withdrawn);

        let err = h.engine.withdraw(&Caller::anonymous(), proposal.id, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthenticated(Capability::View)));
    }

    #[tokio::test]
    async fn test_gate_distinguishes_anonymous_from_insufficient_role() {
        let h = harness();
        let err = h
            .engine
            .create_proposal(&Caller::anonymous(), new_draft("Phase Gate"))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthenticated(Capability::Propose)));

        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        let err = h.engine.approve(&alice(), proposal.id, None, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied(_)));

        let err = h.engine.list_proposals(&Caller::anonymous(), None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthenticated(Capability::View)));
    }

    #[tokio::test]
    async fn test_proposal_validation() {
        let h = harness();
        let mut draft = new_draft("Phase Gate");
        draft.content.definition = "  ".to_string();
        let err = h.engine.create_proposal(&alice(), draft).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(msg) if msg.contains("definition")));

        let mut draft = new_draft("Phase Gate");
        draft.term_id = Some(Uuid::new_v4());
        let err = h.engine.create_proposal(&alice(), draft).await.unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));

        seeded_term(&h).await;
        let err = h.engine.create_proposal(&alice(), new_draft("PHASE GATE")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_edit_approval_conflicts_when_term_moved() {
        let h = harness();
        let term = seeded_term(&h).await;
        let proposal = h
            .engine
            .create_proposal(&alice(), edit_draft(&term, "A formal go/no-go review"))
            .await
            .unwrap();

        // Swap in a store-level race: the term moves after the engine read it
        let current = h.store.get_term(term.id).await.unwrap().unwrap();
        let moved = current.next_version(TermContent {
            synonyms: vec!["Tollgate".to_string()],
            ..current.content.clone()
        });
        let entry = VersionEntry::snapshot(&moved, None, "root");
        let stale_write = TermWrite::Update {
            term: current.next_version(current.content.clone()),
            expected_version: current.version,
            entry: VersionEntry::snapshot(&current.next_version(current.content.clone()), None, "rita"),
        };
        h.store
            .write_term(TermWrite::Update { term: moved, expected_version: 1, entry })
            .await
            .unwrap();

        let outcome = h
            .store
            .commit_transition(Transition {
                proposal: proposal.reviewed(ProposalStatus::Approved, "rita", None),
                expected_status: ProposalStatus::Pending,
                expected_revision: proposal.revision,
                event: AuditEvent::record(proposal.id, AuditEventType::Approved, "rita", None),
                term_write: Some(stale_write),
            })
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::TermVersionMismatch { current: 2 });

        let stored = h.store.get_proposal(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Pending);
        assert_eq!(h.store.term_history(term.id).await.unwrap().len(), 2);

        // A fresh approval reads the new version and succeeds on top of it
        let outcome = h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap();
        assert_eq!(outcome.term.version, 3);
    }

    #[tokio::test]
    async fn test_stale_approval_after_resubmit_cycle_conflicts() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();
        // Approval is prepared from this read...
        let stale = h.store.get_proposal(proposal.id).await.unwrap().unwrap();

        // ...while the proposal is sent back and resubmitted to the same status
        h.engine
            .request_changes(&as_role("rhea", Role::Reviewer), proposal.id, "Sharpen the definition")
            .await
            .unwrap();
        let update = Resubmission {
            fields: ContentPatch {
                definition: Some("Resubmitted definition".to_string()),
                ..Default::default()
            },
            changes_summary: None,
        };
        let resubmitted = h.engine.resubmit(&alice(), proposal.id, update).await.unwrap();
        assert_eq!(resubmitted.status, stale.status);

        let term = Term::new(stale.content.clone(), TermStatus::Canonical, Visibility::default(), None);
        let entry = VersionEntry::snapshot(&term, None, "rita");
        let err = h
            .engine
            .commit(
                Transition::step(
                    &stale,
                    stale.reviewed(ProposalStatus::Approved, "rita", None),
                    AuditEvent::record(proposal.id, AuditEventType::Approved, "rita", None),
                )
                .with_term_write(TermWrite::Create { term, entry }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Conflict(_)));

        let stored = h.store.get_proposal(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Pending);
        assert_eq!(stored.content.definition, "Resubmitted definition");
        assert!(h.store.list_terms(&TermFilter::default()).await.unwrap().is_empty());
        let events = h.store.audit_events(proposal.id).await.unwrap();
        assert_eq!(replay(&events), Ok(ProposalStatus::Pending));

        // A fresh approval sees the resubmitted content
        let outcome = h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap();
        assert_eq!(outcome.term.content.definition, "Resubmitted definition");
        assert_eq!(
            event_types(&h, proposal.id).await,
            vec![
                AuditEventType::Submitted,
                AuditEventType::ChangesRequested,
                AuditEventType::Resubmitted,
                AuditEventType::Approved,
            ]
        );
    }

    #[tokio::test]
    async fn test_proposal_detail_compares_against_current_term() {
        let h = harness();
        let term = seeded_term(&h).await;
        let proposal = h
            .engine
            .create_proposal(&alice(), edit_draft(&term, "A formal go/no-go review"))
            .await
            .unwrap();

        let detail = h.engine.get_proposal(&reviewer(), proposal.id).await.unwrap();

        assert_eq!(detail.current_term_version, Some(1));
        let comparison = detail.comparison.unwrap();
        assert_eq!(comparison.len(), 1);
        assert_eq!(comparison[0].field, ContentField::Definition);
        assert_eq!(detail.events.len(), 1);
        assert_eq!(detail.events[0].event_type, AuditEventType::Submitted);
        // Reading never moves the proposal into review
        assert_eq!(detail.proposal.status, ProposalStatus::Pending);
    }

    #[tokio::test]
    async fn test_admin_edit_versions_content_but_not_metadata() {
        let h = harness();
        let term = seeded_term(&h).await;

        let noop = TermEdit {
            patch: ContentPatch {
                definition: Some(term.content.definition.clone()),
                ..Default::default()
            },
            change_note: None,
            expected_version: None,
        };
        assert!(matches!(
            h.engine.edit_term(&admin(), term.id, noop).await,
            Err(GovernanceError::Validation(_))
        ));

        let stale = TermEdit {
            patch: ContentPatch {
                synonyms: Some(vec!["Tollgate".to_string()]),
                ..Default::default()
            },
            change_note: Some("Add synonym".to_string()),
            expected_version: Some(5),
        };
        assert!(matches!(
            h.engine.edit_term(&admin(), term.id, stale.clone()).await,
            Err(GovernanceError::Conflict(_))
        ));

        let edited = h
            .engine
            .edit_term(&admin(), term.id, TermEdit { expected_version: Some(1), ..stale })
            .await
            .unwrap();
        assert_eq!(edited.version, 2);

        let deprecated = h
            .engine
            .update_term_metadata(
                &admin(),
                term.id,
                TermMetadataUpdate {
                    status: Some(TermStatus::Deprecated),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(deprecated.version, 2);
        assert_eq!(deprecated.status, TermStatus::Deprecated);
        assert_eq!(h.store.term_history(term.id).await.unwrap().len(), 2);

        let err = h
            .engine
            .edit_term(&reviewer(), term.id, TermEdit {
                patch: ContentPatch::default(),
                change_note: None,
                expected_version: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_anonymous_readers_only_see_public_terms() {
        let h = harness();
        seeded_term(&h).await;
        let internal = h
            .engine
            .create_term(
                &admin(),
                NewTerm {
                    content: sample_content("Burn Rate"),
                    status: None,
                    visibility: Some(Visibility::Internal),
                    owner: None,
                    change_note: None,
                },
            )
            .await
            .unwrap();

        let anonymous = h.engine.list_terms(&Caller::anonymous(), TermFilter::default()).await.unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].content.name, "Phase Gate");

        let all = h.engine.list_terms(&alice(), TermFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            h.engine.get_term(&Caller::anonymous(), internal.id).await,
            Err(GovernanceError::NotFound(_))
        ));

        let categories = h.engine.list_categories(&alice()).await.unwrap();
        assert_eq!(
            categories,
            vec![CategoryCount {
                category: "Delivery".to_string(),
                term_count: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let h = harness();
        let term = seeded_term(&h).await;
        let proposal = h
            .engine
            .create_proposal(&alice(), edit_draft(&term, "A formal go/no-go review"))
            .await
            .unwrap();
        h.engine.approve(&reviewer(), proposal.id, None, None).await.unwrap();

        let comparison = h.engine.compare_versions(&Caller::anonymous(), term.id, 1, 2).await.unwrap();
        assert_eq!(comparison.changed_fields, vec![ContentField::Definition]);

        let err = h.engine.term_version(&alice(), term.id, 3).await.unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_admin_only() {
        let h = harness();
        let proposal = h.engine.create_proposal(&alice(), new_draft("Phase Gate")).await.unwrap();

        assert!(matches!(
            h.engine.delete_proposal(&alice(), proposal.id).await,
            Err(GovernanceError::PermissionDenied(_))
        ));
        h.engine.delete_proposal(&admin(), proposal.id).await.unwrap();
        assert!(matches!(
            h.engine.get_proposal(&admin(), proposal.id).await,
            Err(GovernanceError::NotFound(_))
        ));
    }
}
