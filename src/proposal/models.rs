//! Proposal data models
//!
//! A proposal is a request to create a term or change an existing one,
//! subject to review.

use crate::proposal::AuditEventType;
use crate::term::{ContentPatch, TermContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Proposal status in the review workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Submitted, waiting for a reviewer
    Pending,
    /// A reviewer has picked it up
    InReview,
    /// Sent back to the submitter
    ChangesRequested,
    Approved,
    Rejected,
    Withdrawn,
}

impl Default for ProposalStatus {
    fn default() -> Self {
        ProposalStatus::Pending
    }
}

impl ProposalStatus {
    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Approved | ProposalStatus::Rejected | ProposalStatus::Withdrawn
        )
    }

    /// The status reached by recording `event` from this status, if legal.
    ///
    /// This is the single transition table for the workflow; both the engine
    /// and the audit sequence checker go through it.
    pub fn after(&self, event: AuditEventType) -> Option<ProposalStatus> {
        use ProposalStatus::*;

        if self.is_terminal() {
            return None;
        }
        match (self, event) {
            (Pending, AuditEventType::ReviewStarted) => Some(InReview),
            (Pending | InReview, AuditEventType::ChangesRequested) => Some(ChangesRequested),
            (ChangesRequested, AuditEventType::Resubmitted) => Some(Pending),
            (_, AuditEventType::Approved) => Some(Approved),
            (_, AuditEventType::Rejected) => Some(Rejected),
            (_, AuditEventType::Withdrawn) => Some(Withdrawn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::InReview => "in_review",
            ProposalStatus::ChangesRequested => "changes_requested",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "in_review" => Ok(ProposalStatus::InReview),
            "changes_requested" => Ok(ProposalStatus::ChangesRequested),
            "approved" => Ok(ProposalStatus::Approved),
            "rejected" => Ok(ProposalStatus::Rejected),
            "withdrawn" => Ok(ProposalStatus::Withdrawn),
            other => Err(format!("Unknown proposal status '{}'", other)),
        }
    }
}

/// What the proposal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalKind {
    /// Create a term that does not exist yet
    New,
    /// Change an existing term
    Edit {
        #[serde(rename = "termId")]
        term_id: Uuid,
        /// Term version the submitter was looking at
        #[serde(rename = "baseVersion")]
        base_version: i32,
    },
}

impl ProposalKind {
    pub fn term_id(&self) -> Option<Uuid> {
        match self {
            ProposalKind::New => None,
            ProposalKind::Edit { term_id, .. } => Some(*term_id),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::New => "new",
            ProposalKind::Edit { .. } => "edit",
        }
    }
}

/// A request to create or modify a term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ProposalKind,
    /// Proposed field values
    pub content: TermContent,
    pub changes_summary: Option<String>,
    pub status: ProposalStatus,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every committed transition; guards against stale writes
    pub revision: i64,
    /// Set on changes-requested and terminal transitions
    pub review_comment: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        kind: ProposalKind,
        content: TermContent,
        changes_summary: Option<String>,
        submitted_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            content,
            changes_summary,
            status: ProposalStatus::Pending,
            submitted_by: submitted_by.into(),
            submitted_at: now,
            updated_at: now,
            revision: 1,
            review_comment: None,
            reviewed_by: None,
            reviewed_at: None,
        }
    }

    /// Copy of this proposal moved to `status`
    pub fn with_status(&self, status: ProposalStatus) -> Proposal {
        Proposal {
            status,
            updated_at: Utc::now(),
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    /// Copy moved to `status` with the reviewer's decision recorded
    pub fn reviewed(&self, status: ProposalStatus, reviewer: &str, comment: Option<String>) -> Proposal {
        let now = Utc::now();
        Proposal {
            status,
            review_comment: comment,
            reviewed_by: Some(reviewer.to_string()),
            reviewed_at: Some(now),
            updated_at: now,
            revision: self.revision + 1,
            ..self.clone()
        }
    }
}

/// Submitter-provided input for a new proposal
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    /// Absent for new-term proposals
    pub term_id: Option<Uuid>,
    pub content: TermContent,
    pub changes_summary: Option<String>,
}

/// Submitter updates sent with a resubmission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resubmission {
    #[serde(flatten)]
    pub fields: ContentPatch,
    pub changes_summary: Option<String>,
}

/// Listing row for the review queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ProposalKind,
    pub term_name: String,
    pub category: String,
    pub status: ProposalStatus,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Proposal> for ProposalSummary {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.id,
            kind: p.kind,
            term_name: p.content.name.clone(),
            category: p.content.category.clone(),
            status: p.status,
            submitted_by: p.submitted_by.clone(),
            submitted_at: p.submitted_at,
            updated_at: p.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::models::sample_content;

    #[test]
    fn test_terminal_statuses_have_no_outgoing_transitions() {
        let all_events = [
            AuditEventType::Submitted,
            AuditEventType::ReviewStarted,
            AuditEventType::ChangesRequested,
            AuditEventType::Resubmitted,
            AuditEventType::Approved,
            AuditEventType::Rejected,
            AuditEventType::Withdrawn,
        ];
        for status in [ProposalStatus::Approved, ProposalStatus::Rejected, ProposalStatus::Withdrawn] {
            assert!(status.is_terminal());
            for event in all_events {
                assert_eq!(status.after(event), None, "{} accepted {:?}", status, event);
            }
        }
    }

    #[test]
    fn test_resubmit_only_from_changes_requested() {
        assert_eq!(
            ProposalStatus::ChangesRequested.after(AuditEventType::Resubmitted),
            Some(ProposalStatus::Pending)
        );
        assert_eq!(ProposalStatus::Pending.after(AuditEventType::Resubmitted), None);
        assert_eq!(ProposalStatus::InReview.after(AuditEventType::Resubmitted), None);
    }

    #[test]
    fn test_changes_cannot_be_requested_twice() {
        assert_eq!(ProposalStatus::ChangesRequested.after(AuditEventType::ChangesRequested), None);
        assert_eq!(
            ProposalStatus::InReview.after(AuditEventType::ChangesRequested),
            Some(ProposalStatus::ChangesRequested)
        );
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ProposalStatus::Pending,
            ProposalStatus::InReview,
            ProposalStatus::ChangesRequested,
            ProposalStatus::Approved,
            ProposalStatus::Rejected,
            ProposalStatus::Withdrawn,
        ] {
            assert_eq!(status.as_str().parse::<ProposalStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_edit_kind_serializes_flat() {
        let term_id = Uuid::new_v4();
        let proposal = Proposal::new(
            ProposalKind::Edit { term_id, base_version: 3 },
            sample_content("Phase Gate"),
            None,
            "alice",
        );
        let value = serde_json::to_value(&proposal).unwrap();

        assert_eq!(value["type"], "edit");
        assert_eq!(value["termId"], term_id.to_string());
        assert_eq!(value["baseVersion"], 3);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["revision"], 1);
        assert_eq!(value["content"]["name"], "Phase Gate");
    }

    #[test]
    fn test_every_step_bumps_revision() {
        let proposal = Proposal::new(ProposalKind::New, sample_content("Phase Gate"), None, "alice");
        let in_review = proposal.with_status(ProposalStatus::InReview);
        let sent_back = in_review.reviewed(ProposalStatus::ChangesRequested, "rita", Some("More".to_string()));

        assert_eq!(in_review.revision, 2);
        assert_eq!(sent_back.revision, 3);
        assert_eq!(proposal.revision, 1);
    }
}
