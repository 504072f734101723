//! Audit Trail
//!
//! One append-only event per lifecycle transition of a proposal. There is no
//! update or delete path for events; deleting a proposal drops its trail.

use crate::proposal::{Proposal, ProposalStatus};
use crate::term::ContentField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Submitted,
    ReviewStarted,
    ChangesRequested,
    Resubmitted,
    Approved,
    Rejected,
    Withdrawn,
}

impl AuditEventType {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuditEventType::Approved | AuditEventType::Rejected | AuditEventType::Withdrawn
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Submitted => "submitted",
            AuditEventType::ReviewStarted => "review_started",
            AuditEventType::ChangesRequested => "changes_requested",
            AuditEventType::Resubmitted => "resubmitted",
            AuditEventType::Approved => "approved",
            AuditEventType::Rejected => "rejected",
            AuditEventType::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(AuditEventType::Submitted),
            "review_started" => Ok(AuditEventType::ReviewStarted),
            "changes_requested" => Ok(AuditEventType::ChangesRequested),
            "resubmitted" => Ok(AuditEventType::Resubmitted),
            "approved" => Ok(AuditEventType::Approved),
            "rejected" => Ok(AuditEventType::Rejected),
            "withdrawn" => Ok(AuditEventType::Withdrawn),
            other => Err(format!("Unknown audit event type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub event_type: AuditEventType,
    pub actor_id: String,
    pub comment: Option<String>,
    /// Fields the reviewer changed at approval time. Non-empty means the
    /// proposal was "approved with edits".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edited_fields: Vec<ContentField>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn record(
        proposal_id: Uuid,
        event_type: AuditEventType,
        actor_id: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_id,
            event_type,
            actor_id: actor_id.into(),
            comment,
            edited_fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the reviewer-edit annotation to an approval
    pub fn with_edits(mut self, edited_fields: Vec<ContentField>) -> Self {
        self.edited_fields = edited_fields;
        self
    }

    /// The opening event of a proposal's trail
    pub fn submitted(proposal: &Proposal) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_id: proposal.id,
            event_type: AuditEventType::Submitted,
            actor_id: proposal.submitted_by.clone(),
            comment: proposal.changes_summary.clone(),
            edited_fields: Vec::new(),
            timestamp: proposal.submitted_at,
        }
    }

    pub fn approved_with_edits(&self) -> bool {
        self.event_type == AuditEventType::Approved && !self.edited_fields.is_empty()
    }
}

/// The trail a reader should see for `proposal`.
///
/// Falls back to a synthesized `submitted` event so an existing proposal is
/// never shown with an empty history.
pub fn trail_for(proposal: &Proposal, events: Vec<AuditEvent>) -> Vec<AuditEvent> {
    if events.is_empty() {
        vec![AuditEvent::submitted(proposal)]
    } else {
        events
    }
}

/// Replay an event sequence through the status machine.
///
/// Returns the status the sequence ends in, or a description of the first
/// event that is not a legal step.
pub fn replay(events: &[AuditEvent]) -> Result<ProposalStatus, String> {
    let mut iter = events.iter();
    match iter.next() {
        Some(first) if first.event_type == AuditEventType::Submitted => {}
        Some(first) => return Err(format!("Trail starts with {} instead of submitted", first.event_type)),
        None => return Err("Trail is empty".to_string()),
    }

    let mut status = ProposalStatus::Pending;
    let mut last_at = events[0].timestamp;
    for event in iter {
        if event.timestamp < last_at {
            return Err(format!("Event {} is out of timestamp order", event.id));
        }
        last_at = event.timestamp;
        status = status
            .after(event.event_type)
            .ok_or_else(|| format!("{} is not a legal step from {}", event.event_type, status))?;
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalKind;
    use crate::term::models::sample_content;
    use chrono::Duration;

    fn proposal() -> Proposal {
        Proposal::new(ProposalKind::New, sample_content("Phase Gate"), Some("First draft".to_string()), "alice")
    }

    fn events(proposal: &Proposal, types: &[AuditEventType]) -> Vec<AuditEvent> {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut event = AuditEvent::record(proposal.id, *t, "bob", None);
                event.timestamp = proposal.submitted_at + Duration::seconds(i as i64);
                event
            })
            .collect()
    }

    #[test]
    fn test_empty_trail_synthesizes_submitted() {
        let p = proposal();
        let trail = trail_for(&p, Vec::new());

        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].event_type, AuditEventType::Submitted);
        assert_eq!(trail[0].actor_id, "alice");
        assert_eq!(trail[0].timestamp, p.submitted_at);
    }

    #[test]
    fn test_replay_full_review_cycle() {
        use AuditEventType::*;
        let p = proposal();
        let trail = events(&p, &[Submitted, ReviewStarted, ChangesRequested, Resubmitted, Approved]);
        assert_eq!(replay(&trail), Ok(ProposalStatus::Approved));
    }

    #[test]
    fn test_replay_rejects_event_after_terminal() {
        use AuditEventType::*;
        let p = proposal();
        let trail = events(&p, &[Submitted, Rejected, Approved]);
        let err = replay(&trail).unwrap_err();
        assert!(err.contains("approved"));
    }

    #[test]
    fn test_replay_requires_submitted_first() {
        use AuditEventType::*;
        let p = proposal();
        assert!(replay(&events(&p, &[Approved])).is_err());
        assert!(replay(&[]).is_err());
    }

    #[test]
    fn test_approved_with_edits_annotation() {
        let p = proposal();
        let plain = AuditEvent::record(p.id, AuditEventType::Approved, "bob", None);
        assert!(!plain.approved_with_edits());

        let edited = plain.with_edits(vec![ContentField::Definition]);
        assert!(edited.approved_with_edits());
        let value = serde_json::to_value(&edited).unwrap();
        assert_eq!(value["editedFields"], serde_json::json!(["definition"]));
    }
}
