//! Proposal-related request DTOs

use crate::models::TermContentInput;
use crate::proposal::{ProposalDraft, ProposalStatus};
use crate::term::ContentPatch;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Request to submit a proposal. Supplying `termId` makes it an edit.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub term_id: Option<Uuid>,
    #[serde(flatten)]
    #[validate(nested)]
    pub content: TermContentInput,
    #[validate(length(max = 2000, message = "changesSummary is limited to 2000 characters"))]
    pub changes_summary: Option<String>,
}

impl From<CreateProposalRequest> for ProposalDraft {
    fn from(req: CreateProposalRequest) -> Self {
        ProposalDraft {
            term_id: req.term_id,
            content: req.content.into(),
            changes_summary: req.changes_summary,
        }
    }
}

/// Body for request-changes and reject
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewCommentRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 4000, message = "comment is required (max 4000 characters)"))]
    pub comment: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    /// Field overrides applied to the approved term only
    #[serde(default, alias = "edits")]
    pub reviewer_edits: Option<ContentPatch>,
    #[validate(length(max = 4000, message = "comment is limited to 4000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(length(max = 4000, message = "comment is limited to 4000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProposalListQuery {
    pub status: Option<ProposalStatus>,
}
