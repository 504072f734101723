//! Proposal route handlers
//!
//! Thin wrappers over the governance engine: validate the body, pass the
//! caller through, wrap the result.

use crate::auth::Caller;
use crate::error::{ApiResult, AppError};
use crate::governance::{ApprovalOutcome, ProposalDetail};
use crate::models::{
    ApproveRequest, CreateProposalRequest, ProposalListQuery, ReviewCommentRequest, SuccessResponse,
    WithdrawRequest,
};
use crate::proposal::{Proposal, ProposalSummary, Resubmission};
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

/// Parse a body that clients may leave out entirely
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid JSON body: {}", e)))
}

/// Submit a new proposal
pub async fn create_proposal(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateProposalRequest>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    payload.validate()?;
    debug!("Submitting proposal for '{}'", payload.content.term_name);

    let proposal = state.engine.create_proposal(&caller, payload.into()).await?;

    Ok(Json(SuccessResponse::with_data("Proposal submitted for review.", proposal)))
}

/// List proposals, newest first, optionally filtered by status
pub async fn list_proposals(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ProposalListQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<ProposalSummary>>>> {
    let proposals = state.engine.list_proposals(&caller, query.status).await?;
    let message = format!("Found {} proposals.", proposals.len());

    Ok(Json(SuccessResponse::with_data(message, proposals)))
}

/// Get a proposal with its audit trail
pub async fn get_proposal(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ProposalDetail>>> {
    let detail = state.engine.get_proposal(&caller, id).await?;

    Ok(Json(SuccessResponse::with_data("Proposal retrieved.", detail)))
}

pub async fn delete_proposal(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<()>>> {
    state.engine.delete_proposal(&caller, id).await?;

    Ok(Json(SuccessResponse::message_only(format!("Proposal {} deleted.", id))))
}

pub async fn start_review(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    let proposal = state.engine.start_review(&caller, id).await?;

    Ok(Json(SuccessResponse::with_data("Review started.", proposal)))
}

pub async fn request_changes(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewCommentRequest>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    payload.validate()?;
    let proposal = state.engine.request_changes(&caller, id, &payload.comment).await?;

    Ok(Json(SuccessResponse::with_data("Changes requested.", proposal)))
}

/// Send an updated proposal back to the review queue
pub async fn resubmit(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Resubmission>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    let proposal = state.engine.resubmit(&caller, id, payload).await?;

    Ok(Json(SuccessResponse::with_data("Proposal resubmitted.", proposal)))
}

/// Approve a proposal, optionally with reviewer edits
pub async fn approve(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse<ApprovalOutcome>>> {
    let payload: ApproveRequest = optional_body(&body)?;
    payload.validate()?;

    let outcome = state
        .engine
        .approve(&caller, id, payload.reviewer_edits, payload.comment)
        .await?;
    let message = if outcome.edited_fields.is_empty() {
        format!("Proposal approved. '{}' is now at version {}.", outcome.term.content.name, outcome.term.version)
    } else {
        format!(
            "Proposal approved with edits. '{}' is now at version {}.",
            outcome.term.content.name, outcome.term.version
        )
    };

    Ok(Json(SuccessResponse::with_data(message, outcome)))
}

pub async fn reject(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewCommentRequest>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    payload.validate()?;
    let proposal = state.engine.reject(&caller, id, &payload.comment).await?;

    Ok(Json(SuccessResponse::with_data("Proposal rejected.", proposal)))
}

pub async fn withdraw(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    let payload: WithdrawRequest = optional_body(&body)?;
    payload.validate()?;
    let proposal = state.engine.withdraw(&caller, id, payload.comment).await?;

    Ok(Json(SuccessResponse::with_data("Proposal withdrawn.", proposal)))
}
