//! Term route handlers
//!
//! Reads are open to anonymous callers (public terms only); writes are
//! administrative.

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::models::{CompareQuery, CreateTermRequest, EditTermRequest, SuccessResponse};
use crate::state::SharedState;
use crate::term::{
    CategoryCount, Term, TermFilter, TermMetadataUpdate, VersionComparison, VersionEntry, VersionSummary,
};
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

pub async fn list_terms(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<TermFilter>,
) -> ApiResult<Json<SuccessResponse<Vec<Term>>>> {
    debug!("Listing terms with {:?}", filter);
    let terms = state.engine.list_terms(&caller, filter).await?;
    let message = format!("Found {} terms.", terms.len());

    Ok(Json(SuccessResponse::with_data(message, terms)))
}

pub async fn list_categories(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<SuccessResponse<Vec<CategoryCount>>>> {
    let categories = state.engine.list_categories(&caller).await?;
    let message = format!("Found {} categories.", categories.len());

    Ok(Json(SuccessResponse::with_data(message, categories)))
}

pub async fn get_term(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Term>>> {
    let term = state.engine.get_term(&caller, id).await?;

    Ok(Json(SuccessResponse::with_data("Term retrieved.", term)))
}

/// Create a term directly, bypassing review
pub async fn create_term(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateTermRequest>,
) -> ApiResult<Json<SuccessResponse<Term>>> {
    payload.validate()?;
    let term = state.engine.create_term(&caller, payload.into()).await?;

    Ok(Json(SuccessResponse::with_data("Term created.", term)))
}

/// Edit a term's content directly; records a new version
pub async fn edit_term(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditTermRequest>,
) -> ApiResult<Json<SuccessResponse<Term>>> {
    payload.validate()?;
    let term = state.engine.edit_term(&caller, id, payload.into()).await?;
    let message = format!("Term updated to version {}.", term.version);

    Ok(Json(SuccessResponse::with_data(message, term)))
}

pub async fn update_metadata(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TermMetadataUpdate>,
) -> ApiResult<Json<SuccessResponse<Term>>> {
    let term = state.engine.update_term_metadata(&caller, id, payload).await?;

    Ok(Json(SuccessResponse::with_data("Term metadata updated.", term)))
}

/// Version ledger of a term, oldest first, without snapshots
pub async fn list_versions(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<VersionSummary>>>> {
    let history = state.engine.term_history(&caller, id).await?;
    let versions: Vec<VersionSummary> = history.iter().map(VersionSummary::from).collect();
    let message = format!("Found {} versions.", versions.len());

    Ok(Json(SuccessResponse::with_data(message, versions)))
}

pub async fn get_version(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path((id, version)): Path<(Uuid, i32)>,
) -> ApiResult<Json<SuccessResponse<VersionEntry>>> {
    let entry = state.engine.term_version(&caller, id, version).await?;

    Ok(Json(SuccessResponse::with_data(format!("Version {} retrieved.", version), entry)))
}

pub async fn compare_versions(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<Json<SuccessResponse<VersionComparison>>> {
    let comparison = state.engine.compare_versions(&caller, id, query.from, query.to).await?;
    let message = format!("{} fields changed.", comparison.changed_fields.len());

    Ok(Json(SuccessResponse::with_data(message, comparison)))
}
