use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::draft_dto::{ListDraftsQuery, SaveDraftRequest};
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_drafts(
    State(state): State<AppState>,
    Query(query): Query<ListDraftsQuery>,
) -> Result<Response> {
    let drafts = state.draft_service.list_drafts(query.course_id).await?;
    Ok(Json(drafts).into_response())
}

#[axum::debug_handler]
pub async fn save_draft(
    State(state): State<AppState>,
    Json(payload): Json<SaveDraftRequest>,
) -> Result<Response> {
    payload.validate()?;
    let draft = state.draft_service.save_draft(payload.into_input()).await?;
    Ok(Json(draft).into_response())
}

#[axum::debug_handler]
pub async fn get_draft(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let draft = state.draft_service.get_draft(id).await?;
    Ok(Json(draft).into_response())
}

#[axum::debug_handler]
pub async fn delete_draft(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.draft_service.delete_draft(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn publish_draft(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let test = state.draft_service.publish(id).await?;
    Ok(Json(test).into_response())
}
