use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::draft_dto::{CreateTestRequest, UpdateTestRequest};
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<Response> {
    payload.validate()?;
    let (header, questions) = payload.into_parts();
    let test = state.test_service.create_test(header, questions).await?;
    Ok((StatusCode::CREATED, Json(test)).into_response())
}

#[axum::debug_handler]
pub async fn get_test(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let test = state.test_service.get_test(id).await?;
    Ok(Json(test).into_response())
}

#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<Response> {
    payload.validate()?;
    let test = state.test_service.update_test(id, payload.into_header()).await?;
    Ok(Json(test).into_response())
}

#[axum::debug_handler]
pub async fn delete_test(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.test_service.delete_test(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn create_draft_from_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let draft = state.draft_service.create_draft_from_test(id).await?;
    Ok(Json(draft).into_response())
}
