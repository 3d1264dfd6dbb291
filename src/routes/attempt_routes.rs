use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    CompleteAttemptRequest, CreateAttemptRequest, InitVersionRequest, SaveAnswersRequest,
    SaveAnswersResponse, SaveSnapshotRequest, SaveSnapshotResponse, SnapshotListResponse,
    SnapshotResponse, UpsertAnswersRequest,
};
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_attempt(
    State(state): State<AppState>,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<Response> {
    let attempt = state
        .attempt_service
        .create_attempt(payload.student_id, payload.test_id)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let attempt = state.attempt_service.get_attempt(id).await?;
    Ok(Json(attempt).into_response())
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Path((student_id, test_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let attempts = state.attempt_service.list_attempts(student_id, test_id).await?;
    Ok(Json(attempts).into_response())
}

#[axum::debug_handler]
pub async fn delete_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.snapshot_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn get_attempt_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let version = state.attempt_service.get_attempt_version(id).await?;
    Ok(Json(json!({ "attempt_id": id, "attempt_version": version })).into_response())
}

#[axum::debug_handler]
pub async fn init_attempt_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<InitVersionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let version = state
        .attempt_service
        .init_attempt_version_if_empty(
            id,
            payload.attempt_no,
            &payload.questions,
            payload.test_title,
            payload.min_point,
        )
        .await?;
    Ok(Json(version).into_response())
}

#[axum::debug_handler]
pub async fn prepare_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let version = state.attempt_service.prepare_attempt(id).await?;
    Ok(Json(version).into_response())
}

#[axum::debug_handler]
pub async fn save_answers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<Response> {
    payload.validate()?;
    let outcome = state
        .answer_service
        .save_answers(
            id,
            payload.question_id,
            payload.answer_ids,
            payload.answer_points,
            payload.earned_points,
        )
        .await?;
    Ok(Json(SaveAnswersResponse { outcome }).into_response())
}

#[axum::debug_handler]
pub async fn upsert_answers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpsertAnswersRequest>,
) -> Result<Response> {
    payload.validate()?;
    let (question_id, details, selection) = payload.into_parts();
    let version = state
        .answer_service
        .upsert_answers(id, question_id, details, selection)
        .await?;
    Ok(Json(version).into_response())
}

#[axum::debug_handler]
pub async fn complete_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteAttemptRequest>,
) -> Result<Response> {
    let attempt = state
        .attempt_service
        .complete_attempt_by_id(id, payload.total_points)
        .await?;
    Ok(Json(attempt).into_response())
}

#[axum::debug_handler]
pub async fn save_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveSnapshotRequest>,
) -> Result<Response> {
    let location = state
        .snapshot_service
        .save(id, &payload.content(), payload.metadata())
        .await?;
    Ok(Json(SaveSnapshotResponse {
        attempt_id: id,
        location,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn get_snapshot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let content = state.snapshot_service.load(id).await?;
    Ok(Json(SnapshotResponse::new(id, content)).into_response())
}

#[axum::debug_handler]
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path((student_id, test_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let attempt_ids = state.snapshot_service.list(student_id, test_id).await?;
    Ok(Json(SnapshotListResponse { attempt_ids }).into_response())
}
