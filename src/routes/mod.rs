pub mod attempt_routes;
pub mod draft_routes;
pub mod health;
pub mod test_routes;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    let content_api = Router::new()
        .route("/api/tests", post(test_routes::create_test))
        .route(
            "/api/tests/:id",
            get(test_routes::get_test)
                .put(test_routes::update_test)
                .delete(test_routes::delete_test),
        )
        .route("/api/tests/:id/draft", post(test_routes::create_draft_from_test))
        .route(
            "/api/drafts",
            get(draft_routes::list_drafts).post(draft_routes::save_draft),
        )
        .route(
            "/api/drafts/:id",
            get(draft_routes::get_draft).delete(draft_routes::delete_draft),
        )
        .route("/api/drafts/:id/publish", post(draft_routes::publish_draft));

    let attempt_api = Router::new()
        .route("/api/attempts", post(attempt_routes::create_attempt))
        .route(
            "/api/attempts/:id",
            get(attempt_routes::get_attempt).delete(attempt_routes::delete_attempt),
        )
        .route("/api/attempts/:id/version", get(attempt_routes::get_attempt_version))
        .route(
            "/api/attempts/:id/version/init",
            post(attempt_routes::init_attempt_version),
        )
        .route("/api/attempts/:id/prepare", post(attempt_routes::prepare_attempt))
        .route(
            "/api/attempts/:id/answers",
            post(attempt_routes::save_answers).put(attempt_routes::upsert_answers),
        )
        .route("/api/attempts/:id/complete", post(attempt_routes::complete_attempt))
        .route(
            "/api/attempts/:id/snapshot",
            get(attempt_routes::get_snapshot).put(attempt_routes::save_snapshot),
        )
        .route(
            "/api/students/:student_id/tests/:test_id/attempts",
            get(attempt_routes::list_attempts),
        )
        .route(
            "/api/students/:student_id/tests/:test_id/snapshots",
            get(attempt_routes::list_snapshots),
        );

    Router::new()
        .route("/health", get(health::health))
        .merge(content_api)
        .merge(attempt_api)
        .with_state(state)
}
