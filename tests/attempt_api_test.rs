use std::sync::Arc;

use assessment_backend::{
    database::{MemoryAttemptStore, MemoryContentStore},
    routes::router,
    storage::{MemoryObjectStore, SnapshotKey},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    objects: MemoryObjectStore,
}

fn app() -> TestApp {
    let objects = MemoryObjectStore::new("test-attempts");
    let state = AppState::from_parts(
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryAttemptStore::new()),
        Some(Arc::new(objects.clone())),
        None,
    );
    TestApp {
        router: router(state),
        objects,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_test(app: &TestApp) -> JsonValue {
    let (status, test) = send(
        app,
        "POST",
        "/api/tests",
        Some(json!({
            "course_id": Uuid::new_v4(),
            "title": "Chemistry",
            "min_point": 2,
            "questions": [
                {"text_of_question": "H2O is?", "order": 1, "answers": [
                    {"text": "water", "score": 2}, {"text": "salt", "score": 0}
                ]},
                {"text_of_question": "NaCl is?", "order": 2, "answers": [
                    {"text": "salt", "score": 1}, {"text": "sugar", "score": 0}
                ]},
                {"text_of_question": "O2 is?", "order": 3, "answers": [
                    {"text": "oxygen", "score": 1}, {"text": "ozone", "score": 0}
                ]}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    test
}

async fn create_attempt(app: &TestApp, student: Uuid, test: &JsonValue) -> String {
    let (status, attempt) = send(
        app,
        "POST",
        "/api/attempts",
        Some(json!({"student_id": student, "test_id": test["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(attempt["date_of_attempt"].is_null());
    assert_eq!(attempt["completed"], false);
    attempt["id"].as_str().unwrap().to_string()
}

fn question_ids(test: &JsonValue) -> Vec<String> {
    test["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn init_twice_yields_identical_document() {
    let app = app();
    let test = create_test(&app).await;
    let attempt = create_attempt(&app, Uuid::new_v4(), &test).await;
    let init = json!({
        "attempt_no": 1,
        "test_title": "Chemistry",
        "min_point": 2,
        "questions": question_ids(&test)
            .iter()
            .enumerate()
            .map(|(i, id)| json!({"question_id": id, "order": i + 1, "question_text": null, "max_points": 2}))
            .collect::<Vec<_>>()
    });

    let (status, first) = send(&app, "POST", &format!("/api/attempts/{}/version/init", attempt), Some(init.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let answers = first["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    for entry in answers {
        assert_eq!(entry["answerIds"], json!([]));
        assert_eq!(entry["earnedPoints"], 0);
    }

    let (_, stored_once) = send(&app, "GET", &format!("/api/attempts/{}/version", attempt), None).await;
    send(&app, "POST", &format!("/api/attempts/{}/version/init", attempt), Some(init)).await;
    let (_, stored_twice) = send(&app, "GET", &format!("/api/attempts/{}/version", attempt), None).await;
    assert_eq!(stored_once.to_string(), stored_twice.to_string());
}

#[tokio::test]
async fn save_answers_is_append_once_and_upsert_overwrites() {
    let app = app();
    let test = create_test(&app).await;
    let attempt = create_attempt(&app, Uuid::new_v4(), &test).await;
    let (status, version) = send(&app, "POST", &format!("/api/attempts/{}/prepare", attempt), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(version["attemptNo"], 1);
    assert_eq!(version["testTitle"], "Chemistry");

    let questions = question_ids(&test);
    let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());
    let uri = format!("/api/attempts/{}/answers", attempt);

    let (status, first) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"question_id": questions[0], "answer_ids": [a1], "answer_points": [5], "earned_points": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["outcome"], "recorded");

    let (_, second) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"question_id": questions[0], "answer_ids": [a2], "answer_points": [0], "earned_points": 0})),
    )
    .await;
    assert_eq!(second["outcome"], "already_answered");

    let (_, doc) = send(&app, "GET", &format!("/api/attempts/{}/version", attempt), None).await;
    let entry = &doc["attempt_version"]["answers"][0];
    assert_eq!(entry["answerIds"], json!([a1]));
    assert_eq!(entry["earnedPoints"], 5);

    let (status, upserted) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({
            "question_id": questions[1],
            "question_text": "NaCl is?",
            "max_points": 1,
            "answer_ids": [a1],
            "answer_texts": ["salt"],
            "answer_points": [1],
            "earned_points": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upserted["answers"][1]["answerTexts"], json!(["salt"]));

    let (_, upserted) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({"question_id": questions[1], "answer_ids": [a2], "answer_points": [0], "earned_points": 0})),
    )
    .await;
    assert_eq!(upserted["answers"][1]["answerIds"], json!([a2]));
    assert_eq!(upserted["answers"][1]["earnedPoints"], 0);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"question_id": questions[2], "answer_ids": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("answerIds"));
}

#[tokio::test]
async fn completion_fixes_date_and_rejects_negative_points() {
    let app = app();
    let test = create_test(&app).await;
    let student = Uuid::new_v4();
    let attempt = create_attempt(&app, student, &test).await;
    let uri = format!("/api/attempts/{}/complete", attempt);

    let (status, _) = send(&app, "POST", &uri, Some(json!({"total_points": -3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, done) = send(&app, "POST", &uri, Some(json!({"total_points": 3}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["completed"], true);
    assert_eq!(done["point"], 3);
    assert!(done["date_of_attempt"].is_string());

    // A second completion the same day for the same student and test clashes on the date.
    let other = create_attempt(&app, student, &test).await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/attempts/{}/complete", other),
        Some(json!({"total_points": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn snapshot_upload_failure_stores_literal_content() {
    let app = app();
    let test = create_test(&app).await;
    let attempt = create_attempt(&app, Uuid::new_v4(), &test).await;
    app.objects.set_failing(true);

    let snapshot = json!({"title": "Chemistry", "answers": [{"q": 1}]});
    let (status, saved) = send(
        &app,
        "PUT",
        &format!("/api/attempts/{}/snapshot", attempt),
        Some(json!({"snapshot": snapshot})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["location"], "inline");

    let (_, record) = send(&app, "GET", &format!("/api/attempts/{}", attempt), None).await;
    assert_eq!(record["attempt_snapshot"], json!(snapshot.to_string()));

    let (_, loaded) = send(&app, "GET", &format!("/api/attempts/{}/snapshot", attempt), None).await;
    assert_eq!(loaded["snapshot"], snapshot);
}

#[tokio::test]
async fn snapshot_round_trips_through_object_store() {
    let app = app();
    let test = create_test(&app).await;
    let student = Uuid::new_v4();
    let attempt = create_attempt(&app, student, &test).await;

    let snapshot = json!({"title": "Chemistry", "score": 4});
    let (_, saved) = send(
        &app,
        "PUT",
        &format!("/api/attempts/{}/snapshot", attempt),
        Some(json!({"snapshot": snapshot})),
    )
    .await;
    assert_eq!(saved["location"], "object_store");

    let (_, record) = send(&app, "GET", &format!("/api/attempts/{}", attempt), None).await;
    assert!(record["attempt_snapshot"]
        .as_str()
        .unwrap()
        .starts_with("objstore://test-attempts/snapshots/"));

    let (_, loaded) = send(&app, "GET", &format!("/api/attempts/{}/snapshot", attempt), None).await;
    assert_eq!(loaded["snapshot"], snapshot);

    let (_, listed) = send(
        &app,
        "GET",
        &format!("/api/students/{}/tests/{}/snapshots", student, test["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(listed["attempt_ids"], json!([attempt]));

    app.objects.set_failing(true);
    let (status, _) = send(&app, "GET", &format!("/api/attempts/{}/snapshot", attempt), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, "DELETE", &format!("/api/attempts/{}", attempt), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &format!("/api/attempts/{}", attempt), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attempt_for_unknown_test_is_not_found() {
    let app = app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/attempts",
        Some(json!({"student_id": Uuid::new_v4(), "test_id": Uuid::new_v4()})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snapshot_cannot_point_at_another_attempt() {
    let app = app();
    let test = create_test(&app).await;
    let victim_student = Uuid::new_v4();
    let victim = create_attempt(&app, victim_student, &test).await;
    let intruder = create_attempt(&app, Uuid::new_v4(), &test).await;

    let (_, saved) = send(
        &app,
        "PUT",
        &format!("/api/attempts/{}/snapshot", victim),
        Some(json!({"snapshot": {"secret": true}})),
    )
    .await;
    assert_eq!(saved["location"], "object_store");
    let (_, record) = send(&app, "GET", &format!("/api/attempts/{}", victim), None).await;
    let pointer = record["attempt_snapshot"].as_str().unwrap().to_string();

    app.objects.set_failing(true);
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/attempts/{}/snapshot", intruder),
        Some(json!({"snapshot": pointer})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, loaded) = send(&app, "GET", &format!("/api/attempts/{}/snapshot", intruder), None).await;
    assert!(loaded["snapshot"].is_null());
}

#[tokio::test]
async fn attempts_are_listed_per_student_and_test() {
    let app = app();
    let test = create_test(&app).await;
    let student = Uuid::new_v4();
    let first = create_attempt(&app, student, &test).await;
    create_attempt(&app, Uuid::new_v4(), &test).await;
    let second = create_attempt(&app, student, &test).await;

    let (status, listed) = send(
        &app,
        "GET",
        &format!("/api/students/{}/tests/{}/attempts", student, test["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
}

#[tokio::test]
async fn snapshot_metadata_comes_from_the_request() {
    let app = app();
    let test = create_test(&app).await;
    let student = Uuid::new_v4();
    let attempt = create_attempt(&app, student, &test).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/attempts/{}/snapshot", attempt),
        Some(json!({
            "snapshot": {"score": 1},
            "date": "2026-04-01",
            "attempt_version": {"attemptNo": 2, "answers": []}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let key = SnapshotKey::new(
        student,
        test["id"].as_str().unwrap().parse().unwrap(),
        attempt.parse().unwrap(),
    );
    let metadata = app.objects.metadata(&key).await.unwrap();
    assert_eq!(metadata.date.unwrap().to_string(), "2026-04-01");
    assert!(metadata.attempt_version.unwrap().contains("\"attemptNo\":2"));
}
