use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use ignite_server::state::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const OWNER: u64 = 1;
const LEARNER: u64 = 2;
const REVIEWER: u64 = 99;

/// Bootstrap a minimal Ignite project inside the given temp directory and
/// open the app state on it. The database allows one handle per file, so
/// each test shares one state across requests.
fn open_app(dir: &TempDir) -> AppState {
    let config = ignite_core::config::Config::new("test-project");
    config.save(dir.path()).unwrap();
    AppState::open(dir.path().to_path_buf()).unwrap()
}

async fn send(
    app: &AppState,
    method: &str,
    uri: &str,
    user: Option<u64>,
    superuser: bool,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = axum::http::Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header("x-ignite-user", user.to_string());
    }
    if superuser {
        req = req.header("x-ignite-superuser", "true");
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => req.body(axum::body::Body::empty()).unwrap(),
    };
    let router = ignite_server::build_router(app.clone());
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Send a GET request as `user` and return (status, parsed JSON body).
async fn get(app: &AppState, uri: &str, user: u64) -> (StatusCode, Value) {
    send(app, "GET", uri, Some(user), false, None).await
}

/// Send a POST request with a JSON body as `user`.
async fn post_json(app: &AppState, uri: &str, user: u64, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(user), false, Some(body)).await
}

/// Send a PATCH request with a JSON body as `user`.
async fn patch_json(app: &AppState, uri: &str, user: u64, body: Value) -> (StatusCode, Value) {
    send(app, "PATCH", uri, Some(user), false, Some(body)).await
}

async fn delete(app: &AppState, uri: &str, user: u64) -> (StatusCode, Value) {
    send(app, "DELETE", uri, Some(user), false, None).await
}

/// Create a project owned by OWNER with one lesson of `steps` steps.
/// Returns (project id, lesson id, step ids).
async fn seed_project(app: &AppState, steps: usize) -> (u64, u64, Vec<u64>) {
    let (status, project) = post_json(app, "/api/projects", OWNER, json!({ "title": "Robots" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = project["id"].as_u64().unwrap();

    let (status, lesson) = post_json(
        app,
        &format!("/api/projects/{project_id}/lessons"),
        OWNER,
        json!({ "title": "Wiring", "application": "code" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lesson_id = lesson["id"].as_u64().unwrap();

    let mut step_ids = Vec::new();
    for i in 0..steps {
        let (status, step) = post_json(
            app,
            &format!("/api/lessons/{lesson_id}/steps"),
            OWNER,
            json!({ "title": format!("Step {i}") }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        step_ids.push(step["id"].as_u64().unwrap());
    }
    (project_id, lesson_id, step_ids)
}

/// Publish a project directly as the reviewer.
async fn publish(app: &AppState, project_id: u64) -> Value {
    let (status, change) = send(
        app,
        "PATCH",
        &format!("/api/projects/{project_id}/mode"),
        Some(REVIEWER),
        true,
        Some(json!({ "publish_mode": "published" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{change}");
    change
}

// ---------------------------------------------------------------------------
// Projects and content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (status, body) = send(&app, "POST", "/api/projects", None, false, Some(json!({ "title": "x" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-Ignite-User"));
}

#[tokio::test]
async fn unparsable_user_header_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/projects")
        .header("x-ignite-user", "abc")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"title":"x"}"#))
        .unwrap();
    let response = ignite_server::build_router(app.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn create_and_fetch_project_tree() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 2).await;

    let (status, tree) = get(&app, &format!("/api/projects/{project_id}"), LEARNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["publish_mode"], "edit");
    assert_eq!(tree["has_draft"], false);
    assert_eq!(tree["lessons"][0]["id"], lesson_id);
    assert_eq!(tree["lessons"][0]["steps"][1]["id"], steps[1]);

    let (status, list) = get(&app, "/api/projects", LEARNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (status, body) = get(&app, "/api/projects/4242", OWNER).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn only_the_owner_edits_a_project() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;

    let (status, _) = patch_json(&app, &format!("/api/projects/{project_id}"), LEARNER, json!({ "title": "Mine" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = patch_json(
        &app,
        &format!("/api/projects/{project_id}"),
        OWNER,
        json!({ "title": "Robots 2", "publish_mode": "published" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["title"], "Robots 2");
    assert_eq!(body["project"]["publish_mode"], "edit");
    assert_eq!(body["ignored"], json!(["publish_mode"]));
}

#[tokio::test]
async fn edit_lock_blocks_other_editors() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;

    let (status, body) = post_json(&app, &format!("/api/projects/{project_id}/lock"), OWNER, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_editor"], OWNER);

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/projects/{project_id}"),
        Some(REVIEWER),
        true,
        Some(json!({ "title": "Taken over" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = delete(&app, &format!("/api/projects/{project_id}/lock"), OWNER).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["current_editor"].is_null());
}

#[tokio::test]
async fn delete_step_renumbers_the_rest() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, steps) = seed_project(&app, 3).await;

    let (status, _) = delete(&app, &format!("/api/steps/{}", steps[0]), OWNER).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, tree) = get(&app, &format!("/api/projects/{project_id}"), OWNER).await;
    let remaining = tree["lessons"][0]["steps"].as_array().unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0]["id"], steps[1]);
    assert_eq!(remaining[0]["order"], 0);
    assert_eq!(remaining[1]["order"], 1);
}

// ---------------------------------------------------------------------------
// Publish modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_lesson_renumbers_the_rest() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, first, _) = seed_project(&app, 0).await;
    let (_, second) = post_json(
        &app,
        &format!("/api/projects/{project_id}/lessons"),
        OWNER,
        json!({ "title": "Soldering", "application": "code" }),
    )
    .await;

    let (status, _) = delete(&app, &format!("/api/lessons/{first}"), LEARNER).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = delete(&app, &format!("/api/lessons/{first}"), OWNER).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, tree) = get(&app, &format!("/api/projects/{project_id}"), OWNER).await;
    assert_eq!(tree["lesson_count"], 1);
    assert_eq!(tree["lessons"][0]["id"], second["id"]);
    assert_eq!(tree["lessons"][0]["order"], 0);
}

#[tokio::test]
async fn reorder_lessons_and_steps() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, first, steps) = seed_project(&app, 2).await;
    let (_, second) = post_json(
        &app,
        &format!("/api/projects/{project_id}/lessons"),
        OWNER,
        json!({ "title": "Soldering", "application": "code" }),
    )
    .await;
    let second = second["id"].as_u64().unwrap();

    let (status, lessons) = send(
        &app,
        "PUT",
        &format!("/api/projects/{project_id}/lessons/order"),
        Some(OWNER),
        false,
        Some(json!({ "order": [second, first] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{lessons}");
    assert_eq!(lessons[0]["id"], second);

    let (status, reordered) = send(
        &app,
        "PUT",
        &format!("/api/lessons/{first}/steps/order"),
        Some(OWNER),
        false,
        Some(json!({ "order": [steps[1], steps[0]] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{reordered}");
    assert_eq!(reordered[0]["id"], steps[1]);
    assert_eq!(reordered[1]["order"], 1);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/lessons/{first}/steps/order"),
        Some(OWNER),
        false,
        Some(json!({ "order": [steps[0]] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn publish_check_lists_every_problem() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (status, project) = post_json(&app, "/api/projects", OWNER, json!({ "title": "Empty" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = project["id"].as_u64().unwrap();

    let (status, body) = patch_json(
        &app,
        &format!("/api/projects/{project_id}/mode"),
        OWNER,
        json!({ "publish_mode": "review" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["publish_errors"][0]["path"], "lessons");
}

#[tokio::test]
async fn review_then_publish_freezes_content() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, _) = seed_project(&app, 1).await;

    let (status, change) = patch_json(
        &app,
        &format!("/api/projects/{project_id}/mode"),
        OWNER,
        json!({ "publish_mode": "review" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["to"], "review");

    // The owner cannot publish without reviewer rights.
    let (status, _) = patch_json(
        &app,
        &format!("/api/projects/{project_id}/mode"),
        OWNER,
        json!({ "publish_mode": "published" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let change = publish(&app, project_id).await;
    assert_eq!(change["to"], "published");
    assert!(change["publish_date"].is_string());

    let (status, _) = post_json(
        &app,
        &format!("/api/lessons/{lesson_id}/steps"),
        OWNER,
        json!({ "title": "Late" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn future_publish_date_parks_project_in_ready() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;

    let (status, change) = send(
        &app,
        "PATCH",
        &format!("/api/projects/{project_id}/mode"),
        Some(REVIEWER),
        true,
        Some(json!({ "publish_mode": "published", "min_publish_date": "2999-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["to"], "ready");

    let (status, body) = send(&app, "POST", "/api/publish-due", Some(REVIEWER), true, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], json!([]));

    let (status, _) = send(&app, "POST", "/api/publish-due", Some(OWNER), false, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn draft_requires_a_published_project() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;

    let (status, _) = post_json(&app, &format!("/api/projects/{project_id}/draft"), OWNER, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn draft_edits_publish_onto_the_origin() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 1).await;
    publish(&app, project_id).await;

    let (status, draft) = post_json(&app, &format!("/api/projects/{project_id}/draft"), OWNER, json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(draft["publish_mode"], "edit");
    assert_eq!(draft["draft_origin"], project_id);
    let (status, _) = post_json(&app, &format!("/api/projects/{project_id}/draft"), OWNER, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = patch_json(
        &app,
        &format!("/api/projects/{project_id}/draft"),
        OWNER,
        json!({ "title": "Robots v2" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draft"]["title"], "Robots v2");
    assert_eq!(body["origin"]["diff"]["title"], "Robots");

    let (status, _) = patch_json(
        &app,
        &format!("/api/steps/{}/draft", steps[0]),
        OWNER,
        json!({ "instructions": ["Use the red wire"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, diff) = get(&app, &format!("/api/projects/{project_id}/draft/diff"), OWNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(diff["has_changes"], true);
    assert_eq!(diff["tree"]["diff_fields"], json!(["title"]));
    assert_eq!(diff["tree"]["lessons"][0]["id"], lesson_id);

    // The origin is untouched until the draft is published.
    let (_, origin) = get(&app, &format!("/api/projects/{project_id}"), LEARNER).await;
    assert_eq!(origin["title"], "Robots");
    assert_eq!(origin["has_draft"], true);

    let (status, change) = send(
        &app,
        "PATCH",
        &format!("/api/projects/{project_id}/draft/mode"),
        Some(REVIEWER),
        true,
        Some(json!({ "publish_mode": "published" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{change}");
    assert!(change["applied"].is_object());

    let (_, origin) = get(&app, &format!("/api/projects/{project_id}"), LEARNER).await;
    assert_eq!(origin["title"], "Robots v2");
    assert_eq!(origin["has_draft"], false);
    assert_eq!(origin["lessons"][0]["steps"][0]["instructions"][0], "Use the red wire");

    let (status, _) = get(&app, &format!("/api/projects/{project_id}/draft"), OWNER).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discarding_a_draft_leaves_the_origin() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;
    publish(&app, project_id).await;

    patch_json(&app, &format!("/api/projects/{project_id}/draft"), OWNER, json!({ "title": "Scrap" })).await;

    let (status, _) = delete(&app, &format!("/api/projects/{project_id}/draft"), LEARNER).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = delete(&app, &format!("/api/projects/{project_id}/draft"), OWNER).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = delete(&app, &format!("/api/projects/{project_id}/draft"), OWNER).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, origin) = get(&app, &format!("/api/projects/{project_id}"), LEARNER).await;
    assert_eq!(origin["title"], "Robots");
}

#[tokio::test]
async fn draft_reads_are_limited_to_editors() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, _, _) = seed_project(&app, 1).await;
    publish(&app, project_id).await;
    patch_json(&app, &format!("/api/projects/{project_id}/draft"), OWNER, json!({ "title": "Secret" })).await;

    for uri in [
        format!("/api/projects/{project_id}/draft"),
        format!("/api/projects/{project_id}/draft/diff"),
    ] {
        let (status, body) = get(&app, &uri, LEARNER).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}: {body}");
        let (status, body) = get(&app, &uri, OWNER).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {body}");
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn viewing_every_step_completes_the_project() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 2).await;
    publish(&app, project_id).await;

    let (status, state) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    let state_id = state["id"].as_u64().unwrap();
    let (status, _) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, lesson_state) = post_json(
        &app,
        &format!("/api/states/{state_id}/lessons/{lesson_id}"),
        LEARNER,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lesson_state_id = lesson_state["id"].as_u64().unwrap();

    for step in &steps {
        let (status, _) = post_json(
            &app,
            &format!("/api/lesson-states/{lesson_state_id}/steps/{step}?state=done"),
            LEARNER,
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, progress) = get(&app, &format!("/api/states/{state_id}"), LEARNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["is_completed"], true);
    assert_eq!(progress["lessons"][0]["is_completed"], true);
    assert_eq!(progress["lessons"][0]["viewed_steps"].as_array().unwrap().len(), 2);

    let (status, _) = get(&app, &format!("/api/states/{state_id}"), OWNER).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn step_from_another_lesson_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, _) = seed_project(&app, 1).await;
    let (_, _, other_steps) = seed_project(&app, 1).await;

    let (_, state) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    let state_id = state["id"].as_u64().unwrap();
    let (_, lesson_state) = post_json(
        &app,
        &format!("/api/states/{state_id}/lessons/{lesson_id}"),
        LEARNER,
        json!({}),
    )
    .await;
    let lesson_state_id = lesson_state["id"].as_u64().unwrap();

    let (status, _) = post_json(
        &app,
        &format!("/api/lesson-states/{lesson_state_id}/steps/{}", other_steps[0]),
        LEARNER,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lesson_extra_and_unview() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 1).await;

    let (_, state) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    let state_id = state["id"].as_u64().unwrap();
    let (_, lesson_state) = post_json(
        &app,
        &format!("/api/states/{state_id}/lessons/{lesson_id}"),
        LEARNER,
        json!({}),
    )
    .await;
    let lesson_state_id = lesson_state["id"].as_u64().unwrap();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/lesson-states/{lesson_state_id}/extra"),
        Some(LEARNER),
        false,
        Some(json!({ "code": "print(1)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["extra"]["code"], "print(1)");

    let (_, step_state) = post_json(
        &app,
        &format!("/api/lesson-states/{lesson_state_id}/steps/{}", steps[0]),
        LEARNER,
        json!({}),
    )
    .await;
    let step_state_id = step_state["id"].as_u64().unwrap();

    let (status, body) = delete(&app, &format!("/api/step-states/{step_state_id}"), LEARNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lesson_state"]["is_completed"], false);

    let (status, body) = delete(&app, &format!("/api/lesson-states/{lesson_state_id}"), LEARNER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_state"]["enrolled_lessons_count"], 0);
}

#[tokio::test]
async fn adding_a_step_reopens_completed_lessons_in_the_background() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 1).await;

    let (_, state) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    let state_id = state["id"].as_u64().unwrap();
    let (_, lesson_state) = post_json(
        &app,
        &format!("/api/states/{state_id}/lessons/{lesson_id}"),
        LEARNER,
        json!({}),
    )
    .await;
    let lesson_state_id = lesson_state["id"].as_u64().unwrap();
    post_json(
        &app,
        &format!("/api/lesson-states/{lesson_state_id}/steps/{}", steps[0]),
        LEARNER,
        json!({}),
    )
    .await;
    let (_, progress) = get(&app, &format!("/api/states/{state_id}"), LEARNER).await;
    assert_eq!(progress["lessons"][0]["is_completed"], true);

    let (status, _) = post_json(
        &app,
        &format!("/api/lessons/{lesson_id}/steps"),
        OWNER,
        json!({ "title": "Bonus" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut reopened = false;
    for _ in 0..50 {
        let (_, progress) = get(&app, &format!("/api/states/{state_id}"), LEARNER).await;
        if progress["lessons"][0]["is_completed"] == false {
            assert_eq!(progress["is_completed"], false);
            reopened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(reopened, "lesson state was not recomputed");
}

#[tokio::test]
async fn removing_the_unfinished_lesson_completes_the_project_in_the_background() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir);
    let (project_id, lesson_id, steps) = seed_project(&app, 1).await;
    let (_, extra) = post_json(
        &app,
        &format!("/api/projects/{project_id}/lessons"),
        OWNER,
        json!({ "title": "Soldering", "application": "code" }),
    )
    .await;
    let extra = extra["id"].as_u64().unwrap();
    post_json(&app, &format!("/api/lessons/{extra}/steps"), OWNER, json!({ "title": "Iron" })).await;

    let (_, state) = post_json(&app, &format!("/api/projects/{project_id}/state"), LEARNER, json!({})).await;
    let state_id = state["id"].as_u64().unwrap();
    let (_, lesson_state) = post_json(
        &app,
        &format!("/api/states/{state_id}/lessons/{lesson_id}"),
        LEARNER,
        json!({}),
    )
    .await;
    let lesson_state_id = lesson_state["id"].as_u64().unwrap();
    post_json(
        &app,
        &format!("/api/lesson-states/{lesson_state_id}/steps/{}", steps[0]),
        LEARNER,
        json!({}),
    )
    .await;
    post_json(&app, &format!("/api/states/{state_id}/lessons/{extra}"), LEARNER, json!({})).await;
    let (_, progress) = get(&app, &format!("/api/states/{state_id}"), LEARNER).await;
    assert_eq!(progress["is_completed"], false);

    let (status, _) = delete(&app, &format!("/api/lessons/{extra}"), OWNER).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut completed = false;
    for _ in 0..50 {
        let (_, progress) = get(&app, &format!("/api/states/{state_id}"), LEARNER).await;
        if progress["is_completed"] == true {
            assert_eq!(progress["lessons"].as_array().unwrap().len(), 1);
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(completed, "project state was not recomputed");
}
