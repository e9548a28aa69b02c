use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ignite_core::progress::{self, ProjectState};
use ignite_core::types::Id;
use ignite_core::IgniteError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::blocking;
use crate::actor::CurrentActor;
use crate::error::AppError;
use crate::state::AppState;

fn created(flag: bool) -> StatusCode {
    if flag {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// POST /api/projects/{id}/state: enroll the caller in a project.
pub async fn enroll(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(project_id): Path<Id>,
) -> Result<(StatusCode, Json<ProjectState>), AppError> {
    let db = app.db.clone();
    let (state, new) = blocking(move || db.update(|tx| progress::enroll(tx, &actor, project_id))).await?;
    Ok((created(new), Json(state)))
}

/// GET /api/states/{id}: a project state with its lesson states.
pub async fn get_state(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let view = blocking(move || db.view(|tx| progress::project_progress(tx, id))).await?;
    if view.state.user != actor.user && !actor.is_superuser {
        return Err(IgniteError::PermissionDenied("project state belongs to another user".into()).into());
    }
    Ok(Json(serde_json::to_value(view)?))
}

/// POST /api/states/{id}/lessons/{lesson_id}: start a lesson.
pub async fn start_lesson(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((state_id, lesson_id)): Path<(Id, Id)>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let db = app.db.clone();
    let cfg = app.config.progress.clone();
    let (state, new) = blocking(move || {
        db.update(|tx| progress::start_lesson(tx, &cfg, &actor, state_id, lesson_id))
    })
    .await?;
    Ok((created(new), Json(serde_json::to_value(state)?)))
}

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub state: Option<String>,
}

/// POST /api/lesson-states/{id}/steps/{step_id}: mark a step viewed.
pub async fn view_step(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((lesson_state_id, step_id)): Path<(Id, Id)>,
    Query(query): Query<ViewQuery>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let db = app.db.clone();
    let cfg = app.config.progress.clone();
    let (step_state, new) = blocking(move || {
        db.update(|tx| progress::view_step(tx, &cfg, &actor, lesson_state_id, step_id, query.state))
    })
    .await?;
    Ok((created(new), Json(serde_json::to_value(step_state)?)))
}

/// DELETE /api/step-states/{id}: forget a step view.
pub async fn unview_step(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let cfg = app.config.progress.clone();
    let lesson_state = blocking(move || db.update(|tx| progress::unview_step(tx, &cfg, &actor, id))).await?;
    Ok(Json(json!({ "lesson_state": lesson_state })))
}

/// DELETE /api/lesson-states/{id}: delete a lesson state and its views.
pub async fn delete_lesson_state(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let project_state =
        blocking(move || db.update(|tx| progress::delete_lesson_state(tx, &actor, id))).await?;
    Ok(Json(json!({ "project_state": project_state })))
}

/// PUT /api/lesson-states/{id}/extra: replace the application data of a
/// lesson state.
pub async fn put_lesson_extra(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(extra): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let state = blocking(move || db.update(|tx| progress::set_lesson_extra(tx, &actor, id, extra))).await?;
    Ok(Json(serde_json::to_value(state)?))
}
