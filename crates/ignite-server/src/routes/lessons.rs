use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ignite_core::content::{self, NewLesson, NewStep};
use ignite_core::types::{EntityKind, Id};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{blocking, object};
use crate::actor::CurrentActor;
use crate::error::AppError;
use crate::state::{AppState, ServerEvent};

/// POST /api/projects/{id}/lessons: append a lesson.
pub async fn add_lesson(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(project_id): Path<Id>,
    Json(body): Json<NewLesson>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let db = app.db.clone();
    let (lesson, dirty) =
        blocking(move || db.update(|tx| content::add_lesson(tx, &actor, project_id, body))).await?;
    app.schedule_recompute(dirty);
    app.notify(ServerEvent::Update {
        kind: EntityKind::Lesson,
        id: lesson.id,
    });
    Ok((StatusCode::CREATED, Json(serde_json::to_value(lesson)?)))
}

/// PATCH /api/lessons/{id}: edit a lesson while its project is in edit mode.
pub async fn update_lesson(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let patched = blocking(move || db.update(|tx| content::update_lesson(tx, &actor, id, &patch))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Lesson,
        id,
    });
    Ok(Json(json!({
        "lesson": patched.record,
        "ignored": patched.ignored,
    })))
}

/// DELETE /api/lessons/{id}: soft delete a lesson. Project states of its
/// project are recomputed in the background.
pub async fn delete_lesson(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    let db = app.db.clone();
    let dirty = blocking(move || db.update(|tx| content::remove_lesson(tx, &actor, id))).await?;
    app.schedule_recompute(dirty);
    app.notify(ServerEvent::Update {
        kind: EntityKind::Lesson,
        id,
    });
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct OrderBody {
    pub order: Vec<Id>,
}

/// PUT /api/projects/{id}/lessons/order: reorder the lessons of a project.
pub async fn reorder_lessons(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(project_id): Path<Id>,
    Json(body): Json<OrderBody>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let lessons =
        blocking(move || db.update(|tx| content::reorder_lessons(tx, &actor, project_id, &body.order))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id: project_id,
    });
    Ok(Json(serde_json::to_value(lessons)?))
}

/// PUT /api/lessons/{id}/steps/order: reorder the steps of a lesson.
pub async fn reorder_steps(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(lesson_id): Path<Id>,
    Json(body): Json<OrderBody>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let steps =
        blocking(move || db.update(|tx| content::reorder_steps(tx, &actor, lesson_id, &body.order))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Lesson,
        id: lesson_id,
    });
    Ok(Json(serde_json::to_value(steps)?))
}

/// POST /api/lessons/{id}/steps: append a step. Lesson states of the
/// lesson are recomputed in the background.
pub async fn add_step(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(lesson_id): Path<Id>,
    Json(body): Json<NewStep>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let db = app.db.clone();
    let (step, dirty) =
        blocking(move || db.update(|tx| content::add_step(tx, &actor, lesson_id, body))).await?;
    app.schedule_recompute(dirty);
    app.notify(ServerEvent::Update {
        kind: EntityKind::Step,
        id: step.id,
    });
    Ok((StatusCode::CREATED, Json(serde_json::to_value(step)?)))
}

/// PATCH /api/steps/{id}: edit a step while its project is in edit mode.
pub async fn update_step(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let patched = blocking(move || db.update(|tx| content::update_step(tx, &actor, id, &patch))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Step,
        id,
    });
    Ok(Json(json!({
        "step": patched.record,
        "ignored": patched.ignored,
    })))
}

/// DELETE /api/steps/{id}: soft delete a step.
pub async fn delete_step(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    let db = app.db.clone();
    let dirty = blocking(move || db.update(|tx| content::remove_step(tx, &actor, id))).await?;
    app.schedule_recompute(dirty);
    app.notify(ServerEvent::Update {
        kind: EntityKind::Step,
        id,
    });
    Ok(StatusCode::NO_CONTENT)
}
