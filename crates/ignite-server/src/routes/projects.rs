use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ignite_core::content::{self, NewProject, Project};
use ignite_core::db::Reader;
use ignite_core::draft;
use ignite_core::types::{EntityKind, Id};
use serde_json::{json, Value};

use super::{blocking, object};
use crate::actor::CurrentActor;
use crate::error::AppError;
use crate::state::{AppState, ServerEvent};

/// A project with its lessons and their steps nested in order.
pub(crate) fn project_tree(r: &impl Reader, project: &Project) -> ignite_core::Result<Value> {
    let mut lessons = Vec::new();
    for lesson in content::lessons_of(r, project.id)? {
        let steps = content::steps_of(r, lesson.id)?;
        let mut entry = serde_json::to_value(&lesson)?;
        entry["steps"] = serde_json::to_value(steps)?;
        lessons.push(entry);
    }
    let mut tree = serde_json::to_value(project)?;
    tree["lessons"] = Value::Array(lessons);
    Ok(tree)
}

/// GET /api/projects: live origin projects.
pub async fn list_projects(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let result = blocking(move || {
        db.view(|tx| {
            let list: Vec<Value> = content::list_projects(tx)?
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "title": p.title,
                        "owner": p.owner,
                        "publish_mode": p.publish_mode,
                        "lesson_count": p.lesson_count,
                        "publish_date": p.publish_date,
                        "updated_at": p.updated_at,
                    })
                })
                .collect();
            Ok(json!(list))
        })
    })
    .await?;
    Ok(Json(result))
}

/// POST /api/projects: create a project owned by the caller.
pub async fn create_project(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if body.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let db = app.db.clone();
    let project = blocking(move || db.update(|tx| content::create_project(tx, &actor, body))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id: project.id,
    });
    Ok((StatusCode::CREATED, Json(serde_json::to_value(project)?)))
}

/// GET /api/projects/{id}: project with lessons and steps, plus whether a
/// draft exists.
pub async fn get_project(
    State(app): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let result = blocking(move || {
        db.view(|tx| {
            let project = content::origin_project(tx, id)?;
            let mut tree = project_tree(tx, &project)?;
            tree["has_draft"] = json!(draft::draft_of::<Project>(tx, id)?.is_some());
            Ok(tree)
        })
    })
    .await?;
    Ok(Json(result))
}

/// PATCH /api/projects/{id}: edit data fields while in edit mode.
pub async fn update_project(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let patched = blocking(move || db.update(|tx| content::update_project(tx, &actor, id, &patch))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id,
    });
    Ok(Json(json!({
        "project": patched.record,
        "ignored": patched.ignored,
    })))
}

/// DELETE /api/projects/{id}: soft delete.
pub async fn delete_project(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    let db = app.db.clone();
    blocking(move || db.update(|tx| content::delete_project(tx, &actor, id))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/{id}/lock: take the edit lock of a project or draft.
pub async fn lock_project(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    set_lock(app, actor, id, true).await
}

/// DELETE /api/projects/{id}/lock: release the edit lock.
pub async fn unlock_project(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    set_lock(app, actor, id, false).await
}

async fn set_lock(
    app: AppState,
    actor: ignite_core::types::Actor,
    id: Id,
    lock: bool,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let project = blocking(move || db.update(|tx| content::set_edit_lock(tx, &actor, id, lock))).await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id,
    });
    Ok(Json(json!({
        "id": project.id,
        "current_editor": project.current_editor,
    })))
}
