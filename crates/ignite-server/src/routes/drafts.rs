use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ignite_core::content::{self, Lesson, Project, Step};
use ignite_core::db::{Reader, WriteTx};
use ignite_core::draft::{self, Fields};
use ignite_core::publish;
use ignite_core::types::{Actor, EntityKind, EntityRef, Id};
use ignite_core::IgniteError;
use serde_json::{json, Value};

use super::projects::project_tree;
use super::{blocking, object};
use crate::actor::CurrentActor;
use crate::error::AppError;
use crate::state::{AppState, ServerEvent};

fn draft_view(r: &impl Reader, draft: &Project) -> ignite_core::Result<Value> {
    let mut tree = project_tree(r, draft)?;
    tree["diff"] = serde_json::to_value(draft::draft_diff_tree(r, draft.id)?)?;
    Ok(tree)
}

/// Drafts are visible to the editors of their origin only.
fn ensure_draft_reader(project: &Project, actor: &Actor, verb: &str) -> ignite_core::Result<()> {
    if !publish::is_editor(project, actor) {
        return Err(IgniteError::PermissionDenied(format!(
            "user {} cannot {verb} the draft of project {}",
            actor.user, project.id
        )));
    }
    Ok(())
}

/// GET /api/projects/{id}/draft: the draft tree, 404 when there is none.
pub async fn get_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let result = blocking(move || {
        db.view(|tx| {
            let project = content::origin_project(tx, id)?;
            ensure_draft_reader(&project, &actor, "read")?;
            let draft = draft::draft_of::<Project>(tx, project.id)?
                .ok_or(IgniteError::DraftNotFound { kind: "project", id })?;
            draft_view(tx, &draft)
        })
    })
    .await?;
    Ok(Json(result))
}

/// POST /api/projects/{id}/draft: create the draft (201) or return the
/// existing one (200).
pub async fn create_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let db = app.db.clone();
    let (view, created) = blocking(move || {
        db.update(|tx| {
            let (draft, created) = publish::open_draft(tx, &actor, id)?;
            Ok((draft_view(tx, &draft)?, created))
        })
    })
    .await?;
    if created {
        app.notify(ServerEvent::Update {
            kind: EntityKind::Project,
            id,
        });
    }
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(view)))
}

/// Apply `patch` to the draft of a `T`. Returns the saved draft, ignored keys
/// and the origin values of the project fields the draft now changes.
fn update_draft_of<T: draft::Draftable>(
    tx: &WriteTx,
    actor: &Actor,
    project_id: Id,
    id: Id,
    patch: &Fields,
) -> ignite_core::Result<Value> {
    let saved = draft::draft_update::<T>(tx, actor, id, patch)?;
    let diff = draft::draft_diff_values(tx, project_id)?.unwrap_or_default();
    Ok(json!({
        "draft": saved.record,
        "ignored": saved.ignored,
        "origin": { "diff": diff },
    }))
}

/// PATCH /api/projects/{id}/draft: create-or-update the project draft.
pub async fn update_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let result = blocking(move || {
        db.update(|tx| {
            publish::open_draft(tx, &actor, id)?;
            update_draft_of::<Project>(tx, &actor, id, id, &patch)
        })
    })
    .await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id,
    });
    Ok(Json(result))
}

/// PATCH /api/lessons/{id}/draft: edit the draft of an origin lesson.
pub async fn update_lesson_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let result = blocking(move || {
        db.update(|tx| {
            let lesson: Lesson = tx.fetch(id)?;
            if lesson.draft_origin.is_some() {
                return Err(IgniteError::IsDraft { kind: "lesson", id });
            }
            let project = draft::project_of(tx, EntityRef::Lesson(id))?;
            publish::open_draft(tx, &actor, project.id)?;
            draft::lesson_draft_get_or_create(tx, id)?;
            update_draft_of::<Lesson>(tx, &actor, project.id, id, &patch)
        })
    })
    .await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Lesson,
        id,
    });
    Ok(Json(result))
}

/// PATCH /api/steps/{id}/draft: edit the draft of an origin step.
pub async fn update_step_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = object(body)?;
    let db = app.db.clone();
    let result = blocking(move || {
        db.update(|tx| {
            let step: Step = tx.fetch(id)?;
            if step.draft_origin.is_some() {
                return Err(IgniteError::IsDraft { kind: "step", id });
            }
            let project = draft::project_of(tx, EntityRef::Step(id))?;
            publish::open_draft(tx, &actor, project.id)?;
            draft::step_draft_get_or_create(tx, id)?;
            update_draft_of::<Step>(tx, &actor, project.id, id, &patch)
        })
    })
    .await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Step,
        id,
    });
    Ok(Json(result))
}

/// DELETE /api/projects/{id}/draft: discard the draft tree.
pub async fn discard_draft(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    let db = app.db.clone();
    blocking(move || {
        db.update(|tx| {
            let project = content::origin_project(tx, id)?;
            ensure_draft_reader(&project, &actor, "discard")?;
            if !draft::draft_discard(tx, EntityRef::Project(id))? {
                return Err(IgniteError::DraftNotFound { kind: "project", id });
            }
            Ok(())
        })
    })
    .await?;
    app.notify(ServerEvent::Update {
        kind: EntityKind::Project,
        id,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/projects/{id}/draft/diff: what the draft changes.
pub async fn get_draft_diff(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let result = blocking(move || {
        db.view(|tx| {
            let project = content::origin_project(tx, id)?;
            ensure_draft_reader(&project, &actor, "read")?;
            let tree = draft::draft_diff_tree(tx, id)?
                .ok_or(IgniteError::DraftNotFound { kind: "project", id })?;
            let values = draft::draft_diff_values(tx, id)?.unwrap_or_default();
            Ok(json!({
                "tree": tree,
                "has_changes": tree.has_changes(),
                "origin_values": values,
            }))
        })
    })
    .await?;
    Ok(Json(result))
}
