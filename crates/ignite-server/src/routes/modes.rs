use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use ignite_core::content::{self, Project};
use ignite_core::draft;
use ignite_core::publish::{self, ModeChange};
use ignite_core::types::{Id, PublishMode};
use ignite_core::IgniteError;
use serde::Deserialize;
use serde_json::Value;

use super::blocking;
use crate::actor::CurrentActor;
use crate::error::AppError;
use crate::state::{AppState, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct ModeBody {
    pub publish_mode: PublishMode,
    #[serde(default)]
    pub min_publish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct DraftModeBody {
    pub publish_mode: PublishMode,
}

fn announce(app: &AppState, change: &ModeChange) {
    if change.changed {
        app.notify(ServerEvent::ModeChange(change.clone()));
    }
}

/// PATCH /api/projects/{id}/mode: move an origin project through the
/// publish modes.
pub async fn change_mode(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<ModeBody>,
) -> Result<Json<ModeChange>, AppError> {
    let db = app.db.clone();
    let cfg = app.config.progress.clone();
    let change = blocking(move || {
        db.update(|tx| {
            content::origin_project(tx, id)?;
            publish::change_mode(
                tx,
                &cfg,
                id,
                body.publish_mode,
                body.min_publish_date,
                &actor,
                Utc::now(),
            )
        })
    })
    .await?;
    announce(&app, &change);
    Ok(Json(change))
}

/// PATCH /api/projects/{id}/draft/mode: move the project draft through the
/// publish modes. Publishing applies and discards the draft.
pub async fn change_draft_mode(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Id>,
    Json(body): Json<DraftModeBody>,
) -> Result<Json<ModeChange>, AppError> {
    let db = app.db.clone();
    let cfg = app.config.progress.clone();
    let change = blocking(move || {
        db.update(|tx| {
            content::origin_project(tx, id)?;
            let draft = draft::draft_of::<Project>(tx, id)?
                .ok_or(IgniteError::DraftNotFound { kind: "project", id })?;
            publish::change_mode(tx, &cfg, draft.id, body.publish_mode, None, &actor, Utc::now())
        })
    })
    .await?;
    announce(&app, &change);
    Ok(Json(change))
}

/// POST /api/publish-due: publish ready projects whose minimum publish date
/// has passed. Reviewers only.
pub async fn publish_due(
    State(app): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Value>, AppError> {
    if !actor.is_superuser {
        return Err(IgniteError::PermissionDenied("only reviewers can publish due projects".into()).into());
    }
    let db = app.db.clone();
    let changes = blocking(move || db.update(|tx| publish::publish_due(tx, Utc::now()))).await?;
    for change in &changes {
        announce(&app, change);
    }
    Ok(Json(serde_json::json!({ "published": changes })))
}
