//! Publish-mode state machine.
//!
//! A project moves `edit -> review -> ready -> published`. Leaving edit
//! requires the project to pass [`check_before_publish`]. `ready` turns into
//! `published` as soon as the minimum publish date (if any) has passed.
//!
//! The same machine runs on project drafts. A draft that reaches
//! `published` is applied to its origin and discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::ProgressConfig;
use crate::content::{lessons_of, steps_of, Lesson, Project};
use crate::db::{Reader, WriteTx};
use crate::draft::{self, ApplyReport, DiffTree, Draftable, Fields};
use crate::error::{IgniteError, Result};
use crate::progress;
use crate::types::{Actor, EntityRef, Id, PublishMode};

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Owners and superusers.
pub fn is_editor(project: &Project, actor: &Actor) -> bool {
    project.is_editor(actor)
}

pub fn can_edit(project: &Project, actor: &Actor) -> bool {
    project.publish_mode == PublishMode::Edit && is_editor(project, actor)
}

/// Reviewers (superusers) publish projects that are in review or ready.
pub fn can_publish(project: &Project, actor: &Actor) -> bool {
    matches!(project.publish_mode, PublishMode::Review | PublishMode::Ready) && actor.is_superuser
}

/// Sending a project back to edit takes the same rights as publishing it.
pub fn can_reedit(project: &Project, actor: &Actor) -> bool {
    can_publish(project, actor)
}

/// Only a published origin without a draft can get one, and only from one
/// of its editors.
pub fn can_create_draft(r: &impl Reader, project: &Project, actor: &Actor) -> Result<bool> {
    if project.is_draft() || project.is_deleted || project.publish_mode != PublishMode::Published {
        return Ok(false);
    }
    if draft::draft_of::<Project>(r, project.id)?.is_some() {
        return Ok(false);
    }
    Ok(is_editor(project, actor))
}

/// The project draft, created (with its whole lesson tree) when the project
/// may have one.
pub fn open_draft(tx: &WriteTx, actor: &Actor, project_id: Id) -> Result<(Project, bool)> {
    let project = crate::content::origin_project(tx, project_id)?;
    if let Some(existing) = draft::draft_of::<Project>(tx, project_id)? {
        return Ok((existing, false));
    }
    if !can_create_draft(tx, &project, actor)? {
        return Err(IgniteError::DraftNotAllowed(project_id));
    }
    draft::project_draft_get_or_create(tx, project_id)
}

// ---------------------------------------------------------------------------
// Pre-publish check
// ---------------------------------------------------------------------------

/// One reason a project cannot leave edit mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishIssue {
    /// Dotted path to the offending field, e.g. `lessons.4.steps`.
    pub path: String,
    pub message: String,
}

impl PublishIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Blob key that must be set before a lesson of `application` can publish.
fn required_blob_key(application: &str) -> Option<&'static str> {
    match application.to_ascii_lowercase().as_str() {
        "video" => Some("video"),
        "instructables" => Some("instructables"),
        "circuits" => Some("startCircuitId"),
        _ => None,
    }
}

fn blob_is_set(blob: &Value, key: &str) -> bool {
    match blob.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

fn check_lesson(r: &impl Reader, cfg: &ProgressConfig, lesson: &Lesson, issues: &mut Vec<PublishIssue>) -> Result<()> {
    let prefix = format!("lessons.{}", lesson.id);
    if lesson.title.trim().is_empty() {
        issues.push(PublishIssue::new(
            format!("{prefix}.title"),
            "This field is required before publishing",
        ));
    }
    if let Some(key) = required_blob_key(&lesson.application) {
        if !blob_is_set(&lesson.application_blob, key) {
            issues.push(PublishIssue::new(
                format!("{prefix}.application_blob"),
                format!("'{key}' must be set before publishing"),
            ));
        }
    }
    if !cfg.is_stepless(&lesson.application) && steps_of(r, lesson.id)?.is_empty() {
        issues.push(PublishIssue::new(
            format!("{prefix}.steps"),
            "Lesson must have steps before publishing",
        ));
    }
    Ok(())
}

/// Everything that keeps `project` (origin or draft) from leaving edit mode.
pub fn check_before_publish(r: &impl Reader, cfg: &ProgressConfig, project: &Project) -> Result<Vec<PublishIssue>> {
    let mut issues = Vec::new();
    if project.title.trim().is_empty() {
        issues.push(PublishIssue::new("title", "This field is required before publishing"));
    }
    let lessons = lessons_of(r, project.id)?;
    if lessons.is_empty() {
        issues.push(PublishIssue::new("lessons", "Add at least 1 lesson"));
    }
    for lesson in &lessons {
        check_lesson(r, cfg, lesson, &mut issues)?;
    }
    Ok(issues)
}

// ---------------------------------------------------------------------------
// Mode changes
// ---------------------------------------------------------------------------

/// Outcome of a mode change, broadcast to listeners by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeChange {
    /// The origin project.
    pub project_id: Id,
    /// Set when the change ran on the project draft.
    pub draft_id: Option<Id>,
    pub from: PublishMode,
    pub to: PublishMode,
    pub changed: bool,
    /// What the draft changes, captured before it was applied.
    pub diff: Option<DiffTree>,
    /// Present when a published draft was applied to its origin.
    pub applied: Option<ApplyReport>,
    pub publish_date: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

fn denied(from: PublishMode, to: PublishMode) -> IgniteError {
    IgniteError::PermissionDenied(format!(
        "not allowed to move the project from '{from}' mode to '{to}' mode"
    ))
}

fn forbidden(from: PublishMode, to: PublishMode) -> IgniteError {
    IgniteError::InvalidModeTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Validate moving `project` to `requested` and return the mode it actually
/// lands in before the publish date is considered. Requests for `ready` and
/// `published` both land in `ready`.
pub fn resolve_target(project: &Project, requested: PublishMode, actor: &Actor) -> Result<PublishMode> {
    let from = project.publish_mode;
    if requested == from {
        return Ok(from);
    }
    match requested {
        PublishMode::Edit => match from {
            PublishMode::Review | PublishMode::Ready if can_reedit(project, actor) => Ok(PublishMode::Edit),
            PublishMode::Review | PublishMode::Ready => Err(denied(from, requested)),
            _ => Err(forbidden(from, requested)),
        },
        PublishMode::Review => match from {
            PublishMode::Edit if can_edit(project, actor) => Ok(PublishMode::Review),
            PublishMode::Ready if can_publish(project, actor) => Ok(PublishMode::Review),
            PublishMode::Edit | PublishMode::Ready => Err(denied(from, requested)),
            _ => Err(forbidden(from, requested)),
        },
        PublishMode::Ready | PublishMode::Published => match from {
            // From edit the editor must also hold publish rights once the
            // project is in review.
            PublishMode::Edit if can_edit(project, actor) && actor.is_superuser => Ok(PublishMode::Ready),
            PublishMode::Review if can_publish(project, actor) => Ok(PublishMode::Ready),
            PublishMode::Edit | PublishMode::Review => Err(denied(from, requested)),
            _ => Err(forbidden(from, requested)),
        },
    }
}

fn publish_is_due(min_publish_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    min_publish_date.map_or(true, |d| d < now)
}

/// Move a project or project draft to `requested`.
///
/// `min_publish_date` can only be set on an origin, by an editor or a
/// reviewer, before the project is published.
pub fn change_mode(
    tx: &WriteTx,
    cfg: &ProgressConfig,
    project_id: Id,
    requested: PublishMode,
    min_publish_date: Option<DateTime<Utc>>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ModeChange> {
    let mut project: Project = tx.fetch(project_id)?;
    if project.is_deleted {
        return Err(IgniteError::ProjectNotFound(project_id));
    }
    let from = project.publish_mode;

    if let Some(date) = min_publish_date {
        if project.is_draft() {
            return Err(IgniteError::InvalidField {
                field: "min_publish_date".into(),
                reason: "a draft has no publish date".into(),
            });
        }
        if from == PublishMode::Published || !(is_editor(&project, actor) || can_reedit(&project, actor)) {
            return Err(IgniteError::PermissionDenied(
                "not allowed to set the minimum publish date".into(),
            ));
        }
        project.min_publish_date = Some(date);
    }

    let mut target = resolve_target(&project, requested, actor)?;
    if target != PublishMode::Edit {
        let issues = check_before_publish(tx, cfg, &project)?;
        if !issues.is_empty() {
            return Err(IgniteError::PublishCheck(issues));
        }
    }
    let due = project.is_draft() || publish_is_due(project.min_publish_date, now);
    if target == PublishMode::Ready && due {
        target = PublishMode::Published;
    }

    match project.draft_origin {
        Some(origin_id) => change_draft_mode(tx, project, origin_id, from, target, now),
        None => change_origin_mode(tx, project, from, target, min_publish_date.is_some(), now),
    }
}

fn change_origin_mode(
    tx: &WriteTx,
    mut project: Project,
    from: PublishMode,
    target: PublishMode,
    date_changed: bool,
    now: DateTime<Utc>,
) -> Result<ModeChange> {
    let changed = target != from;
    if changed || date_changed {
        project.publish_mode = target;
        if target != PublishMode::Edit {
            project.current_editor = None;
        }
        if changed {
            project.publish_date = (target == PublishMode::Published).then_some(now);
        }
        project.touch(now);
        tx.put(&project)?;
    }
    if changed && target == PublishMode::Published {
        let removed = progress::reset_project_progress(tx, project.id)?;
        tracing::info!(project = project.id, removed, "project published; progress reset");
    }
    if changed {
        tracing::info!(project = project.id, %from, to = %target, "publish mode changed");
    }
    Ok(ModeChange {
        project_id: project.id,
        draft_id: None,
        from,
        to: target,
        changed,
        diff: None,
        applied: None,
        publish_date: project.publish_date,
        at: now,
    })
}

fn change_draft_mode(
    tx: &WriteTx,
    project: Project,
    origin_id: Id,
    from: PublishMode,
    target: PublishMode,
    now: DateTime<Utc>,
) -> Result<ModeChange> {
    let changed = target != from;
    let diff = draft::draft_diff_tree(tx, project.id)?;

    if changed {
        let mut meta = Fields::new();
        meta.insert("publish_mode".into(), serde_json::to_value(target)?);
        if target != PublishMode::Edit {
            meta.insert("current_editor".into(), Value::Null);
        }
        draft::draft_save::<Project>(tx, project.id, &meta)?;
        tracing::info!(project = origin_id, draft = project.id, %from, to = %target, "draft publish mode changed");
    }

    let mut applied = None;
    if changed && target == PublishMode::Published {
        applied = draft::draft_apply(tx, EntityRef::Project(project.id), true, true)?;
        draft::draft_discard(tx, EntityRef::Project(project.id))?;
        tracing::info!(project = origin_id, "draft applied and discarded");
    }

    let origin: Project = tx.fetch(origin_id)?;
    Ok(ModeChange {
        project_id: origin_id,
        draft_id: Some(project.id),
        from,
        to: target,
        changed,
        diff,
        applied,
        publish_date: origin.publish_date,
        at: now,
    })
}

/// Publish every ready origin whose minimum publish date has passed.
pub fn publish_due(tx: &WriteTx, now: DateTime<Utc>) -> Result<Vec<ModeChange>> {
    let due = tx.filter::<Project>(|p| {
        !p.is_draft()
            && !p.is_deleted
            && p.publish_mode == PublishMode::Ready
            && publish_is_due(p.min_publish_date, now)
    })?;
    let mut changes = Vec::with_capacity(due.len());
    for project in due {
        changes.push(change_origin_mode(
            tx,
            project,
            PublishMode::Ready,
            PublishMode::Published,
            false,
            now,
        )?);
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{add_lesson, add_step, create_project, NewLesson, NewProject, NewStep};
    use crate::db::ContentDb;
    use crate::draft::draft_save;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn owner() -> Actor {
        Actor::user(1)
    }

    fn admin() -> Actor {
        Actor::superuser(99)
    }

    fn cfg() -> ProgressConfig {
        ProgressConfig::default()
    }

    fn open_tmp() -> (TempDir, ContentDb) {
        let dir = TempDir::new().unwrap();
        let db = ContentDb::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    /// A project with one lesson holding one step, still in edit mode.
    fn ready_to_review(db: &ContentDb) -> Id {
        db.update(|tx| {
            let p = create_project(tx, &owner(), NewProject { title: "Robots".into(), description: String::new() })?;
            let (lesson, _) = add_lesson(
                tx,
                &owner(),
                p.id,
                NewLesson { title: "Build".into(), duration: 20, application: "tinkercad".into(), application_blob: Value::Null },
            )?;
            add_step(
                tx,
                &owner(),
                lesson.id,
                NewStep { title: "Wheels".into(), description: String::new(), image: None, instructions: Vec::new() },
            )?;
            Ok(p.id)
        })
        .unwrap()
    }

    fn change(db: &ContentDb, id: Id, to: PublishMode, actor: &Actor) -> Result<ModeChange> {
        db.update(|tx| change_mode(tx, &cfg(), id, to, None, actor, Utc::now()))
    }

    #[test]
    fn empty_project_fails_publish_check() {
        let (_dir, db) = open_tmp();
        let project = db
            .update(|tx| create_project(tx, &owner(), NewProject { title: "  ".into(), description: String::new() }))
            .unwrap();
        let err = change(&db, project.id, PublishMode::Review, &owner()).unwrap_err();
        match err {
            IgniteError::PublishCheck(issues) => {
                let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
                assert_eq!(paths, vec!["title", "lessons"]);
            }
            other => panic!("expected PublishCheck, got {other:?}"),
        }
    }

    #[test]
    fn lesson_without_steps_fails_unless_stepless() {
        let (_dir, db) = open_tmp();
        let (project, lesson) = db
            .update(|tx| {
                let p = create_project(tx, &owner(), NewProject { title: "P".into(), description: String::new() })?;
                let (l, _) = add_lesson(
                    tx,
                    &owner(),
                    p.id,
                    NewLesson { title: "L".into(), duration: 1, application: "tinkercad".into(), application_blob: Value::Null },
                )?;
                add_lesson(
                    tx,
                    &owner(),
                    p.id,
                    NewLesson {
                        title: "Watch".into(),
                        duration: 1,
                        application: "video".into(),
                        application_blob: json!({ "video": { "id": "abc" } }),
                    },
                )?;
                Ok((p, l))
            })
            .unwrap();
        let issues = db
            .view(|tx| {
                let p: Project = tx.fetch(project.id)?;
                check_before_publish(tx, &cfg(), &p)
            })
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, format!("lessons.{}.steps", lesson.id));
    }

    #[test]
    fn video_lesson_needs_its_blob() {
        let (_dir, db) = open_tmp();
        let project = db
            .update(|tx| {
                let p = create_project(tx, &owner(), NewProject { title: "P".into(), description: String::new() })?;
                add_lesson(
                    tx,
                    &owner(),
                    p.id,
                    NewLesson { title: "Watch".into(), duration: 1, application: "video".into(), application_blob: Value::Null },
                )?;
                tx.fetch::<Project>(p.id)
            })
            .unwrap();
        let issues = db.view(|tx| check_before_publish(tx, &cfg(), &project)).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].path.ends_with(".application_blob"));
    }

    #[test]
    fn owner_sends_to_review_and_reviewer_publishes() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);

        let review = change(&db, id, PublishMode::Review, &owner()).unwrap();
        assert_eq!(review.to, PublishMode::Review);

        let err = change(&db, id, PublishMode::Published, &owner()).unwrap_err();
        assert!(matches!(err, IgniteError::PermissionDenied(_)));

        let published = change(&db, id, PublishMode::Published, &admin()).unwrap();
        assert_eq!(published.to, PublishMode::Published);
        assert!(published.publish_date.is_some());
    }

    #[test]
    fn future_min_publish_date_stops_at_ready() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        change(&db, id, PublishMode::Review, &owner()).unwrap();

        let now = Utc::now();
        let later = now + Duration::days(2);
        let ready = db
            .update(|tx| change_mode(tx, &cfg(), id, PublishMode::Published, Some(later), &admin(), now))
            .unwrap();
        assert_eq!(ready.to, PublishMode::Ready);

        let none_due = db.update(|tx| publish_due(tx, now)).unwrap();
        assert!(none_due.is_empty());
        let due = db.update(|tx| publish_due(tx, later + Duration::seconds(1))).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].to, PublishMode::Published);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);

        // requesting the current mode is a no-op
        let same = change(&db, id, PublishMode::Edit, &owner()).unwrap();
        assert!(!same.changed);

        change(&db, id, PublishMode::Published, &admin()).unwrap();
        let err = change(&db, id, PublishMode::Edit, &admin()).unwrap_err();
        assert!(matches!(err, IgniteError::InvalidModeTransition { .. }));
        let err = change(&db, id, PublishMode::Review, &admin()).unwrap_err();
        assert!(matches!(err, IgniteError::InvalidModeTransition { .. }));
    }

    #[test]
    fn only_reviewer_returns_project_to_edit() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        change(&db, id, PublishMode::Review, &owner()).unwrap();

        let err = change(&db, id, PublishMode::Edit, &owner()).unwrap_err();
        assert!(matches!(err, IgniteError::PermissionDenied(_)));
        let back = change(&db, id, PublishMode::Edit, &admin()).unwrap();
        assert_eq!(back.to, PublishMode::Edit);
    }

    #[test]
    fn leaving_edit_releases_edit_lock() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        db.update(|tx| crate::content::set_edit_lock(tx, &owner(), id, true)).unwrap();
        change(&db, id, PublishMode::Review, &owner()).unwrap();
        let project: Project = db.view(|tx| tx.fetch(id)).unwrap();
        assert_eq!(project.current_editor, None);
    }

    #[test]
    fn draft_only_for_published_projects() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        let err = db.update(|tx| open_draft(tx, &owner(), id)).unwrap_err();
        assert!(matches!(err, IgniteError::DraftNotAllowed(_)));

        change(&db, id, PublishMode::Published, &admin()).unwrap();
        let err = db.update(|tx| open_draft(tx, &Actor::user(5), id)).unwrap_err();
        assert!(matches!(err, IgniteError::DraftNotAllowed(_)));

        let (draft, created) = db.update(|tx| open_draft(tx, &owner(), id)).unwrap();
        assert!(created);
        assert_eq!(draft.publish_mode, PublishMode::Edit);
        let (again, created) = db.update(|tx| open_draft(tx, &owner(), id)).unwrap();
        assert!(!created);
        assert_eq!(again.id, draft.id);
    }

    #[test]
    fn publishing_draft_applies_and_discards_it() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        change(&db, id, PublishMode::Published, &admin()).unwrap();
        let published_at: Project = db.view(|tx| tx.fetch(id)).unwrap();

        let (draft, _) = db.update(|tx| open_draft(tx, &owner(), id)).unwrap();
        db.update(|tx| {
            let mut patch = Fields::new();
            patch.insert("title".into(), json!("Robots v2"));
            draft_save::<Project>(tx, draft.id, &patch)
        })
        .unwrap();

        change(&db, draft.id, PublishMode::Review, &owner()).unwrap();
        let done = change(&db, draft.id, PublishMode::Published, &admin()).unwrap();
        assert_eq!(done.project_id, id);
        assert_eq!(done.draft_id, Some(draft.id));
        assert_eq!(done.diff.as_ref().unwrap().diff_fields, vec!["title".to_string()]);
        assert_eq!(done.applied.as_ref().unwrap().written(), 1);

        let (origin, remaining) = db
            .view(|tx| Ok((tx.fetch::<Project>(id)?, draft::draft_of::<Project>(tx, id)?)))
            .unwrap();
        assert_eq!(origin.title, "Robots v2");
        assert_eq!(origin.publish_mode, PublishMode::Published);
        assert_eq!(origin.publish_date, published_at.publish_date);
        assert!(remaining.is_none());
    }

    #[test]
    fn min_publish_date_not_allowed_on_drafts() {
        let (_dir, db) = open_tmp();
        let id = ready_to_review(&db);
        change(&db, id, PublishMode::Published, &admin()).unwrap();
        let (draft, _) = db.update(|tx| open_draft(tx, &owner(), id)).unwrap();
        let err = db
            .update(|tx| change_mode(tx, &cfg(), draft.id, PublishMode::Review, Some(Utc::now()), &owner(), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, IgniteError::InvalidField { .. }));
    }
}
