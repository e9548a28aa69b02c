use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::fields::{apply_patch, copy_fields, diff_fields, values_of, Fields, Patched};
use super::Draftable;
use crate::content::{ensure_editable, lessons_of, steps_of, Lesson, Project, Step};
use crate::db::{Reader, WriteTx};
use crate::error::{IgniteError, Result};
use crate::types::{Actor, EntityKind, EntityRef, Id, PublishMode};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    /// The origin row the draft was applied to.
    pub entity: EntityRef,
    pub fields: Vec<String>,
    /// False when the draft had no changes and nothing was written.
    pub written: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<AppliedChange>,
}

impl ApplyReport {
    pub fn written(&self) -> usize {
        self.applied.iter().filter(|c| c.written).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDiff {
    pub id: Id,
    pub draft_id: Id,
    pub title: String,
    pub diff_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonDiff {
    pub id: Id,
    pub draft_id: Id,
    pub title: String,
    pub diff_fields: Vec<String>,
    pub steps: Vec<StepDiff>,
}

/// What a project draft changes, project down to steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffTree {
    pub id: Id,
    pub draft_id: Id,
    pub title: String,
    pub diff_fields: Vec<String>,
    pub lessons: Vec<LessonDiff>,
}

impl DiffTree {
    pub fn has_changes(&self) -> bool {
        !self.diff_fields.is_empty()
            || self.lessons.iter().any(|l| {
                !l.diff_fields.is_empty() || l.steps.iter().any(|s| !s.diff_fields.is_empty())
            })
    }
}

fn entity(kind: EntityKind, id: Id) -> EntityRef {
    match kind {
        EntityKind::Project => EntityRef::Project(id),
        EntityKind::Lesson => EntityRef::Lesson(id),
        EntityKind::Step => EntityRef::Step(id),
    }
}

fn owned(names: Vec<&'static str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// The draft pointing at `origin_id`, if any.
pub fn draft_of<T: Draftable>(r: &impl Reader, origin_id: Id) -> Result<Option<T>> {
    Ok(r
        .filter::<T>(|t| t.draft_origin() == Some(origin_id))?
        .into_iter()
        .next())
}

/// The row itself when it is a draft, otherwise its draft if it has one.
pub fn draft_get<T: Draftable>(r: &impl Reader, id: Id) -> Result<Option<T>> {
    let record: T = r.fetch(id)?;
    if record.is_draft() {
        return Ok(Some(record));
    }
    draft_of(r, id)
}

fn require_draft<T: Draftable>(r: &impl Reader, id: Id) -> Result<T> {
    draft_get(r, id)?.ok_or(IgniteError::DraftNotFound {
        kind: T::KIND.as_str(),
        id,
    })
}

/// Split `id` into (origin, draft). The draft is `None` when `id` is an
/// origin without a draft.
fn pair<T: Draftable>(r: &impl Reader, id: Id) -> Result<(T, Option<T>)> {
    let record: T = r.fetch(id)?;
    match record.draft_origin() {
        Some(origin_id) => Ok((r.fetch(origin_id)?, Some(record))),
        None => {
            let draft = draft_of(r, id)?;
            Ok((record, draft))
        }
    }
}

/// The project (or project draft) a row belongs to.
pub fn project_of(r: &impl Reader, entity: EntityRef) -> Result<Project> {
    match entity {
        EntityRef::Project(id) => r.fetch(id),
        EntityRef::Lesson(id) => {
            let lesson: Lesson = r.fetch(id)?;
            r.fetch(lesson.project_id)
        }
        EntityRef::Step(id) => {
            let step: Step = r.fetch(id)?;
            let lesson: Lesson = r.fetch(step.lesson_id)?;
            r.fetch(lesson.project_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Insert a copy of `origin` linked back to it. Only keys listed in the
/// type's create fields are taken from `create`.
fn clone_as_draft<T: Draftable>(tx: &WriteTx, origin: &T, create: &Fields) -> Result<T> {
    let patched = apply_patch(origin, create, T::CREATE_FIELDS)?;
    let mut draft = patched.record;
    draft.set_draft_origin(Some(origin.id()));
    draft.touch(Utc::now());
    tx.insert(&mut draft)?;
    Ok(draft)
}

fn parent_field(name: &str, id: Id) -> Fields {
    let mut fields = Fields::new();
    fields.insert(name.to_string(), Value::from(id));
    fields
}

/// Draft `lesson` under `project_draft_id` together with all its steps.
fn clone_lesson_tree(tx: &WriteTx, lesson: &Lesson, project_draft_id: Id) -> Result<Lesson> {
    let draft = clone_as_draft(tx, lesson, &parent_field("project_id", project_draft_id))?;
    for step in steps_of(tx, lesson.id)? {
        clone_as_draft(tx, &step, &parent_field("lesson_id", draft.id))?;
    }
    Ok(draft)
}

/// Get the project draft, creating it with drafts of every lesson and step
/// when missing. A new draft always starts in edit mode.
pub fn project_draft_get_or_create(tx: &WriteTx, project_id: Id) -> Result<(Project, bool)> {
    if let Some(draft) = draft_get::<Project>(tx, project_id)? {
        return Ok((draft, false));
    }
    let project: Project = tx.fetch(project_id)?;
    let mut base = project.clone();
    base.publish_mode = PublishMode::Edit;
    let draft = clone_as_draft(tx, &base, &Fields::new())?;

    let lessons = lessons_of(tx, project_id)?;
    for lesson in &lessons {
        clone_lesson_tree(tx, lesson, draft.id)?;
    }
    tracing::info!(
        project = project_id,
        draft = draft.id,
        lessons = lessons.len(),
        "project draft created"
    );
    Ok((draft, true))
}

/// Get the lesson draft. When the project has no draft yet, the whole
/// project draft is created.
pub fn lesson_draft_get_or_create(tx: &WriteTx, lesson_id: Id) -> Result<(Lesson, bool)> {
    if let Some(draft) = draft_get::<Lesson>(tx, lesson_id)? {
        return Ok((draft, false));
    }
    let lesson: Lesson = tx.fetch(lesson_id)?;
    match draft_of::<Project>(tx, lesson.project_id)? {
        Some(project_draft) => Ok((clone_lesson_tree(tx, &lesson, project_draft.id)?, true)),
        None => {
            let (project_draft, _) = project_draft_get_or_create(tx, lesson.project_id)?;
            match draft_of::<Lesson>(tx, lesson_id)? {
                Some(draft) => Ok((draft, true)),
                None => Ok((clone_lesson_tree(tx, &lesson, project_draft.id)?, true)),
            }
        }
    }
}

/// Get the step draft, creating the lesson draft (and with it the project
/// draft) when missing.
pub fn step_draft_get_or_create(tx: &WriteTx, step_id: Id) -> Result<(Step, bool)> {
    if let Some(draft) = draft_get::<Step>(tx, step_id)? {
        return Ok((draft, false));
    }
    let step: Step = tx.fetch(step_id)?;
    if let Some(lesson_draft) = draft_of::<Lesson>(tx, step.lesson_id)? {
        let draft = clone_as_draft(tx, &step, &parent_field("lesson_id", lesson_draft.id))?;
        return Ok((draft, true));
    }
    let (lesson_draft, _) = lesson_draft_get_or_create(tx, step.lesson_id)?;
    match draft_of::<Step>(tx, step_id)? {
        Some(draft) => Ok((draft, true)),
        None => Ok((
            clone_as_draft(tx, &step, &parent_field("lesson_id", lesson_draft.id))?,
            true,
        )),
    }
}

// ---------------------------------------------------------------------------
// Saving
// ---------------------------------------------------------------------------

fn save_through<T: Draftable>(tx: &WriteTx, id: Id, patch: &Fields, allowed: &[&str]) -> Result<Patched<T>> {
    let draft = require_draft::<T>(tx, id)?;
    let mut patched = apply_patch(&draft, patch, allowed)?;
    patched.record.touch(Utc::now());
    tx.put(&patched.record)?;
    Ok(patched)
}

/// Write data and meta fields of `patch` to the draft of `id` (or to `id`
/// when it is itself a draft). Other keys are ignored and reported.
pub fn draft_save<T: Draftable>(tx: &WriteTx, id: Id, patch: &Fields) -> Result<Patched<T>> {
    save_through(tx, id, patch, &T::writable_fields())
}

/// Client edit of a draft: data fields only, and only while the project
/// draft is editable by `actor`.
pub fn draft_update<T: Draftable>(tx: &WriteTx, actor: &Actor, id: Id, patch: &Fields) -> Result<Patched<T>> {
    let draft = require_draft::<T>(tx, id)?;
    let project = project_of(tx, entity(T::KIND, draft.id()))?;
    ensure_editable(&project, actor)?;
    save_through(tx, draft.id(), patch, T::DATA_FIELDS)
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

fn diff_of<T: Draftable>(r: &impl Reader, id: Id) -> Result<Option<Vec<&'static str>>> {
    match pair::<T>(r, id)? {
        (origin, Some(draft)) => Ok(Some(diff_fields(&draft, &origin)?)),
        (_, None) => Ok(None),
    }
}

/// Data fields whose draft value differs from the origin. `None` when there
/// is no draft.
pub fn draft_diff_fields(r: &impl Reader, entity: EntityRef) -> Result<Option<Vec<&'static str>>> {
    match entity {
        EntityRef::Project(id) => diff_of::<Project>(r, id),
        EntityRef::Lesson(id) => diff_of::<Lesson>(r, id),
        EntityRef::Step(id) => diff_of::<Step>(r, id),
    }
}

/// Origin values of the project fields the draft changes.
pub fn draft_diff_values(r: &impl Reader, project_id: Id) -> Result<Option<Fields>> {
    match pair::<Project>(r, project_id)? {
        (origin, Some(draft)) => {
            let changed = diff_fields(&draft, &origin)?;
            Ok(Some(values_of(&origin, &changed)?))
        }
        (_, None) => Ok(None),
    }
}

pub fn draft_diff_tree(r: &impl Reader, project_id: Id) -> Result<Option<DiffTree>> {
    let (origin, draft) = match pair::<Project>(r, project_id)? {
        (origin, Some(draft)) => (origin, draft),
        (_, None) => return Ok(None),
    };

    let mut lessons = Vec::new();
    for lesson_draft in lessons_of(r, draft.id)? {
        let Some(lesson_origin_id) = lesson_draft.draft_origin else {
            continue;
        };
        let lesson_origin: Lesson = r.fetch(lesson_origin_id)?;

        let mut steps = Vec::new();
        for step_draft in steps_of(r, lesson_draft.id)? {
            let Some(step_origin_id) = step_draft.draft_origin else {
                continue;
            };
            let step_origin: Step = r.fetch(step_origin_id)?;
            steps.push(StepDiff {
                id: step_origin_id,
                draft_id: step_draft.id,
                title: step_draft.title.clone(),
                diff_fields: owned(diff_fields(&step_draft, &step_origin)?),
            });
        }

        lessons.push(LessonDiff {
            id: lesson_origin_id,
            draft_id: lesson_draft.id,
            title: lesson_draft.title.clone(),
            diff_fields: owned(diff_fields(&lesson_draft, &lesson_origin)?),
            steps,
        });
    }

    Ok(Some(DiffTree {
        id: origin.id,
        draft_id: draft.id,
        title: draft.title.clone(),
        diff_fields: owned(diff_fields(&draft, &origin)?),
        lessons,
    }))
}

// ---------------------------------------------------------------------------
// Apply / discard
// ---------------------------------------------------------------------------

/// Copy the data fields of `draft` onto its origin.
fn apply_one<T: Draftable>(tx: &WriteTx, draft: &T, only_when_changed: bool) -> Result<AppliedChange> {
    let origin_id = draft.draft_origin().ok_or(IgniteError::DraftNotFound {
        kind: T::KIND.as_str(),
        id: draft.id(),
    })?;
    let origin: T = tx.fetch(origin_id)?;
    let changed = diff_fields(draft, &origin)?;

    let written = !(only_when_changed && changed.is_empty());
    if written {
        let mut merged = copy_fields(draft, &origin, T::DATA_FIELDS)?;
        merged.touch(Utc::now());
        tx.put(&merged)?;
    }
    Ok(AppliedChange {
        entity: entity(T::KIND, origin_id),
        fields: owned(changed),
        written,
    })
}

fn apply_lesson(tx: &WriteTx, draft: &Lesson, only_when_changed: bool, deep: bool, report: &mut ApplyReport) -> Result<()> {
    report.applied.push(apply_one(tx, draft, only_when_changed)?);
    if deep {
        for step_draft in steps_of(tx, draft.id)? {
            report.applied.push(apply_one(tx, &step_draft, only_when_changed)?);
        }
    }
    Ok(())
}

/// Apply the draft of `entity` to its origin. With `deep`, drafts below it
/// are applied too. The draft is kept. `None` when there is no draft.
pub fn draft_apply(
    tx: &WriteTx,
    entity: EntityRef,
    only_when_changed: bool,
    deep: bool,
) -> Result<Option<ApplyReport>> {
    let mut report = ApplyReport::default();
    match entity {
        EntityRef::Project(id) => {
            let Some(draft) = draft_get::<Project>(tx, id)? else {
                return Ok(None);
            };
            report.applied.push(apply_one(tx, &draft, only_when_changed)?);
            if deep {
                for lesson_draft in lessons_of(tx, draft.id)? {
                    apply_lesson(tx, &lesson_draft, only_when_changed, deep, &mut report)?;
                }
            }
        }
        EntityRef::Lesson(id) => {
            let Some(draft) = draft_get::<Lesson>(tx, id)? else {
                return Ok(None);
            };
            apply_lesson(tx, &draft, only_when_changed, deep, &mut report)?;
        }
        EntityRef::Step(id) => {
            let Some(draft) = draft_get::<Step>(tx, id)? else {
                return Ok(None);
            };
            report.applied.push(apply_one(tx, &draft, only_when_changed)?);
        }
    }
    tracing::debug!(%entity, written = report.written(), "draft applied");
    Ok(Some(report))
}

/// Delete a project draft with every lesson and step draft below it.
/// Lesson and step drafts cannot be discarded on their own; for them this
/// returns `false` and changes nothing.
pub fn draft_discard(tx: &WriteTx, entity: EntityRef) -> Result<bool> {
    let EntityRef::Project(id) = entity else {
        return Ok(false);
    };
    let Some(draft) = draft_get::<Project>(tx, id)? else {
        return Ok(false);
    };

    let lessons = tx.filter::<Lesson>(|l| l.project_id == draft.id)?;
    for lesson in &lessons {
        for step in tx.filter::<Step>(|s| s.lesson_id == lesson.id)? {
            tx.remove::<Step>(step.id)?;
        }
        tx.remove::<Lesson>(lesson.id)?;
    }
    tx.remove::<Project>(draft.id)?;
    tracing::info!(draft = draft.id, origin = ?draft.draft_origin, "project draft discarded");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
