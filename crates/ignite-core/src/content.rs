use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Reader, Record, RecordTable, WriteTx};
use crate::draft::fields::{apply_patch, Fields, Patched};
use crate::draft::{self, Draftable};
use crate::error::{IgniteError, Result};
use crate::progress;
use crate::types::{Actor, EntityKind, EntityRef, Id, PublishMode};

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Easy,
    Intermediate,
    Hard,
}

fn default_age() -> String {
    "3+".to_string()
}

fn default_license() -> String {
    "CC-BY-NC-SA 3.0".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub card_image: Option<String>,
    /// Expected duration in minutes.
    #[serde(default)]
    pub duration: u32,
    #[serde(default = "default_age")]
    pub age: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_license")]
    pub license: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub teacher_tips: Option<String>,
    #[serde(default)]
    pub prerequisites: Option<String>,
    #[serde(default)]
    pub teacher_additional_resources: String,
    #[serde(default)]
    pub skills_acquired: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    pub owner: Id,
    #[serde(default)]
    pub current_editor: Option<Id>,
    pub publish_mode: PublishMode,
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lesson_count: u32,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub draft_origin: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: Id, owner: Id, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: String::new(),
            banner_image: None,
            card_image: None,
            duration: 0,
            age: default_age(),
            difficulty: Difficulty::default(),
            license: default_license(),
            language: default_language(),
            tags: String::new(),
            teacher_tips: None,
            prerequisites: None,
            teacher_additional_resources: String::new(),
            skills_acquired: Vec::new(),
            learning_objectives: Vec::new(),
            owner,
            current_editor: None,
            publish_mode: PublishMode::Edit,
            publish_date: None,
            min_publish_date: None,
            lesson_count: 0,
            is_deleted: false,
            draft_origin: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_editor(&self, actor: &Actor) -> bool {
        actor.is_superuser || self.owner == actor.user
    }
}

impl Record for Project {
    const TABLE: RecordTable = RecordTable::new("projects");
    const NAME: &'static str = "projects";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::ProjectNotFound(id)
    }
}

impl Draftable for Project {
    const KIND: EntityKind = EntityKind::Project;
    const DATA_FIELDS: &'static [&'static str] = &[
        "title",
        "description",
        "banner_image",
        "card_image",
        "duration",
        "age",
        "difficulty",
        "license",
        "language",
        "tags",
        "teacher_tips",
        "prerequisites",
        "teacher_additional_resources",
        "skills_acquired",
        "learning_objectives",
    ];
    const META_FIELDS: &'static [&'static str] = &["publish_mode", "current_editor"];

    fn draft_origin(&self) -> Option<Id> {
        self.draft_origin
    }

    fn set_draft_origin(&mut self, origin: Option<Id>) {
        self.draft_origin = origin;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Lesson
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Id,
    pub project_id: Id,
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub duration: u32,
    /// The application the lesson takes place in, e.g. `video` or `tinkercad`.
    pub application: String,
    #[serde(default)]
    pub application_blob: Value,
    #[serde(default)]
    pub steps_count: u32,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub draft_origin: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Lesson {
    const TABLE: RecordTable = RecordTable::new("lessons");
    const NAME: &'static str = "lessons";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::LessonNotFound(id)
    }
}

impl Draftable for Lesson {
    const KIND: EntityKind = EntityKind::Lesson;
    const DATA_FIELDS: &'static [&'static str] = &["title", "duration"];
    const CREATE_FIELDS: &'static [&'static str] = &["project_id"];

    fn draft_origin(&self) -> Option<Id> {
        self.draft_origin
    }

    fn set_draft_origin(&mut self, origin: Option<Id>) {
        self.draft_origin = origin;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: Id,
    pub lesson_id: Id,
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub instructions: Vec<Value>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub draft_origin: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Step {
    const TABLE: RecordTable = RecordTable::new("steps");
    const NAME: &'static str = "steps";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::StepNotFound(id)
    }
}

impl Draftable for Step {
    const KIND: EntityKind = EntityKind::Step;
    const DATA_FIELDS: &'static [&'static str] = &["title", "description", "image", "instructions"];
    const CREATE_FIELDS: &'static [&'static str] = &["lesson_id"];

    fn draft_origin(&self) -> Option<Id> {
        self.draft_origin
    }

    fn set_draft_origin(&mut self, origin: Option<Id>) {
        self.draft_origin = origin;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Creation payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLesson {
    pub title: String,
    #[serde(default)]
    pub duration: u32,
    pub application: String,
    #[serde(default)]
    pub application_blob: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub instructions: Vec<Value>,
}

/// Lesson states whose completion must be recomputed after a content change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dirty {
    pub lesson_states: Vec<Id>,
    pub project_states: Vec<Id>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Live origin projects, oldest first.
pub fn list_projects(r: &impl Reader) -> Result<Vec<Project>> {
    r.filter::<Project>(|p| !p.is_draft() && !p.is_deleted)
}

/// Live lessons of `project_id` in order. For a draft project these are the
/// lesson drafts.
pub fn lessons_of(r: &impl Reader, project_id: Id) -> Result<Vec<Lesson>> {
    let mut lessons = r.filter::<Lesson>(|l| l.project_id == project_id && !l.is_deleted)?;
    lessons.sort_by_key(|l| l.order);
    Ok(lessons)
}

/// Live steps of `lesson_id` in order.
pub fn steps_of(r: &impl Reader, lesson_id: Id) -> Result<Vec<Step>> {
    let mut steps = r.filter::<Step>(|s| s.lesson_id == lesson_id && !s.is_deleted)?;
    steps.sort_by_key(|s| s.order);
    Ok(steps)
}

/// Fetch a live origin project.
pub fn origin_project(r: &impl Reader, id: Id) -> Result<Project> {
    let project: Project = r.fetch(id)?;
    if project.is_deleted {
        return Err(IgniteError::ProjectNotFound(id));
    }
    if project.is_draft() {
        return Err(IgniteError::IsDraft {
            kind: "project",
            id,
        });
    }
    Ok(project)
}

/// Content of a project or project draft can only change while it is in
/// edit mode, by one of its editors, and not under someone else's edit lock.
pub fn ensure_editable(project: &Project, actor: &Actor) -> Result<()> {
    if project.publish_mode != PublishMode::Edit {
        return Err(IgniteError::NotEditable {
            project: project.id,
            mode: project.publish_mode.to_string(),
        });
    }
    if !project.is_editor(actor) {
        return Err(IgniteError::PermissionDenied(format!(
            "user {} cannot edit project {}",
            actor.user, project.id
        )));
    }
    ensure_unlocked(project, actor)
}

fn ensure_unlocked(project: &Project, actor: &Actor) -> Result<()> {
    match project.current_editor {
        Some(editor) if editor != actor.user => Err(IgniteError::PermissionDenied(format!(
            "project {} is edit-locked by user {}",
            project.id, editor
        ))),
        _ => Ok(()),
    }
}

/// Take (`lock = true`) or release the edit lock of a project or project
/// draft. The lock can only be held by the acting user and only in edit mode;
/// a superuser may release anyone's lock.
pub fn set_edit_lock(tx: &WriteTx, actor: &Actor, project_id: Id, lock: bool) -> Result<Project> {
    let mut project: Project = tx.fetch(project_id)?;
    if project.is_deleted {
        return Err(IgniteError::ProjectNotFound(project_id));
    }
    if project.publish_mode != PublishMode::Edit {
        return Err(IgniteError::NotEditable {
            project: project_id,
            mode: project.publish_mode.to_string(),
        });
    }
    if !project.is_editor(actor) {
        return Err(IgniteError::PermissionDenied(format!(
            "user {} cannot edit project {}",
            actor.user, project_id
        )));
    }
    if !(actor.is_superuser && !lock) {
        ensure_unlocked(&project, actor)?;
    }
    project.current_editor = lock.then_some(actor.user);
    project.touch(Utc::now());
    tx.put(&project)?;
    tracing::debug!(project = project_id, user = actor.user, lock, "edit lock changed");
    Ok(project)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

pub fn create_project(tx: &WriteTx, actor: &Actor, new: NewProject) -> Result<Project> {
    let mut project = Project::new(0, actor.user, new.title);
    project.description = new.description;
    tx.insert(&mut project)?;
    tracing::info!(project = project.id, owner = actor.user, "project created");
    Ok(project)
}

/// Patch data fields of an origin project in edit mode.
pub fn update_project(tx: &WriteTx, actor: &Actor, id: Id, patch: &Fields) -> Result<Patched<Project>> {
    let project = origin_project(tx, id)?;
    ensure_editable(&project, actor)?;
    let mut patched = apply_patch(&project, patch, Project::DATA_FIELDS)?;
    patched.record.touch(Utc::now());
    tx.put(&patched.record)?;
    Ok(patched)
}

/// Soft-delete a project. Its draft goes with it; progress records survive
/// only when the project was published.
pub fn delete_project(tx: &WriteTx, actor: &Actor, id: Id) -> Result<()> {
    let mut project = origin_project(tx, id)?;
    if !project.is_editor(actor) {
        return Err(IgniteError::PermissionDenied(format!(
            "user {} cannot delete project {}",
            actor.user, id
        )));
    }
    draft::draft_discard(tx, EntityRef::Project(id))?;
    project.is_deleted = true;
    project.touch(Utc::now());
    tx.put(&project)?;
    if project.publish_mode != PublishMode::Published {
        progress::reset_project_progress(tx, id)?;
    }
    tracing::info!(project = id, "project deleted");
    Ok(())
}

/// Append a lesson to a project in edit mode.
pub fn add_lesson(tx: &WriteTx, actor: &Actor, project_id: Id, new: NewLesson) -> Result<(Lesson, Dirty)> {
    let mut project = origin_project(tx, project_id)?;
    ensure_editable(&project, actor)?;

    let order = lessons_of(tx, project_id)?.len() as u32;
    let now = Utc::now();
    let mut lesson = Lesson {
        id: 0,
        project_id,
        order,
        title: new.title,
        duration: new.duration,
        application: new.application,
        application_blob: new.application_blob,
        steps_count: 0,
        is_deleted: false,
        draft_origin: None,
        created_at: now,
        updated_at: now,
    };
    tx.insert(&mut lesson)?;

    project.lesson_count += 1;
    project.touch(now);
    tx.put(&project)?;

    let dirty = Dirty {
        lesson_states: Vec::new(),
        project_states: progress::project_state_ids_of(tx, project_id)?,
    };
    Ok((lesson, dirty))
}

/// Lesson fields an editor may change in place. The application blob is
/// edited on the origin only; drafts carry the data fields.
const LESSON_EDIT_FIELDS: &[&str] = &["title", "duration", "application_blob"];

/// Patch fields of an origin lesson whose project is in edit mode.
pub fn update_lesson(tx: &WriteTx, actor: &Actor, id: Id, patch: &Fields) -> Result<Patched<Lesson>> {
    let lesson = live_lesson(tx, id)?;
    let project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;
    let mut patched = apply_patch(&lesson, patch, LESSON_EDIT_FIELDS)?;
    patched.record.touch(Utc::now());
    tx.put(&patched.record)?;
    Ok(patched)
}

/// Append a step to a lesson whose project is in edit mode.
pub fn add_step(tx: &WriteTx, actor: &Actor, lesson_id: Id, new: NewStep) -> Result<(Step, Dirty)> {
    let mut lesson = live_lesson(tx, lesson_id)?;
    let project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;

    let order = steps_of(tx, lesson_id)?.len() as u32;
    let now = Utc::now();
    let mut step = Step {
        id: 0,
        lesson_id,
        order,
        title: new.title,
        description: new.description,
        image: new.image,
        instructions: new.instructions,
        is_deleted: false,
        draft_origin: None,
        created_at: now,
        updated_at: now,
    };
    tx.insert(&mut step)?;

    lesson.steps_count += 1;
    lesson.touch(now);
    tx.put(&lesson)?;

    let dirty = progress::mark_lesson_dirty(tx, lesson_id)?;
    Ok((step, dirty))
}

/// Patch data fields of an origin step whose project is in edit mode.
pub fn update_step(tx: &WriteTx, actor: &Actor, id: Id, patch: &Fields) -> Result<Patched<Step>> {
    let step = live_step(tx, id)?;
    let lesson = live_lesson(tx, step.lesson_id)?;
    let project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;
    let mut patched = apply_patch(&step, patch, Step::DATA_FIELDS)?;
    patched.record.touch(Utc::now());
    tx.put(&patched.record)?;
    Ok(patched)
}

/// Soft-delete a step and close the gap in its siblings' order.
pub fn remove_step(tx: &WriteTx, actor: &Actor, step_id: Id) -> Result<Dirty> {
    let mut step = live_step(tx, step_id)?;
    let mut lesson = live_lesson(tx, step.lesson_id)?;
    let project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;

    let now = Utc::now();
    step.is_deleted = true;
    step.touch(now);
    tx.put(&step)?;

    for (order, mut sibling) in steps_of(tx, lesson.id)?.into_iter().enumerate() {
        if sibling.order != order as u32 {
            sibling.order = order as u32;
            tx.put(&sibling)?;
        }
    }

    lesson.steps_count = lesson.steps_count.saturating_sub(1);
    lesson.touch(now);
    tx.put(&lesson)?;

    if project.publish_mode != PublishMode::Published {
        progress::forget_step(tx, step_id)?;
    }

    progress::mark_lesson_dirty(tx, lesson.id)
}

/// Soft-delete a lesson and close the gap in its siblings' order. Progress
/// on the lesson is dropped while the project is unpublished; the returned
/// project states must be recomputed.
pub fn remove_lesson(tx: &WriteTx, actor: &Actor, lesson_id: Id) -> Result<Dirty> {
    let mut lesson = live_lesson(tx, lesson_id)?;
    let mut project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;

    let now = Utc::now();
    lesson.is_deleted = true;
    lesson.touch(now);
    tx.put(&lesson)?;

    for (order, mut sibling) in lessons_of(tx, project.id)?.into_iter().enumerate() {
        if sibling.order != order as u32 {
            sibling.order = order as u32;
            tx.put(&sibling)?;
        }
    }

    project.lesson_count = project.lesson_count.saturating_sub(1);
    project.touch(now);
    tx.put(&project)?;

    if project.publish_mode != PublishMode::Published {
        let removed = progress::forget_lesson(tx, lesson_id)?;
        tracing::debug!(lesson = lesson_id, removed, "lesson progress dropped");
    }
    tracing::info!(project = project.id, lesson = lesson_id, "lesson removed");

    Ok(Dirty {
        lesson_states: Vec::new(),
        project_states: progress::project_state_ids_of(tx, project.id)?,
    })
}

/// Check that `order` names every id in `live` exactly once.
fn check_order(live: &[Id], order: &[Id]) -> Result<()> {
    let mut wanted = order.to_vec();
    wanted.sort_unstable();
    let mut have = live.to_vec();
    have.sort_unstable();
    if wanted != have {
        return Err(IgniteError::InvalidField {
            field: "order".into(),
            reason: format!("expected each of {have:?} exactly once, got {order:?}"),
        });
    }
    Ok(())
}

/// Put the lessons of a project in edit mode in the given order.
pub fn reorder_lessons(tx: &WriteTx, actor: &Actor, project_id: Id, order: &[Id]) -> Result<Vec<Lesson>> {
    let project = origin_project(tx, project_id)?;
    ensure_editable(&project, actor)?;
    let lessons = lessons_of(tx, project_id)?;
    check_order(&lessons.iter().map(|l| l.id).collect::<Vec<_>>(), order)?;

    let now = Utc::now();
    for mut lesson in lessons {
        let position = order.iter().position(|id| *id == lesson.id).unwrap_or_default() as u32;
        if lesson.order != position {
            lesson.order = position;
            lesson.touch(now);
            tx.put(&lesson)?;
        }
    }
    lessons_of(tx, project_id)
}

/// Put the steps of a lesson whose project is in edit mode in the given
/// order.
pub fn reorder_steps(tx: &WriteTx, actor: &Actor, lesson_id: Id, order: &[Id]) -> Result<Vec<Step>> {
    let lesson = live_lesson(tx, lesson_id)?;
    let project = origin_project(tx, lesson.project_id)?;
    ensure_editable(&project, actor)?;
    let steps = steps_of(tx, lesson_id)?;
    check_order(&steps.iter().map(|s| s.id).collect::<Vec<_>>(), order)?;

    let now = Utc::now();
    for mut step in steps {
        let position = order.iter().position(|id| *id == step.id).unwrap_or_default() as u32;
        if step.order != position {
            step.order = position;
            step.touch(now);
            tx.put(&step)?;
        }
    }
    steps_of(tx, lesson_id)
}

fn live_lesson(r: &impl Reader, id: Id) -> Result<Lesson> {
    let lesson: Lesson = r.fetch(id)?;
    if lesson.is_deleted {
        return Err(IgniteError::LessonNotFound(id));
    }
    if lesson.is_draft() {
        return Err(IgniteError::IsDraft { kind: "lesson", id });
    }
    Ok(lesson)
}

fn live_step(r: &impl Reader, id: Id) -> Result<Step> {
    let step: Step = r.fetch(id)?;
    if step.is_deleted {
        return Err(IgniteError::StepNotFound(id));
    }
    if step.is_draft() {
        return Err(IgniteError::IsDraft { kind: "step", id });
    }
    Ok(step)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
