//! Per-user progress through a project.
//!
//! Completion is derived, never set by a client: a lesson state is complete
//! when every live step of its lesson has a step state (stepless lessons are
//! always complete), and a project state is complete when every live lesson
//! has a completed lesson state. Each write below recomputes upwards inside
//! the same transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProgressConfig;
use crate::content::{lessons_of, origin_project, steps_of, Dirty, Lesson, Step};
use crate::db::{Reader, Record, RecordTable, WriteTx};
use crate::error::{IgniteError, Result};
use crate::types::{Actor, Id};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: Id,
    pub user: Id,
    pub project_id: Id,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub enrolled_lessons_count: u32,
    #[serde(default)]
    pub completed_lessons_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonState {
    pub id: Id,
    pub project_state_id: Id,
    pub lesson_id: Id,
    pub user: Id,
    #[serde(default)]
    pub is_completed: bool,
    /// User specific data for the lesson application, e.g. a canvas id.
    #[serde(default)]
    pub extra: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub id: Id,
    pub lesson_state_id: Id,
    pub step_id: Id,
    pub user: Id,
    #[serde(default)]
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl Record for ProjectState {
    const TABLE: RecordTable = RecordTable::new("project_states");
    const NAME: &'static str = "project_states";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::StateNotFound {
            kind: "project state",
            id,
        }
    }
}

impl Record for LessonState {
    const TABLE: RecordTable = RecordTable::new("lesson_states");
    const NAME: &'static str = "lesson_states";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::StateNotFound {
            kind: "lesson state",
            id,
        }
    }
}

impl Record for StepState {
    const TABLE: RecordTable = RecordTable::new("step_states");
    const NAME: &'static str = "step_states";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn missing(id: Id) -> IgniteError {
        IgniteError::StateNotFound {
            kind: "step state",
            id,
        }
    }
}

fn ensure_owner(actor: &Actor, user: Id, what: &str) -> Result<()> {
    if actor.is_superuser || actor.user == user {
        Ok(())
    } else {
        Err(IgniteError::PermissionDenied(format!(
            "{what} belongs to another user"
        )))
    }
}

// ---------------------------------------------------------------------------
// Dirty tracking
// ---------------------------------------------------------------------------

/// Lesson states of `lesson_id`; they need recomputing after its steps change.
pub fn lesson_state_ids_of(r: &impl Reader, lesson_id: Id) -> Result<Vec<Id>> {
    Ok(r
        .filter::<LessonState>(|s| s.lesson_id == lesson_id)?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

/// Project states of `project_id`; they need recomputing after its lessons
/// change.
pub fn project_state_ids_of(r: &impl Reader, project_id: Id) -> Result<Vec<Id>> {
    Ok(r
        .filter::<ProjectState>(|s| s.project_id == project_id)?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

/// Lesson states to recompute after the steps of `lesson_id` changed.
pub fn mark_lesson_dirty(r: &impl Reader, lesson_id: Id) -> Result<Dirty> {
    Ok(Dirty {
        lesson_states: lesson_state_ids_of(r, lesson_id)?,
        project_states: Vec::new(),
    })
}

/// Recompute every state listed in `dirty`. States deleted in the meantime
/// are skipped. Returns how many states were recomputed.
pub fn recompute_dirty(tx: &WriteTx, cfg: &ProgressConfig, dirty: &Dirty) -> Result<usize> {
    let mut done = 0;
    for id in &dirty.lesson_states {
        if tx.get::<LessonState>(*id)?.is_some() {
            recompute_lesson(tx, cfg, *id)?;
            done += 1;
        }
    }
    for id in &dirty.project_states {
        if tx.get::<ProjectState>(*id)?.is_some() {
            recompute_project(tx, *id)?;
            done += 1;
        }
    }
    Ok(done)
}

// ---------------------------------------------------------------------------
// Recomputation
// ---------------------------------------------------------------------------

fn lesson_is_complete(r: &impl Reader, cfg: &ProgressConfig, lesson: &Lesson, state_id: Id) -> Result<bool> {
    if cfg.is_stepless(&lesson.application) {
        return Ok(true);
    }
    let live: HashSet<Id> = steps_of(r, lesson.id)?.into_iter().map(|s| s.id).collect();
    let viewed: HashSet<Id> = r
        .filter::<StepState>(|s| s.lesson_state_id == state_id && live.contains(&s.step_id))?
        .into_iter()
        .map(|s| s.step_id)
        .collect();
    Ok(viewed.len() == live.len())
}

/// Refresh `is_completed` of a lesson state from its step states, then
/// recompute its project state. Writes only when the flag changes.
pub fn recompute_lesson(tx: &WriteTx, cfg: &ProgressConfig, lesson_state_id: Id) -> Result<LessonState> {
    let mut state: LessonState = tx.fetch(lesson_state_id)?;
    let lesson: Lesson = tx.fetch(state.lesson_id)?;
    let complete = lesson_is_complete(tx, cfg, &lesson, state.id)?;
    if complete != state.is_completed {
        state.is_completed = complete;
        state.updated_at = Utc::now();
        tx.put(&state)?;
        tracing::debug!(lesson_state = state.id, complete, "lesson state recomputed");
    }
    recompute_project(tx, state.project_state_id)?;
    Ok(state)
}

/// Refresh counters and `is_completed` of a project state from its lesson
/// states. Writes only when something changes.
pub fn recompute_project(tx: &WriteTx, project_state_id: Id) -> Result<ProjectState> {
    let mut state: ProjectState = tx.fetch(project_state_id)?;
    let live: HashSet<Id> = lessons_of(tx, state.project_id)?.into_iter().map(|l| l.id).collect();
    let lesson_states = tx.filter::<LessonState>(|s| s.project_state_id == state.id && live.contains(&s.lesson_id))?;

    let enrolled = lesson_states.len() as u32;
    let completed = lesson_states.iter().filter(|s| s.is_completed).count() as u32;
    let complete = !live.is_empty() && completed as usize == live.len();

    if (state.is_completed, state.enrolled_lessons_count, state.completed_lessons_count) != (complete, enrolled, completed) {
        state.is_completed = complete;
        state.enrolled_lessons_count = enrolled;
        state.completed_lessons_count = completed;
        state.updated_at = Utc::now();
        tx.put(&state)?;
        tracing::debug!(project_state = state.id, complete, completed, "project state recomputed");
    }
    Ok(state)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Get or create the actor's state for a project.
pub fn enroll(tx: &WriteTx, actor: &Actor, project_id: Id) -> Result<(ProjectState, bool)> {
    let project = origin_project(tx, project_id)?;
    if let Some(existing) = tx
        .filter::<ProjectState>(|s| s.user == actor.user && s.project_id == project.id)?
        .into_iter()
        .next()
    {
        return Ok((existing, false));
    }
    let now = Utc::now();
    let mut state = ProjectState {
        id: 0,
        user: actor.user,
        project_id: project.id,
        is_completed: false,
        enrolled_lessons_count: 0,
        completed_lessons_count: 0,
        created_at: now,
        updated_at: now,
    };
    tx.insert(&mut state)?;
    tracing::info!(project = project.id, user = actor.user, "enrolled");
    Ok((state, true))
}

/// Get or create the lesson state of `lesson_id` under a project state.
pub fn start_lesson(
    tx: &WriteTx,
    cfg: &ProgressConfig,
    actor: &Actor,
    project_state_id: Id,
    lesson_id: Id,
) -> Result<(LessonState, bool)> {
    let project_state: ProjectState = tx.fetch(project_state_id)?;
    ensure_owner(actor, project_state.user, "project state")?;
    let lesson: Lesson = tx.fetch(lesson_id)?;
    if lesson.is_deleted || lesson.project_id != project_state.project_id {
        return Err(IgniteError::Mismatch {
            kind: "lesson",
            id: lesson_id,
            parent: format!("project {}", project_state.project_id),
        });
    }

    if let Some(existing) = tx
        .filter::<LessonState>(|s| s.project_state_id == project_state_id && s.lesson_id == lesson_id)?
        .into_iter()
        .next()
    {
        return Ok((existing, false));
    }

    let now = Utc::now();
    let mut state = LessonState {
        id: 0,
        project_state_id,
        lesson_id,
        user: project_state.user,
        is_completed: false,
        extra: Value::Null,
        created_at: now,
        updated_at: now,
    };
    tx.insert(&mut state)?;
    let state = recompute_lesson(tx, cfg, state.id)?;
    Ok((state, true))
}

/// Record that a step was viewed. Viewing twice changes nothing.
pub fn view_step(
    tx: &WriteTx,
    cfg: &ProgressConfig,
    actor: &Actor,
    lesson_state_id: Id,
    step_id: Id,
    state: Option<String>,
) -> Result<(StepState, bool)> {
    let lesson_state: LessonState = tx.fetch(lesson_state_id)?;
    ensure_owner(actor, lesson_state.user, "lesson state")?;
    let step: Step = tx.fetch(step_id)?;
    if step.is_deleted || step.lesson_id != lesson_state.lesson_id {
        return Err(IgniteError::Mismatch {
            kind: "step",
            id: step_id,
            parent: format!("lesson {}", lesson_state.lesson_id),
        });
    }

    if let Some(existing) = tx
        .filter::<StepState>(|s| s.lesson_state_id == lesson_state_id && s.step_id == step_id)?
        .into_iter()
        .next()
    {
        return Ok((existing, false));
    }

    let mut step_state = StepState {
        id: 0,
        lesson_state_id,
        step_id,
        user: lesson_state.user,
        state: state.unwrap_or_default(),
        created_at: Utc::now(),
    };
    tx.insert(&mut step_state)?;
    recompute_lesson(tx, cfg, lesson_state_id)?;
    Ok((step_state, true))
}

/// Forget a step view and re-derive the lesson state. A lesson of a
/// stepless application stays complete.
pub fn unview_step(tx: &WriteTx, cfg: &ProgressConfig, actor: &Actor, step_state_id: Id) -> Result<LessonState> {
    let step_state: StepState = tx.fetch(step_state_id)?;
    ensure_owner(actor, step_state.user, "step state")?;
    tx.remove::<StepState>(step_state_id)?;
    recompute_lesson(tx, cfg, step_state.lesson_state_id)
}

/// Delete a lesson state with its step views. The project can no longer be
/// complete.
pub fn delete_lesson_state(tx: &WriteTx, actor: &Actor, lesson_state_id: Id) -> Result<ProjectState> {
    let lesson_state: LessonState = tx.fetch(lesson_state_id)?;
    ensure_owner(actor, lesson_state.user, "lesson state")?;
    for step_state in tx.filter::<StepState>(|s| s.lesson_state_id == lesson_state_id)? {
        tx.remove::<StepState>(step_state.id)?;
    }
    tx.remove::<LessonState>(lesson_state_id)?;
    recompute_project(tx, lesson_state.project_state_id)
}

/// Replace the application data stored on a lesson state.
pub fn set_lesson_extra(tx: &WriteTx, actor: &Actor, lesson_state_id: Id, extra: Value) -> Result<LessonState> {
    let mut state: LessonState = tx.fetch(lesson_state_id)?;
    ensure_owner(actor, state.user, "lesson state")?;
    state.extra = extra;
    state.updated_at = Utc::now();
    tx.put(&state)?;
    Ok(state)
}

/// Delete every progress record of a project. Returns the number of project
/// states removed.
pub fn reset_project_progress(tx: &WriteTx, project_id: Id) -> Result<usize> {
    let project_states = tx.filter::<ProjectState>(|s| s.project_id == project_id)?;
    for project_state in &project_states {
        for lesson_state in tx.filter::<LessonState>(|s| s.project_state_id == project_state.id)? {
            for step_state in tx.filter::<StepState>(|s| s.lesson_state_id == lesson_state.id)? {
                tx.remove::<StepState>(step_state.id)?;
            }
            tx.remove::<LessonState>(lesson_state.id)?;
        }
        tx.remove::<ProjectState>(project_state.id)?;
    }
    Ok(project_states.len())
}

/// Delete the lesson states of a removed lesson with their step views.
/// Returns how many lesson states were removed.
pub fn forget_lesson(tx: &WriteTx, lesson_id: Id) -> Result<usize> {
    let lesson_states = tx.filter::<LessonState>(|s| s.lesson_id == lesson_id)?;
    for lesson_state in &lesson_states {
        for step_state in tx.filter::<StepState>(|s| s.lesson_state_id == lesson_state.id)? {
            tx.remove::<StepState>(step_state.id)?;
        }
        tx.remove::<LessonState>(lesson_state.id)?;
    }
    Ok(lesson_states.len())
}

/// Delete the step views of a removed step. Returns how many were removed.
pub fn forget_step(tx: &WriteTx, step_id: Id) -> Result<usize> {
    let views = tx.filter::<StepState>(|s| s.step_id == step_id)?;
    for view in &views {
        tx.remove::<StepState>(view.id)?;
    }
    Ok(views.len())
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LessonProgress {
    #[serde(flatten)]
    pub state: LessonState,
    pub viewed_steps: Vec<Id>,
    pub total_steps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectProgress {
    #[serde(flatten)]
    pub state: ProjectState,
    pub total_lessons: usize,
    pub lessons: Vec<LessonProgress>,
}

/// A project state with its lesson states in lesson order.
pub fn project_progress(r: &impl Reader, project_state_id: Id) -> Result<ProjectProgress> {
    let state: ProjectState = r.fetch(project_state_id)?;
    let lessons_in_order = lessons_of(r, state.project_id)?;
    let mut lessons = Vec::new();
    for lesson in &lessons_in_order {
        let Some(lesson_state) = r
            .filter::<LessonState>(|s| s.project_state_id == state.id && s.lesson_id == lesson.id)?
            .into_iter()
            .next()
        else {
            continue;
        };
        let viewed_steps = r
            .filter::<StepState>(|s| s.lesson_state_id == lesson_state.id)?
            .into_iter()
            .map(|s| s.step_id)
            .collect();
        lessons.push(LessonProgress {
            state: lesson_state,
            viewed_steps,
            total_steps: steps_of(r, lesson.id)?.len(),
        });
    }
    Ok(ProjectProgress {
        state,
        total_lessons: lessons_in_order.len(),
        lessons,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
