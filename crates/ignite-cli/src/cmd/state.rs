use crate::output::{print_fields, print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use ignite_core::{
    db::Reader,
    progress,
    types::{Actor, Id},
};
use serde_json::{json, Value};
use std::path::Path;

use super::{open, yes_no};

#[derive(Subcommand)]
pub enum StateSubcommand {
    /// Enroll the acting user in a project
    Enroll { project_id: Id },
    /// Show a project state with its lessons
    Show { state_id: Id },
    /// Start a lesson under a project state
    Start { state_id: Id, lesson_id: Id },
    /// Mark a step viewed
    View {
        lesson_state_id: Id,
        step_id: Id,
        /// Application-defined state of the view
        #[arg(long)]
        state: Option<String>,
    },
    /// Forget a step view
    Unview { step_state_id: Id },
    /// Delete a lesson state and its step views
    DropLesson { lesson_state_id: Id },
    /// Replace the application data of a lesson state
    Extra {
        lesson_state_id: Id,
        /// JSON value
        data: String,
    },
}

pub fn run(root: &Path, actor: &Actor, subcmd: StateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StateSubcommand::Enroll { project_id } => enroll(root, actor, project_id, json),
        StateSubcommand::Show { state_id } => show(root, actor, state_id, json),
        StateSubcommand::Start { state_id, lesson_id } => start(root, actor, state_id, lesson_id, json),
        StateSubcommand::View {
            lesson_state_id,
            step_id,
            state,
        } => view(root, actor, lesson_state_id, step_id, state, json),
        StateSubcommand::Unview { step_state_id } => unview(root, actor, step_state_id, json),
        StateSubcommand::DropLesson { lesson_state_id } => drop_lesson(root, actor, lesson_state_id, json),
        StateSubcommand::Extra { lesson_state_id, data } => extra(root, actor, lesson_state_id, &data, json),
    }
}

fn enroll(root: &Path, actor: &Actor, project_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let (state, created) = db
        .update(|tx| progress::enroll(tx, actor, project_id))
        .with_context(|| format!("failed to enroll in project {project_id}"))?;

    if json {
        return print_json(&json!({ "state": state, "created": created }));
    }
    if created {
        println!("Enrolled user {} in project {project_id}: state {}.", actor.user, state.id);
    } else {
        println!("User {} is already enrolled in project {project_id}: state {}.", actor.user, state.id);
    }
    Ok(())
}

fn show(root: &Path, actor: &Actor, state_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let view = db
        .view(|tx| progress::project_progress(tx, state_id))
        .with_context(|| format!("failed to load project state {state_id}"))?;
    if view.state.user != actor.user && !actor.is_superuser {
        bail!("project state {state_id} belongs to another user");
    }

    if json {
        return print_json(&view);
    }
    print_fields(&[
        ("state", view.state.id.to_string()),
        ("project", view.state.project_id.to_string()),
        ("user", view.state.user.to_string()),
        ("completed", yes_no(view.state.is_completed).to_string()),
        (
            "lessons",
            format!("{}/{}", view.state.completed_lessons_count, view.total_lessons),
        ),
    ]);
    if view.lessons.is_empty() {
        return Ok(());
    }
    println!();
    let rows = view
        .lessons
        .iter()
        .map(|l| {
            vec![
                l.state.id.to_string(),
                l.state.lesson_id.to_string(),
                format!("{}/{}", l.viewed_steps.len(), l.total_steps),
                yes_no(l.state.is_completed).to_string(),
            ]
        })
        .collect();
    print_table(&["LESSON STATE", "LESSON", "STEPS", "DONE"], rows);
    Ok(())
}

fn start(root: &Path, actor: &Actor, state_id: Id, lesson_id: Id, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let (state, created) = db
        .update(|tx| progress::start_lesson(tx, &config.progress, actor, state_id, lesson_id))
        .with_context(|| format!("failed to start lesson {lesson_id}"))?;

    if json {
        return print_json(&json!({ "lesson_state": state, "created": created }));
    }
    println!(
        "Lesson {lesson_id}: lesson state {} (completed: {}).",
        state.id,
        yes_no(state.is_completed)
    );
    Ok(())
}

fn view(
    root: &Path,
    actor: &Actor,
    lesson_state_id: Id,
    step_id: Id,
    state: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let (step_state, lesson_state) = db
        .update(|tx| {
            let (step_state, _) = progress::view_step(tx, &config.progress, actor, lesson_state_id, step_id, state)?;
            let lesson_state: progress::LessonState = tx.fetch(lesson_state_id)?;
            Ok((step_state, lesson_state))
        })
        .with_context(|| format!("failed to mark step {step_id} viewed"))?;

    if json {
        return print_json(&json!({ "step_state": step_state, "lesson_state": lesson_state }));
    }
    println!(
        "Viewed step {step_id}: step state {} (lesson completed: {}).",
        step_state.id,
        yes_no(lesson_state.is_completed)
    );
    Ok(())
}

fn unview(root: &Path, actor: &Actor, step_state_id: Id, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let lesson_state = db
        .update(|tx| progress::unview_step(tx, &config.progress, actor, step_state_id))
        .with_context(|| format!("failed to remove step state {step_state_id}"))?;

    if json {
        return print_json(&json!({ "lesson_state": lesson_state }));
    }
    println!("Removed step state {step_state_id}.");
    Ok(())
}

fn drop_lesson(root: &Path, actor: &Actor, lesson_state_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let project_state = db
        .update(|tx| progress::delete_lesson_state(tx, actor, lesson_state_id))
        .with_context(|| format!("failed to delete lesson state {lesson_state_id}"))?;

    if json {
        return print_json(&json!({ "project_state": project_state }));
    }
    println!("Deleted lesson state {lesson_state_id}.");
    Ok(())
}

fn extra(root: &Path, actor: &Actor, lesson_state_id: Id, data: &str, json: bool) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(data).context("extra data must be valid JSON")?;
    let (_, db) = open(root)?;
    let state = db
        .update(|tx| progress::set_lesson_extra(tx, actor, lesson_state_id, value))
        .with_context(|| format!("failed to update lesson state {lesson_state_id}"))?;

    if json {
        return print_json(&state);
    }
    println!("Updated the data of lesson state {lesson_state_id}.");
    Ok(())
}
