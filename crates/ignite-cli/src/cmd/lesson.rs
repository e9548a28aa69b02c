use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use ignite_core::{
    content::{self, NewLesson, NewStep},
    types::{Actor, Id},
};
use serde_json::{json, Value};
use std::path::Path;

use super::{open, parse_patch, settle};

#[derive(Subcommand)]
pub enum LessonSubcommand {
    /// Append a lesson to a project
    Add {
        project_id: Id,
        title: String,
        /// Application the lesson runs in (e.g. tinkercad, video, instructables)
        #[arg(long)]
        application: String,
        /// Duration in minutes
        #[arg(long, default_value_t = 0)]
        duration: u32,
        /// Application data as a JSON object
        #[arg(long, value_name = "JSON")]
        blob: Option<String>,
    },
    /// Edit lesson fields while in edit mode (repeatable: --set title=Wiring)
    Update {
        id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Remove a lesson and renumber the rest
    Remove { id: Id },
    /// Put the lessons of a project in the given order
    Reorder {
        project_id: Id,
        #[arg(required = true)]
        order: Vec<Id>,
    },
}

#[derive(Subcommand)]
pub enum StepSubcommand {
    /// Append a step to a lesson
    Add {
        lesson_id: Id,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        image: Option<String>,
        /// Instruction text (repeatable)
        #[arg(long = "instruction")]
        instructions: Vec<String>,
    },
    /// Edit step fields while in edit mode (repeatable: --set title=Solder)
    Update {
        id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Remove a step and renumber the rest
    Remove { id: Id },
    /// Put the steps of a lesson in the given order
    Reorder {
        lesson_id: Id,
        #[arg(required = true)]
        order: Vec<Id>,
    },
}

pub fn run_lesson(root: &Path, actor: &Actor, subcmd: LessonSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        LessonSubcommand::Add {
            project_id,
            title,
            application,
            duration,
            blob,
        } => {
            let application_blob = match blob {
                Some(raw) => serde_json::from_str(&raw).context("--blob must be valid JSON")?,
                None => Value::Null,
            };
            add_lesson(
                root,
                actor,
                project_id,
                NewLesson {
                    title,
                    duration,
                    application,
                    application_blob,
                },
                json,
            )
        }
        LessonSubcommand::Update { id, set } => update_lesson(root, actor, id, &set, json),
        LessonSubcommand::Remove { id } => remove_lesson(root, actor, id, json),
        LessonSubcommand::Reorder { project_id, order } => {
            let (_, db) = open(root)?;
            let lessons = db
                .update(|tx| content::reorder_lessons(tx, actor, project_id, &order))
                .with_context(|| format!("failed to reorder the lessons of project {project_id}"))?;
            if json {
                return print_json(&lessons);
            }
            for lesson in &lessons {
                println!("{:>3}  {}  {}", lesson.order, lesson.id, lesson.title);
            }
            Ok(())
        }
    }
}

pub fn run_step(root: &Path, actor: &Actor, subcmd: StepSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StepSubcommand::Add {
            lesson_id,
            title,
            description,
            image,
            instructions,
        } => add_step(
            root,
            actor,
            lesson_id,
            NewStep {
                title,
                description,
                image,
                instructions: instructions.into_iter().map(Value::String).collect(),
            },
            json,
        ),
        StepSubcommand::Update { id, set } => update_step(root, actor, id, &set, json),
        StepSubcommand::Remove { id } => remove_step(root, actor, id, json),
        StepSubcommand::Reorder { lesson_id, order } => {
            let (_, db) = open(root)?;
            let steps = db
                .update(|tx| content::reorder_steps(tx, actor, lesson_id, &order))
                .with_context(|| format!("failed to reorder the steps of lesson {lesson_id}"))?;
            if json {
                return print_json(&steps);
            }
            for step in &steps {
                println!("{:>3}  {}  {}", step.order, step.id, step.title);
            }
            Ok(())
        }
    }
}

fn add_lesson(root: &Path, actor: &Actor, project_id: Id, new: NewLesson, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let (lesson, dirty) = db
        .update(|tx| content::add_lesson(tx, actor, project_id, new))
        .with_context(|| format!("failed to add a lesson to project {project_id}"))?;
    settle(&db, &config, &dirty)?;

    if json {
        return print_json(&lesson);
    }
    println!(
        "Added lesson {} '{}' to project {project_id} at position {}.",
        lesson.id, lesson.title, lesson.order
    );
    Ok(())
}

fn update_lesson(root: &Path, actor: &Actor, id: Id, set: &[String], json: bool) -> anyhow::Result<()> {
    let patch = parse_patch(set)?;
    let (_, db) = open(root)?;
    let patched = db
        .update(|tx| content::update_lesson(tx, actor, id, &patch))
        .with_context(|| format!("failed to update lesson {id}"))?;

    if json {
        return print_json(&json!({ "lesson": patched.record, "ignored": patched.ignored }));
    }
    println!("Updated lesson {id}: {}", patched.applied.join(", "));
    if !patched.ignored.is_empty() {
        println!("  ignored (read-only): {}", patched.ignored.join(", "));
    }
    Ok(())
}

fn remove_lesson(root: &Path, actor: &Actor, id: Id, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let dirty = db
        .update(|tx| content::remove_lesson(tx, actor, id))
        .with_context(|| format!("failed to remove lesson {id}"))?;
    let recomputed = settle(&db, &config, &dirty)?;

    if json {
        return print_json(&json!({ "id": id, "removed": true, "recomputed": recomputed }));
    }
    println!("Removed lesson {id}.");
    if recomputed > 0 {
        println!("  recomputed {recomputed} progress record(s)");
    }
    Ok(())
}

fn add_step(root: &Path, actor: &Actor, lesson_id: Id, new: NewStep, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let (step, dirty) = db
        .update(|tx| content::add_step(tx, actor, lesson_id, new))
        .with_context(|| format!("failed to add a step to lesson {lesson_id}"))?;
    let recomputed = settle(&db, &config, &dirty)?;

    if json {
        return print_json(&json!({ "step": step, "recomputed": recomputed }));
    }
    println!(
        "Added step {} '{}' to lesson {lesson_id} at position {}.",
        step.id, step.title, step.order
    );
    if recomputed > 0 {
        println!("  recomputed {recomputed} progress record(s)");
    }
    Ok(())
}

fn update_step(root: &Path, actor: &Actor, id: Id, set: &[String], json: bool) -> anyhow::Result<()> {
    let patch = parse_patch(set)?;
    let (_, db) = open(root)?;
    let patched = db
        .update(|tx| content::update_step(tx, actor, id, &patch))
        .with_context(|| format!("failed to update step {id}"))?;

    if json {
        return print_json(&json!({ "step": patched.record, "ignored": patched.ignored }));
    }
    println!("Updated step {id}: {}", patched.applied.join(", "));
    if !patched.ignored.is_empty() {
        println!("  ignored (read-only): {}", patched.ignored.join(", "));
    }
    Ok(())
}

fn remove_step(root: &Path, actor: &Actor, id: Id, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    let dirty = db
        .update(|tx| content::remove_step(tx, actor, id))
        .with_context(|| format!("failed to remove step {id}"))?;
    let recomputed = settle(&db, &config, &dirty)?;

    if json {
        return print_json(&json!({ "id": id, "removed": true, "recomputed": recomputed }));
    }
    println!("Removed step {id}.");
    Ok(())
}
