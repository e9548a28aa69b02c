use crate::output::{print_fields, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ignite_core::{
    content::{self, NewProject, Project},
    db::Reader,
    draft,
    types::{Actor, Id},
};
use serde_json::{json, Value};
use std::path::Path;

use super::{open, parse_patch, yes_no};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List live projects
    List,
    /// Show a project with its lessons and steps
    Show { id: Id },
    /// Create a project owned by the acting user
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Edit project fields while in edit mode (repeatable: --set title=Robots)
    Update {
        id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Soft delete a project
    Delete { id: Id },
    /// Take the edit lock of a project or project draft
    Lock { id: Id },
    /// Release the edit lock
    Unlock { id: Id },
}

pub fn run(root: &Path, actor: &Actor, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::List => list(root, json),
        ProjectSubcommand::Show { id } => show(root, id, json),
        ProjectSubcommand::Create { title, description } => create(root, actor, title, description, json),
        ProjectSubcommand::Update { id, set } => update(root, actor, id, &set, json),
        ProjectSubcommand::Delete { id } => delete(root, actor, id, json),
        ProjectSubcommand::Lock { id } => lock(root, actor, id, true, json),
        ProjectSubcommand::Unlock { id } => lock(root, actor, id, false, json),
    }
}

/// A project with its lessons and their steps nested in order.
pub fn project_tree(r: &impl Reader, project: &Project) -> ignite_core::Result<Value> {
    let mut lessons = Vec::new();
    for lesson in content::lessons_of(r, project.id)? {
        let mut entry = serde_json::to_value(&lesson)?;
        entry["steps"] = serde_json::to_value(content::steps_of(r, lesson.id)?)?;
        lessons.push(entry);
    }
    let mut tree = serde_json::to_value(project)?;
    tree["lessons"] = Value::Array(lessons);
    Ok(tree)
}

/// Text rendering of `project_tree` output.
pub fn print_tree(tree: &Value) {
    let text = |v: &Value| match v {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    print_fields(&[
        ("id", text(&tree["id"])),
        ("title", text(&tree["title"])),
        ("owner", text(&tree["owner"])),
        ("mode", text(&tree["publish_mode"])),
        ("editor", text(&tree["current_editor"])),
        ("published", text(&tree["publish_date"])),
    ]);
    let Some(lessons) = tree["lessons"].as_array() else {
        return;
    };
    for lesson in lessons {
        println!(
            "\n  [{}] {} ({}, {})",
            text(&lesson["id"]),
            text(&lesson["title"]),
            text(&lesson["application"]),
            text(&lesson["duration"]),
        );
        for step in lesson["steps"].as_array().into_iter().flatten() {
            println!("    {}. [{}] {}", text(&step["order"]), text(&step["id"]), text(&step["title"]));
        }
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let projects = db.view(|tx| content::list_projects(tx)).context("failed to list projects")?;

    if json {
        let items: Vec<Value> = projects
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "title": p.title,
                    "owner": p.owner,
                    "publish_mode": p.publish_mode,
                    "lesson_count": p.lesson_count,
                })
            })
            .collect();
        return print_json(&items);
    }

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.title.clone(),
                p.owner.to_string(),
                p.publish_mode.to_string(),
                p.lesson_count.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "OWNER", "MODE", "LESSONS"], rows);
    Ok(())
}

fn show(root: &Path, id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let tree = db
        .view(|tx| {
            let project = content::origin_project(tx, id)?;
            let mut tree = project_tree(tx, &project)?;
            tree["has_draft"] = json!(draft::draft_of::<Project>(tx, id)?.is_some());
            Ok(tree)
        })
        .with_context(|| format!("failed to load project {id}"))?;

    if json {
        return print_json(&tree);
    }
    print_tree(&tree);
    println!("\n  draft: {}", yes_no(tree["has_draft"] == true));
    Ok(())
}

fn create(root: &Path, actor: &Actor, title: String, description: String, json: bool) -> anyhow::Result<()> {
    if title.trim().is_empty() {
        anyhow::bail!("title must not be empty");
    }
    let (_, db) = open(root)?;
    let project = db
        .update(|tx| content::create_project(tx, actor, NewProject { title, description }))
        .context("failed to create project")?;

    if json {
        return print_json(&project);
    }
    println!("Created project {} '{}'.", project.id, project.title);
    Ok(())
}

fn update(root: &Path, actor: &Actor, id: Id, set: &[String], json: bool) -> anyhow::Result<()> {
    let patch = parse_patch(set)?;
    let (_, db) = open(root)?;
    let patched = db
        .update(|tx| content::update_project(tx, actor, id, &patch))
        .with_context(|| format!("failed to update project {id}"))?;

    if json {
        return print_json(&json!({ "project": patched.record, "ignored": patched.ignored }));
    }
    println!("Updated project {id}: {}", patched.applied.join(", "));
    if !patched.ignored.is_empty() {
        println!("  ignored (read-only): {}", patched.ignored.join(", "));
    }
    Ok(())
}

fn delete(root: &Path, actor: &Actor, id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    db.update(|tx| content::delete_project(tx, actor, id))
        .with_context(|| format!("failed to delete project {id}"))?;

    if json {
        return print_json(&json!({ "id": id, "deleted": true }));
    }
    println!("Deleted project {id}.");
    Ok(())
}

fn lock(root: &Path, actor: &Actor, id: Id, take: bool, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let project = db
        .update(|tx| content::set_edit_lock(tx, actor, id, take))
        .with_context(|| format!("failed to change the edit lock of project {id}"))?;

    if json {
        return print_json(&json!({ "id": project.id, "current_editor": project.current_editor }));
    }
    match project.current_editor {
        Some(user) => println!("Project {id} locked by user {user}."),
        None => println!("Project {id} unlocked."),
    }
    Ok(())
}
