use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use ignite_core::{
    content::{self, Lesson, Project, Step},
    db::{Reader, WriteTx},
    draft::{self, DiffTree, Draftable, Fields},
    publish,
    types::{Actor, EntityRef, Id},
    IgniteError,
};
use serde_json::{json, Value};
use std::path::Path;

use super::{open, parse_patch};
use crate::cmd::project::{print_tree, project_tree};

#[derive(Subcommand)]
pub enum DraftSubcommand {
    /// Show the draft of a project
    Show { project_id: Id },
    /// Create the draft of a published project (or return the existing one)
    Open { project_id: Id },
    /// Edit project fields in the draft (repeatable: --set title=Robots)
    Update {
        project_id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Edit the draft of a lesson
    UpdateLesson {
        lesson_id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Edit the draft of a step
    UpdateStep {
        step_id: Id,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Show which fields the draft changes
    Diff { project_id: Id },
    /// Throw the draft away
    Discard { project_id: Id },
}

pub fn run(root: &Path, actor: &Actor, subcmd: DraftSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        DraftSubcommand::Show { project_id } => show(root, project_id, json),
        DraftSubcommand::Open { project_id } => open_draft(root, actor, project_id, json),
        DraftSubcommand::Update { project_id, set } => {
            edit(root, actor, EntityRef::Project(project_id), &set, json)
        }
        DraftSubcommand::UpdateLesson { lesson_id, set } => {
            edit(root, actor, EntityRef::Lesson(lesson_id), &set, json)
        }
        DraftSubcommand::UpdateStep { step_id, set } => edit(root, actor, EntityRef::Step(step_id), &set, json),
        DraftSubcommand::Diff { project_id } => diff(root, project_id, json),
        DraftSubcommand::Discard { project_id } => discard(root, actor, project_id, json),
    }
}

fn no_draft(id: Id) -> IgniteError {
    IgniteError::DraftNotFound { kind: "project", id }
}

fn show(root: &Path, project_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let tree = db
        .view(|tx| {
            content::origin_project(tx, project_id)?;
            let draft = draft::draft_of::<Project>(tx, project_id)?.ok_or(no_draft(project_id))?;
            project_tree(tx, &draft)
        })
        .with_context(|| format!("failed to load the draft of project {project_id}"))?;

    if json {
        return print_json(&tree);
    }
    print_tree(&tree);
    Ok(())
}

fn open_draft(root: &Path, actor: &Actor, project_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let (draft, created) = db
        .update(|tx| publish::open_draft(tx, actor, project_id))
        .with_context(|| format!("failed to open a draft of project {project_id}"))?;

    if json {
        return print_json(&json!({ "draft": draft, "created": created }));
    }
    if created {
        println!("Created draft {} of project {project_id}.", draft.id);
    } else {
        println!("Project {project_id} already has draft {}.", draft.id);
    }
    Ok(())
}

/// Reject ids that are themselves drafts; edits address the origin.
fn require_origin<T: Draftable>(r: &impl Reader, id: Id) -> ignite_core::Result<()> {
    let record: T = r.fetch(id)?;
    if record.draft_origin().is_some() {
        return Err(IgniteError::IsDraft {
            kind: T::KIND.as_str(),
            id,
        });
    }
    Ok(())
}

fn save<T: Draftable>(tx: &WriteTx, actor: &Actor, id: Id, patch: &Fields) -> ignite_core::Result<(Value, Vec<String>)> {
    let saved = draft::draft_update::<T>(tx, actor, id, patch)?;
    Ok((serde_json::to_value(&saved.record)?, saved.ignored))
}

fn edit(root: &Path, actor: &Actor, entity: EntityRef, set: &[String], json: bool) -> anyhow::Result<()> {
    let patch = parse_patch(set)?;
    let (_, db) = open(root)?;
    let (draft, ignored, origin_diff) = db
        .update(|tx| {
            let project = draft::project_of(tx, entity)?;
            if project.is_draft() {
                return Err(IgniteError::IsDraft {
                    kind: "project",
                    id: project.id,
                });
            }
            publish::open_draft(tx, actor, project.id)?;
            let (draft, ignored) = match entity {
                EntityRef::Project(id) => save::<Project>(tx, actor, id, &patch)?,
                EntityRef::Lesson(id) => {
                    require_origin::<Lesson>(tx, id)?;
                    draft::lesson_draft_get_or_create(tx, id)?;
                    save::<Lesson>(tx, actor, id, &patch)?
                }
                EntityRef::Step(id) => {
                    require_origin::<Step>(tx, id)?;
                    draft::step_draft_get_or_create(tx, id)?;
                    save::<Step>(tx, actor, id, &patch)?
                }
            };
            let origin_diff = draft::draft_diff_values(tx, project.id)?.unwrap_or_default();
            Ok((draft, ignored, origin_diff))
        })
        .with_context(|| format!("failed to edit the draft of {entity}"))?;

    if json {
        return print_json(&json!({
            "draft": draft,
            "ignored": ignored,
            "origin": { "diff": origin_diff },
        }));
    }
    println!("Saved draft {} of {entity}.", draft["id"]);
    if !ignored.is_empty() {
        println!("  ignored (read-only): {}", ignored.join(", "));
    }
    for (field, value) in &origin_diff {
        println!("  {field}: was {value}");
    }
    Ok(())
}

fn diff_rows(tree: &DiffTree) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    if !tree.diff_fields.is_empty() {
        rows.push(vec![format!("project {}", tree.id), tree.diff_fields.join(", ")]);
    }
    for lesson in &tree.lessons {
        if !lesson.diff_fields.is_empty() {
            rows.push(vec![format!("lesson {}", lesson.id), lesson.diff_fields.join(", ")]);
        }
        for step in &lesson.steps {
            if !step.diff_fields.is_empty() {
                rows.push(vec![format!("step {}", step.id), step.diff_fields.join(", ")]);
            }
        }
    }
    rows
}

fn diff(root: &Path, project_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let tree = db
        .view(|tx| {
            content::origin_project(tx, project_id)?;
            draft::draft_diff_tree(tx, project_id)?.ok_or(no_draft(project_id))
        })
        .with_context(|| format!("failed to diff the draft of project {project_id}"))?;

    if json {
        return print_json(&json!({ "tree": tree, "has_changes": tree.has_changes() }));
    }
    let rows = diff_rows(&tree);
    if rows.is_empty() {
        println!("Draft {} has no changes.", tree.draft_id);
        return Ok(());
    }
    print_table(&["ENTITY", "CHANGED FIELDS"], rows);
    Ok(())
}

fn discard(root: &Path, actor: &Actor, project_id: Id, json: bool) -> anyhow::Result<()> {
    let (_, db) = open(root)?;
    let project = db
        .view(|tx| content::origin_project(tx, project_id))
        .with_context(|| format!("failed to load project {project_id}"))?;
    if !publish::is_editor(&project, actor) {
        bail!("user {} cannot discard the draft of project {project_id}", actor.user);
    }
    let removed = db
        .update(|tx| draft::draft_discard(tx, EntityRef::Project(project_id)))
        .with_context(|| format!("failed to discard the draft of project {project_id}"))?;
    if !removed {
        return Err(no_draft(project_id)).context("nothing to discard");
    }

    if json {
        return print_json(&json!({ "project_id": project_id, "discarded": true }));
    }
    println!("Discarded the draft of project {project_id}.");
    Ok(())
}
