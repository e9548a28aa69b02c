use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use ignite_core::{
    config::Config,
    content::{self, Project},
    db::ContentDb,
    draft,
    publish::{self, ModeChange},
    types::{Actor, Id, PublishMode},
    IgniteError,
};
use std::path::Path;

use super::open;

#[derive(Subcommand)]
pub enum ModeSubcommand {
    /// Move a project to edit, review, ready or published
    Set {
        project_id: Id,
        mode: PublishMode,
        /// Earliest publish time (RFC 3339); the project waits in ready until then
        #[arg(long, value_name = "DATE")]
        min_publish_date: Option<DateTime<Utc>>,
    },
    /// Move the draft of a project; publishing applies and discards it
    Draft { project_id: Id, mode: PublishMode },
    /// Publish ready projects whose minimum publish date has passed
    Due,
}

pub fn run(root: &Path, actor: &Actor, subcmd: ModeSubcommand, json: bool) -> anyhow::Result<()> {
    let (config, db) = open(root)?;
    match subcmd {
        ModeSubcommand::Set {
            project_id,
            mode,
            min_publish_date,
        } => set(&db, &config, actor, project_id, mode, min_publish_date, json),
        ModeSubcommand::Draft { project_id, mode } => set_draft(&db, &config, actor, project_id, mode, json),
        ModeSubcommand::Due => due(&db, actor, json),
    }
}

fn report(change: &ModeChange, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(change);
    }
    let target = match change.draft_id {
        Some(draft_id) => format!("Draft {draft_id} of project {}", change.project_id),
        None => format!("Project {}", change.project_id),
    };
    if !change.changed {
        println!("{target} is already in {} mode.", change.to);
        return Ok(());
    }
    println!("{target}: {} → {}", change.from, change.to);
    if let Some(applied) = &change.applied {
        println!("  applied {} change(s) to the live project", applied.written());
    }
    if let Some(date) = change.publish_date {
        println!("  published at {}", date.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

/// Map a failed publish check to a readable list of problems.
fn explain(e: IgniteError) -> anyhow::Error {
    match e {
        IgniteError::PublishCheck(issues) => {
            let lines: Vec<String> = issues.iter().map(|i| format!("  {}: {}", i.path, i.message)).collect();
            anyhow::anyhow!("project is not ready to publish:\n{}", lines.join("\n"))
        }
        other => other.into(),
    }
}

fn set(
    db: &ContentDb,
    config: &Config,
    actor: &Actor,
    project_id: Id,
    mode: PublishMode,
    min_publish_date: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let change = db
        .update(|tx| {
            content::origin_project(tx, project_id)?;
            publish::change_mode(tx, &config.progress, project_id, mode, min_publish_date, actor, Utc::now())
        })
        .map_err(explain)
        .with_context(|| format!("failed to move project {project_id} to {mode}"))?;
    report(&change, json)
}

fn set_draft(
    db: &ContentDb,
    config: &Config,
    actor: &Actor,
    project_id: Id,
    mode: PublishMode,
    json: bool,
) -> anyhow::Result<()> {
    let change = db
        .update(|tx| {
            content::origin_project(tx, project_id)?;
            let draft = draft::draft_of::<Project>(tx, project_id)?.ok_or(IgniteError::DraftNotFound {
                kind: "project",
                id: project_id,
            })?;
            publish::change_mode(tx, &config.progress, draft.id, mode, None, actor, Utc::now())
        })
        .map_err(explain)
        .with_context(|| format!("failed to move the draft of project {project_id} to {mode}"))?;
    report(&change, json)
}

fn due(db: &ContentDb, actor: &Actor, json: bool) -> anyhow::Result<()> {
    if !actor.is_superuser {
        bail!("only reviewers can publish due projects (pass --superuser)");
    }
    let changes = db
        .update(|tx| publish::publish_due(tx, Utc::now()))
        .context("failed to publish due projects")?;

    if json {
        return print_json(&changes);
    }
    if changes.is_empty() {
        println!("No projects are due.");
        return Ok(());
    }
    let rows = changes
        .iter()
        .map(|c| {
            vec![
                c.project_id.to_string(),
                c.from.to_string(),
                c.to.to_string(),
            ]
        })
        .collect();
    print_table(&["PROJECT", "FROM", "TO"], rows);
    Ok(())
}
