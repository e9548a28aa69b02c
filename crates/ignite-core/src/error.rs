use thiserror::Error;

use crate::publish::PublishIssue;

#[derive(Debug, Error)]
pub enum IgniteError {
    #[error("not initialized: run 'ignite init'")]
    NotInitialized,

    #[error("project not found: {0}")]
    ProjectNotFound(u64),

    #[error("lesson not found: {0}")]
    LessonNotFound(u64),

    #[error("step not found: {0}")]
    StepNotFound(u64),

    #[error("state not found: {kind} {id}")]
    StateNotFound { kind: &'static str, id: u64 },

    #[error("no draft for {kind} {id}")]
    DraftNotFound { kind: &'static str, id: u64 },

    #[error("draft cannot be created for project {0}: only published origin projects without a draft")]
    DraftNotAllowed(u64),

    #[error("{kind} {id} is a draft; use its origin")]
    IsDraft { kind: &'static str, id: u64 },

    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid publish mode: {0}")]
    InvalidPublishMode(String),

    #[error("forbidden to move the project from '{from}' mode to '{to}' mode")]
    InvalidModeTransition { from: String, to: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("project {project} is in '{mode}' mode; content can be changed only in 'edit' mode")]
    NotEditable { project: u64, mode: String },

    #[error("{kind} {id} does not belong to {parent}")]
    Mismatch {
        kind: &'static str,
        id: u64,
        parent: String,
    },

    #[error("project is not ready to publish: {}", summarize_issues(.0))]
    PublishCheck(Vec<PublishIssue>),

    #[error("database error: {0}")]
    Db(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn summarize_issues(issues: &[PublishIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map any storage-layer error into `IgniteError::Db`.
pub(crate) fn db_err(e: impl std::fmt::Display) -> IgniteError {
    IgniteError::Db(e.to_string())
}

pub type Result<T> = std::result::Result<T, IgniteError>;
