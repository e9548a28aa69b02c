//! Shadow drafts of published content.
//!
//! A draft is a full copy of a project, lesson or step whose `draft_origin`
//! points back at the row it was copied from. Editors change the draft while
//! the origin stays live; applying copies the whitelisted data fields back.
//! Drafts are always created and discarded per project: creating any draft
//! creates the whole project tree, and only the project draft can be
//! discarded.
//!
//! `fields` holds the field-level primitives (diff, copy, patch) and `ops`
//! the transactional operations over the content tree.

pub mod fields;
pub mod ops;

use chrono::{DateTime, Utc};

use crate::db::Record;
use crate::types::{EntityKind, Id};

pub use fields::{Fields, Patched};
pub use ops::{
    draft_apply, draft_diff_fields, draft_diff_tree, draft_diff_values, draft_discard,
    draft_get, draft_of, draft_save, draft_update, lesson_draft_get_or_create, project_of,
    project_draft_get_or_create, step_draft_get_or_create, AppliedChange, ApplyReport, DiffTree,
    LessonDiff, StepDiff,
};

/// A record type that can have a draft.
pub trait Draftable: Record + Clone {
    const KIND: EntityKind;

    /// Fields a draft may change that are copied back to the origin on apply.
    const DATA_FIELDS: &'static [&'static str];

    /// Fields a draft may change for its own bookkeeping; never applied.
    const META_FIELDS: &'static [&'static str] = &[];

    /// Fields that may be set when the draft is created and are fixed after.
    const CREATE_FIELDS: &'static [&'static str] = &[];

    fn draft_origin(&self) -> Option<Id>;
    fn set_draft_origin(&mut self, origin: Option<Id>);
    fn title(&self) -> &str;
    fn is_deleted(&self) -> bool;
    fn touch(&mut self, now: DateTime<Utc>);

    fn is_draft(&self) -> bool {
        self.draft_origin().is_some()
    }

    /// Fields a stored draft accepts on save.
    fn writable_fields() -> Vec<&'static str> {
        Self::DATA_FIELDS
            .iter()
            .chain(Self::META_FIELDS)
            .copied()
            .collect()
    }
}
