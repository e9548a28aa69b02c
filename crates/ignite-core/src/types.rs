use serde::{Deserialize, Serialize};
use std::fmt;

pub type Id = u64;

// ---------------------------------------------------------------------------
// PublishMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    Edit,
    Review,
    Ready,
    Published,
}

impl PublishMode {
    pub fn all() -> &'static [PublishMode] {
        &[
            PublishMode::Edit,
            PublishMode::Review,
            PublishMode::Ready,
            PublishMode::Published,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PublishMode::Edit => "edit",
            PublishMode::Review => "review",
            PublishMode::Ready => "ready",
            PublishMode::Published => "published",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PublishMode::Edit => "In Edit",
            PublishMode::Review => "In Review",
            PublishMode::Ready => "Ready For Publish",
            PublishMode::Published => "Published",
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PublishMode {
    type Err = crate::error::IgniteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(PublishMode::Edit),
            "review" => Ok(PublishMode::Review),
            "ready" => Ok(PublishMode::Ready),
            "published" => Ok(PublishMode::Published),
            _ => Err(crate::error::IgniteError::InvalidPublishMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityKind / EntityRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Lesson,
    Step,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Lesson => "lesson",
            EntityKind::Step => "step",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to one draft-capable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Project(Id),
    Lesson(Id),
    Step(Id),
}

impl EntityRef {
    pub fn kind(self) -> EntityKind {
        match self {
            EntityRef::Project(_) => EntityKind::Project,
            EntityRef::Lesson(_) => EntityKind::Lesson,
            EntityRef::Step(_) => EntityKind::Step,
        }
    }

    pub fn id(self) -> Id {
        match self {
            EntityRef::Project(id) | EntityRef::Lesson(id) | EntityRef::Step(id) => id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The user on whose behalf an operation runs. Identity is asserted by the
/// caller; nothing here verifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user: Id,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Actor {
    pub fn user(user: Id) -> Self {
        Self {
            user,
            is_superuser: false,
        }
    }

    pub fn superuser(user: Id) -> Self {
        Self {
            user,
            is_superuser: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_mode_round_trips_through_str() {
        for &mode in PublishMode::all() {
            let parsed: PublishMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("draft".parse::<PublishMode>().is_err());
    }

    #[test]
    fn publish_modes_are_ordered() {
        assert!(PublishMode::Edit < PublishMode::Review);
        assert!(PublishMode::Ready < PublishMode::Published);
    }

    #[test]
    fn entity_ref_serializes_tagged() {
        let json = serde_json::to_value(EntityRef::Lesson(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "lesson", "id": 7 }));
        assert_eq!(EntityRef::Step(3).to_string(), "step 3");
    }
}
