pub mod draft;
pub mod init;
pub mod lesson;
pub mod mode;
pub mod project;
pub mod serve;
pub mod state;

use std::path::Path;

use anyhow::{bail, Context};
use ignite_core::config::Config;
use ignite_core::content::Dirty;
use ignite_core::db::ContentDb;
use ignite_core::draft::Fields;
use serde_json::Value;

/// Load the config and open the database of an initialized root.
pub fn open(root: &Path) -> anyhow::Result<(Config, ContentDb)> {
    let config = Config::load(root).context("failed to load config (run `ignite init` first)")?;
    let db = ContentDb::open_root(root).context("failed to open the content database")?;
    Ok((config, db))
}

/// Recompute dirty lesson and project states right away. The server defers
/// this to its background worker.
pub fn settle(db: &ContentDb, config: &Config, dirty: &Dirty) -> anyhow::Result<usize> {
    if dirty.lesson_states.is_empty() && dirty.project_states.is_empty() {
        return Ok(0);
    }
    let n = db
        .update(|tx| ignite_core::progress::recompute_dirty(tx, &config.progress, dirty))
        .context("failed to recompute progress")?;
    tracing::debug!(recomputed = n, "progress recomputed");
    Ok(n)
}

/// Build a patch from `key=value` pairs. Values that parse as JSON are kept
/// as JSON; anything else is a string.
pub fn parse_patch(pairs: &[String]) -> anyhow::Result<Fields> {
    let mut patch = Fields::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected key=value, got '{pair}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("empty key in '{pair}'");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        patch.insert(key.to_string(), value);
    }
    Ok(patch)
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_values_are_json_when_they_parse() {
        let patch = parse_patch(&[
            "title=Robots".to_string(),
            "duration=45".to_string(),
            "tags=[\"stem\"]".to_string(),
        ])
        .unwrap();
        assert_eq!(patch["title"], "Robots");
        assert_eq!(patch["duration"], 45);
        assert_eq!(patch["tags"][0], "stem");
    }

    #[test]
    fn patch_rejects_missing_equals() {
        assert!(parse_patch(&["title".to_string()]).is_err());
        assert!(parse_patch(&["=x".to_string()]).is_err());
    }
}
