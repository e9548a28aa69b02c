use crate::error::{IgniteError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Lesson states recomputed per batch by the background worker.
    #[serde(default = "default_recompute_batch")]
    pub recompute_batch: usize,
}

fn default_port() -> u16 {
    8341
}

fn default_recompute_batch() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            recompute_batch: default_recompute_batch(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Lesson applications that have no steps; their lesson states are
    /// complete as soon as they are created.
    #[serde(default = "default_stepless")]
    pub stepless_applications: Vec<String>,
}

fn default_stepless() -> Vec<String> {
    vec!["instructables".to_string(), "video".to_string()]
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            stepless_applications: default_stepless(),
        }
    }
}

impl ProgressConfig {
    pub fn is_stepless(&self, application: &str) -> bool {
        self.stepless_applications
            .iter()
            .any(|a| a.eq_ignore_ascii_case(application))
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            server: ServerConfig::default(),
            progress: ProgressConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(IgniteError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(IgniteError::NotInitialized)
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("ignite-test");
        cfg.server.port = 9000;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "ignite-test");
        assert_eq!(loaded.server.port, 9000);
        assert!(loaded.progress.is_stepless("video"));
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("project:\n  name: x\n").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.server.port, 8341);
        assert_eq!(
            cfg.progress.stepless_applications,
            vec!["instructables".to_string(), "video".to_string()]
        );
    }

    #[test]
    fn stepless_match_ignores_case() {
        let cfg = ProgressConfig::default();
        assert!(cfg.is_stepless("Video"));
        assert!(!cfg.is_stepless("tinkercad"));
    }
}
