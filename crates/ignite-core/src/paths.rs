use std::path::{Path, PathBuf};

pub const IGNITE_DIR: &str = ".ignite";
pub const CONFIG_FILE: &str = ".ignite/config.yaml";
pub const DB_FILE: &str = ".ignite/ignite.db";

pub fn ignite_dir(root: &Path) -> PathBuf {
    root.join(IGNITE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}
