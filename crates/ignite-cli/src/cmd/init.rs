use anyhow::Context;
use ignite_core::{config::Config, db::ContentDb, io, paths};
use std::path::Path;

const GITIGNORE: &str = "ignite.db\n";

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ignite".to_string())
    });

    println!("Initializing Ignite in: {}", root.display());

    let dir = paths::ignite_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let db_existed = paths::db_path(root).exists();
    ContentDb::open_root(root).context("failed to create the content database")?;
    if db_existed {
        println!("  exists:  {}", paths::DB_FILE);
    } else {
        println!("  created: {}", paths::DB_FILE);
    }

    if io::write_if_missing(&dir.join(".gitignore"), GITIGNORE.as_bytes())
        .context("failed to write .ignite/.gitignore")?
    {
        println!("  created: {}/.gitignore", paths::IGNITE_DIR);
    }

    println!("\nIgnite initialized. Next: ignite project create \"<title>\"");
    Ok(())
}
