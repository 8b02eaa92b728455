use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use tally_core::Store;
use tally_core::config::{TALLY_DIR, config_path, db_path, default_config_toml, load_project_config};

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.tally/` already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    path: String,
    config: String,
    database: String,
}

/// Execute `tally init`. Creates the project skeleton:
///
/// ```text
/// .tally/
///   config.toml   (default project config)
///   tally.db      (migrated SQLite store)
/// ```
///
/// An existing store is kept; `--force` only rewrites the config.
///
/// # Errors
///
/// Returns an error if `.tally/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let tally_dir = project_root.join(TALLY_DIR);

    if tally_dir.exists() && !args.force {
        anyhow::bail!(
            "{TALLY_DIR}/ already exists. Use `tally init --force` to rewrite its config."
        );
    }

    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("create {}", tally_dir.display()))?;

    let config_file = config_path(project_root);
    std::fs::write(&config_file, default_config_toml()?)
        .with_context(|| format!("write {}", config_file.display()))?;

    let config = load_project_config(project_root)?;
    let database = db_path(project_root);
    Store::open(&database, &config)?;
    tracing::info!(path = %tally_dir.display(), "initialized tally project");

    let result = InitOutput {
        path: tally_dir.display().to_string(),
        config: config_file.display().to_string(),
        database: database.display().to_string(),
    };
    render(output, &result, |r, w| {
        writeln!(w, "Initialized tally project in {}", r.path)?;
        pretty_kv(w, "config", &r.config)?;
        pretty_kv(w, "database", &r.database)
    })
}
