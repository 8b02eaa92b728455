//! `tally move` — move a work item to another stage.

use clap::Args;
use std::path::Path;
use tally_core::WriteMode;
use tally_core::model::ItemUpdate;

use crate::cmd::{item_record, open_store, resolve_stage, write_item_line, write_item_summary};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Item ID to move.
    pub id: String,

    /// Target stage (name or id).
    #[arg(required_unless_present = "unstage")]
    pub stage: Option<String>,

    /// Clear the stage reference instead.
    #[arg(long, conflicts_with = "stage")]
    pub unstage: bool,
}

/// Execute `tally move`.
///
/// The first move into a closed stage stamps the item's done time and
/// report period; moving it back out follows the configured reopen policy.
///
/// # Errors
///
/// Returns an error if the item or stage does not exist, or the store
/// write fails.
pub fn run_move(
    args: &MoveArgs,
    actor: &str,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(project_root)?;

    let stage_id = match args.stage {
        Some(ref name) if !args.unstage => Some(resolve_stage(&store, name)?.id),
        _ => None,
    };

    let item = store.update_item(
        &args.id,
        ItemUpdate::stage(stage_id),
        &WriteMode::user(actor),
    )?;
    let record = item_record(&store, &item.id)?;
    render_mode(output, &record, write_item_line, |r, w| {
        write_item_summary(w, "Moved", r)
    })
}
