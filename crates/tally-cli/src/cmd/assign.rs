//! `tally assign` / `tally unassign` — edit an item's assignees.

use clap::Args;
use std::path::Path;
use tally_core::WriteMode;
use tally_core::model::ItemUpdate;

use crate::cmd::{item_record, open_store, write_item_line};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Item ID.
    pub id: String,

    /// One or more assignees.
    #[arg(required = true)]
    pub assignees: Vec<String>,
}

/// Execute `tally assign`.
///
/// # Errors
///
/// Returns an error if the item does not exist or the store write fails.
pub fn run_assign(
    args: &AssignArgs,
    actor: &str,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let update = ItemUpdate {
        assign: args.assignees.clone(),
        ..ItemUpdate::default()
    };
    apply(&args.id, update, actor, output, project_root)
}

/// Execute `tally unassign`.
///
/// # Errors
///
/// Returns an error if the item does not exist or the store write fails.
pub fn run_unassign(
    args: &AssignArgs,
    actor: &str,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let update = ItemUpdate {
        unassign: args.assignees.clone(),
        ..ItemUpdate::default()
    };
    apply(&args.id, update, actor, output, project_root)
}

fn apply(
    item_id: &str,
    update: ItemUpdate,
    actor: &str,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(project_root)?;
    let item = store.update_item(item_id, update, &WriteMode::user(actor))?;
    let record = item_record(&store, &item.id)?;
    render_mode(output, &record, write_item_line, |r, w| {
        let assignees = if r.assignees.is_empty() {
            "nobody".to_string()
        } else {
            r.assignees.join(", ")
        };
        writeln!(w, "{} assigned to {assignees}", r.id)
    })
}
