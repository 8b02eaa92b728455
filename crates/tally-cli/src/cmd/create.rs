use clap::Args;
use std::path::Path;
use tally_core::WriteMode;
use tally_core::model::NewItem;

use crate::cmd::{item_record, open_store, resolve_project, resolve_stage, write_item_line, write_item_summary};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Item title.
    #[arg(long, short)]
    pub title: String,

    /// Initial stage (name or id). An item created in a closed stage is done
    /// as of its creation.
    #[arg(long, short)]
    pub stage: Option<String>,

    /// Project name.
    #[arg(long, short)]
    pub project: Option<String>,

    /// Assignee. Repeat for several.
    #[arg(long = "assign", short = 'a')]
    pub assignees: Vec<String>,
}

/// Execute `tally create`.
///
/// # Errors
///
/// Returns an error if a named stage or project does not exist, or the
/// store write fails.
pub fn run_create(
    args: &CreateArgs,
    actor: &str,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(project_root)?;

    let mut new = NewItem::titled(args.title.trim());
    if let Some(ref name) = args.stage {
        new = new.in_stage(resolve_stage(&store, name)?.id);
    }
    if let Some(ref name) = args.project {
        new = new.in_project(resolve_project(&store, name)?.id);
    }
    for assignee in &args.assignees {
        new = new.assigned_to(assignee.as_str());
    }

    let item = store.create_item(new, &WriteMode::user(actor))?;
    let record = item_record(&store, &item.id)?;
    render_mode(output, &record, write_item_line, |r, w| {
        write_item_summary(w, "Created", r)
    })
}
