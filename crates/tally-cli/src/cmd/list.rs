use clap::Args;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tally_core::db::query::ItemFilter;
use tally_core::model::{ItemView, Quarter};

use crate::cmd::{ItemRecord, open_store, resolve_project, resolve_stage, write_item_line};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only items assigned to this person.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Only items in this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Only items in this stage (name or id).
    #[arg(long)]
    pub stage: Option<String>,

    /// Stored report year.
    #[arg(long)]
    pub year: Option<i32>,

    /// Stored report quarter (1-4 or Q1-Q4).
    #[arg(long)]
    pub quarter: Option<Quarter>,

    /// Only items that have been done at least once.
    #[arg(long, conflicts_with = "open")]
    pub done: bool,

    /// Only items never done (or reopened under the clear policy).
    #[arg(long)]
    pub open: bool,

    /// Maximum number of items.
    #[arg(long, short)]
    pub limit: Option<u32>,
}

/// Execute `tally list`.
///
/// Period flags match the stored period fields. Use `tally drill` to list
/// items by the period the KPI view reports them under.
///
/// # Errors
///
/// Returns an error if a named stage or project does not exist, or the
/// store query fails.
pub fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root)?;

    let filter = ItemFilter {
        assignee: args.assignee.clone(),
        project_id: match args.project {
            Some(ref name) => Some(resolve_project(&store, name)?.id),
            None => None,
        },
        stage_id: match args.stage {
            Some(ref name) => Some(resolve_stage(&store, name)?.id),
            None => None,
        },
        report_year: args.year,
        report_quarter: args.quarter,
        done: match (args.done, args.open) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        },
        limit: args.limit,
    };

    let items = store.list_items(&filter)?;
    let mut views: HashMap<String, ItemView> = store
        .item_views()?
        .into_iter()
        .map(|view| (view.item.id.clone(), view))
        .collect();
    let records: Vec<ItemRecord> = items
        .iter()
        .filter_map(|item| views.remove(&item.id))
        .map(|view| ItemRecord::new(&view, store.rules()))
        .collect();

    render_mode(output, &records, render_items_text, render_items_pretty)
}

/// Text rendering shared with `tally drill`.
pub fn render_items_text(items: &Vec<ItemRecord>, w: &mut dyn Write) -> std::io::Result<()> {
    for item in items {
        write_item_line(item, w)?;
    }
    Ok(())
}

/// Pretty rendering shared with `tally drill`.
pub fn render_items_pretty(items: &Vec<ItemRecord>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Items ({})", items.len()))?;
    for item in items {
        write_item_line(item, w)?;
    }
    Ok(())
}
