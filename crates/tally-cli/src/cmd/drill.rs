//! `tally drill` — list the items behind one count of a KPI row.

use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tally_core::drilldown::{DrillAction, Metric};
use tally_core::kpi::KpiKey;
use tally_core::model::Quarter;

use crate::cmd::list::{render_items_pretty, render_items_text};
use crate::cmd::{ItemRecord, open_store};
use crate::output::{OutputMode, pretty_kv, render_mode};

/// The row is addressed by its grouping key: an omitted flag selects the
/// row whose component is undefined (unassigned, no project, and so on).
#[derive(Args, Debug)]
pub struct DrillArgs {
    /// Assignee of the row. Omit for the unassigned row.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Project of the row. Omit for the row without a project.
    #[arg(long)]
    pub project: Option<String>,

    /// Report year of the row. Omit for the row without a year.
    #[arg(long)]
    pub year: Option<i32>,

    /// Report quarter of the row (1-4 or Q1-Q4). Omit for archive rows.
    #[arg(long)]
    pub quarter: Option<Quarter>,

    /// Count to drill into: backlog, todo, in_progress, done, total.
    #[arg(long, short, default_value = "total")]
    pub metric: Metric,
}

impl DrillArgs {
    fn key(&self) -> KpiKey {
        KpiKey {
            assignee: self.assignee.clone(),
            project: self.project.clone(),
            year: self.year,
            quarter: self.quarter,
        }
    }
}

#[derive(Debug, Serialize)]
struct DrillOutput {
    action: DrillAction,
    items: Vec<ItemRecord>,
}

/// Execute `tally drill`.
///
/// Builds the drill-down action for the row and evaluates its filter
/// against the current items.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the store query
/// fails.
pub fn run_drill(args: &DrillArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root)?;
    let action = store.drill(&args.key(), Some(args.metric));
    let items = store
        .find_items(&action.filter)?
        .iter()
        .map(|view| ItemRecord::new(view, store.rules()))
        .collect();

    render_mode(
        output,
        &DrillOutput { action, items },
        |out, w| render_items_text(&out.items, w),
        render_drill_pretty,
    )
}

fn render_drill_pretty(out: &DrillOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_kv(w, "view", &out.action.name)?;
    pretty_kv(w, "filter", out.action.filter.to_string())?;
    writeln!(w)?;
    render_items_pretty(&out.items, w)
}
