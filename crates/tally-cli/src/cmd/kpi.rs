//! `tally kpi` — per assignee/project/period KPI rows.

use clap::Args;
use std::io::Write;
use std::path::Path;
use tally_core::kpi::{KpiQuery, KpiRow};
use tally_core::model::Quarter;

use crate::cmd::open_store;
use crate::output::{OutputMode, or_unset, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct KpiArgs {
    /// Only rows for this assignee.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Only rows for this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Only rows for this report year.
    #[arg(long)]
    pub year: Option<i32>,

    /// Only rows for this report quarter (1-4 or Q1-Q4).
    #[arg(long)]
    pub quarter: Option<Quarter>,
}

impl KpiArgs {
    fn query(&self) -> KpiQuery {
        KpiQuery {
            assignee: self.assignee.clone(),
            project: self.project.clone(),
            year: self.year,
            quarter: self.quarter,
        }
    }
}

/// Execute `tally kpi`. Rows are recomputed from the current items on
/// every run.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the store query
/// fails.
pub fn run_kpi(args: &KpiArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root)?;
    let rows = store.kpi_rows(&args.query())?;
    render_mode(output, &rows, render_kpi_text, render_kpi_pretty)
}

fn render_kpi_text(rows: &Vec<KpiRow>, w: &mut dyn Write) -> std::io::Result<()> {
    for row in rows {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
            or_unset(row.key.assignee.as_deref()),
            or_unset(row.key.project.as_deref()),
            or_unset(row.key.year),
            or_unset(row.key.quarter),
            row.backlog_count,
            row.todo_count,
            row.inprogress_count,
            row.done_count,
            row.total_count,
            row.done_pct
        )?;
    }
    Ok(())
}

fn render_kpi_pretty(rows: &Vec<KpiRow>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("KPI ({} rows)", rows.len()))?;
    writeln!(
        w,
        "{:<14} {:<14} {:>4} {:>2} {:>7} {:>5} {:>5} {:>5} {:>5} {:>7}",
        "ASSIGNEE", "PROJECT", "YEAR", "Q", "BACKLOG", "TODO", "WIP", "DONE", "TOTAL", "DONE%"
    )?;
    for row in rows {
        writeln!(
            w,
            "{:<14} {:<14} {:>4} {:>2} {:>7} {:>5} {:>5} {:>5} {:>5} {:>7.2}",
            truncate(&or_unset(row.key.assignee.as_deref()), 14),
            truncate(&or_unset(row.key.project.as_deref()), 14),
            or_unset(row.key.year),
            or_unset(row.key.quarter.map(Quarter::number)),
            row.backlog_count,
            row.todo_count,
            row.inprogress_count,
            row.done_count,
            row.total_count,
            row.done_pct
        )?;
    }
    if !rows.is_empty() {
        pretty_rule(w)?;
    }
    Ok(())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
