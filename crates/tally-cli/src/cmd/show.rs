use chrono::DateTime;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tally_core::db::query::ItemChange;

use crate::cmd::{ItemRecord, item_record, open_store};
use crate::output::{OutputMode, or_unset, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Item ID.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ShowItem {
    #[serde(flatten)]
    item: ItemRecord,
    changes: Vec<ItemChange>,
}

/// Execute `tally show <id>`.
///
/// # Errors
///
/// Returns [`tally_core::error::TallyError::ItemNotFound`] for an unknown
/// id, or an error if the store query fails.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root)?;
    let item = item_record(&store, args.id.trim())?;
    let changes = store.item_changes(&item.id)?;

    render_mode(
        output,
        &ShowItem { item, changes },
        render_show_text,
        render_show_pretty,
    )
}

fn render_show_pretty(show: &ShowItem, w: &mut dyn Write) -> std::io::Result<()> {
    let item = &show.item;
    pretty_section(w, &format!("Item {}", item.id))?;
    writeln!(w, "{}", item.title)?;
    pretty_rule(w)?;
    pretty_kv(w, "stage", or_unset(item.stage.as_deref()))?;
    pretty_kv(w, "bucket", or_unset(item.bucket))?;
    pretty_kv(w, "project", or_unset(item.project.as_deref()))?;
    if !item.assignees.is_empty() {
        pretty_kv(w, "assigned", item.assignees.join(", "))?;
    }
    pretty_kv(w, "created", item.created_at.format("%Y-%m-%d %H:%M").to_string())?;
    pretty_kv(
        w,
        "done",
        or_unset(item.done_at.map(|at| at.format("%Y-%m-%d %H:%M").to_string())),
    )?;
    pretty_kv(
        w,
        "stored",
        format!(
            "{} {}",
            or_unset(item.report_year),
            or_unset(item.report_quarter)
        ),
    )?;
    pretty_kv(
        w,
        "reported",
        format!(
            "{} {}",
            or_unset(item.effective_year),
            or_unset(item.effective_quarter)
        ),
    )?;

    if !show.changes.is_empty() {
        writeln!(w)?;
        pretty_section(w, &format!("Changes ({})", show.changes.len()))?;
        for change in &show.changes {
            writeln!(
                w,
                "[{}] {}: {} {} -> {}",
                change.changed_at.format("%Y-%m-%d %H:%M"),
                change.actor,
                change.field,
                or_unset(change.old_value.as_deref()),
                or_unset(change.new_value.as_deref())
            )?;
        }
    }
    Ok(())
}

fn render_show_text(show: &ShowItem, w: &mut dyn Write) -> std::io::Result<()> {
    let item = &show.item;
    writeln!(w, "id: {}", item.id)?;
    writeln!(w, "title: {}", item.title)?;
    writeln!(w, "stage: {}", or_unset(item.stage.as_deref()))?;
    writeln!(w, "bucket: {}", or_unset(item.bucket))?;
    writeln!(w, "project: {}", or_unset(item.project.as_deref()))?;
    writeln!(w, "assignees: {}", item.assignees.join(","))?;
    writeln!(w, "created_at: {}", item.created_at.to_rfc3339())?;
    writeln!(
        w,
        "done_at: {}",
        or_unset(item.done_at.as_ref().map(DateTime::to_rfc3339))
    )?;
    writeln!(
        w,
        "period: {} {}",
        or_unset(item.effective_year),
        or_unset(item.effective_quarter)
    )?;
    for change in &show.changes {
        writeln!(
            w,
            "change: {} {} {} {} {}",
            change.changed_at.to_rfc3339(),
            change.actor,
            change.field,
            or_unset(change.old_value.as_deref()),
            or_unset(change.new_value.as_deref())
        )?;
    }
    Ok(())
}
