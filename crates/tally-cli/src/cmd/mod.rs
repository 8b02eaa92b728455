pub mod assign;
pub mod create;
pub mod drill;
pub mod init;
pub mod kpi;
pub mod list;
pub mod move_cmd;
pub mod project;
pub mod show;
pub mod stage;

use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::Store;
use tally_core::error::TallyError;
use tally_core::model::{ItemView, Project, Quarter, Stage, StageId};
use tally_core::rules::{Bucket, ClassificationRules};

use crate::output::or_unset;

/// Open the store of the project rooted at `project_root`.
pub fn open_store(project_root: &Path) -> anyhow::Result<Store> {
    Store::open_project(project_root)
}

/// Resolve a stage by name (case-insensitive) or numeric id.
pub fn resolve_stage(store: &Store, name: &str) -> anyhow::Result<Stage> {
    if let Some(stage) = store.find_stage_by_name(name)? {
        return Ok(stage);
    }
    let by_id = match name.trim().parse::<i64>() {
        Ok(id) => store.get_stage(StageId(id))?,
        Err(_) => None,
    };
    by_id.ok_or_else(|| TallyError::StageNotFound(name.to_string()).into())
}

/// Resolve a project by name (case-insensitive).
pub fn resolve_project(store: &Store, name: &str) -> anyhow::Result<Project> {
    store
        .find_project_by_name(name)?
        .ok_or_else(|| TallyError::ProjectNotFound(name.to_string()).into())
}

/// An item as printed by item-oriented commands.
#[derive(Debug, Serialize)]
pub struct ItemRecord {
    pub id: String,
    pub title: String,
    pub stage: Option<String>,
    pub closed: bool,
    pub bucket: Option<Bucket>,
    pub project: Option<String>,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub done_at: Option<DateTime<Utc>>,
    /// Stored period fields.
    pub report_year: Option<i32>,
    pub report_quarter: Option<Quarter>,
    /// Period the KPI view groups this item under.
    pub effective_year: Option<i32>,
    pub effective_quarter: Option<Quarter>,
}

impl ItemRecord {
    pub fn new(view: &ItemView, rules: &ClassificationRules) -> Self {
        let effective = rules.report_period(view);
        Self {
            id: view.item.id.clone(),
            title: view.item.title.clone(),
            stage: view.stage_name().map(str::to_string),
            closed: view.is_closed(),
            bucket: rules.bucket(view.stage.as_ref()),
            project: view.project_name().map(str::to_string),
            assignees: view.item.assignees.clone(),
            created_at: view.item.created_at,
            done_at: view.item.done_at,
            report_year: view.item.report_year,
            report_quarter: view.item.report_quarter,
            effective_year: effective.year,
            effective_quarter: effective.quarter,
        }
    }

    fn period_label(&self) -> String {
        format!(
            "{}-{}",
            or_unset(self.effective_year),
            or_unset(self.effective_quarter)
        )
    }
}

/// Build the record of one item after a write.
pub fn item_record(store: &Store, item_id: &str) -> anyhow::Result<ItemRecord> {
    let view = store.item_view(item_id)?;
    Ok(ItemRecord::new(&view, store.rules()))
}

/// One TSV-ish line per item for text output.
pub fn write_item_line(item: &ItemRecord, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}  {}  {}  {}  {}",
        item.id,
        or_unset(item.stage.as_deref()),
        item.period_label(),
        if item.assignees.is_empty() {
            or_unset::<&str>(None)
        } else {
            item.assignees.join(",")
        },
        item.title
    )
}

/// Short confirmation used by the write commands in pretty mode.
pub fn write_item_summary(w: &mut dyn Write, verb: &str, item: &ItemRecord) -> io::Result<()> {
    writeln!(w, "{verb} {}: {}", item.id, item.title)?;
    writeln!(
        w,
        "  stage {}  period {}  done {}",
        or_unset(item.stage.as_deref()),
        item.period_label(),
        or_unset(item.done_at.map(|at| at.format("%Y-%m-%d %H:%M").to_string()))
    )
}
