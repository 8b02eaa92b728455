//! `SQLite` query helpers for the record store.
//!
//! All functions take a shared `&Connection` and return `anyhow::Result<T>`
//! with domain types (never raw rows). Stored values that cannot be mapped
//! back (out-of-range timestamps, quarters outside 1..=4) surface as
//! [`TallyError`] rather than being silently dropped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::TallyError;
use crate::model::{ItemView, Project, ProjectId, Quarter, Stage, StageId, WorkItem};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One user-visible field edit recorded in `item_changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub change_id: i64,
    pub item_id: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Column filters for item listings, combined with AND semantics.
///
/// Period filters match the stored fields only; use
/// [`crate::drilldown::Filter`] for effective-period matching.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub assignee: Option<String>,
    pub project_id: Option<ProjectId>,
    pub stage_id: Option<StageId>,
    pub report_year: Option<i32>,
    pub report_quarter: Option<Quarter>,
    /// Only items with (`true`) or without (`false`) a first-done timestamp.
    pub done: Option<bool>,
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Microsecond representation used for every stored timestamp.
#[must_use]
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Inverse of [`to_micros`].
///
/// # Errors
///
/// Returns [`TallyError::TimestampOutOfRange`] when `us` is not a
/// representable instant.
pub fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| TallyError::TimestampOutOfRange(us).into())
}

fn quarter_from_column(value: Option<i64>) -> Result<Option<Quarter>> {
    value
        .map(|number| {
            Quarter::from_number(number).ok_or_else(|| {
                anyhow::Error::from(TallyError::InvalidEnumValue {
                    expected: "quarter",
                    got: number.to_string(),
                })
            })
        })
        .transpose()
}

fn year_from_column(value: Option<i64>) -> Result<Option<i32>> {
    value
        .map(|year| {
            i32::try_from(year).map_err(|_| {
                anyhow::Error::from(TallyError::InvalidEnumValue {
                    expected: "report year",
                    got: year.to_string(),
                })
            })
        })
        .transpose()
}

fn flag_from_column(value: Option<i64>) -> Option<bool> {
    value.map(|flag| flag != 0)
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

const STAGE_COLUMNS: &str = "stage_id, name, is_closed, fold, sequence";

fn row_to_stage(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stage> {
    Ok(Stage {
        id: StageId(row.get(0)?),
        name: row.get(1)?,
        is_closed: flag_from_column(row.get(2)?),
        fold: flag_from_column(row.get(3)?),
        sequence: row.get(4)?,
    })
}

/// Fetch a stage by id. Returns `None` for an unknown id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_stage(conn: &Connection, stage_id: StageId) -> Result<Option<Stage>> {
    conn.query_row(
        &format!("SELECT {STAGE_COLUMNS} FROM stages WHERE stage_id = ?1"),
        params![stage_id.0],
        row_to_stage,
    )
    .optional()
    .with_context(|| format!("get_stage for {stage_id}"))
}

/// All stages in workflow order.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_stages(conn: &Connection) -> Result<Vec<Stage>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {STAGE_COLUMNS} FROM stages ORDER BY sequence, stage_id"
        ))
        .context("prepare list_stages")?;
    let rows = stmt
        .query_map([], row_to_stage)
        .context("execute list_stages")?;

    let mut stages = Vec::new();
    for row in rows {
        stages.push(row.context("read stage row")?);
    }
    Ok(stages)
}

/// Look a stage up by display name (ASCII case-insensitive). The first
/// stage in workflow order wins when names collide.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_stage_by_name(conn: &Connection, name: &str) -> Result<Option<Stage>> {
    conn.query_row(
        &format!(
            "SELECT {STAGE_COLUMNS} FROM stages WHERE name = ?1 COLLATE NOCASE \
             ORDER BY sequence, stage_id LIMIT 1"
        ),
        params![name.trim()],
        row_to_stage,
    )
    .optional()
    .with_context(|| format!("find_stage_by_name for '{name}'"))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
    })
}

/// Fetch a project by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_project(conn: &Connection, project_id: ProjectId) -> Result<Option<Project>> {
    conn.query_row(
        "SELECT project_id, name FROM projects WHERE project_id = ?1",
        params![project_id.0],
        row_to_project,
    )
    .optional()
    .with_context(|| format!("get_project for {project_id}"))
}

/// All projects ordered by name.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn
        .prepare("SELECT project_id, name FROM projects ORDER BY name, project_id")
        .context("prepare list_projects")?;
    let rows = stmt
        .query_map([], row_to_project)
        .context("execute list_projects")?;

    let mut projects = Vec::new();
    for row in rows {
        projects.push(row.context("read project row")?);
    }
    Ok(projects)
}

/// Look a project up by exact name.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_project_by_name(conn: &Connection, name: &str) -> Result<Option<Project>> {
    conn.query_row(
        "SELECT project_id, name FROM projects WHERE name = ?1",
        params![name.trim()],
        row_to_project,
    )
    .optional()
    .with_context(|| format!("find_project_by_name for '{name}'"))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

const ITEM_COLUMNS: &str = "i.item_id, i.title, i.stage_id, i.project_id, i.created_at_us, \
     i.done_at_us, i.report_year, i.report_quarter, i.updated_at_us";

/// Raw `items` row before timestamp and enum conversion.
struct ItemRow {
    item_id: String,
    title: String,
    stage_id: Option<i64>,
    project_id: Option<i64>,
    created_at_us: i64,
    done_at_us: Option<i64>,
    report_year: Option<i64>,
    report_quarter: Option<i64>,
    updated_at_us: i64,
}

impl ItemRow {
    fn into_item(self, assignees: Vec<String>) -> Result<WorkItem> {
        Ok(WorkItem {
            id: self.item_id,
            title: self.title,
            stage_id: self.stage_id.map(StageId),
            project_id: self.project_id.map(ProjectId),
            assignees,
            created_at: from_micros(self.created_at_us)?,
            done_at: self.done_at_us.map(from_micros).transpose()?,
            report_year: year_from_column(self.report_year)?,
            report_quarter: quarter_from_column(self.report_quarter)?,
            updated_at: from_micros(self.updated_at_us)?,
        })
    }
}

fn row_to_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: row.get(0)?,
        title: row.get(1)?,
        stage_id: row.get(2)?,
        project_id: row.get(3)?,
        created_at_us: row.get(4)?,
        done_at_us: row.get(5)?,
        report_year: row.get(6)?,
        report_quarter: row.get(7)?,
        updated_at_us: row.get(8)?,
    })
}

/// Whether an item id is already taken.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn item_exists(conn: &Connection, item_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM items WHERE item_id = ?1)",
        params![item_id],
        |row| row.get(0),
    )
    .with_context(|| format!("item_exists for '{item_id}'"))
}

/// Fetch a single item, with its assignees, by exact id.
///
/// # Errors
///
/// Returns an error if the database query fails or a stored value cannot be
/// mapped back to the domain type.
pub fn get_item(conn: &Connection, item_id: &str) -> Result<Option<WorkItem>> {
    let row = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.item_id = ?1"),
            params![item_id],
            row_to_item_row,
        )
        .optional()
        .with_context(|| format!("get_item for '{item_id}'"))?;

    match row {
        Some(row) => {
            let assignees = get_assignees(conn, item_id)?;
            row.into_item(assignees).map(Some)
        }
        None => Ok(None),
    }
}

/// Assignees of one item, sorted.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_assignees(conn: &Connection, item_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT assignee FROM item_assignees WHERE item_id = ?1 ORDER BY assignee")
        .context("prepare get_assignees")?;
    let rows = stmt
        .query_map(params![item_id], |row| row.get(0))
        .with_context(|| format!("execute get_assignees for '{item_id}'"))?;

    let mut assignees = Vec::new();
    for row in rows {
        assignees.push(row.context("read assignee row")?);
    }
    Ok(assignees)
}

fn all_assignees(conn: &Connection) -> Result<HashMap<String, Vec<String>>> {
    let mut stmt = conn
        .prepare("SELECT item_id, assignee FROM item_assignees ORDER BY item_id, assignee")
        .context("prepare all_assignees")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("execute all_assignees")?;

    let mut by_item: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (item_id, assignee) = row.context("read assignee row")?;
        by_item.entry(item_id).or_default().push(assignee);
    }
    Ok(by_item)
}

/// List items matching `filter`, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails or a stored value cannot be
/// mapped back to the domain type.
pub fn list_items(conn: &Connection, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(project_id) = filter.project_id {
        param_values.push(Box::new(project_id.0));
        conditions.push(format!("i.project_id = ?{}", param_values.len()));
    }

    if let Some(stage_id) = filter.stage_id {
        param_values.push(Box::new(stage_id.0));
        conditions.push(format!("i.stage_id = ?{}", param_values.len()));
    }

    if let Some(year) = filter.report_year {
        param_values.push(Box::new(year));
        conditions.push(format!("i.report_year = ?{}", param_values.len()));
    }

    if let Some(quarter) = filter.report_quarter {
        param_values.push(Box::new(quarter.number()));
        conditions.push(format!("i.report_quarter = ?{}", param_values.len()));
    }

    match filter.done {
        Some(true) => conditions.push("i.done_at_us IS NOT NULL".to_string()),
        Some(false) => conditions.push("i.done_at_us IS NULL".to_string()),
        None => {}
    }

    let mut joins = String::new();
    if let Some(ref assignee) = filter.assignee {
        param_values.push(Box::new(assignee.clone()));
        let _ = write!(
            joins,
            " INNER JOIN item_assignees ia ON ia.item_id = i.item_id AND ia.assignee = ?{}",
            param_values.len()
        );
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let limit_clause = filter
        .limit
        .map_or_else(String::new, |limit| format!(" LIMIT {limit}"));

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items i{joins}{where_clause} \
         ORDER BY i.created_at_us ASC, i.item_id ASC{limit_clause}"
    );

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare list_items query: {sql}"))?;

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(AsRef::as_ref).collect();

    let rows = stmt
        .query_map(params_from_iter(params_ref), row_to_item_row)
        .context("execute list_items query")?;

    let mut raw = Vec::new();
    for row in rows {
        raw.push(row.context("read list_items row")?);
    }

    let mut assignees = all_assignees(conn)?;
    raw.into_iter()
        .map(|row| {
            let names = assignees.remove(&row.item_id).unwrap_or_default();
            row.into_item(names)
        })
        .collect()
}

/// Every item joined with its resolved stage and project.
///
/// Dangling stage references resolve to `None`.
///
/// # Errors
///
/// Returns an error if any underlying query fails.
pub fn item_views(conn: &Connection) -> Result<Vec<ItemView>> {
    let stages: HashMap<StageId, Stage> = list_stages(conn)?
        .into_iter()
        .map(|stage| (stage.id, stage))
        .collect();
    let projects: HashMap<ProjectId, Project> = list_projects(conn)?
        .into_iter()
        .map(|project| (project.id, project))
        .collect();

    let items = list_items(conn, &ItemFilter::default())?;
    Ok(items
        .into_iter()
        .map(|item| ItemView {
            stage: item.stage_id.and_then(|id| stages.get(&id).cloned()),
            project: item.project_id.and_then(|id| projects.get(&id).cloned()),
            item,
        })
        .collect())
}

/// Recorded field edits of an item, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn item_changes(conn: &Connection, item_id: &str) -> Result<Vec<ItemChange>> {
    let mut stmt = conn
        .prepare(
            "SELECT change_id, item_id, field, old_value, new_value, actor, changed_at_us \
             FROM item_changes WHERE item_id = ?1 \
             ORDER BY changed_at_us ASC, change_id ASC",
        )
        .context("prepare item_changes")?;

    let rows = stmt
        .query_map(params![item_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .with_context(|| format!("execute item_changes for '{item_id}'"))?;

    let mut changes = Vec::new();
    for row in rows {
        let (change_id, item_id, field, old_value, new_value, actor, changed_at_us) =
            row.context("read item_changes row")?;
        changes.push(ItemChange {
            change_id,
            item_id,
            field,
            old_value,
            new_value,
            actor,
            changed_at: from_micros(changed_at_us)?,
        });
    }
    Ok(changes)
}
