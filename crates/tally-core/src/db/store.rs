//! Write path and read model over the SQLite record store.
//!
//! Every item write runs inside one `BEGIN IMMEDIATE` transaction: the user
//! fields, the tracker's `done_at` bookkeeping, and the period recomputation
//! either all land or none do.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use super::query::{self, ItemChange, ItemFilter, to_micros};
use crate::config::{ProjectConfig, db_path, load_project_config};
use crate::drilldown::{DrillAction, Filter, Metric, drill_down};
use crate::error::TallyError;
use crate::kpi::{KpiKey, KpiQuery, KpiRow, aggregate};
use crate::model::{
    ItemUpdate, ItemView, NewItem, NewStage, Period, Project, ProjectId, Stage, StageId, WorkItem,
    derive_period,
};
use crate::rules::ClassificationRules;
use crate::tracker::{DoneStamp, Tracker};

const ITEM_ID_PREFIX: &str = "tk-";
const ITEM_ID_HEX_LEN: usize = 8;
const MAX_ID_ATTEMPTS: u32 = 64;

/// Who is performing a write.
///
/// User writes are permission-checked against system-derived fields and
/// leave an audit trail in `item_changes`. System writes do neither; the
/// tracker's own bookkeeping is always applied as part of the surrounding
/// write and never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    User { actor: String },
    System,
}

impl WriteMode {
    #[must_use]
    pub fn user(actor: impl Into<String>) -> Self {
        Self::User {
            actor: actor.into(),
        }
    }

    fn actor(&self) -> Option<&str> {
        match self {
            Self::User { actor } => Some(actor),
            Self::System => None,
        }
    }

    fn check_timestamps(&self, created_at: bool, done_at: bool) -> Result<()> {
        if self.actor().is_none() {
            return Ok(());
        }
        if created_at {
            return Err(TallyError::ReadonlyField("created_at").into());
        }
        if done_at {
            return Err(TallyError::ReadonlyField("done_at").into());
        }
        Ok(())
    }
}

/// Field edits collected during one user write.
#[derive(Debug, Default)]
struct ChangeLog {
    entries: Vec<(&'static str, Option<String>, Option<String>)>,
}

impl ChangeLog {
    fn record<T: ToString>(&mut self, field: &'static str, old: Option<T>, new: Option<T>) {
        self.entries.push((
            field,
            old.map(|value| value.to_string()),
            new.map(|value| value.to_string()),
        ));
    }

    fn write(
        &self,
        conn: &Connection,
        item_id: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut stmt = conn
            .prepare_cached(
                "INSERT INTO item_changes (item_id, field, old_value, new_value, actor, changed_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("prepare item_changes insert")?;
        for (field, old, new) in &self.entries {
            stmt.execute(params![item_id, field, old, new, actor, to_micros(at)])
                .with_context(|| format!("record change of {field} on '{item_id}'"))?;
        }
        Ok(())
    }
}

/// Handle over an opened record store plus the rules it reports with.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    tracker: Tracker,
    rules: ClassificationRules,
}

impl Store {
    /// Open the store at `path` configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, config: &ProjectConfig) -> Result<Self> {
        let conn = super::open_database(path)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Open the store of an initialized project directory.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::NotInitialized`] when `project_root` holds no
    /// store, or any config/database error.
    pub fn open_project(project_root: &Path) -> Result<Self> {
        let path = db_path(project_root);
        if !path.exists() {
            return Err(TallyError::NotInitialized(project_root.display().to_string()).into());
        }
        let config = load_project_config(project_root)?;
        Self::open(&path, &config)
    }

    /// A migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory(config: &ProjectConfig) -> Result<Self> {
        let conn = super::open_in_memory()?;
        Ok(Self::with_connection(conn, config))
    }

    #[must_use]
    pub fn with_connection(conn: Connection, config: &ProjectConfig) -> Self {
        Self {
            conn,
            tracker: Tracker::new(config.tracker.on_reopen),
            rules: ClassificationRules::from_config(config),
        }
    }

    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub const fn tracker(&self) -> Tracker {
        self.tracker
    }

    #[must_use]
    pub const fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    fn immediate<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("begin write transaction")?;

        match op(&self.conn) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .context("commit write transaction")?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "rollback of failed write did not apply");
                }
                Err(error)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages and projects
    // -----------------------------------------------------------------------

    /// Register a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. a blank name).
    pub fn add_stage(&self, stage: NewStage) -> Result<Stage> {
        self.conn
            .execute(
                "INSERT INTO stages (name, is_closed, fold, sequence) VALUES (?1, ?2, ?3, ?4)",
                params![stage.name.trim(), stage.is_closed, stage.fold, stage.sequence],
            )
            .with_context(|| format!("insert stage '{}'", stage.name))?;

        let id = StageId(self.conn.last_insert_rowid());
        info!(stage_id = %id, name = %stage.name, "added stage");
        self.require_stage(id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_stage(&self, stage_id: StageId) -> Result<Option<Stage>> {
        query::get_stage(&self.conn, stage_id)
    }

    fn require_stage(&self, stage_id: StageId) -> Result<Stage> {
        self.get_stage(stage_id)?
            .ok_or_else(|| TallyError::StageNotFound(stage_id.to_string()).into())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_stages(&self) -> Result<Vec<Stage>> {
        query::list_stages(&self.conn)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_stage_by_name(&self, name: &str) -> Result<Option<Stage>> {
        query::find_stage_by_name(&self.conn, name)
    }

    /// Register a project. Names are unique.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (blank or duplicate name).
    pub fn add_project(&self, name: &str) -> Result<Project> {
        self.conn
            .execute("INSERT INTO projects (name) VALUES (?1)", params![name.trim()])
            .with_context(|| format!("insert project '{name}'"))?;

        let id = ProjectId(self.conn.last_insert_rowid());
        info!(project_id = %id, name, "added project");
        query::get_project(&self.conn, id)?
            .ok_or_else(|| TallyError::ProjectNotFound(id.to_string()).into())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        query::list_projects(&self.conn)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        query::find_project_by_name(&self.conn, name)
    }

    // -----------------------------------------------------------------------
    // Item writes
    // -----------------------------------------------------------------------

    /// Create a work item now. See [`Store::create_item_at`].
    ///
    /// # Errors
    ///
    /// See [`Store::create_item_at`].
    pub fn create_item(&self, new: NewItem, mode: &WriteMode) -> Result<WorkItem> {
        self.create_item_at(new, mode, Utc::now())
    }

    /// Create a work item as of `now`.
    ///
    /// An item created in a closed stage is done as of its creation moment
    /// unless the (system) caller supplied `done_at`. The report period is
    /// derived in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`TallyError::ReadonlyField`] when a user write supplies `created_at`
    ///   or `done_at`
    /// - [`TallyError::ProjectNotFound`] for an unknown project
    /// - any storage failure, in which case nothing is written
    pub fn create_item_at(
        &self,
        new: NewItem,
        mode: &WriteMode,
        now: DateTime<Utc>,
    ) -> Result<WorkItem> {
        mode.check_timestamps(new.created_at.is_some(), new.done_at.is_some())?;

        self.immediate(|conn| {
            let stage = match new.stage_id {
                Some(id) => query::get_stage(conn, id)?,
                None => None,
            };
            if let Some(project_id) = new.project_id {
                ensure_project(conn, project_id)?;
            }

            let created_at = new.created_at.unwrap_or(now);
            let done_at = self
                .tracker
                .on_create(stage.as_ref(), created_at, new.done_at);
            let period = derive_period(Some(created_at), done_at);
            let item_id = generate_item_id(conn, &new.title, created_at)?;

            conn.execute(
                "INSERT INTO items (item_id, title, stage_id, project_id, created_at_us, \
                 done_at_us, report_year, report_quarter, updated_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    item_id,
                    new.title,
                    new.stage_id.map(|id| id.0),
                    new.project_id.map(|id| id.0),
                    to_micros(created_at),
                    done_at.map(to_micros),
                    period.map(|p| p.year),
                    period.map(|p| p.quarter.number()),
                    to_micros(now),
                ],
            )
            .with_context(|| format!("insert item '{item_id}'"))?;

            let assignees = normalize_assignees(&new.assignees);
            insert_assignees(conn, &item_id, &assignees, now)?;

            if new.done_at.is_none() && done_at.is_some() {
                debug!(
                    item_id = %item_id,
                    stage_id = ?new.stage_id,
                    "created in closed stage, seeded done_at"
                );
            }

            if let Some(actor) = mode.actor() {
                let mut log = ChangeLog::default();
                log.record("created", None, Some(new.title.as_str()));
                log.write(conn, &item_id, actor, now)?;
            }

            require_item(conn, &item_id)
        })
    }

    /// Update a work item now. See [`Store::update_item_at`].
    ///
    /// # Errors
    ///
    /// See [`Store::update_item_at`].
    pub fn update_item(&self, item_id: &str, update: ItemUpdate, mode: &WriteMode) -> Result<WorkItem> {
        self.update_item_at(item_id, update, mode, Utc::now())
    }

    /// Apply `update` to an item as of `now`.
    ///
    /// When the update writes the stage reference, the tracker decides
    /// whether `done_at` is stamped, cleared, or left alone; that write and
    /// the period recomputation happen in the same transaction and are not
    /// recorded as user changes.
    ///
    /// # Errors
    ///
    /// - [`TallyError::ReadonlyField`] when a user write touches `created_at`
    ///   or `done_at`
    /// - [`TallyError::ItemNotFound`] / [`TallyError::ProjectNotFound`]
    /// - any storage failure, in which case nothing is written
    pub fn update_item_at(
        &self,
        item_id: &str,
        update: ItemUpdate,
        mode: &WriteMode,
        now: DateTime<Utc>,
    ) -> Result<WorkItem> {
        mode.check_timestamps(update.created_at.is_some(), update.done_at.is_some())?;

        self.immediate(|conn| {
            let current = require_item(conn, item_id)?;
            let mut next = current.clone();
            let mut log = ChangeLog::default();

            if let Some(title) = update.title {
                if title != current.title {
                    log.record("title", Some(current.title.as_str()), Some(title.as_str()));
                    next.title = title;
                }
            }

            if let Some(project_id) = update.project_id {
                if let Some(id) = project_id {
                    ensure_project(conn, id)?;
                }
                if project_id != current.project_id {
                    log.record("project_id", current.project_id, project_id);
                    next.project_id = project_id;
                }
            }

            if let Some(stage_id) = update.stage_id {
                if stage_id != current.stage_id {
                    log.record("stage_id", current.stage_id, stage_id);
                }
                next.stage_id = stage_id;
            }

            let assignees = apply_assignment(&current.assignees, &update.assign, &update.unassign);
            if assignees != current.assignees {
                log.record(
                    "assignees",
                    Some(current.assignees.join(",")),
                    Some(assignees.join(",")),
                );
            }
            next.assignees = assignees;

            if let Some(created_at) = update.created_at {
                next.created_at = created_at;
            }
            if let Some(done_at) = update.done_at {
                next.done_at = done_at;
            }

            if update.stage_id.is_some() {
                let stage = match next.stage_id {
                    Some(id) => query::get_stage(conn, id)?,
                    None => None,
                };
                let stamp = self
                    .tracker
                    .on_stage_change(stage.as_ref(), next.done_at, now);
                if stamp.is_write() {
                    log_stamp(item_id, next.stage_id, stamp, self.tracker);
                    next.done_at = stamp.apply(next.done_at);
                }
            }

            if next.created_at != current.created_at || next.done_at != current.done_at {
                let period = derive_period(Some(next.created_at), next.done_at);
                next.report_year = period.map(|p| p.year);
                next.report_quarter = period.map(|p| p.quarter);
            }

            if next == current {
                return Ok(current);
            }

            write_item(conn, &next, now)?;
            sync_assignees(conn, item_id, &current.assignees, &next.assignees, now)?;

            if let Some(actor) = mode.actor() {
                log.write(conn, item_id, actor, now)?;
            }

            require_item(conn, item_id)
        })
    }

    /// Recompute stored report periods from the timestamps of every item.
    ///
    /// Used to repair rows written by older versions or by hand. Returns the
    /// number of items whose period changed.
    ///
    /// # Errors
    ///
    /// Returns an error if any read or write fails; nothing is written then.
    pub fn recompute_periods(&self) -> Result<usize> {
        self.immediate(|conn| {
            let items = query::list_items(conn, &ItemFilter::default())?;
            let mut changed = 0;
            for item in items {
                let period = derive_period(Some(item.created_at), item.done_at);
                let stored = item.stored_period();
                let partial = item.report_year.is_some() != item.report_quarter.is_some();
                if stored == period && !partial {
                    continue;
                }
                write_period(conn, &item.id, period)?;
                changed += 1;
            }
            if changed > 0 {
                info!(changed, "recomputed report periods");
            }
            Ok(changed)
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_item(&self, item_id: &str) -> Result<Option<WorkItem>> {
        query::get_item(&self.conn, item_id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        query::list_items(&self.conn, filter)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn item_views(&self) -> Result<Vec<ItemView>> {
        query::item_views(&self.conn)
    }

    /// The view of one item.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::ItemNotFound`] for an unknown id.
    pub fn item_view(&self, item_id: &str) -> Result<ItemView> {
        let item = require_item(&self.conn, item_id)?;
        let stage = match item.stage_id {
            Some(id) => self.get_stage(id)?,
            None => None,
        };
        let project = match item.project_id {
            Some(id) => query::get_project(&self.conn, id)?,
            None => None,
        };
        Ok(ItemView {
            item,
            stage,
            project,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn item_changes(&self, item_id: &str) -> Result<Vec<ItemChange>> {
        query::item_changes(&self.conn, item_id)
    }

    /// KPI rows computed from the current item set.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the items fails.
    pub fn kpi_rows(&self, filter: &KpiQuery) -> Result<Vec<KpiRow>> {
        let views = self.item_views()?;
        let rows = aggregate(&views, &self.rules);
        Ok(rows
            .into_iter()
            .filter(|row| filter.matches(&row.key))
            .collect())
    }

    /// Drill-down action for a row key under this store's rules.
    #[must_use]
    pub fn drill(&self, key: &KpiKey, metric: Option<Metric>) -> DrillAction {
        drill_down(key, metric, &self.rules)
    }

    /// Items matching a drill-down filter.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the items fails.
    pub fn find_items(&self, filter: &Filter) -> Result<Vec<ItemView>> {
        Ok(self
            .item_views()?
            .into_iter()
            .filter(|view| filter.matches(view, &self.rules))
            .collect())
    }
}

fn log_stamp(item_id: &str, stage_id: Option<StageId>, stamp: DoneStamp, tracker: Tracker) {
    match stamp {
        DoneStamp::Stamp(at) => debug!(
            item_id,
            stage_id = ?stage_id,
            done_at = %at,
            "stage closed, stamped done_at"
        ),
        DoneStamp::Clear => debug!(
            item_id,
            stage_id = ?stage_id,
            policy = %tracker.policy(),
            "stage reopened, cleared done_at"
        ),
        DoneStamp::Unchanged => {}
    }
}

fn require_item(conn: &Connection, item_id: &str) -> Result<WorkItem> {
    query::get_item(conn, item_id)?.ok_or_else(|| TallyError::ItemNotFound(item_id.to_string()).into())
}

fn ensure_project(conn: &Connection, project_id: ProjectId) -> Result<()> {
    if query::get_project(conn, project_id)?.is_none() {
        return Err(TallyError::ProjectNotFound(project_id.to_string()).into());
    }
    Ok(())
}

/// `tk-` plus the first eight hex digits of a BLAKE3 digest over the title,
/// creation time, and an attempt counter.
fn generate_item_id(conn: &Connection, title: &str, created_at: DateTime<Utc>) -> Result<String> {
    for attempt in 0..MAX_ID_ATTEMPTS {
        let mut hasher = blake3::Hasher::new();
        hasher.update(title.as_bytes());
        hasher.update(&to_micros(created_at).to_le_bytes());
        hasher.update(&attempt.to_le_bytes());
        let hex = hasher.finalize().to_hex();
        let candidate = format!("{ITEM_ID_PREFIX}{}", &hex.as_str()[..ITEM_ID_HEX_LEN]);
        if !query::item_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    bail!("could not allocate a unique item id after {MAX_ID_ATTEMPTS} attempts")
}

fn normalize_assignees(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn apply_assignment(current: &[String], assign: &[String], unassign: &[String]) -> Vec<String> {
    let removed = normalize_assignees(unassign);
    let mut names: BTreeSet<String> = current.iter().cloned().collect();
    names.extend(normalize_assignees(assign));
    names.retain(|name| !removed.contains(name));
    names.into_iter().collect()
}

fn insert_assignees(
    conn: &Connection,
    item_id: &str,
    assignees: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    for assignee in assignees {
        conn.execute(
            "INSERT OR IGNORE INTO item_assignees (item_id, assignee, created_at_us) \
             VALUES (?1, ?2, ?3)",
            params![item_id, assignee, to_micros(now)],
        )
        .with_context(|| format!("assign '{assignee}' to '{item_id}'"))?;
    }
    Ok(())
}

fn sync_assignees(
    conn: &Connection,
    item_id: &str,
    before: &[String],
    after: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    for gone in before.iter().filter(|name| !after.contains(name)) {
        conn.execute(
            "DELETE FROM item_assignees WHERE item_id = ?1 AND assignee = ?2",
            params![item_id, gone],
        )
        .with_context(|| format!("unassign '{gone}' from '{item_id}'"))?;
    }
    let added: Vec<String> = after
        .iter()
        .filter(|name| !before.contains(name))
        .cloned()
        .collect();
    insert_assignees(conn, item_id, &added, now)
}

fn write_item(conn: &Connection, item: &WorkItem, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE items SET title = ?2, stage_id = ?3, project_id = ?4, created_at_us = ?5, \
         done_at_us = ?6, report_year = ?7, report_quarter = ?8, updated_at_us = ?9 \
         WHERE item_id = ?1",
        params![
            item.id,
            item.title,
            item.stage_id.map(|id| id.0),
            item.project_id.map(|id| id.0),
            to_micros(item.created_at),
            item.done_at.map(to_micros),
            item.report_year,
            item.report_quarter.map(|q| q.number()),
            to_micros(now),
        ],
    )
    .with_context(|| format!("update item '{}'", item.id))?;
    Ok(())
}

fn write_period(conn: &Connection, item_id: &str, period: Option<Period>) -> Result<()> {
    conn.execute(
        "UPDATE items SET report_year = ?2, report_quarter = ?3 WHERE item_id = ?1",
        params![
            item_id,
            period.map(|p| p.year),
            period.map(|p| p.quarter.number())
        ],
    )
    .with_context(|| format!("update report period of '{item_id}'"))?;
    Ok(())
}
