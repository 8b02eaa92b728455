//! SQLite schema for the tally record store.
//!
//! - `stages` and `projects` are reference data owned by whoever configures
//!   the workflow; items point at them by id
//! - `items` keeps the current fields of each work item, including the
//!   tracker-maintained `done_at_us` and report period columns
//! - `item_assignees` models the many-to-many assignee relation
//! - `item_changes` records user-visible field edits
//! - `store_meta` tracks the schema version

/// Migration v1: core tables plus store metadata.
///
/// `items.stage_id` carries no foreign key: a dangling stage reference is a
/// legal state and resolves to an open stage.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS stages (
    stage_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    is_closed INTEGER CHECK (is_closed IS NULL OR is_closed IN (0, 1)),
    fold INTEGER CHECK (fold IS NULL OR fold IN (0, 1)),
    sequence INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0)
);

CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    stage_id INTEGER,
    project_id INTEGER REFERENCES projects(project_id) ON DELETE SET NULL,
    created_at_us INTEGER NOT NULL,
    done_at_us INTEGER,
    report_year INTEGER,
    report_quarter INTEGER CHECK (report_quarter IS NULL OR report_quarter BETWEEN 1 AND 4),
    updated_at_us INTEGER NOT NULL,
    CHECK (item_id LIKE 'tk-%')
);

CREATE TABLE IF NOT EXISTS item_assignees (
    item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    assignee TEXT NOT NULL CHECK (length(trim(assignee)) > 0),
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (item_id, assignee)
);

CREATE TABLE IF NOT EXISTS item_changes (
    change_id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    field TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    actor TEXT NOT NULL,
    changed_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER));
";

/// Migration v2: read-path indexes for reporting and drill-down.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_done_at
    ON items(done_at_us);

CREATE INDEX IF NOT EXISTS idx_items_report_period
    ON items(report_year, report_quarter);

CREATE INDEX IF NOT EXISTS idx_items_stage
    ON items(stage_id);

CREATE INDEX IF NOT EXISTS idx_items_project
    ON items(project_id);

CREATE INDEX IF NOT EXISTS idx_item_assignees_assignee
    ON item_assignees(assignee, item_id);

CREATE INDEX IF NOT EXISTS idx_item_changes_item
    ON item_changes(item_id, changed_at_us);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by list/report query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_items_done_at",
    "idx_items_report_period",
    "idx_items_stage",
    "idx_items_project",
    "idx_item_assignees_assignee",
    "idx_item_changes_item",
];
