use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::period::{Period, Quarter};
use super::stage::{Stage, StageId, resolve_closed};

/// Row identifier of a project in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
}

/// All persisted fields for a work item.
///
/// `done_at`, `report_year` and `report_quarter` are maintained by the
/// transition tracker; `created_at` is fixed at creation. None of them can
/// be written through a user-mode write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub stage_id: Option<StageId>,
    pub project_id: Option<ProjectId>,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub done_at: Option<DateTime<Utc>>,
    pub report_year: Option<i32>,
    pub report_quarter: Option<Quarter>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// The stored period, when both fields are populated.
    #[must_use]
    pub fn stored_period(&self) -> Option<Period> {
        Some(Period {
            year: self.report_year?,
            quarter: self.report_quarter?,
        })
    }
}

/// A work item joined with its resolved stage and project.
///
/// This is the unit the KPI view and drill-down predicates operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub item: WorkItem,
    pub stage: Option<Stage>,
    pub project: Option<Project>,
}

impl ItemView {
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        self.stage.as_ref().map(|stage| stage.name.as_str())
    }

    #[must_use]
    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|project| project.name.as_str())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        resolve_closed(self.stage.as_ref())
    }
}

/// Input for creating a work item.
///
/// `created_at` and `done_at` are system-derived; supplying either requires
/// a system-mode write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub stage_id: Option<StageId>,
    pub project_id: Option<ProjectId>,
    pub assignees: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
}

impl NewItem {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn in_stage(mut self, stage_id: StageId) -> Self {
        self.stage_id = Some(stage_id);
        self
    }

    #[must_use]
    pub const fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    #[must_use]
    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assignees.push(assignee.into());
        self
    }

    #[must_use]
    pub const fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// A partial update of a work item. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub stage_id: Option<Option<StageId>>,
    pub project_id: Option<Option<ProjectId>>,
    pub assign: Vec<String>,
    pub unassign: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub done_at: Option<Option<DateTime<Utc>>>,
}

impl ItemUpdate {
    /// An update that only moves the item to `stage_id`.
    #[must_use]
    pub fn stage(stage_id: Option<StageId>) -> Self {
        Self {
            stage_id: Some(stage_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when the update writes a system-derived timestamp.
    #[must_use]
    pub const fn touches_timestamps(&self) -> bool {
        self.created_at.is_some() || self.done_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemUpdate, ItemView, WorkItem};
    use crate::model::period::{Period, Quarter};
    use crate::model::stage::{Stage, StageId};
    use chrono::{TimeZone, Utc};

    fn item() -> WorkItem {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        WorkItem {
            id: "tk-0000abcd".into(),
            title: "Write report".into(),
            stage_id: Some(StageId(3)),
            project_id: None,
            assignees: vec![],
            created_at: at,
            done_at: None,
            report_year: Some(2024),
            report_quarter: Some(Quarter::Q1),
            updated_at: at,
        }
    }

    #[test]
    fn stored_period_requires_both_fields() {
        let mut item = item();
        assert_eq!(
            item.stored_period(),
            Some(Period {
                year: 2024,
                quarter: Quarter::Q1
            })
        );
        item.report_quarter = None;
        assert_eq!(item.stored_period(), None);
    }

    #[test]
    fn view_without_stage_is_open() {
        let view = ItemView {
            item: item(),
            stage: None,
            project: None,
        };
        assert!(!view.is_closed());
        assert_eq!(view.stage_name(), None);

        let closed = ItemView {
            stage: Some(Stage {
                id: StageId(3),
                name: "Done".into(),
                is_closed: None,
                fold: Some(true),
                sequence: 9,
            }),
            ..view
        };
        assert!(closed.is_closed());
    }

    #[test]
    fn update_helpers() {
        assert!(ItemUpdate::default().is_empty());
        let update = ItemUpdate::stage(None);
        assert!(!update.is_empty());
        assert!(!update.touches_timestamps());
        let backfill = ItemUpdate {
            done_at: Some(None),
            ..ItemUpdate::default()
        };
        assert!(backfill.touches_timestamps());
    }
}
