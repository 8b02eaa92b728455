//! Drill-down from a KPI row to the items behind one of its counts.
//!
//! A [`Filter`] built here selects exactly the items that contributed to the
//! chosen metric of the chosen row: undefined group components become
//! "is unset" tests, and the bucket conditions mirror
//! [`ClassificationRules::bucket`] term for term.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::kpi::KpiKey;
use crate::model::{ItemView, ParseEnumError, Quarter, normalize, resolve_closed};
use crate::rules::{ClassificationRules, InProgressMode, LabelKind};

/// Entity kind drill-down actions open.
pub const DRILL_TARGET: &str = "work_item";

/// Display name of drill-down actions.
pub const DRILL_NAME: &str = "Tasks";

/// Which count of a KPI row to drill into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Backlog,
    Todo,
    InProgress,
    Done,
    Total,
}

impl Metric {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Total => "total",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).replace('-', "_").as_str() {
            "backlog" => Ok(Self::Backlog),
            "todo" | "to_do" => Ok(Self::Todo),
            "in_progress" | "inprogress" | "wip" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "total" | "all" => Ok(Self::Total),
            _ => Err(ParseEnumError {
                expected: "metric",
                got: s.to_string(),
            }),
        }
    }
}

/// A predicate over item views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Filter {
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
    AssignedTo(String),
    Unassigned,
    InProject(String),
    NoProject,
    /// Effective report year equals the value (`None`: undefined).
    ReportYear(Option<i32>),
    /// Effective report quarter equals the value (`None`: undefined).
    ReportQuarter(Option<Quarter>),
    StageClosed,
    StagePrefix(LabelKind),
    /// Stage carries an archive marker; `Some(year)` pins the marker year.
    ArchiveMarker(Option<i32>),
}

impl Filter {
    /// Evaluate against one item view.
    #[must_use]
    pub fn matches(&self, view: &ItemView, rules: &ClassificationRules) -> bool {
        match self {
            Self::All(parts) => parts.iter().all(|part| part.matches(view, rules)),
            Self::Any(parts) => parts.iter().any(|part| part.matches(view, rules)),
            Self::Not(inner) => !inner.matches(view, rules),
            Self::AssignedTo(name) => view.item.assignees.iter().any(|a| a == name),
            Self::Unassigned => view.item.assignees.is_empty(),
            Self::InProject(name) => view.project_name() == Some(name.as_str()),
            Self::NoProject => view.project.is_none(),
            Self::ReportYear(year) => rules.report_period(view).year == *year,
            Self::ReportQuarter(quarter) => rules.report_period(view).quarter == *quarter,
            Self::StageClosed => resolve_closed(view.stage.as_ref()),
            Self::StagePrefix(kind) => rules.has_label(*kind, view.stage_name()),
            Self::ArchiveMarker(year) => match rules.archive_year_of(view.stage.as_ref()) {
                Some(found) => year.is_none_or(|wanted| wanted == found),
                None => false,
            },
        }
    }

    fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, parts: &[Filter], sep: &str) -> fmt::Result {
            if parts.is_empty() {
                return f.write_str("true");
            }
            f.write_str("(")?;
            for (idx, part) in parts.iter().enumerate() {
                if idx > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{part}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::All(parts) => join(f, parts, " AND "),
            Self::Any(parts) => join(f, parts, " OR "),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::AssignedTo(name) => write!(f, "assignee = {name:?}"),
            Self::Unassigned => f.write_str("assignee IS NULL"),
            Self::InProject(name) => write!(f, "project = {name:?}"),
            Self::NoProject => f.write_str("project IS NULL"),
            Self::ReportYear(Some(year)) => write!(f, "report_year = {year}"),
            Self::ReportYear(None) => f.write_str("report_year IS NULL"),
            Self::ReportQuarter(Some(quarter)) => {
                write!(f, "report_quarter = {}", quarter.number())
            }
            Self::ReportQuarter(None) => f.write_str("report_quarter IS NULL"),
            Self::StageClosed => f.write_str("stage.closed"),
            Self::StagePrefix(kind) => write!(f, "stage ^= {kind}"),
            Self::ArchiveMarker(Some(year)) => write!(f, "stage ~ archive({year})"),
            Self::ArchiveMarker(None) => f.write_str("stage ~ archive"),
        }
    }
}

/// Presentation hint for the opened item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewHint {
    List,
}

/// Where the item list opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenIn {
    Current,
}

/// Navigation request describing an item list to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillAction {
    pub target: String,
    pub name: String,
    pub view: ViewHint,
    pub open_in: OpenIn,
    pub filter: Filter,
}

/// Build the action listing the items behind `metric` of the row `key`.
///
/// `None` for the metric drills into the whole row, same as
/// [`Metric::Total`].
#[must_use]
pub fn drill_down(
    key: &KpiKey,
    metric: Option<Metric>,
    rules: &ClassificationRules,
) -> DrillAction {
    let mut parts = group_filters(key);
    if let Some(condition) = metric_filter(metric.unwrap_or(Metric::Total), key.year, rules) {
        parts.push(condition);
    }

    DrillAction {
        target: DRILL_TARGET.to_string(),
        name: DRILL_NAME.to_string(),
        view: ViewHint::List,
        open_in: OpenIn::Current,
        filter: Filter::All(parts),
    }
}

fn group_filters(key: &KpiKey) -> Vec<Filter> {
    vec![
        key.assignee
            .as_ref()
            .map_or(Filter::Unassigned, |name| Filter::AssignedTo(name.clone())),
        key.project
            .as_ref()
            .map_or(Filter::NoProject, |name| Filter::InProject(name.clone())),
        Filter::ReportYear(key.year),
        Filter::ReportQuarter(key.quarter),
    ]
}

fn done_filter(year: Option<i32>, rules: &ClassificationRules) -> Filter {
    let mut any = vec![Filter::StageClosed];
    // Within a row, archive-marked items always carry the marker year.
    if rules.archive_override && year.is_some() {
        any.push(Filter::ArchiveMarker(year));
    }
    Filter::Any(any)
}

fn metric_filter(
    metric: Metric,
    year: Option<i32>,
    rules: &ClassificationRules,
) -> Option<Filter> {
    let not_done = || done_filter(year, rules).negate();
    let not_label = |kind| Filter::StagePrefix(kind).negate();

    match metric {
        Metric::Total => None,
        Metric::Done => Some(done_filter(year, rules)),
        Metric::Backlog => Some(Filter::All(vec![
            not_done(),
            Filter::StagePrefix(LabelKind::Backlog),
        ])),
        Metric::Todo => Some(Filter::All(vec![
            not_done(),
            not_label(LabelKind::Backlog),
            Filter::StagePrefix(LabelKind::Todo),
        ])),
        Metric::InProgress => {
            let mut parts = vec![
                not_done(),
                not_label(LabelKind::Backlog),
                not_label(LabelKind::Todo),
            ];
            if rules.in_progress == InProgressMode::Explicit {
                parts.push(Filter::StagePrefix(LabelKind::InProgress));
            }
            Some(Filter::All(parts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DRILL_TARGET, Filter, Metric, OpenIn, ViewHint, drill_down};
    use crate::kpi::{KpiKey, aggregate};
    use crate::model::{ItemView, Project, ProjectId, Quarter, Stage, StageId, WorkItem};
    use crate::rules::{Bucket, ClassificationRules, InProgressMode, LabelKind};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn view(
        id: &str,
        stage: Option<(&str, bool)>,
        project: Option<&str>,
        assignees: &[&str],
        month: u32,
    ) -> ItemView {
        let created = Utc.with_ymd_and_hms(2024, month, 10, 0, 0, 0).unwrap();
        ItemView {
            item: WorkItem {
                id: id.into(),
                title: id.into(),
                stage_id: stage.map(|_| StageId(1)),
                project_id: project.map(|_| ProjectId(1)),
                assignees: assignees.iter().map(ToString::to_string).collect(),
                created_at: created,
                done_at: None,
                report_year: None,
                report_quarter: None,
                updated_at: created,
            },
            stage: stage.map(|(name, closed)| Stage {
                id: StageId(1),
                name: name.into(),
                is_closed: Some(closed),
                fold: None,
                sequence: 0,
            }),
            project: project.map(|name| Project {
                id: ProjectId(1),
                name: name.into(),
            }),
        }
    }

    fn fixture() -> Vec<ItemView> {
        vec![
            view("tk-1", Some(("Backlog", false)), Some("Apollo"), &["ayse"], 4),
            view("tk-2", Some(("To Do Review", false)), Some("Apollo"), &["ayse"], 5),
            view("tk-3", Some(("2024 Archive", false)), Some("Apollo"), &["ayse"], 6),
            view("tk-4", Some(("Review", false)), Some("Apollo"), &["ayse", "mehmet"], 4),
            view("tk-5", Some(("Done", true)), None, &[], 1),
            view("tk-6", None, Some("Apollo"), &[], 8),
            view("tk-7", Some(("Backlog grooming", true)), Some("Apollo"), &["ayse"], 4),
        ]
    }

    fn selected<'a>(
        views: &'a [ItemView],
        filter: &Filter,
        rules: &ClassificationRules,
    ) -> Vec<&'a str> {
        views
            .iter()
            .filter(|v| filter.matches(v, rules))
            .map(|v| v.item.id.as_str())
            .collect()
    }

    #[test]
    fn every_drill_matches_its_count() {
        for rules in [
            ClassificationRules::default(),
            ClassificationRules {
                in_progress: InProgressMode::Explicit,
                ..ClassificationRules::default()
            },
            ClassificationRules {
                archive_override: false,
                ..ClassificationRules::default()
            },
        ] {
            let views = fixture();
            for row in aggregate(&views, &rules) {
                let pairs = [
                    (Metric::Backlog, row.count(Bucket::Backlog)),
                    (Metric::Todo, row.count(Bucket::Todo)),
                    (Metric::InProgress, row.count(Bucket::InProgress)),
                    (Metric::Done, row.count(Bucket::Done)),
                    (Metric::Total, row.total_count),
                ];
                for (metric, expected) in pairs {
                    let action = drill_down(&row.key, Some(metric), &rules);
                    let hits = selected(&views, &action.filter, &rules);
                    assert_eq!(
                        u64::try_from(hits.len()).unwrap(),
                        expected,
                        "{metric} for {:?} selected {hits:?}",
                        row.key
                    );
                }
            }
        }
    }

    #[test]
    fn undefined_components_become_unset_tests() {
        let rules = ClassificationRules::default();
        let key = KpiKey {
            assignee: None,
            project: None,
            year: Some(2024),
            quarter: None,
        };
        let action = drill_down(&key, None, &rules);
        assert_eq!(action.target, DRILL_TARGET);
        assert_eq!(action.view, ViewHint::List);
        assert_eq!(action.open_in, OpenIn::Current);
        assert_eq!(
            action.filter,
            Filter::All(vec![
                Filter::Unassigned,
                Filter::NoProject,
                Filter::ReportYear(Some(2024)),
                Filter::ReportQuarter(None),
            ])
        );
    }

    #[test]
    fn archive_row_done_drill_selects_archived_item() {
        let rules = ClassificationRules::default();
        let views = fixture();
        let key = KpiKey {
            assignee: Some("ayse".into()),
            project: Some("Apollo".into()),
            year: Some(2024),
            quarter: None,
        };
        let action = drill_down(&key, Some(Metric::Done), &rules);
        assert_eq!(selected(&views, &action.filter, &rules), vec!["tk-3"]);
    }

    #[test]
    fn closed_backlog_stage_is_not_backlog() {
        let rules = ClassificationRules::default();
        let views = fixture();
        let key = KpiKey {
            assignee: Some("ayse".into()),
            project: Some("Apollo".into()),
            year: Some(2024),
            quarter: Some(Quarter::Q2),
        };
        let backlog = drill_down(&key, Some(Metric::Backlog), &rules);
        assert_eq!(selected(&views, &backlog.filter, &rules), vec!["tk-1"]);
        let done = drill_down(&key, Some(Metric::Done), &rules);
        assert_eq!(selected(&views, &done.filter, &rules), vec!["tk-7"]);
    }

    #[test]
    fn display_renders_readable_predicate() {
        let filter = Filter::All(vec![
            Filter::AssignedTo("ayse".into()),
            Filter::ReportQuarter(None),
            Filter::Not(Box::new(Filter::StagePrefix(LabelKind::Backlog))),
        ]);
        assert_eq!(
            filter.to_string(),
            "(assignee = \"ayse\" AND report_quarter IS NULL AND NOT stage ^= backlog)"
        );
    }

    #[test]
    fn filter_serializes_with_op_tags() {
        let json = serde_json::to_value(Filter::ReportYear(Some(2024))).unwrap();
        assert_eq!(json, serde_json::json!({"op": "report_year", "arg": 2024}));
        let json = serde_json::to_value(Filter::Unassigned).unwrap();
        assert_eq!(json, serde_json::json!({"op": "unassigned"}));
    }

    #[test]
    fn metric_parses_aliases() {
        assert_eq!(Metric::from_str("in-progress").unwrap(), Metric::InProgress);
        assert!(Metric::from_str("To Do").is_err());
        assert_eq!(Metric::from_str("TODO").unwrap(), Metric::Todo);
        assert!(Metric::from_str("velocity").is_err());
    }
}
