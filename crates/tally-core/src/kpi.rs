//! Read-time KPI aggregation.
//!
//! Rows are recomputed from the current item views on every call; nothing
//! is cached or stored. Each item contributes once per assignee (or once to
//! the unassigned row) under the period chosen by
//! [`ClassificationRules::report_period`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ItemView, Quarter};
use crate::rules::{Bucket, ClassificationRules};

/// Grouping key of a KPI row. `None` components are "undefined" groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KpiKey {
    pub assignee: Option<String>,
    pub project: Option<String>,
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
}

/// One aggregated row of the KPI view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRow {
    #[serde(flatten)]
    pub key: KpiKey,
    pub backlog_count: u64,
    pub todo_count: u64,
    pub inprogress_count: u64,
    pub done_count: u64,
    pub total_count: u64,
    /// `100 * done / total`, two decimals; 0 for an empty row.
    pub done_pct: f64,
}

impl KpiRow {
    /// Count for one bucket.
    #[must_use]
    pub const fn count(&self, bucket: Bucket) -> u64 {
        match bucket {
            Bucket::Backlog => self.backlog_count,
            Bucket::Todo => self.todo_count,
            Bucket::InProgress => self.inprogress_count,
            Bucket::Done => self.done_count,
        }
    }
}

/// Optional restrictions applied to aggregated rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpiQuery {
    pub assignee: Option<String>,
    pub project: Option<String>,
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
}

impl KpiQuery {
    #[must_use]
    pub fn matches(&self, key: &KpiKey) -> bool {
        fn check<T: PartialEq>(wanted: Option<&T>, actual: Option<&T>) -> bool {
            wanted.is_none_or(|wanted| actual == Some(wanted))
        }

        check(self.assignee.as_ref(), key.assignee.as_ref())
            && check(self.project.as_ref(), key.project.as_ref())
            && check(self.year.as_ref(), key.year.as_ref())
            && check(self.quarter.as_ref(), key.quarter.as_ref())
    }
}

#[derive(Debug, Default)]
struct Counts {
    backlog: u64,
    todo: u64,
    inprogress: u64,
    done: u64,
    total: u64,
}

impl Counts {
    const fn record(&mut self, bucket: Option<Bucket>) {
        match bucket {
            Some(Bucket::Backlog) => self.backlog += 1,
            Some(Bucket::Todo) => self.todo += 1,
            Some(Bucket::InProgress) => self.inprogress += 1,
            Some(Bucket::Done) => self.done += 1,
            None => {}
        }
        self.total += 1;
    }

    fn into_row(self, key: KpiKey) -> KpiRow {
        KpiRow {
            key,
            backlog_count: self.backlog,
            todo_count: self.todo,
            inprogress_count: self.inprogress,
            done_count: self.done,
            total_count: self.total,
            done_pct: done_percentage(self.done, self.total),
        }
    }
}

/// `100 * done / total` rounded to two decimals, or 0 when `total` is 0.
#[must_use]
pub fn done_percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = done as f64 / total as f64;
    (ratio * 10_000.0).round() / 100.0
}

/// Aggregate item views into KPI rows, sorted by key.
pub fn aggregate<'a>(
    views: impl IntoIterator<Item = &'a ItemView>,
    rules: &ClassificationRules,
) -> Vec<KpiRow> {
    let mut groups: BTreeMap<KpiKey, Counts> = BTreeMap::new();

    for view in views {
        let period = rules.report_period(view);
        let bucket = rules.bucket(view.stage.as_ref());
        let project = view.project_name().map(str::to_owned);

        let mut record = |assignee: Option<String>| {
            let key = KpiKey {
                assignee,
                project: project.clone(),
                year: period.year,
                quarter: period.quarter,
            };
            groups.entry(key).or_default().record(bucket);
        };

        if view.item.assignees.is_empty() {
            record(None);
        } else {
            for assignee in &view.item.assignees {
                record(Some(assignee.clone()));
            }
        }
    }

    groups
        .into_iter()
        .map(|(key, counts)| counts.into_row(key))
        .collect()
}
