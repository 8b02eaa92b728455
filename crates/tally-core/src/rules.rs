//! Text-pattern classification of stages.
//!
//! Bucket membership and period overrides are driven by stage display
//! names. All of those rules live here so the KPI view and the drill-down
//! predicates evaluate exactly the same tests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::config::{LabelsConfig, ProjectConfig};
use crate::model::{ItemView, ParseEnumError, ReportPeriod, Stage, derive_period, normalize, resolve_closed};

/// Recognised spellings of "archive" in archive markers.
pub const ARCHIVE_SPELLINGS: &[&str] = &["arşiv", "arsiv", "archive"];

/// A four-digit year (1000-2999) followed by an archive spelling, e.g.
/// `2024 Arşiv`, `2023arsiv`, `2024 Archive`.
static ARCHIVE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([12][0-9]{3})\s*(?:ar[sş][iİ]v|archive)").expect("valid archive marker regex")
});

/// Year encoded by an archive marker in a stage name, if any.
///
/// Text that does not match the marker pattern is simply not an archive
/// stage.
#[must_use]
pub fn archive_year(stage_name: &str) -> Option<i32> {
    let captures = ARCHIVE_MARKER.captures(stage_name)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Case-insensitive prefix test against a list of labels. Leading
/// whitespace in the stage name is ignored.
#[must_use]
pub fn starts_with_any(stage_name: &str, prefixes: &[String]) -> bool {
    let name = stage_name.trim_start().to_lowercase();
    prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && name.starts_with(&prefix.to_lowercase()))
}

/// The four mutually exclusive status buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Backlog,
    Todo,
    InProgress,
    Done,
}

impl Bucket {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label families matched by stage-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Backlog,
    Todo,
    InProgress,
}

impl LabelKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How non-done items that match neither backlog nor to-do are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InProgressMode {
    /// Everything left over is in progress.
    #[default]
    CatchAll,
    /// Only stages with an in-progress label; the rest count only in totals.
    Explicit,
}

impl FromStr for InProgressMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).replace('-', "_").as_str() {
            "catch_all" | "catchall" => Ok(Self::CatchAll),
            "explicit" => Ok(Self::Explicit),
            _ => Err(ParseEnumError {
                expected: "in-progress mode",
                got: s.to_string(),
            }),
        }
    }
}

/// Bucket and period rules shared by aggregation and drill-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    pub labels: LabelsConfig,
    pub in_progress: InProgressMode,
    /// When false, archive markers are ignored entirely.
    pub archive_override: bool,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            labels: LabelsConfig::default(),
            in_progress: InProgressMode::default(),
            archive_override: true,
        }
    }
}

impl ClassificationRules {
    #[must_use]
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            labels: config.labels.clone(),
            in_progress: config.report.in_progress,
            archive_override: config.report.archive_override,
        }
    }

    fn prefixes(&self, kind: LabelKind) -> &[String] {
        match kind {
            LabelKind::Backlog => &self.labels.backlog,
            LabelKind::Todo => &self.labels.todo,
            LabelKind::InProgress => &self.labels.in_progress,
        }
    }

    /// Archive-marker year of a stage, honouring `archive_override`.
    #[must_use]
    pub fn archive_year_of(&self, stage: Option<&Stage>) -> Option<i32> {
        if !self.archive_override {
            return None;
        }
        stage.and_then(|stage| archive_year(&stage.name))
    }

    /// Whether a stage name carries a label of `kind`.
    #[must_use]
    pub fn has_label(&self, kind: LabelKind, stage_name: Option<&str>) -> bool {
        stage_name.is_some_and(|name| starts_with_any(name, self.prefixes(kind)))
    }

    /// Done classification: a closed stage or an archive-marked stage.
    #[must_use]
    pub fn is_done(&self, stage: Option<&Stage>) -> bool {
        resolve_closed(stage) || self.archive_year_of(stage).is_some()
    }

    /// The bucket an item in `stage` counts under.
    ///
    /// `None` only happens in [`InProgressMode::Explicit`], for open stages
    /// that carry none of the recognised labels.
    #[must_use]
    pub fn bucket(&self, stage: Option<&Stage>) -> Option<Bucket> {
        if self.is_done(stage) {
            return Some(Bucket::Done);
        }

        let name = stage.map(|stage| stage.name.as_str());
        if self.has_label(LabelKind::Backlog, name) {
            Some(Bucket::Backlog)
        } else if self.has_label(LabelKind::Todo, name) {
            Some(Bucket::Todo)
        } else {
            match self.in_progress {
                InProgressMode::CatchAll => Some(Bucket::InProgress),
                InProgressMode::Explicit => self
                    .has_label(LabelKind::InProgress, name)
                    .then_some(Bucket::InProgress),
            }
        }
    }

    /// The period an item is reported under.
    ///
    /// Precedence: an archive marker in the stage name (quarter forced to
    /// undefined), then the item's stored period fields, then the period
    /// computed from its first-done or creation timestamp.
    #[must_use]
    pub fn report_period(&self, view: &ItemView) -> ReportPeriod {
        if let Some(year) = self.archive_year_of(view.stage.as_ref()) {
            return ReportPeriod {
                year: Some(year),
                quarter: None,
            };
        }

        let computed = derive_period(Some(view.item.created_at), view.item.done_at);
        ReportPeriod {
            year: view
                .item
                .report_year
                .or_else(|| computed.map(|period| period.year)),
            quarter: view
                .item
                .report_quarter
                .or_else(|| computed.map(|period| period.quarter)),
        }
    }
}
