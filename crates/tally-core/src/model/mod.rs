//! Domain records: stages, projects, work items and reporting periods.

pub mod item;
pub mod period;
pub mod stage;

pub use item::{ItemUpdate, ItemView, NewItem, Project, ProjectId, WorkItem};
pub use period::{Period, Quarter, ReportPeriod, derive_period};
pub use stage::{NewStage, Stage, StageId, resolve_closed};

use std::fmt;

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl From<ParseEnumError> for crate::error::TallyError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidEnumValue {
            expected: err.expected,
            got: err.got,
        }
    }
}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}
