use serde::{Deserialize, Serialize};
use std::fmt;

/// Row identifier of a stage in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub i64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named phase a work item occupies.
///
/// Stages are owned outside the tracker and are read-only input here. Older
/// stage records carry no explicit closed flag, only `fold`; see
/// [`Stage::closed_flag`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub is_closed: Option<bool>,
    pub fold: Option<bool>,
    pub sequence: i64,
}

impl Stage {
    /// Resolve the closed classification of this stage.
    ///
    /// An explicit closed flag wins; without one the folded flag is used;
    /// with neither the stage is open.
    #[must_use]
    pub const fn closed_flag(&self) -> bool {
        match (self.is_closed, self.fold) {
            (Some(closed), _) => closed,
            (None, Some(fold)) => fold,
            (None, None) => false,
        }
    }
}

/// Closed classification of a possibly-unresolvable stage reference.
///
/// A missing stage is open, never an error.
#[must_use]
pub fn resolve_closed(stage: Option<&Stage>) -> bool {
    stage.is_some_and(Stage::closed_flag)
}

/// Input for registering a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewStage {
    pub name: String,
    pub is_closed: Option<bool>,
    pub fold: Option<bool>,
    pub sequence: i64,
}

impl NewStage {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn closed(mut self, closed: bool) -> Self {
        self.is_closed = Some(closed);
        self
    }

    #[must_use]
    pub const fn folded(mut self, fold: bool) -> Self {
        self.fold = Some(fold);
        self
    }

    #[must_use]
    pub const fn at(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }
}
