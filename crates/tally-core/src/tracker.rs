//! First-done transition tracking.
//!
//! The tracker owns the rules for the `done_at` bookkeeping field: it is
//! seeded when an item is created directly in a closed stage, stamped on the
//! first move into a closed stage, and (depending on [`ReopenPolicy`])
//! cleared when the item moves back to an open stage.
//!
//! Everything here is pure; the store applies the resulting [`DoneStamp`]
//! in the same transaction as the triggering stage write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::model::{ParseEnumError, Stage, normalize, resolve_closed};

/// What happens to `done_at` when a done item is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReopenPolicy {
    /// Clear the timestamp: it tracks "currently done since".
    #[default]
    Clear,
    /// Keep the timestamp: once done, always counted.
    Preserve,
}

impl ReopenPolicy {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Preserve => "preserve",
        }
    }
}

impl fmt::Display for ReopenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReopenPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "clear" | "revertible" => Ok(Self::Clear),
            "preserve" | "sticky" => Ok(Self::Preserve),
            _ => Err(ParseEnumError {
                expected: "reopen policy",
                got: s.to_string(),
            }),
        }
    }
}

/// Bookkeeping write requested by the tracker after a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneStamp {
    Unchanged,
    Stamp(DateTime<Utc>),
    Clear,
}

impl DoneStamp {
    /// The `done_at` value after applying this stamp to `current`.
    #[must_use]
    pub const fn apply(self, current: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        match self {
            Self::Unchanged => current,
            Self::Stamp(at) => Some(at),
            Self::Clear => None,
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Stateless transition tracker configured with a reopen policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tracker {
    policy: ReopenPolicy,
}

impl Tracker {
    #[must_use]
    pub const fn new(policy: ReopenPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> ReopenPolicy {
        self.policy
    }

    /// Initial `done_at` for a new item.
    ///
    /// A caller-supplied value is kept as-is. Otherwise an item created in a
    /// closed stage is done as of its creation moment.
    #[must_use]
    pub fn on_create(
        &self,
        stage: Option<&Stage>,
        created_at: DateTime<Utc>,
        supplied: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        if supplied.is_some() {
            return supplied;
        }
        resolve_closed(stage).then_some(created_at)
    }

    /// Bookkeeping required after an item's stage reference was written.
    ///
    /// Idempotent: re-applying the same stage yields [`DoneStamp::Unchanged`].
    #[must_use]
    pub fn on_stage_change(
        &self,
        stage: Option<&Stage>,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DoneStamp {
        match (resolve_closed(stage), current) {
            (true, None) => DoneStamp::Stamp(now),
            (false, Some(_)) if self.policy == ReopenPolicy::Clear => DoneStamp::Clear,
            _ => DoneStamp::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DoneStamp, ReopenPolicy, Tracker};
    use crate::model::{Stage, StageId};
    use chrono::{Duration, TimeZone, Utc};
    use std::str::FromStr;

    fn stage(closed: bool) -> Stage {
        Stage {
            id: StageId(if closed { 2 } else { 1 }),
            name: if closed { "Done" } else { "In Progress" }.into(),
            is_closed: Some(closed),
            fold: None,
            sequence: 0,
        }
    }

    #[test]
    fn create_in_closed_stage_seeds_creation_moment() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let tracker = Tracker::default();
        assert_eq!(
            tracker.on_create(Some(&stage(true)), created, None),
            Some(created)
        );
        assert_eq!(tracker.on_create(Some(&stage(false)), created, None), None);
        assert_eq!(tracker.on_create(None, created, None), None);
    }

    #[test]
    fn create_keeps_supplied_value() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let supplied = created - Duration::days(30);
        let tracker = Tracker::default();
        assert_eq!(
            tracker.on_create(Some(&stage(true)), created, Some(supplied)),
            Some(supplied)
        );
    }

    #[test]
    fn first_close_stamps_once() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let later = now + Duration::hours(2);
        for policy in [ReopenPolicy::Clear, ReopenPolicy::Preserve] {
            let tracker = Tracker::new(policy);
            let first = tracker.on_stage_change(Some(&stage(true)), None, now);
            assert_eq!(first, DoneStamp::Stamp(now));

            let done_at = first.apply(None);
            let second = tracker.on_stage_change(Some(&stage(true)), done_at, later);
            assert_eq!(second, DoneStamp::Unchanged);
            assert_eq!(second.apply(done_at), Some(now));
        }
    }

    #[test]
    fn reopen_depends_on_policy() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let done_at = Some(now);

        let clear = Tracker::new(ReopenPolicy::Clear);
        assert_eq!(
            clear.on_stage_change(Some(&stage(false)), done_at, now),
            DoneStamp::Clear
        );

        let preserve = Tracker::new(ReopenPolicy::Preserve);
        assert_eq!(
            preserve.on_stage_change(Some(&stage(false)), done_at, now),
            DoneStamp::Unchanged
        );
    }

    #[test]
    fn dropping_the_stage_counts_as_reopen() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let clear = Tracker::new(ReopenPolicy::Clear);
        assert_eq!(clear.on_stage_change(None, Some(now), now), DoneStamp::Clear);
        assert_eq!(clear.on_stage_change(None, None, now), DoneStamp::Unchanged);
    }

    #[test]
    fn policy_parses_aliases() {
        assert_eq!(ReopenPolicy::from_str("clear").unwrap(), ReopenPolicy::Clear);
        assert_eq!(
            ReopenPolicy::from_str("Revertible").unwrap(),
            ReopenPolicy::Clear
        );
        assert_eq!(
            ReopenPolicy::from_str("sticky").unwrap(),
            ReopenPolicy::Preserve
        );
        assert!(ReopenPolicy::from_str("never").is_err());
        assert_eq!(ReopenPolicy::Preserve.to_string(), "preserve");
    }
}
