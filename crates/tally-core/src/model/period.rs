use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Calendar quarter. Serialized as `"1"`..`"4"`, displayed as `Q1`..`Q4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    #[serde(rename = "1")]
    Q1,
    #[serde(rename = "2")]
    Q2,
    #[serde(rename = "3")]
    Q3,
    #[serde(rename = "4")]
    Q4,
}

impl Quarter {
    pub const ALL: [Self; 4] = [Self::Q1, Self::Q2, Self::Q3, Self::Q4];

    /// Quarter containing `month` (1-based): `1 + (month - 1) / 3`.
    #[must_use]
    pub const fn from_month(month: u32) -> Self {
        match month {
            0..=3 => Self::Q1,
            4..=6 => Self::Q2,
            7..=9 => Self::Q3,
            _ => Self::Q4,
        }
    }

    #[must_use]
    pub const fn from_number(number: i64) -> Option<Self> {
        match number {
            1 => Some(Self::Q1),
            2 => Some(Self::Q2),
            3 => Some(Self::Q3),
            4 => Some(Self::Q4),
            _ => None,
        }
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quarter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        let digits = normalized.strip_prefix('q').unwrap_or(&normalized);
        match digits {
            "1" => Ok(Self::Q1),
            "2" => Ok(Self::Q2),
            "3" => Ok(Self::Q3),
            "4" => Ok(Self::Q4),
            _ => Err(ParseEnumError {
                expected: "quarter",
                got: s.to_string(),
            }),
        }
    }
}

/// A concrete (year, quarter) reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: Quarter,
}

impl Period {
    /// The period containing `ts` (UTC calendar).
    #[must_use]
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            quarter: Quarter::from_month(ts.month()),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.quarter)
    }
}

/// Derive the stored reporting period of an item.
///
/// The first-done timestamp wins over the creation timestamp; with neither
/// available the period is undefined.
#[must_use]
pub fn derive_period(
    created_at: Option<DateTime<Utc>>,
    done_at: Option<DateTime<Utc>>,
) -> Option<Period> {
    done_at.or(created_at).map(Period::of)
}

/// The period an item is grouped under in KPI rows.
///
/// Either part may be undefined: archive-marked stages force the quarter to
/// `None`, and items without any timestamp have no year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
}

impl From<Period> for ReportPeriod {
    fn from(period: Period) -> Self {
        Self {
            year: Some(period.year),
            quarter: Some(period.quarter),
        }
    }
}
