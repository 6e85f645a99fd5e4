//! Contribution scheduling.

use core::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use ajo_core::{DomainError, DomainResult};

/// How often members contribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Weekly,
    #[serde(rename = "Bi-Weekly")]
    BiWeekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Weekly => "Weekly",
            Frequency::BiWeekly => "Bi-Weekly",
            Frequency::Monthly => "Monthly",
        }
    }

    pub fn next_date(self, from: DateTime<Utc>) -> DomainResult<DateTime<Utc>> {
        next_date(self, from)
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Weekly" => Ok(Frequency::Weekly),
            "Bi-Weekly" => Ok(Frequency::BiWeekly),
            "Monthly" => Ok(Frequency::Monthly),
            other => Err(DomainError::validation(format!(
                "frequency must be Weekly, Bi-Weekly or Monthly (got {other:?})"
            ))),
        }
    }
}

impl core::fmt::Display for Frequency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The next contribution date after `from`.
///
/// Monthly steps land on the same day of the next month, clamped to that month's
/// last day (Jan 31 -> Feb 29 in a leap year). Time of day is preserved.
pub fn next_date(frequency: Frequency, from: DateTime<Utc>) -> DomainResult<DateTime<Utc>> {
    let next = match frequency {
        Frequency::Weekly => from.checked_add_signed(Duration::days(7)),
        Frequency::BiWeekly => from.checked_add_signed(Duration::days(14)),
        Frequency::Monthly => from.checked_add_months(Months::new(1)),
    };
    next.ok_or_else(|| DomainError::invariant("contribution date out of range"))
}
