//! Aggregation periods and the time windows they cover.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FinanceError;

/// Current UTC time at whole-second precision, the resolution timestamps
/// are stored at.
pub fn now_utc() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Resolve an optional query value for reporting. Anything missing or
    /// unrecognised falls back to [`Period::Monthly`].
    pub fn resolve_or_monthly(value: Option<&str>) -> Self {
        match value.map(str::parse::<Period>) {
            Some(Ok(period)) => period,
            Some(Err(_)) => {
                tracing::debug!(requested = ?value, "unknown period, using monthly");
                Self::Monthly
            }
            None => Self::Monthly,
        }
    }

    /// Window ending at `now`: the last seven days, the current calendar
    /// month, or the current calendar year.
    pub fn window(self, now: NaiveDateTime) -> Window {
        let today = now.date();
        let start = match self {
            Self::Weekly => now - Duration::days(7),
            Self::Monthly => midnight(today - Duration::days(i64::from(today.day0()))),
            Self::Yearly => midnight(today - Duration::days(i64::from(today.ordinal0()))),
        };
        Window { start, end: now }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(FinanceError::invalid(
                "period",
                format!("period must be one of weekly, monthly, yearly (got '{other}')"),
            )),
        }
    }
}

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(at: NaiveDateTime) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Chronological iterator over the `count` months ending with the month of
/// `now`. Cheap to rebuild, so callers restart by calling
/// [`trailing_months`] again.
#[derive(Debug, Clone)]
pub struct TrailingMonths {
    next: YearMonth,
    remaining: usize,
}

pub fn trailing_months(now: NaiveDateTime, count: usize) -> TrailingMonths {
    let mut first = YearMonth::of(now);
    for _ in 1..count {
        first = first.prev();
    }
    TrailingMonths {
        next: first,
        remaining: count,
    }
}

impl Iterator for TrailingMonths {
    type Item = YearMonth;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.next = current.next();
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for TrailingMonths {}
