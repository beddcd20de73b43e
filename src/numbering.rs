// Human-readable request numbers.
//
// Two layouts are in use:
//
// * year + counter: `CRT-20260001`, `DEL-…`, `ATR-…`, and `PWD-2026-00001`
//   for password resets (separator and five digits);
// * date + counter: `GRP20261018001` for group and network requests.
//
// The counter restarts each period. The next number is derived from the last
// stored one for the same period prefix, inside the transaction that inserts
// the new row.

use chrono::{DateTime, Utc};

use crate::db::models::requests::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// `<PREFIX>-<YYYY>[-]`
    Year { separator: bool },
    /// `<PREFIX><YYYYMMDD>`
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingScheme {
    pub prefix: &'static str,
    pub period: Period,
    pub width: usize,
}

impl NumberingScheme {
    pub fn for_kind(kind: RequestKind) -> Self {
        let year = |prefix: &'static str| NumberingScheme {
            prefix,
            period: Period::Year { separator: false },
            width: 4,
        };
        let day = |prefix: &'static str| NumberingScheme { prefix, period: Period::Day, width: 3 };

        match kind {
            RequestKind::Creation => year("CRT"),
            RequestKind::Deletion => year("DEL"),
            RequestKind::Attribute => year("ATR"),
            RequestKind::Password => NumberingScheme {
                prefix: "PWD",
                period: Period::Year { separator: true },
                width: 5,
            },
            RequestKind::Group => day("GRP"),
            RequestKind::Network => day("NET"),
        }
    }

    /// Everything before the counter for the period containing `now`.
    pub fn period_prefix(&self, now: DateTime<Utc>) -> String {
        match self.period {
            Period::Year { separator: false } => format!("{}-{}", self.prefix, now.format("%Y")),
            Period::Year { separator: true } => format!("{}-{}-", self.prefix, now.format("%Y")),
            Period::Day => format!("{}{}", self.prefix, now.format("%Y%m%d")),
        }
    }

    pub fn format(&self, period_prefix: &str, counter: u32) -> String {
        format!("{period_prefix}{counter:0width$}", width = self.width)
    }

    /// Next number after `last` within `period_prefix`. A missing or
    /// unparseable predecessor starts the period at 1.
    pub fn next(&self, period_prefix: &str, last: Option<&str>) -> String {
        let counter = last
            .and_then(|number| number.strip_prefix(period_prefix))
            .and_then(|digits| digits.parse::<u32>().ok())
            .map_or(1, |current| current.saturating_add(1));
        self.format(period_prefix, counter)
    }
}

/// Numeric suffix of a request number (period digits included for the
/// unseparated layouts). Monotonic within a period.
pub fn counter_of(number: &str) -> Option<u64> {
    let digits: String = number
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}
