//! Time windows used to bound extraction queries.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A closed `[start, end]` interval at millisecond precision (UTC).
///
/// `sequence` is 1-based and fixes the window's position inside its day;
/// artifact names are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub sequence: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(sequence: usize, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            sequence,
            start,
            end,
        }
    }

    /// Inclusive lower bound, e.g. `2024-03-01T00:00:00.000Z`.
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Inclusive upper bound, e.g. `2024-03-01T01:59:59.999Z`.
    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} [{} .. {}]",
            self.sequence,
            self.start_rfc3339(),
            self.end_rfc3339()
        )
    }
}
