/// Calendar projection: derives iCalendar items from tagged tasks and
/// answers CalDAV-level queries over them.
pub mod derive;
pub mod ics;
pub mod query;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Event,
    Todo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Confirmed,
    NeedsAction,
    Completed,
}

impl ItemStatus {
    pub fn as_ical(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::NeedsAction => "NEEDS-ACTION",
            Self::Completed => "COMPLETED",
        }
    }
}

/// A point in floating local time: a bare date (all-day) or a date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalTime {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CalTime {
    /// Collapse to a date-time for range comparisons (dates become their
    /// local midnight).
    pub fn as_datetime(&self) -> NaiveDateTime {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default(),
            Self::DateTime(dt) => *dt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarItem {
    /// Deterministic hash of (board id, column title, first line,
    /// occurrence index). Stable only while task order/text is unchanged.
    pub uid: String,
    pub kind: ItemKind,
    pub summary: String,
    pub start: Option<CalTime>,
    pub end: Option<CalTime>,
    pub due: Option<NaiveDate>,
    pub status: ItemStatus,
    pub categories: Vec<String>,
    /// Board id the item was derived from.
    pub source_board: String,
}

impl CalendarItem {
    /// The date used for time-range filtering; items without one always
    /// pass a time-range filter.
    pub fn primary_time(&self) -> Option<NaiveDateTime> {
        self.start
            .map(|t| t.as_datetime())
            .or_else(|| self.due.and_then(|d| d.and_hms_opt(0, 0, 0)))
    }
}
