//! Calendar interval analysis.
//!
//! This module provides:
//! - Half-open time intervals with a validated start < end invariant
//! - Overlap detection between calendar occupants
//! - Conflict clustering (transitive overlap groups)
//! - Gap extraction and fragmentation scoring

mod conflict;
mod gap;

pub use conflict::{find_conflicts, ConflictSet};
pub use gap::{
    compute_gaps, fragmentation_score, FragmentationReport, GapAnalyzer, GapConfig,
};

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open time interval `[start, end)`.
///
/// Invariant: `start < end`, enforced at construction. Immutable once
/// created; every mutation path (including deserialization) goes through
/// the validating constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = ValidationError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start, raw.end)
    }
}

impl TimeInterval {
    /// Create a new interval. Rejects `start >= end` so malformed data
    /// never reaches the analysis functions.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Interval starting at `start` lasting `minutes`.
    pub fn from_start(start: DateTime<Utc>, minutes: i64) -> Result<Self, ValidationError> {
        Self::new(start, start + Duration::minutes(minutes))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Get duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Check whether two intervals overlap.
    ///
    /// Half-open semantics: touching endpoints (`a.end == b.start`) do NOT
    /// overlap. Adjacency must never count as a conflict.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The shared sub-interval, if the two overlap.
    pub fn intersection(&self, other: &TimeInterval) -> Option<TimeInterval> {
        if !self.overlaps(other) {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        // Overlap guarantees start < end here.
        Some(Self { start, end })
    }

    /// Smallest interval covering both.
    pub fn span(&self, other: &TimeInterval) -> TimeInterval {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Shift the whole interval forward by `minutes`.
    pub fn shifted_by(&self, minutes: i64) -> TimeInterval {
        Self {
            start: self.start + Duration::minutes(minutes),
            end: self.end + Duration::minutes(minutes),
        }
    }
}

/// Check whether two intervals overlap (free-function form).
pub fn overlaps(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.overlaps(b)
}

/// A calendar occupant: one busy block with its attendees.
///
/// Never mutated after ingestion; replacing an event means building a new
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: String,
    pub title: String,
    pub interval: TimeInterval,
    pub attendees: BTreeSet<String>,
}

impl ScheduleItem {
    /// Create a new schedule item
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        interval: TimeInterval,
        attendees: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            interval,
            attendees: attendees.into_iter().collect(),
        }
    }

    /// Check if this item overlaps a candidate interval
    pub fn overlaps(&self, interval: &TimeInterval) -> bool {
        self.interval.overlaps(interval)
    }

    pub fn duration_minutes(&self) -> i64 {
        self.interval.duration_minutes()
    }
}

#[cfg(test)]
pub(crate) fn make_test_interval(start_min: i64, end_min: i64) -> TimeInterval {
    use chrono::TimeZone;
    let base = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
    TimeInterval::new(
        base + Duration::minutes(start_min),
        base + Duration::minutes(end_min),
    )
    .unwrap()
}
