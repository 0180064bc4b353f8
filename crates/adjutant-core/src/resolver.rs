//! Multi-party meeting scheduling.
//!
//! A concrete retry-loop workflow over the interval engine: propose a
//! slot, check every attendee's busy calendar, and on conflict shift the
//! proposal forward inside working hours until a free slot appears or the
//! attempt budget runs out. Exhaustion returns the full attempt trail so
//! the caller can surface which attendees blocked which slots.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::sources::{deliver_best_effort, NotificationSink, SchedulingDecision};
use crate::timeline::{ScheduleItem, TimeInterval};
use crate::workflow::{run_retry_loop, CancelFlag, RetryOutcome, RetryPolicy, RetrySpec};

/// Scheduling knobs: proposal increment, working hours, attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Forward shift between successive proposals, minutes
    pub increment_min: i64,
    /// Work day opens at this hour (inclusive)
    pub work_start_hour: u32,
    /// Work day closes at this hour (exclusive)
    pub work_end_hour: u32,
    /// Proposal budget per request
    pub max_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            increment_min: 30,
            work_start_hour: 9,
            work_end_hour: 17,
            max_attempts: 3,
        }
    }
}

/// One scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub title: String,
    pub attendees: Vec<String>,
    pub duration_min: i64,
    /// Where the search starts; the first candidate begins here
    pub preferred_start: chrono::DateTime<chrono::Utc>,
}

/// Per-attendee busy calendars, keyed by attendee identifier. An attendee
/// with no entry is treated as fully free.
pub type AttendeeCalendars = BTreeMap<String, Vec<ScheduleItem>>;

/// Per-attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Every attendee was free
    Success,
    /// At least one attendee was busy
    Conflict,
    /// This conflict consumed the last attempt of the budget
    Exhausted,
}

/// Record of one proposal. Immutable once the attempt is made (the final
/// attempt's outcome is promoted from Conflict to Exhausted when the
/// budget runs out, before the trail is handed back).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingAttempt {
    pub attempt_number: u32,
    pub proposed_interval: TimeInterval,
    /// attendee -> free at the proposed interval
    pub availability: BTreeMap<String, bool>,
    pub outcome: AttemptOutcome,
}

impl SchedulingAttempt {
    /// Attendees who were busy at the proposed interval.
    pub fn blocking_attendees(&self) -> Vec<&str> {
        self.availability
            .iter()
            .filter(|(_, free)| !**free)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Terminal result of one scheduling request. Exhaustion is an answer,
/// not an error: no slot existed within the bounded search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Resolution {
    Scheduled {
        decision: SchedulingDecision,
        attempts: Vec<SchedulingAttempt>,
    },
    Exhausted {
        attempts: Vec<SchedulingAttempt>,
    },
    Cancelled {
        attempts: Vec<SchedulingAttempt>,
    },
}

impl Resolution {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Resolution::Scheduled { .. })
    }

    pub fn attempts(&self) -> &[SchedulingAttempt] {
        match self {
            Resolution::Scheduled { attempts, .. }
            | Resolution::Exhausted { attempts }
            | Resolution::Cancelled { attempts } => attempts,
        }
    }
}

/// Iterative scheduling resolver.
pub struct SchedulingResolver {
    config: ResolverConfig,
}

impl SchedulingResolver {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve one request against the attendees' busy calendars.
    ///
    /// Fails only on malformed input (non-positive duration, or a meeting
    /// longer than the work day, which no candidate could ever satisfy).
    pub async fn resolve(
        &self,
        request: &MeetingRequest,
        calendars: &AttendeeCalendars,
        cancel: &CancelFlag,
    ) -> Result<Resolution, ValidationError> {
        if self.config.work_start_hour >= self.config.work_end_hour
            || self.config.work_end_hour > 24
        {
            return Err(ValidationError::InvalidValue {
                field: "work_hours".to_string(),
                message: format!(
                    "[{}, {}) is not a valid work-hour window",
                    self.config.work_start_hour, self.config.work_end_hour
                ),
            });
        }
        let work_minutes =
            (self.config.work_end_hour as i64 - self.config.work_start_hour as i64) * 60;
        if request.duration_min <= 0 || request.duration_min > work_minutes {
            return Err(ValidationError::InvalidValue {
                field: "duration_min".to_string(),
                message: format!(
                    "{} min does not fit the {}-minute work day",
                    request.duration_min, work_minutes
                ),
            });
        }

        // The preferred slot itself must respect work hours before the
        // availability search begins.
        let initial = clamp_to_work_hours(
            &TimeInterval::from_start(request.preferred_start, request.duration_min)?,
            &self.config,
        );
        let policy = RetryPolicy {
            max_attempts: self.config.max_attempts,
            retry_delay_ms: 0,
        };
        let spec = AvailabilityCheck {
            request,
            calendars,
            config: &self.config,
        };

        debug!(
            title = %request.title,
            attendees = request.attendees.len(),
            start = %initial.start(),
            "scheduling search started"
        );

        let resolution = match run_retry_loop(&spec, initial, &policy, cancel).await {
            RetryOutcome::Solved {
                solution,
                mut rejections,
                ..
            } => {
                rejections.push(solution.attempt.clone());
                info!(
                    title = %request.title,
                    slot = %solution.attempt.proposed_interval.start(),
                    "meeting scheduled"
                );
                Resolution::Scheduled {
                    decision: solution.decision,
                    attempts: rejections,
                }
            }
            RetryOutcome::Exhausted { mut rejections } => {
                // The final conflict is what ended the search.
                if let Some(last) = rejections.last_mut() {
                    last.outcome = AttemptOutcome::Exhausted;
                }
                info!(
                    title = %request.title,
                    attempts = rejections.len(),
                    "scheduling search exhausted"
                );
                Resolution::Exhausted {
                    attempts: rejections,
                }
            }
            RetryOutcome::Cancelled { rejections } => Resolution::Cancelled {
                attempts: rejections,
            },
        };
        Ok(resolution)
    }

    /// Resolve and, on success, hand the decision to the sink.
    ///
    /// Delivery is fire-and-forget: a sink failure is logged and the
    /// Scheduled resolution stands.
    pub async fn resolve_and_notify(
        &self,
        request: &MeetingRequest,
        calendars: &AttendeeCalendars,
        sink: &dyn NotificationSink,
        cancel: &CancelFlag,
    ) -> Result<Resolution, ValidationError> {
        let resolution = self.resolve(request, calendars, cancel).await?;
        if let Resolution::Scheduled { decision, .. } = &resolution {
            deliver_best_effort(sink, decision).await;
        }
        Ok(resolution)
    }
}

impl Default for SchedulingResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful attempt payload carried out of the retry loop.
struct ScheduledSlot {
    decision: SchedulingDecision,
    attempt: SchedulingAttempt,
}

/// The retry-loop problem: one availability check per candidate slot.
struct AvailabilityCheck<'a> {
    request: &'a MeetingRequest,
    calendars: &'a AttendeeCalendars,
    config: &'a ResolverConfig,
}

#[async_trait]
impl RetrySpec for AvailabilityCheck<'_> {
    type Candidate = TimeInterval;
    type Solution = ScheduledSlot;
    type Rejection = SchedulingAttempt;

    async fn attempt(
        &self,
        attempt_number: u32,
        candidate: &TimeInterval,
    ) -> Result<ScheduledSlot, SchedulingAttempt> {
        let mut availability = BTreeMap::new();
        for attendee in &self.request.attendees {
            let busy = self
                .calendars
                .get(attendee)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let free = !busy.iter().any(|item| item.overlaps(candidate));
            availability.insert(attendee.clone(), free);
        }

        let all_free = availability.values().all(|free| *free);
        let attempt = SchedulingAttempt {
            attempt_number,
            proposed_interval: *candidate,
            availability,
            outcome: if all_free {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::Conflict
            },
        };

        if all_free {
            Ok(ScheduledSlot {
                decision: SchedulingDecision {
                    title: self.request.title.clone(),
                    interval: *candidate,
                    attendees: self.request.attendees.clone(),
                },
                attempt,
            })
        } else {
            debug!(
                attempt_number,
                blocked_by = ?attempt.blocking_attendees(),
                "slot rejected"
            );
            Err(attempt)
        }
    }

    /// Shift forward by the increment, skipping non-working hours: a
    /// proposal that would spill past the work-day close jumps to the
    /// next day's opening instead.
    fn next_candidate(&self, failed: &TimeInterval) -> Option<TimeInterval> {
        let shifted = failed.shifted_by(self.config.increment_min);
        Some(clamp_to_work_hours(&shifted, self.config))
    }
}

/// Move a candidate into the configured work hours, preserving duration.
/// Candidates already inside the window pass through unchanged.
fn clamp_to_work_hours(candidate: &TimeInterval, config: &ResolverConfig) -> TimeInterval {
    let open = NaiveTime::from_hms_opt(config.work_start_hour, 0, 0).expect("valid work hour");
    let duration = candidate.duration_minutes();

    let day_open = candidate
        .start()
        .date_naive()
        .and_time(open)
        .and_utc();
    let day_close = day_open
        + Duration::hours((config.work_end_hour - config.work_start_hour) as i64);

    if candidate.start() < day_open {
        // Before opening: snap forward to today's opening.
        return TimeInterval::from_start(day_open, duration).expect("positive duration");
    }
    if candidate.end() > day_close || candidate.start().hour() >= config.work_end_hour {
        // Would spill past closing: first slot of the next work day.
        let next_open = day_open + Duration::days(1);
        return TimeInterval::from_start(next_open, duration).expect("positive duration");
    }
    *candidate
}
