//! Prebuilt coordination workflows.
//!
//! Binds the collaborator traits to the engines through orchestrator
//! stages: a sequential daily-briefing pipeline (degrade policy, so one
//! dead source never kills the briefing) and a fan-out meeting-prep
//! pipeline. Also the schedule-health report combining the interval
//! engine's outputs into a single 0-100 rating.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::sources::{
    CalendarSource, FetchRetryConfig, MessageSource, RawEvent, RawMessage, TextExtractor,
};
use crate::timeline::{find_conflicts, ConflictSet, FragmentationReport, GapAnalyzer, GapConfig, ScheduleItem, TimeInterval};
use crate::triage::Classifier;
use crate::workflow::{FailurePolicy, Pipeline, Stage, StageContext, StageFailure};
use crate::error::WorkflowError;

// ── Schedule health ──────────────────────────────────────────────

/// Penalty weights for the schedule-health score. Starting points, not
/// calibrated truth; only the direction of each term is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Subtracted per conflict cluster
    pub conflict_penalty: f64,
    /// Subtracted per consecutive-meeting pair with too little buffer
    pub buffer_penalty: f64,
    /// Maximum focus-deficit subtraction
    pub focus_weight: f64,
    /// Subtracted per meeting beyond the back-to-back limit
    pub overload_penalty: f64,
    /// Minimum breathing room between consecutive meetings, minutes
    pub min_buffer_min: i64,
    /// Contiguous free minutes counted as a full focus block
    pub focus_target_min: i64,
    /// Back-to-back meetings tolerated before the overload penalty
    pub max_consecutive: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            conflict_penalty: 30.0,
            buffer_penalty: 5.0,
            focus_weight: 20.0,
            overload_penalty: 10.0,
            min_buffer_min: 15,
            focus_target_min: 90,
            max_consecutive: 3,
        }
    }
}

/// One day's schedule rated 0-100, with the evidence attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleHealth {
    /// 100 = clean calendar, 0 = unworkable
    pub score: f64,
    pub conflicts: Vec<ConflictSet>,
    pub fragmentation: FragmentationReport,
    /// Consecutive pairs with less than the minimum buffer between them
    pub missing_buffers: usize,
    /// Longest back-to-back run of meetings
    pub longest_consecutive_run: usize,
}

/// Rate a day's schedule.
///
/// Starts at 100 and subtracts: a fixed penalty per conflict cluster, a
/// fixed penalty per missing buffer, a focus-deficit term proportional to
/// how far the longest free block falls short of the target, and a fixed
/// penalty per meeting beyond the back-to-back tolerance. Clamped to
/// [0, 100].
pub fn schedule_health(
    items: &[ScheduleItem],
    bounds: &TimeInterval,
    health_config: &HealthConfig,
    gap_config: &GapConfig,
) -> ScheduleHealth {
    let conflicts = find_conflicts(items);
    let fragmentation = GapAnalyzer::with_config(*gap_config).analyze(items, bounds);

    let mut sorted: Vec<&ScheduleItem> = items.iter().collect();
    sorted.sort_by_key(|item| item.interval.start());

    // Buffer and back-to-back analysis over consecutive pairs.
    // Overlapping pairs are already penalized as conflicts, so only
    // non-overlapping pairs count against the buffer.
    let mut missing_buffers = 0usize;
    let mut longest_run = usize::from(!sorted.is_empty());
    let mut run = longest_run;
    for pair in sorted.windows(2) {
        let rest = (pair[1].interval.start() - pair[0].interval.end()).num_minutes();
        if (0..health_config.min_buffer_min).contains(&rest) {
            missing_buffers += 1;
        }
        if rest < health_config.min_buffer_min {
            run += 1;
            longest_run = longest_run.max(run);
        } else {
            run = 1;
        }
    }

    let mut score = 100.0;
    score -= health_config.conflict_penalty * conflicts.len() as f64;
    score -= health_config.buffer_penalty * missing_buffers as f64;

    let longest_focus_min = fragmentation
        .longest_focus_block
        .map_or(0, |block| block.duration_minutes());
    let focus_ratio = (longest_focus_min as f64 / health_config.focus_target_min as f64).min(1.0);
    score -= health_config.focus_weight * (1.0 - focus_ratio);

    let excess = longest_run.saturating_sub(health_config.max_consecutive);
    score -= health_config.overload_penalty * excess as f64;

    ScheduleHealth {
        score: score.clamp(0.0, 100.0),
        conflicts,
        fragmentation,
        missing_buffers,
        longest_consecutive_run: longest_run,
    }
}

// ── Pipeline stages ──────────────────────────────────────────────

fn events_to_items(events: &[RawEvent]) -> Result<Vec<ScheduleItem>, StageFailure> {
    events
        .iter()
        .map(|event| {
            let interval = TimeInterval::new(event.start, event.end)
                .map_err(|err| StageFailure::malformed(err.to_string()))?;
            Ok(ScheduleItem::new(
                event.id.clone(),
                event.title.clone(),
                interval,
                event.attendees.iter().cloned(),
            ))
        })
        .collect()
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StageFailure> {
    serde_json::to_value(value).map_err(|err| StageFailure::malformed(err.to_string()))
}

/// Fetches raw messages; publishes them under `messages`.
pub struct FetchMessagesStage {
    source: Arc<dyn MessageSource>,
    retry: FetchRetryConfig,
}

impl FetchMessagesStage {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self {
            source,
            retry: FetchRetryConfig::default(),
        }
    }
}

#[async_trait]
impl Stage for FetchMessagesStage {
    fn name(&self) -> &str {
        "messages"
    }

    async fn run(&self, _ctx: &StageContext) -> Result<Value, StageFailure> {
        let messages = crate::sources::fetch_with_retry(&self.retry, "messages", || {
            self.source.fetch_messages()
        })
        .await
        .map_err(|err| StageFailure::unavailable(err.to_string()))?;
        debug!(count = messages.len(), "messages fetched");
        encode(&messages)
    }
}

/// Ask the extractor for a deadline hint on one message. Advisory only:
/// a failed or empty extraction leaves the deadline unset, it never
/// fails the stage. The highest-confidence dated action item wins.
async fn extracted_deadline(
    extractor: Option<&Arc<dyn TextExtractor>>,
    message: &RawMessage,
) -> Option<DateTime<Utc>> {
    let extractor = extractor?;
    match extractor.extract(&message.body).await {
        Ok(items) => items
            .into_iter()
            .filter(|item| item.deadline.is_some())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .and_then(|item| item.deadline),
        Err(err) => {
            debug!(message_id = %message.id, error = %err, "action-item extraction failed");
            None
        }
    }
}

/// Scores and buckets the fetched messages; publishes a `TriageReport`
/// under `triage`.
pub struct TriageMessagesStage {
    classifier: Classifier,
    extractor: Option<Arc<dyn TextExtractor>>,
    now: DateTime<Utc>,
}

impl TriageMessagesStage {
    pub fn new(classifier: Classifier, now: DateTime<Utc>) -> Self {
        Self {
            classifier,
            extractor: None,
            now,
        }
    }

    /// Feed extracted action-item deadlines into scoring.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }
}

#[async_trait]
impl Stage for TriageMessagesStage {
    fn name(&self) -> &str {
        "triage"
    }

    fn reads(&self) -> Vec<String> {
        vec!["messages".to_string()]
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, StageFailure> {
        let messages: Vec<RawMessage> = ctx
            .get_as("messages")
            .ok_or_else(|| StageFailure::unavailable("no messages to triage"))?;

        let mut signals = Vec::with_capacity(messages.len());
        for m in &messages {
            let deadline = extracted_deadline(self.extractor.as_ref(), m).await;
            signals.push(self.classifier.engine().scan_signals(m, deadline, None, self.now));
        }
        let report = self
            .classifier
            .classify_batch(&signals)
            .map_err(|err| StageFailure::malformed(err.to_string()))?;
        encode(&report)
    }
}

/// Fetches raw calendar events for the analysis window; publishes them
/// under `calendar`.
pub struct FetchCalendarStage {
    source: Arc<dyn CalendarSource>,
    range: TimeInterval,
    retry: FetchRetryConfig,
}

impl FetchCalendarStage {
    pub fn new(source: Arc<dyn CalendarSource>, range: TimeInterval) -> Self {
        Self {
            source,
            range,
            retry: FetchRetryConfig::default(),
        }
    }
}

#[async_trait]
impl Stage for FetchCalendarStage {
    fn name(&self) -> &str {
        "calendar"
    }

    async fn run(&self, _ctx: &StageContext) -> Result<Value, StageFailure> {
        let events = crate::sources::fetch_with_retry(&self.retry, "calendar", || {
            self.source.fetch_events(&self.range)
        })
        .await
        .map_err(|err| StageFailure::unavailable(err.to_string()))?;
        debug!(count = events.len(), "calendar events fetched");
        encode(&events)
    }
}

/// Runs the interval engine over the fetched events; publishes a
/// `ScheduleHealth` under `analysis`.
pub struct AnalyzeCalendarStage {
    bounds: TimeInterval,
    health_config: HealthConfig,
    gap_config: GapConfig,
}

impl AnalyzeCalendarStage {
    pub fn new(bounds: TimeInterval) -> Self {
        Self {
            bounds,
            health_config: HealthConfig::default(),
            gap_config: GapConfig::default(),
        }
    }
}

#[async_trait]
impl Stage for AnalyzeCalendarStage {
    fn name(&self) -> &str {
        "analysis"
    }

    fn reads(&self) -> Vec<String> {
        vec!["calendar".to_string()]
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, StageFailure> {
        let events: Vec<RawEvent> = ctx
            .get_as("calendar")
            .ok_or_else(|| StageFailure::unavailable("no calendar to analyze"))?;
        let items = events_to_items(&events)?;
        let health = schedule_health(&items, &self.bounds, &self.health_config, &self.gap_config);
        encode(&health)
    }
}

/// Composes the final briefing from whatever upstream slots completed.
/// Never fails on a missing slot; each absent section is marked
/// unavailable instead, so a degraded run still yields a briefing.
pub struct ComposeBriefingStage {
    generated_at: DateTime<Utc>,
}

impl ComposeBriefingStage {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }
}

#[async_trait]
impl Stage for ComposeBriefingStage {
    fn name(&self) -> &str {
        "briefing"
    }

    fn reads(&self) -> Vec<String> {
        vec!["triage".to_string(), "analysis".to_string()]
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, StageFailure> {
        let triage: Option<crate::triage::TriageReport> = ctx.get_as("triage");
        let analysis: Option<ScheduleHealth> = ctx.get_as("analysis");

        let priorities = triage.as_ref().map(|report| {
            report
                .ranked
                .iter()
                .take(3)
                .map(|item| json!({"id": item.source_id, "action": item.quadrant.action()}))
                .collect::<Vec<_>>()
        });
        let insights = triage.as_ref().map(|report| report.insights.clone());
        let schedule = analysis.as_ref().map(|health| {
            json!({
                "health_score": health.score,
                "conflict_count": health.conflicts.len(),
                "longest_focus_block_min": health
                    .fragmentation
                    .longest_focus_block
                    .map(|b| b.duration_minutes()),
            })
        });

        Ok(json!({
            "generated_at": self.generated_at,
            "top_priorities": priorities.unwrap_or_default(),
            "insights": insights.unwrap_or_default(),
            "schedule": schedule.unwrap_or(json!("unavailable")),
        }))
    }
}

/// Fan-out branch: fetch and triage messages in one independent unit.
pub struct MessagePrepStage {
    source: Arc<dyn MessageSource>,
    classifier: Classifier,
    extractor: Option<Arc<dyn TextExtractor>>,
    retry: FetchRetryConfig,
    now: DateTime<Utc>,
}

#[async_trait]
impl Stage for MessagePrepStage {
    fn name(&self) -> &str {
        "triage"
    }

    async fn run(&self, _ctx: &StageContext) -> Result<Value, StageFailure> {
        let messages = crate::sources::fetch_with_retry(&self.retry, "messages", || {
            self.source.fetch_messages()
        })
        .await
        .map_err(|err| StageFailure::unavailable(err.to_string()))?;

        let mut signals = Vec::with_capacity(messages.len());
        for m in &messages {
            let deadline = extracted_deadline(self.extractor.as_ref(), m).await;
            signals.push(self.classifier.engine().scan_signals(m, deadline, None, self.now));
        }
        let report = self
            .classifier
            .classify_batch(&signals)
            .map_err(|err| StageFailure::malformed(err.to_string()))?;
        encode(&report)
    }
}

/// Fan-out branch: fetch and analyze the calendar in one independent
/// unit.
pub struct CalendarPrepStage {
    source: Arc<dyn CalendarSource>,
    bounds: TimeInterval,
    health_config: HealthConfig,
    gap_config: GapConfig,
    retry: FetchRetryConfig,
}

#[async_trait]
impl Stage for CalendarPrepStage {
    fn name(&self) -> &str {
        "analysis"
    }

    async fn run(&self, _ctx: &StageContext) -> Result<Value, StageFailure> {
        let events = crate::sources::fetch_with_retry(&self.retry, "calendar", || {
            self.source.fetch_events(&self.bounds)
        })
        .await
        .map_err(|err| StageFailure::unavailable(err.to_string()))?;

        let items = events_to_items(&events)?;
        let health = schedule_health(&items, &self.bounds, &self.health_config, &self.gap_config);
        encode(&health)
    }
}

// ── Prebuilt pipelines ───────────────────────────────────────────

/// The daily briefing: fetch messages, triage them, fetch the calendar,
/// analyze it, compose. Degrade policy throughout; a dead source leaves
/// its slot marked unavailable and the briefing still composes from the
/// rest, so the run ends PartiallyFailed rather than Failed.
pub fn daily_briefing_pipeline(
    messages: Arc<dyn MessageSource>,
    calendar: Arc<dyn CalendarSource>,
    extractor: Option<Arc<dyn TextExtractor>>,
    bounds: TimeInterval,
    now: DateTime<Utc>,
) -> Result<Pipeline, WorkflowError> {
    let mut triage = TriageMessagesStage::new(Classifier::new(), now);
    if let Some(extractor) = extractor {
        triage = triage.with_extractor(extractor);
    }
    Pipeline::builder()
        .policy(FailurePolicy::Degrade)
        .then(Arc::new(FetchMessagesStage::new(messages)))
        .then(Arc::new(triage))
        .then(Arc::new(FetchCalendarStage::new(calendar, bounds)))
        .then(Arc::new(AnalyzeCalendarStage::new(bounds)))
        .then(Arc::new(ComposeBriefingStage::new(now)))
        .build()
}

/// Meeting prep: gather message triage and calendar analysis
/// concurrently, join, compose.
pub fn meeting_prep_pipeline(
    messages: Arc<dyn MessageSource>,
    calendar: Arc<dyn CalendarSource>,
    extractor: Option<Arc<dyn TextExtractor>>,
    bounds: TimeInterval,
    now: DateTime<Utc>,
) -> Result<Pipeline, WorkflowError> {
    Pipeline::builder()
        .policy(FailurePolicy::Degrade)
        .fan_out(vec![
            Arc::new(MessagePrepStage {
                source: messages,
                classifier: Classifier::new(),
                extractor,
                retry: FetchRetryConfig::default(),
                now,
            }),
            Arc::new(CalendarPrepStage {
                source: calendar,
                bounds,
                health_config: HealthConfig::default(),
                gap_config: GapConfig::default(),
                retry: FetchRetryConfig::default(),
            }),
        ])
        .then(Arc::new(ComposeBriefingStage::new(now)))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sources::ActionItem;
    use crate::timeline::make_test_interval;
    use crate::workflow::{Orchestrator, RunStatus};
    use chrono::TimeZone;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    fn workday() -> TimeInterval {
        make_test_interval(540, 1020) // 09:00-17:00
    }

    fn busy(id: &str, start_min: i64, end_min: i64) -> ScheduleItem {
        ScheduleItem::new(
            id,
            format!("Meeting {}", id),
            make_test_interval(start_min, end_min),
            Vec::new(),
        )
    }

    // ── schedule_health ──────────────────────────────────────────

    #[test]
    fn test_empty_calendar_is_perfectly_healthy() {
        let health = schedule_health(
            &[],
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );
        assert_eq!(health.score, 100.0);
        assert!(health.conflicts.is_empty());
        assert_eq!(health.missing_buffers, 0);
    }

    #[test]
    fn test_conflicts_cost_a_fixed_penalty_each() {
        // One overlapping pair, otherwise an open day.
        let items = vec![busy("a", 600, 660), busy("b", 630, 690)];
        let health = schedule_health(
            &items,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );

        assert_eq!(health.conflicts.len(), 1);
        // 100 - 30 (conflict); focus target is met by the afternoon.
        assert_eq!(health.score, 70.0);
    }

    #[test]
    fn test_missing_buffers_are_counted_and_penalized() {
        let tight = vec![busy("a", 600, 660), busy("b", 665, 720)]; // 5 min apart
        let spaced = vec![busy("a", 600, 660), busy("b", 690, 745)]; // 30 min apart

        let tight_health = schedule_health(
            &tight,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );
        let spaced_health = schedule_health(
            &spaced,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );

        assert_eq!(tight_health.missing_buffers, 1);
        assert_eq!(spaced_health.missing_buffers, 0);
        assert!(tight_health.score < spaced_health.score);
    }

    #[test]
    fn test_focus_deficit_lowers_the_score() {
        // Meetings every hour leave no 90-minute block.
        let shredded: Vec<ScheduleItem> = (0..8)
            .map(|i| busy(&format!("m{}", i), 540 + i * 60, 540 + i * 60 + 45))
            .collect();
        let health = schedule_health(
            &shredded,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );

        let open = schedule_health(
            &[],
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );
        assert!(health.score < open.score);
    }

    #[test]
    fn test_back_to_back_overload_penalty() {
        // Five meetings with no breathing room at all.
        let marathon: Vec<ScheduleItem> = (0..5)
            .map(|i| busy(&format!("m{}", i), 540 + i * 60, 600 + i * 60))
            .collect();
        let health = schedule_health(
            &marathon,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );

        assert_eq!(health.longest_consecutive_run, 5);
        // Two meetings beyond the tolerated three.
        let config = HealthConfig::default();
        let expected_overload = config.overload_penalty * 2.0;
        assert!(health.score <= 100.0 - expected_overload);
    }

    #[test]
    fn test_score_never_leaves_the_range() {
        // Pathological day: everything conflicts with everything.
        let pileup: Vec<ScheduleItem> =
            (0..10).map(|i| busy(&format!("m{}", i), 540, 1020 - i)).collect();
        let health = schedule_health(
            &pileup,
            &workday(),
            &HealthConfig::default(),
            &GapConfig::default(),
        );
        assert!((0.0..=100.0).contains(&health.score));
    }

    // ── pipelines ────────────────────────────────────────────────

    struct StubMessages {
        fail: bool,
    }

    #[async_trait]
    impl MessageSource for StubMessages {
        async fn fetch_messages(&self) -> Result<Vec<RawMessage>, SourceError> {
            if self.fail {
                return Err(SourceError::unavailable("imap", "connection refused"));
            }
            Ok(vec![
                RawMessage {
                    id: "m-1".to_string(),
                    sender: "ceo@initech.example".to_string(),
                    subject: "URGENT: board deck due".to_string(),
                    body: "Need the final numbers asap.".to_string(),
                    timestamp: test_now(),
                },
                RawMessage {
                    id: "m-2".to_string(),
                    sender: "newsletter@vendor.example".to_string(),
                    subject: "FYI: release notes".to_string(),
                    body: "For your information.".to_string(),
                    timestamp: test_now(),
                },
            ])
        }
    }

    struct StubCalendar {
        fail: bool,
    }

    #[async_trait]
    impl CalendarSource for StubCalendar {
        async fn fetch_events(&self, _range: &TimeInterval) -> Result<Vec<RawEvent>, SourceError> {
            if self.fail {
                return Err(SourceError::unavailable("caldav", "503"));
            }
            let slot = make_test_interval(600, 660);
            let clash = make_test_interval(630, 690);
            Ok(vec![
                RawEvent {
                    id: "e-1".to_string(),
                    title: "Staff meeting".to_string(),
                    start: slot.start(),
                    end: slot.end(),
                    attendees: vec!["ava".to_string()],
                },
                RawEvent {
                    id: "e-2".to_string(),
                    title: "1:1".to_string(),
                    start: clash.start(),
                    end: clash.end(),
                    attendees: vec!["ben".to_string()],
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_daily_briefing_happy_path() {
        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: false }),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        assert_eq!(run.status, RunStatus::Succeeded);
        let briefing = run.output("briefing").unwrap();
        // The urgent executive message ranks first.
        assert_eq!(briefing["top_priorities"][0]["id"], "m-1");
        assert_eq!(briefing["schedule"]["conflict_count"], 1);
    }

    #[tokio::test]
    async fn test_briefing_survives_a_dead_message_source() {
        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: true }),
            Arc::new(StubCalendar { fail: false }),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        // Messages and triage degraded; calendar analysis and the
        // composed briefing are still present.
        assert_eq!(run.status, RunStatus::PartiallyFailed);
        let degraded: Vec<&str> = run.degraded_stages().iter().map(|(name, _)| *name).collect();
        assert!(degraded.contains(&"messages"));
        assert!(degraded.contains(&"triage"));

        let briefing = run.output("briefing").unwrap();
        assert_eq!(briefing["top_priorities"], json!([]));
        assert_eq!(briefing["schedule"]["conflict_count"], 1);
    }

    #[tokio::test]
    async fn test_briefing_survives_a_dead_calendar_source() {
        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: true }),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        assert_eq!(run.status, RunStatus::PartiallyFailed);
        let briefing = run.output("briefing").unwrap();
        assert_eq!(briefing["schedule"], json!("unavailable"));
        assert_eq!(briefing["top_priorities"][0]["id"], "m-1");
    }

    #[tokio::test]
    async fn test_meeting_prep_fan_out_joins_both_branches() {
        let pipeline = meeting_prep_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: false }),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.output("triage").is_some());
        assert!(run.output("analysis").is_some());
        let briefing = run.output("briefing").unwrap();
        assert_eq!(briefing["schedule"]["conflict_count"], 1);
        assert_eq!(briefing["top_priorities"][0]["id"], "m-1");
    }

    #[tokio::test]
    async fn test_meeting_prep_degrades_one_branch_without_losing_the_other() {
        let pipeline = meeting_prep_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: true }),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        assert_eq!(run.status, RunStatus::PartiallyFailed);
        assert!(run.output("triage").is_some());
        assert!(run.output("analysis").is_none());
        assert!(run.output("briefing").is_some());
    }

    #[tokio::test]
    async fn test_malformed_event_fails_the_analysis() {
        struct BrokenCalendar;

        #[async_trait]
        impl CalendarSource for BrokenCalendar {
            async fn fetch_events(
                &self,
                _range: &TimeInterval,
            ) -> Result<Vec<RawEvent>, SourceError> {
                let slot = make_test_interval(600, 660);
                // end before start
                Ok(vec![RawEvent {
                    id: "e-bad".to_string(),
                    title: "Inverted".to_string(),
                    start: slot.end(),
                    end: slot.start(),
                    attendees: Vec::new(),
                }])
            }
        }

        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(BrokenCalendar),
            None,
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;
        // Malformed data is not degradable; the run fails.
        assert_eq!(run.status, RunStatus::Failed);
    }

    struct StubExtractor {
        fail: bool,
    }

    #[async_trait]
    impl TextExtractor for StubExtractor {
        async fn extract(&self, _text: &str) -> Result<Vec<ActionItem>, SourceError> {
            if self.fail {
                return Err(SourceError::unavailable("extractor", "model offline"));
            }
            Ok(vec![
                ActionItem {
                    task: "send the final numbers".to_string(),
                    deadline: Some(test_now() + chrono::Duration::hours(2)),
                    confidence: 0.9,
                },
                // Higher confidence but undated; the dated item above
                // must still supply the deadline hint.
                ActionItem {
                    task: "file expenses".to_string(),
                    deadline: None,
                    confidence: 0.95,
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_extracted_deadlines_raise_message_urgency() {
        let extractor: Arc<dyn TextExtractor> = Arc::new(StubExtractor { fail: false });
        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: false }),
            Some(extractor),
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;
        assert_eq!(run.status, RunStatus::Succeeded);

        let triage = run.output("triage").unwrap();
        let newsletter = triage["ranked"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["source_id"] == "m-2")
            .unwrap();
        // An FYI newsletter scores near the floor on its own; the
        // extracted two-hour deadline pushes it into the urgent band.
        assert!(newsletter["deadline"].is_string());
        assert!(newsletter["urgency"].as_f64().unwrap() > 7.0);
    }

    #[tokio::test]
    async fn test_failed_extractor_never_degrades_the_triage() {
        let extractor: Arc<dyn TextExtractor> = Arc::new(StubExtractor { fail: true });
        let pipeline = daily_briefing_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: false }),
            Some(extractor),
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;

        // Extraction is advisory: the triage proceeds undated.
        assert_eq!(run.status, RunStatus::Succeeded);
        let briefing = run.output("briefing").unwrap();
        assert_eq!(briefing["top_priorities"][0]["id"], "m-1");
    }

    #[tokio::test]
    async fn test_meeting_prep_feeds_extracted_deadlines_into_triage() {
        let extractor: Arc<dyn TextExtractor> = Arc::new(StubExtractor { fail: false });
        let pipeline = meeting_prep_pipeline(
            Arc::new(StubMessages { fail: false }),
            Arc::new(StubCalendar { fail: false }),
            Some(extractor),
            workday(),
            test_now(),
        )
        .unwrap();

        let run = Orchestrator::new().execute(&pipeline).await;
        assert_eq!(run.status, RunStatus::Succeeded);

        let triage = run.output("triage").unwrap();
        let newsletter = triage["ranked"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["source_id"] == "m-2")
            .unwrap();
        assert!(newsletter["deadline"].is_string());
    }
}
