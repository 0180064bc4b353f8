//! Collaborator boundary: the abstract interfaces the core consumes.
//!
//! Concrete implementations (IMAP/HTTP clients, NLP extractors) live
//! outside this crate. The core only sees these traits and their raw
//! record types, so every engine can be exercised against plain in-memory
//! doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SourceError;
use crate::timeline::TimeInterval;

/// A raw inbound message record as delivered by a MessageSource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// A raw calendar event record as delivered by a CalendarSource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
}

/// An action item extracted from message text by a TextExtractor.
///
/// Purely advisory: scoring proceeds without it, and `confidence` is the
/// extractor's own estimate, never a control-flow authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    pub deadline: Option<DateTime<Utc>>,
    pub confidence: f64,
}

/// A finalized scheduling decision handed to a NotificationSink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingDecision {
    pub title: String,
    pub interval: TimeInterval,
    pub attendees: Vec<String>,
}

/// Yields inbound messages. May fail with `SourceError::Unavailable`,
/// which the orchestrator treats as a degradable stage failure.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_messages(&self) -> Result<Vec<RawMessage>, SourceError>;
}

/// Yields calendar events for a bounded date range. Same failure
/// contract as `MessageSource`.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_events(&self, range: &TimeInterval) -> Result<Vec<RawEvent>, SourceError>;
}

/// Extracts action items from raw message text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<ActionItem>, SourceError>;
}

/// Accepts a finalized scheduling decision for delivery.
///
/// Fire-and-forget from the core's perspective: a delivery failure is
/// logged by the caller and never invalidates the scheduling outcome.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, decision: &SchedulingDecision) -> Result<(), SourceError>;
}

/// Deliver a decision, swallowing (but logging) sink failures.
pub async fn deliver_best_effort(sink: &dyn NotificationSink, decision: &SchedulingDecision) {
    if let Err(err) = sink.deliver(decision).await {
        warn!(title = %decision.title, error = %err, "notification delivery failed");
    }
}

/// Retry/backoff settings for collaborator fetches.
///
/// Backoff is deterministic: delay = base * multiplier^attempt, capped.
/// No jitter; identical inputs must produce an identical call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for FetchRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            multiplier: 2,
            max_delay_ms: 5_000,
        }
    }
}

impl FetchRetryConfig {
    /// Delay before retrying after the given zero-based failed attempt.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = self.multiplier.saturating_pow(attempt) as u64;
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// Call a fallible collaborator operation, retrying `SourceError` failures
/// with deterministic exponential backoff.
///
/// This is transport-level resilience only. MalformedInput never reaches
/// this helper: validation errors are raised by the engines, not the
/// sources.
pub async fn fetch_with_retry<T, F, Fut>(
    config: &FetchRetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts {
                    return Err(err);
                }
                let delay = config.delay_ms(attempt - 1);
                warn!(
                    source = label,
                    attempt,
                    delay_ms = delay,
                    error = %err,
                    "source fetch failed, backing off"
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }
}
