//! # Adjutant Core Library
//!
//! Core business logic for Adjutant, an executive-coordination assistant:
//! inbound-message triage, calendar conflict analysis, and multi-party
//! meeting scheduling. Presentation layers (CLI, dashboard) and concrete
//! service clients are thin shells over this crate.
//!
//! ## Architecture
//!
//! - **Timeline**: pure interval analysis -- overlap detection, conflict
//!   clustering, gap extraction, fragmentation scoring
//! - **Scoring**: deterministic urgency/importance scoring with priority
//!   tiers and Eisenhower quadrants; no model calls, fully reproducible
//! - **Triage**: batch classification with ranking and distribution
//!   insights
//! - **Workflow**: a small orchestration engine -- sequential pipelines,
//!   parallel fan-out/join, bounded retry loops -- threading an immutable
//!   run context through stages
//! - **Resolver**: iterative meeting scheduling built on the retry loop
//! - **Briefing**: prebuilt pipelines wiring external sources through the
//!   engines
//!
//! ## Key Components
//!
//! - [`TimeInterval`] / [`find_conflicts`] / [`GapAnalyzer`]: interval engine
//! - [`ScoringEngine`] / [`Classifier`]: scoring and triage
//! - [`Orchestrator`] / [`Pipeline`]: workflow execution
//! - [`SchedulingResolver`]: bounded meeting-slot search

pub mod briefing;
pub mod error;
pub mod resolver;
pub mod scoring;
pub mod sources;
pub mod timeline;
pub mod triage;
pub mod workflow;

pub use briefing::{daily_briefing_pipeline, meeting_prep_pipeline, schedule_health, HealthConfig, ScheduleHealth};
pub use error::{CoreError, Result, SourceError, ValidationError, WorkflowError};
pub use resolver::{
    AttendeeCalendars, MeetingRequest, Resolution, ResolverConfig, SchedulingAttempt,
    SchedulingResolver,
};
pub use scoring::{
    PriorityTier, Quadrant, ScoredItem, ScoringConfig, ScoringEngine, ScoringSignals, SenderClass,
};
pub use sources::{
    ActionItem, CalendarSource, MessageSource, NotificationSink, RawEvent, RawMessage,
    SchedulingDecision, TextExtractor,
};
pub use timeline::{
    compute_gaps, find_conflicts, overlaps, ConflictSet, FragmentationReport, GapAnalyzer,
    GapConfig, ScheduleItem, TimeInterval,
};
pub use triage::{classify_batch, Classifier, TriageReport};
pub use workflow::{
    CancelFlag, FailurePolicy, Orchestrator, Pipeline, RetryOutcome, RetryPolicy, RunStatus,
    Stage, StageContext, StageFailure, StageOutput, WorkflowRun,
};
