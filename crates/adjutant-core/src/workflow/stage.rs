//! Stage interface for the workflow orchestrator.
//!
//! A stage is one named unit of work. It statically declares the context
//! keys it reads, receives a read-only snapshot of the accumulated run
//! context, and returns one JSON payload published under its own name.
//! Stages never see the live run and never write another stage's slot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// How a stage failed. The orchestrator maps these onto run status per
/// the configured policy; stages themselves never decide run fate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageFailure {
    /// An external collaborator could not produce data. Degradable.
    #[error("source unavailable: {reason}")]
    Unavailable { reason: String },

    /// Malformed input reached the stage. Never degraded, never retried.
    #[error("malformed input: {reason}")]
    Malformed { reason: String },

    /// The stage observed cooperative cancellation mid-work.
    #[error("cancelled")]
    Cancelled,
}

impl StageFailure {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StageFailure::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        StageFailure::Malformed {
            reason: reason.into(),
        }
    }
}

/// Cooperative cancellation flag, checked at stage and retry-iteration
/// boundaries. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only snapshot of the completed stage outputs, taken by the
/// orchestrator before each step. Fan-out branches all see the same
/// snapshot, so no branch can observe a sibling's in-flight output.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    outputs: Arc<BTreeMap<String, Value>>,
}

impl StageContext {
    pub(crate) fn snapshot(outputs: BTreeMap<String, Value>) -> Self {
        Self {
            outputs: Arc::new(outputs),
        }
    }

    /// A prior stage's output, if that stage completed.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    /// A prior stage's output deserialized into a concrete type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.outputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

/// One unit of work in a pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name; also the output key this stage publishes under.
    fn name(&self) -> &str;

    /// Context keys this stage reads. Declared statically so the
    /// pipeline can validate wiring at construction instead of at call
    /// time.
    fn reads(&self) -> Vec<String> {
        Vec::new()
    }

    /// Do the work against a read-only context snapshot.
    async fn run(&self, ctx: &StageContext) -> Result<Value, StageFailure>;
}
