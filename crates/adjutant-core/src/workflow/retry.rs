//! Bounded iterative retry loop.
//!
//! The third orchestration pattern: invoke an attempt against a candidate
//! input; on failure ask for the next candidate and go again, up to a
//! fixed bound. Running out of attempts is a legitimate terminal outcome
//! (`Exhausted`), distinct from an error: "no valid solution within the
//! search bound" is an answer, not a fault.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stage::CancelFlag;

/// Bounds for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Hard cap on attempt invocations
    pub max_attempts: u32,
    /// Pause between attempts; zero for pure candidate search
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 0,
        }
    }
}

/// The problem definition for one retry loop.
#[async_trait]
pub trait RetrySpec: Send + Sync {
    /// The mutable attempt state (e.g. a proposed time slot).
    type Candidate: Send + Sync + Clone;
    /// What a successful attempt yields.
    type Solution: Send;
    /// What a failed attempt records (diagnostics for the caller).
    type Rejection: Send;

    /// Try one candidate. `attempt_number` starts at 1.
    async fn attempt(
        &self,
        attempt_number: u32,
        candidate: &Self::Candidate,
    ) -> Result<Self::Solution, Self::Rejection>;

    /// Produce the replacement input after a failed attempt, or `None`
    /// when the candidate space is out (ends the loop early, still
    /// Exhausted).
    fn next_candidate(&self, failed: &Self::Candidate) -> Option<Self::Candidate>;
}

/// Terminal outcome of a retry loop.
///
/// Every variant carries the rejections accumulated along the way so the
/// caller can report which candidates were tried and why each failed.
#[derive(Debug)]
pub enum RetryOutcome<S, R> {
    /// An attempt succeeded.
    Solved {
        solution: S,
        /// Rejections from the failed attempts that preceded success
        rejections: Vec<R>,
        attempts_used: u32,
    },
    /// Every attempt within the bound failed.
    Exhausted { rejections: Vec<R> },
    /// Cooperative cancellation observed at an iteration boundary.
    Cancelled { rejections: Vec<R> },
}

impl<S, R> RetryOutcome<S, R> {
    pub fn is_solved(&self) -> bool {
        matches!(self, RetryOutcome::Solved { .. })
    }

    pub fn rejections(&self) -> &[R] {
        match self {
            RetryOutcome::Solved { rejections, .. }
            | RetryOutcome::Exhausted { rejections }
            | RetryOutcome::Cancelled { rejections } => rejections,
        }
    }
}

/// Drive a [`RetrySpec`] to a terminal outcome.
///
/// Invokes `attempt` at most `policy.max_attempts` times. The cancel flag
/// is checked before every attempt; cancellation short-circuits the
/// remaining attempts and reports `Cancelled`, never `Exhausted`.
pub async fn run_retry_loop<Spec: RetrySpec>(
    spec: &Spec,
    initial: Spec::Candidate,
    policy: &RetryPolicy,
    cancel: &CancelFlag,
) -> RetryOutcome<Spec::Solution, Spec::Rejection> {
    let mut candidate = initial;
    let mut rejections = Vec::new();

    for attempt_number in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            debug!(attempt_number, "retry loop cancelled");
            return RetryOutcome::Cancelled { rejections };
        }

        match spec.attempt(attempt_number, &candidate).await {
            Ok(solution) => {
                debug!(attempt_number, "retry loop solved");
                return RetryOutcome::Solved {
                    solution,
                    rejections,
                    attempts_used: attempt_number,
                };
            }
            Err(rejection) => {
                debug!(attempt_number, "attempt rejected");
                rejections.push(rejection);
            }
        }

        if attempt_number < policy.max_attempts {
            match spec.next_candidate(&candidate) {
                Some(next) => candidate = next,
                // Candidate space ran dry before the bound did.
                None => break,
            }
            if policy.retry_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(policy.retry_delay_ms)).await;
            }
        }
    }

    RetryOutcome::Exhausted { rejections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Succeeds once the candidate value reaches `solves_at`.
    struct CountingSpec {
        solves_at: i64,
        invocations: AtomicU32,
    }

    impl CountingSpec {
        fn new(solves_at: i64) -> Self {
            Self {
                solves_at,
                invocations: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RetrySpec for CountingSpec {
        type Candidate = i64;
        type Solution = i64;
        type Rejection = String;

        async fn attempt(&self, _attempt_number: u32, candidate: &i64) -> Result<i64, String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if *candidate >= self.solves_at {
                Ok(*candidate)
            } else {
                Err(format!("{} too low", candidate))
            }
        }

        fn next_candidate(&self, failed: &i64) -> Option<i64> {
            Some(failed + 1)
        }
    }

    #[tokio::test]
    async fn test_solves_on_first_attempt() {
        let spec = CountingSpec::new(0);
        let outcome = run_retry_loop(&spec, 5, &RetryPolicy::default(), &CancelFlag::new()).await;

        match outcome {
            RetryOutcome::Solved {
                solution,
                rejections,
                attempts_used,
            } => {
                assert_eq!(solution, 5);
                assert!(rejections.is_empty());
                assert_eq!(attempts_used, 1);
            }
            other => panic!("expected Solved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_solves_after_candidate_replacement() {
        let spec = CountingSpec::new(2);
        let outcome = run_retry_loop(&spec, 0, &RetryPolicy::default(), &CancelFlag::new()).await;

        match outcome {
            RetryOutcome::Solved {
                solution,
                rejections,
                attempts_used,
            } => {
                assert_eq!(solution, 2);
                assert_eq!(rejections.len(), 2);
                assert_eq!(attempts_used, 3);
            }
            other => panic!("expected Solved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhaustion_after_exactly_max_attempts() {
        let spec = CountingSpec::new(100);
        let policy = RetryPolicy {
            max_attempts: 3,
            retry_delay_ms: 0,
        };
        let outcome = run_retry_loop(&spec, 0, &policy, &CancelFlag::new()).await;

        assert!(matches!(&outcome, RetryOutcome::Exhausted { rejections } if rejections.len() == 3));
        assert_eq!(spec.invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_exceeds_the_bound() {
        for max in 1..=5u32 {
            let spec = CountingSpec::new(100);
            let policy = RetryPolicy {
                max_attempts: max,
                retry_delay_ms: 0,
            };
            run_retry_loop(&spec, 0, &policy, &CancelFlag::new()).await;
            assert_eq!(spec.invocations.load(Ordering::SeqCst), max);
        }
    }

    #[tokio::test]
    async fn test_empty_candidate_space_ends_exhausted_early() {
        struct DrySpec;

        #[async_trait]
        impl RetrySpec for DrySpec {
            type Candidate = i64;
            type Solution = i64;
            type Rejection = String;

            async fn attempt(&self, _n: u32, _c: &i64) -> Result<i64, String> {
                Err("never".to_string())
            }

            fn next_candidate(&self, _failed: &i64) -> Option<i64> {
                None
            }
        }

        let policy = RetryPolicy {
            max_attempts: 5,
            retry_delay_ms: 0,
        };
        let outcome = run_retry_loop(&DrySpec, 0, &policy, &CancelFlag::new()).await;
        assert!(matches!(&outcome, RetryOutcome::Exhausted { rejections } if rejections.len() == 1));
    }

    #[tokio::test]
    async fn test_cancellation_returns_cancelled_not_exhausted() {
        let spec = CountingSpec::new(100);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = run_retry_loop(&spec, 0, &RetryPolicy::default(), &cancel).await;
        assert!(matches!(outcome, RetryOutcome::Cancelled { .. }));
        assert_eq!(spec.invocations.load(Ordering::SeqCst), 0);
    }
}
