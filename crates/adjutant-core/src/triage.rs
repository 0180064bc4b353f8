//! Batch triage: scoring applied to collections.
//!
//! `classify_batch` scores every snapshot in a batch, buckets the results
//! by tier and quadrant, produces a deterministic ranking, and emits
//! batch-level insight flags. Insights are descriptive output only; they
//! never feed back into scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::scoring::{PriorityTier, Quadrant, ScoredItem, ScoringEngine, ScoringSignals};

/// Fixed ratios at which batch insights fire.
///
/// Descriptive thresholds, not scoring weights: changing them changes the
/// commentary, never the scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Q1 share above which the batch is flagged as crisis mode
    pub crisis_ratio: f64,
    /// Q3 share above which delegation is suggested
    pub delegation_ratio: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            crisis_ratio: 0.5,
            delegation_ratio: 0.3,
        }
    }
}

/// Result of one triage pass over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    /// Scored items bucketed by priority tier
    pub by_tier: BTreeMap<PriorityTier, Vec<ScoredItem>>,
    /// Scored items bucketed by Eisenhower quadrant
    pub by_quadrant: BTreeMap<Quadrant, Vec<ScoredItem>>,
    /// All items, most pressing first
    pub ranked: Vec<ScoredItem>,
    /// Qualitative flags over the batch distribution, fixed order
    pub insights: Vec<String>,
}

impl TriageReport {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Count of items in the given quadrant.
    pub fn quadrant_count(&self, quadrant: Quadrant) -> usize {
        self.by_quadrant.get(&quadrant).map_or(0, Vec::len)
    }
}

/// Batch classifier over a scoring engine.
pub struct Classifier {
    engine: ScoringEngine,
    insight_config: InsightConfig,
}

impl Classifier {
    /// Create a classifier with default weights
    pub fn new() -> Self {
        Self {
            engine: ScoringEngine::new(),
            insight_config: InsightConfig::default(),
        }
    }

    /// Create over a custom engine and insight thresholds
    pub fn with_config(engine: ScoringEngine, insight_config: InsightConfig) -> Self {
        Self {
            engine,
            insight_config,
        }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Score and bucket a batch of signal snapshots.
    ///
    /// Ranking: tier rank first, quadrant rank second, deadline ascending
    /// third, original input position last. The final key makes the
    /// ordering stable for equal scores, so the same batch always ranks
    /// identically.
    ///
    /// An empty batch yields an empty report and no insights.
    pub fn classify_batch(
        &self,
        batch: &[ScoringSignals],
    ) -> Result<TriageReport, ValidationError> {
        // 1. Score everything; any malformed snapshot fails the whole
        //    pass immediately.
        let mut scored: Vec<(usize, ScoredItem)> = Vec::with_capacity(batch.len());
        for (position, signals) in batch.iter().enumerate() {
            scored.push((position, self.engine.score(signals)?));
        }

        // 2. Rank.
        scored.sort_by(|(pos_a, a), (pos_b, b)| {
            a.tier
                .rank()
                .cmp(&b.tier.rank())
                .then(a.quadrant.rank().cmp(&b.quadrant.rank()))
                .then(compare_deadlines(a, b))
                .then(pos_a.cmp(pos_b))
        });
        let ranked: Vec<ScoredItem> = scored.into_iter().map(|(_, item)| item).collect();

        // 3. Bucket.
        let mut by_tier: BTreeMap<PriorityTier, Vec<ScoredItem>> = BTreeMap::new();
        let mut by_quadrant: BTreeMap<Quadrant, Vec<ScoredItem>> = BTreeMap::new();
        for item in &ranked {
            by_tier.entry(item.tier).or_default().push(item.clone());
            by_quadrant
                .entry(item.quadrant)
                .or_default()
                .push(item.clone());
        }

        // 4. Batch insights.
        let insights = self.generate_insights(&ranked, &by_quadrant);

        Ok(TriageReport {
            by_tier,
            by_quadrant,
            ranked,
            insights,
        })
    }

    /// Emit the insight catalogue in a fixed order for determinism.
    fn generate_insights(
        &self,
        ranked: &[ScoredItem],
        by_quadrant: &BTreeMap<Quadrant, Vec<ScoredItem>>,
    ) -> Vec<String> {
        if ranked.is_empty() {
            return Vec::new();
        }

        let total = ranked.len() as f64;
        let count = |q: Quadrant| by_quadrant.get(&q).map_or(0, Vec::len);
        let mut insights = Vec::new();

        if count(Quadrant::Q1) as f64 / total > self.insight_config.crisis_ratio {
            insights.push(format!(
                "Crisis mode: {} of {} items are urgent AND important",
                count(Quadrant::Q1),
                ranked.len()
            ));
        }
        if count(Quadrant::Q2) == 0 {
            insights.push(
                "Purely reactive: no important-but-not-urgent items; strategic work is absent"
                    .to_string(),
            );
        }
        if count(Quadrant::Q3) as f64 / total > self.insight_config.delegation_ratio {
            insights.push(format!(
                "Delegation opportunity: {} urgent-but-unimportant items could be handed off",
                count(Quadrant::Q3)
            ));
        }
        if count(Quadrant::Q4) > 0 {
            insights.push(format!(
                "Elimination candidates: {} items are neither urgent nor important",
                count(Quadrant::Q4)
            ));
        }

        let overdue = ranked
            .iter()
            .filter(|item| item.deadline.is_some_and(|d| d < item.scored_at))
            .count();
        if overdue > 0 {
            insights.push(format!("Overdue: {} items are past their deadline", overdue));
        }

        insights
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_deadlines(a: &ScoredItem, b: &ScoredItem) -> std::cmp::Ordering {
    // Earlier deadline first; items without a deadline sort last.
    match (a.deadline, b.deadline) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// Convenience function to classify a batch with default weights
pub fn classify_batch(batch: &[ScoringSignals]) -> Result<TriageReport, ValidationError> {
    Classifier::new().classify_batch(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::SenderClass;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn neutral(id: &str) -> ScoringSignals {
        ScoringSignals::new(id, test_now())
    }

    fn pressing(id: &str, deadline_hours: i64) -> ScoringSignals {
        neutral(id)
            .with_sender_class(SenderClass::Executive)
            .with_urgent_keyword()
            .with_deadline(test_now() + Duration::hours(deadline_hours))
    }

    #[test]
    fn test_empty_batch_yields_empty_report() {
        let report = classify_batch(&[]).unwrap();
        assert!(report.is_empty());
        assert!(report.by_tier.is_empty());
        assert!(report.by_quadrant.is_empty());
        assert!(report.insights.is_empty());
    }

    #[test]
    fn test_ranking_puts_pressing_work_first() {
        let batch = vec![neutral("calm"), pressing("fire", 2), neutral("later")];

        let report = classify_batch(&batch).unwrap();
        assert_eq!(report.ranked[0].source_id, "fire");
    }

    #[test]
    fn test_ranking_breaks_tier_ties_by_deadline() {
        let batch = vec![pressing("due-second", 3), pressing("due-first", 1)];

        let report = classify_batch(&batch).unwrap();
        assert_eq!(report.ranked[0].source_id, "due-first");
        assert_eq!(report.ranked[1].source_id, "due-second");
        assert_eq!(report.ranked[0].tier, report.ranked[1].tier);
    }

    #[test]
    fn test_ranking_is_stable_for_equal_keys() {
        let batch = vec![neutral("first"), neutral("second"), neutral("third")];

        let report = classify_batch(&batch).unwrap();
        let ids: Vec<&str> = report.ranked.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_deadlined_items_rank_before_open_ended_peers() {
        // 15 days out: the deadline term is zero, so both items share a
        // tier and only the deadline key separates them.
        let with_deadline = neutral("dated").with_deadline(test_now() + Duration::days(15));
        let batch = vec![neutral("open"), with_deadline];

        let report = classify_batch(&batch).unwrap();
        // Same tier and quadrant; the deadline breaks the tie.
        assert_eq!(report.ranked[0].tier, report.ranked[1].tier);
        assert_eq!(report.ranked[0].source_id, "dated");
    }

    #[test]
    fn test_buckets_partition_the_batch() {
        let batch = vec![
            pressing("a", 2),
            neutral("b"),
            neutral("c").with_sender_class(SenderClass::Executive),
        ];

        let report = classify_batch(&batch).unwrap();
        let tier_total: usize = report.by_tier.values().map(Vec::len).sum();
        let quadrant_total: usize = report.by_quadrant.values().map(Vec::len).sum();
        assert_eq!(tier_total, 3);
        assert_eq!(quadrant_total, 3);
    }

    #[test]
    fn test_crisis_mode_flag_on_q1_majority() {
        let batch = vec![pressing("a", 2), pressing("b", 1), neutral("c")];

        let report = classify_batch(&batch).unwrap();
        assert_eq!(report.quadrant_count(Quadrant::Q1), 2);
        assert!(report.insights.iter().any(|i| i.starts_with("Crisis mode")));
    }

    #[test]
    fn test_reactive_flag_when_q2_is_empty() {
        let report = classify_batch(&[neutral("a")]).unwrap();
        assert!(report
            .insights
            .iter()
            .any(|i| i.starts_with("Purely reactive")));
    }

    #[test]
    fn test_no_reactive_flag_when_strategic_work_exists() {
        // Executive sender without urgency lands in Q2.
        let batch = vec![neutral("plan").with_sender_class(SenderClass::Executive)];

        let report = classify_batch(&batch).unwrap();
        assert_eq!(report.quadrant_count(Quadrant::Q2), 1);
        assert!(!report
            .insights
            .iter()
            .any(|i| i.starts_with("Purely reactive")));
    }

    #[test]
    fn test_elimination_flag_counts_q4() {
        let report = classify_batch(&[neutral("a"), neutral("b")]).unwrap();
        assert!(report
            .insights
            .iter()
            .any(|i| i.contains("2 items are neither urgent nor important")));
    }

    #[test]
    fn test_overdue_alert() {
        let overdue = neutral("late").with_deadline(test_now() - Duration::hours(5));

        let report = classify_batch(&[overdue]).unwrap();
        assert!(report
            .insights
            .iter()
            .any(|i| i.contains("1 items are past their deadline")));
    }

    #[test]
    fn test_insights_come_in_fixed_order() {
        let batch = vec![
            pressing("a", -1), // Q1, overdue
            pressing("b", 2),  // Q1
            neutral("c"),      // Q4
        ];

        let report = classify_batch(&batch).unwrap();
        let prefixes: Vec<&str> = report
            .insights
            .iter()
            .map(|i| i.split(':').next().unwrap())
            .collect();
        assert_eq!(
            prefixes,
            vec!["Crisis mode", "Purely reactive", "Elimination candidates", "Overdue"]
        );
    }

    #[test]
    fn test_malformed_snapshot_fails_the_batch() {
        let batch = vec![neutral("ok"), neutral("")];
        assert!(classify_batch(&batch).is_err());
    }
}
