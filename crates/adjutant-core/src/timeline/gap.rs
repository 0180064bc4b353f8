//! Free-time extraction and fragmentation scoring.
//!
//! Gaps are the complement of the busy intervals within an analysis
//! window. The fragmentation score condenses a gap list into a 1-10
//! rating of how broken-up the free time is (lower is better): a single
//! long block rates near 1, many short slivers rate near 10.

use serde::{Deserialize, Serialize};

use super::{ScheduleItem, TimeInterval};

/// Tuning for gap analysis.
///
/// Only the direction of each weight is contractual: more gaps must raise
/// the fragmentation score and longer average gaps must lower it. The
/// numeric values are starting points, not calibrated truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapConfig {
    /// Added per gap beyond the first
    pub count_weight: f64,
    /// Scale of the short-gap penalty
    pub shortness_weight: f64,
    /// Average gap length (minutes) at which the short-gap penalty halves
    pub gap_half_life_min: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            count_weight: 1.0,
            shortness_weight: 2.0,
            gap_half_life_min: 60.0,
        }
    }
}

/// Result of one fragmentation analysis pass. Recomputed per call, never
/// cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentationReport {
    /// 1 (one solid block) to 10 (shredded)
    pub score: f64,
    /// Free intervals within the analysis bounds, ordered by start
    pub gaps: Vec<TimeInterval>,
    /// The longest single free interval, if any free time exists
    pub longest_focus_block: Option<TimeInterval>,
}

/// Gap analyzer over a set of busy schedule items.
pub struct GapAnalyzer {
    config: GapConfig,
}

impl GapAnalyzer {
    /// Create an analyzer with default weights
    pub fn new() -> Self {
        Self {
            config: GapConfig::default(),
        }
    }

    /// Create with custom weights
    pub fn with_config(config: GapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    /// Compute free intervals within `bounds`.
    ///
    /// Overlapping and adjacent busy intervals merge implicitly: the sweep
    /// only opens a gap when the next busy block starts strictly after the
    /// furthest end seen so far, so zero-length gaps never appear.
    pub fn compute_gaps(&self, items: &[ScheduleItem], bounds: &TimeInterval) -> Vec<TimeInterval> {
        let mut sorted: Vec<&ScheduleItem> = items.iter().collect();
        sorted.sort_by_key(|item| item.interval.start());

        let mut gaps = Vec::new();
        let mut last_end = bounds.start();

        for item in sorted {
            // Skip busy blocks already covered by the sweep position.
            if item.interval.end() <= last_end {
                continue;
            }
            // Past the window: nothing further can contribute.
            if item.interval.start() >= bounds.end() {
                break;
            }

            if item.interval.start() > last_end {
                let gap_end = item.interval.start().min(bounds.end());
                if last_end < gap_end {
                    gaps.push(TimeInterval {
                        start: last_end,
                        end: gap_end,
                    });
                }
            }

            if item.interval.end() > last_end {
                last_end = item.interval.end().min(bounds.end());
            }
        }

        // Trailing free time after the last busy block.
        if last_end < bounds.end() {
            gaps.push(TimeInterval {
                start: last_end,
                end: bounds.end(),
            });
        }

        gaps
    }

    /// Score how fragmented the free time is, in [1, 10].
    ///
    /// `1 + count_weight*(gaps-1) + shortness_weight * h/(avg+h)` where `h`
    /// is the half-life: strictly increasing in gap count, strictly
    /// decreasing in average gap length, clamped to the range. No gaps at
    /// all means a fully packed calendar (10) unless nothing was scheduled
    /// either (1).
    pub fn fragmentation_score(&self, gaps: &[TimeInterval], total_busy_count: usize) -> f64 {
        if gaps.is_empty() {
            return if total_busy_count == 0 { 1.0 } else { 10.0 };
        }

        let count = gaps.len() as f64;
        let total_min: i64 = gaps.iter().map(|g| g.duration_minutes()).sum();
        let avg_min = total_min as f64 / count;

        let count_term = self.config.count_weight * (count - 1.0);
        let h = self.config.gap_half_life_min;
        let shortness_term = self.config.shortness_weight * h / (avg_min + h);

        (1.0 + count_term + shortness_term).clamp(1.0, 10.0)
    }

    /// Full analysis: gaps, longest focus block, and the score.
    pub fn analyze(&self, items: &[ScheduleItem], bounds: &TimeInterval) -> FragmentationReport {
        let gaps = self.compute_gaps(items, bounds);
        let score = self.fragmentation_score(&gaps, items.len());
        let longest_focus_block = gaps
            .iter()
            .max_by_key(|g| g.duration_minutes())
            .copied();

        FragmentationReport {
            score,
            gaps,
            longest_focus_block,
        }
    }
}

impl Default for GapAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to compute gaps with default settings
pub fn compute_gaps(items: &[ScheduleItem], bounds: &TimeInterval) -> Vec<TimeInterval> {
    GapAnalyzer::new().compute_gaps(items, bounds)
}

/// Convenience function to score gaps with default settings
pub fn fragmentation_score(gaps: &[TimeInterval], total_busy_count: usize) -> f64 {
    GapAnalyzer::new().fragmentation_score(gaps, total_busy_count)
}
