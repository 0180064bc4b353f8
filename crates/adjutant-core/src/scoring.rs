//! Urgency/importance scoring engine.
//!
//! Turns enumerated message/task signals into a scored, explainable
//! priority assessment:
//! - Urgency 0-10 from keywords, sender class, deadline proximity
//! - Importance 0-10 from sender class and strategic signals, with an
//!   explicit human-provided hint overriding the heuristic
//! - An 8-level priority tier derived from urgency alone
//! - An Eisenhower quadrant from the (urgency, importance) split
//!
//! Scoring is a pure function of its inputs: the reference time is part of
//! the signal snapshot, so the same snapshot always produces an identical
//! result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::sources::RawMessage;

/// Cutoff shared by the urgent and important axes of the quadrant split.
/// Referenced only through `ScoringConfig` so changing it reclassifies
/// consistently everywhere.
pub const DEFAULT_QUADRANT_CUTOFF: f64 = 6.0;

/// Sender classification for weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderClass {
    /// C-suite, board, VPs
    Executive,
    /// Directors, managers, team leads
    Management,
    /// Everyone else
    Standard,
}

impl SenderClass {
    /// Privileged senders add urgency regardless of class level.
    pub fn is_privileged(&self) -> bool {
        !matches!(self, SenderClass::Standard)
    }
}

/// One enumerated input snapshot for a single scoring pass.
///
/// `now` is captured here rather than read from the clock inside the
/// engine. Missing optional signals default to neutral values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSignals {
    /// Identity of the item being scored (required)
    pub source_id: String,
    /// Sender classification
    pub sender_class: SenderClass,
    /// An urgent keyword appeared in subject or body
    pub contains_urgent_keyword: bool,
    /// A strategic/business-impact keyword appeared
    pub contains_strategic_keyword: bool,
    /// Explicit low-priority marker (FYI and friends)
    pub is_low_priority_fyi: bool,
    /// Count of shouted (all-caps) words
    pub all_caps_word_count: usize,
    /// Deadline, when one is known
    pub deadline: Option<DateTime<Utc>>,
    /// Human-provided importance (0-10); overrides the heuristic
    pub explicit_importance_hint: Option<f64>,
    /// Reference time for deadline distance
    pub now: DateTime<Utc>,
}

impl ScoringSignals {
    /// Create a neutral snapshot for the given item id.
    pub fn new(source_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.into(),
            sender_class: SenderClass::Standard,
            contains_urgent_keyword: false,
            contains_strategic_keyword: false,
            is_low_priority_fyi: false,
            all_caps_word_count: 0,
            deadline: None,
            explicit_importance_hint: None,
            now,
        }
    }

    pub fn with_sender_class(mut self, class: SenderClass) -> Self {
        self.sender_class = class;
        self
    }

    pub fn with_urgent_keyword(mut self) -> Self {
        self.contains_urgent_keyword = true;
        self
    }

    pub fn with_strategic_keyword(mut self) -> Self {
        self.contains_strategic_keyword = true;
        self
    }

    pub fn with_fyi_marker(mut self) -> Self {
        self.is_low_priority_fyi = true;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_importance_hint(mut self, hint: f64) -> Self {
        self.explicit_importance_hint = Some(hint);
        self
    }
}

/// One contributing factor in a score's reasoning trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    /// What contributed
    pub label: String,
    /// Signed amount it moved the score
    pub delta: f64,
}

impl ScoreFactor {
    fn new(label: impl Into<String>, delta: f64) -> Self {
        Self {
            label: label.into(),
            delta,
        }
    }
}

/// Priority tier derived from urgency alone, most urgent first.
///
/// Declaration order is the ordering: `Critical < Urgent < ...` so an
/// ascending sort puts the most urgent work first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Critical,
    Urgent,
    High,
    Elevated,
    Moderate,
    Routine,
    Low,
    Minimal,
}

impl PriorityTier {
    /// Descending urgency thresholds. A value exactly at a boundary lands
    /// in the more urgent tier (never under-prioritize a tie).
    const LADDER: [(f64, PriorityTier); 7] = [
        (9.0, PriorityTier::Critical),
        (8.0, PriorityTier::Urgent),
        (7.0, PriorityTier::High),
        (6.0, PriorityTier::Elevated),
        (5.0, PriorityTier::Moderate),
        (4.0, PriorityTier::Routine),
        (3.0, PriorityTier::Low),
    ];

    /// Map an urgency score to its tier.
    pub fn from_urgency(urgency: f64) -> Self {
        for (threshold, tier) in Self::LADDER {
            if urgency >= threshold {
                return tier;
            }
        }
        PriorityTier::Minimal
    }

    /// 0 for the most urgent tier through 7 for the least.
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// Eisenhower quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// Urgent and important: do first
    Q1,
    /// Important but not urgent: schedule
    Q2,
    /// Urgent but not important: delegate
    Q3,
    /// Neither: eliminate
    Q4,
}

impl Quadrant {
    /// Derive the quadrant from both scores against the shared cutoff.
    /// The boundary is inclusive on the urgent/important side.
    pub fn from_scores(urgency: f64, importance: f64, cutoff: f64) -> Self {
        let urgent = urgency >= cutoff;
        let important = importance >= cutoff;
        match (urgent, important) {
            (true, true) => Quadrant::Q1,
            (false, true) => Quadrant::Q2,
            (true, false) => Quadrant::Q3,
            (false, false) => Quadrant::Q4,
        }
    }

    /// Recommended handling for items in this quadrant
    pub fn action(&self) -> &'static str {
        match self {
            Quadrant::Q1 => "DO FIRST",
            Quadrant::Q2 => "SCHEDULE",
            Quadrant::Q3 => "DELEGATE",
            Quadrant::Q4 => "ELIMINATE",
        }
    }

    /// 0 (Q1) through 3 (Q4) for ranking
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// Scoring weights and keyword tables.
///
/// All tunables live here; the engine itself holds no inline numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Urgency before any signal applies
    pub baseline_urgency: f64,
    /// Added when an urgent keyword is present
    pub urgent_keyword_weight: f64,
    /// Added to urgency for any privileged sender
    pub privileged_sender_urgency_weight: f64,
    /// Added when the all-caps count reaches `all_caps_threshold`
    pub emphasis_weight: f64,
    /// Shouted-word count at which emphasis kicks in
    pub all_caps_threshold: usize,
    /// Subtracted for explicit FYI/low-priority markers
    pub low_priority_penalty: f64,
    /// Importance before any signal applies
    pub baseline_importance: f64,
    /// Added to importance for executive-class senders
    pub executive_importance_weight: f64,
    /// Added to importance for management-class senders
    pub management_importance_weight: f64,
    /// Added when a strategic keyword is present
    pub strategic_keyword_weight: f64,
    /// Shared urgent/important cutoff for the quadrant split
    pub quadrant_cutoff: f64,
    /// Keywords that flag urgency (matched case-insensitively)
    pub urgent_keywords: Vec<String>,
    /// Keywords that flag strategic weight
    pub strategic_keywords: Vec<String>,
    /// Markers that flag explicit low priority
    pub fyi_markers: Vec<String>,
    /// Sender substrings classed as executive
    pub executive_senders: Vec<String>,
    /// Sender substrings classed as management
    pub management_senders: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            baseline_urgency: 3.0,
            urgent_keyword_weight: 2.0,
            privileged_sender_urgency_weight: 2.0,
            emphasis_weight: 1.0,
            all_caps_threshold: 2,
            low_priority_penalty: 2.0,
            baseline_importance: 4.0,
            executive_importance_weight: 3.0,
            management_importance_weight: 1.5,
            strategic_keyword_weight: 2.0,
            quadrant_cutoff: DEFAULT_QUADRANT_CUTOFF,
            urgent_keywords: to_strings(&[
                "urgent",
                "asap",
                "immediate",
                "critical",
                "emergency",
                "action required",
                "time-sensitive",
                "deadline",
            ]),
            strategic_keywords: to_strings(&[
                "strategy",
                "strategic",
                "roadmap",
                "budget",
                "revenue",
                "partnership",
                "board",
                "acquisition",
            ]),
            fyi_markers: to_strings(&["fyi", "for your information", "no action needed"]),
            executive_senders: to_strings(&["ceo", "chief", "president", "board", "vp", "founder"]),
            management_senders: to_strings(&["director", "manager", "lead", "head of"]),
        }
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// A scored item: one immutable result per input per scoring pass.
/// Re-scoring builds a new value, never edits in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Identity of the scored input
    pub source_id: String,
    /// 0-10, higher is more time-critical
    pub urgency: f64,
    /// 0-10, higher is more consequential
    pub importance: f64,
    /// Tier from urgency alone
    pub tier: PriorityTier,
    /// Eisenhower quadrant from both axes
    pub quadrant: Quadrant,
    /// Ordered contributing factors, urgency first then importance
    pub reasoning: Vec<ScoreFactor>,
    /// Deadline carried from the input snapshot, for downstream ordering
    pub deadline: Option<DateTime<Utc>>,
    /// The snapshot's reference time
    pub scored_at: DateTime<Utc>,
}

/// Deterministic scoring engine.
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Create an engine with default weights
    pub fn new() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }

    /// Create with custom weights
    pub fn with_config(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one signal snapshot.
    ///
    /// Fails only when the required `source_id` is absent; every optional
    /// signal has a neutral default.
    pub fn score(&self, signals: &ScoringSignals) -> Result<ScoredItem, ValidationError> {
        if signals.source_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                kind: "ScoringSignals".to_string(),
                field: "source_id".to_string(),
            });
        }

        let mut reasoning = Vec::new();
        let urgency = self.calculate_urgency(signals, &mut reasoning);
        let importance = self.calculate_importance(signals, &mut reasoning);

        Ok(ScoredItem {
            source_id: signals.source_id.clone(),
            urgency,
            importance,
            tier: PriorityTier::from_urgency(urgency),
            quadrant: Quadrant::from_scores(urgency, importance, self.config.quadrant_cutoff),
            reasoning,
            deadline: signals.deadline,
            scored_at: signals.now,
        })
    }

    /// Urgency: baseline + keyword + sender + deadline + emphasis - FYI,
    /// clamped to [0, 10].
    fn calculate_urgency(&self, signals: &ScoringSignals, reasoning: &mut Vec<ScoreFactor>) -> f64 {
        let mut score = self.config.baseline_urgency;
        reasoning.push(ScoreFactor::new("baseline", self.config.baseline_urgency));

        if signals.contains_urgent_keyword {
            score += self.config.urgent_keyword_weight;
            reasoning.push(ScoreFactor::new(
                "urgent keyword",
                self.config.urgent_keyword_weight,
            ));
        }

        if signals.sender_class.is_privileged() {
            score += self.config.privileged_sender_urgency_weight;
            reasoning.push(ScoreFactor::new(
                "privileged sender",
                self.config.privileged_sender_urgency_weight,
            ));
        }

        if let Some(deadline) = signals.deadline {
            let (delta, band) = self.deadline_term(deadline, signals.now);
            score += delta;
            reasoning.push(ScoreFactor::new(format!("deadline {}", band), delta));
        }

        if signals.all_caps_word_count >= self.config.all_caps_threshold {
            score += self.config.emphasis_weight;
            reasoning.push(ScoreFactor::new(
                "all-caps emphasis",
                self.config.emphasis_weight,
            ));
        }

        if signals.is_low_priority_fyi {
            score -= self.config.low_priority_penalty;
            reasoning.push(ScoreFactor::new(
                "FYI marker",
                -self.config.low_priority_penalty,
            ));
        }

        score.clamp(0.0, 10.0)
    }

    /// Deadline urgency term, a step function of the remaining time.
    ///
    /// Bands (added to the baseline of 3 they reproduce the classic
    /// absolute ladder 10/9/8/7/5/3/1):
    /// - Overdue or within 4h: +7
    /// - Within 24h: +6
    /// - Within 2 days: +5
    /// - Within 5 days: +4
    /// - Within 10 days: +2
    /// - Within 20 days: +0
    /// - Beyond: -2
    fn deadline_term(&self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> (f64, &'static str) {
        let hours = (deadline - now).num_hours();

        if hours <= 4 {
            // Overdue saturates at the maximum step.
            (7.0, "overdue or within 4h")
        } else if hours <= 24 {
            (6.0, "within 24h")
        } else if hours <= 48 {
            (5.0, "within 2 days")
        } else if hours <= 120 {
            (4.0, "within 5 days")
        } else if hours <= 240 {
            (2.0, "within 10 days")
        } else if hours <= 480 {
            (0.0, "within 20 days")
        } else {
            (-2.0, "distant")
        }
    }

    /// Importance: independent of urgency. An explicit hint replaces the
    /// heuristic entirely; a human signal outranks inferred text features.
    fn calculate_importance(
        &self,
        signals: &ScoringSignals,
        reasoning: &mut Vec<ScoreFactor>,
    ) -> f64 {
        if let Some(hint) = signals.explicit_importance_hint {
            let clamped = hint.clamp(0.0, 10.0);
            reasoning.push(ScoreFactor::new("explicit importance hint", clamped));
            return clamped;
        }

        let mut score = self.config.baseline_importance;
        reasoning.push(ScoreFactor::new(
            "importance baseline",
            self.config.baseline_importance,
        ));

        match signals.sender_class {
            SenderClass::Executive => {
                score += self.config.executive_importance_weight;
                reasoning.push(ScoreFactor::new(
                    "executive sender",
                    self.config.executive_importance_weight,
                ));
            }
            SenderClass::Management => {
                score += self.config.management_importance_weight;
                reasoning.push(ScoreFactor::new(
                    "management sender",
                    self.config.management_importance_weight,
                ));
            }
            SenderClass::Standard => {}
        }

        if signals.contains_strategic_keyword {
            score += self.config.strategic_keyword_weight;
            reasoning.push(ScoreFactor::new(
                "strategic signal",
                self.config.strategic_keyword_weight,
            ));
        }

        score.clamp(0.0, 10.0)
    }

    /// Derive a signal snapshot from a raw message by matching the
    /// configured keyword tables (plain case-insensitive containment).
    ///
    /// `deadline` and `importance_hint` come from upstream advisories when
    /// available; both are optional.
    pub fn scan_signals(
        &self,
        message: &RawMessage,
        deadline: Option<DateTime<Utc>>,
        importance_hint: Option<f64>,
        now: DateTime<Utc>,
    ) -> ScoringSignals {
        let haystack = format!("{} {}", message.subject, message.body).to_lowercase();
        let sender = message.sender.to_lowercase();

        let sender_class = if contains_any(&sender, &self.config.executive_senders) {
            SenderClass::Executive
        } else if contains_any(&sender, &self.config.management_senders) {
            SenderClass::Management
        } else {
            SenderClass::Standard
        };

        ScoringSignals {
            source_id: message.id.clone(),
            sender_class,
            contains_urgent_keyword: contains_any(&haystack, &self.config.urgent_keywords),
            contains_strategic_keyword: contains_any(&haystack, &self.config.strategic_keywords),
            is_low_priority_fyi: contains_any(&haystack, &self.config.fyi_markers),
            all_caps_word_count: count_shouted_words(&message.subject),
            deadline,
            explicit_importance_hint: importance_hint,
            now,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

/// Count words of 4+ letters written entirely in capitals. Shorter
/// all-caps words are usually acronyms (API, CEO), not emphasis.
fn count_shouted_words(text: &str) -> usize {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() >= 4 && w.chars().all(|c| c.is_ascii_uppercase()))
        .count()
}

/// Convenience function to score one snapshot with default weights
pub fn score(signals: &ScoringSignals) -> Result<ScoredItem, ValidationError> {
    ScoringEngine::new().score(signals)
}
