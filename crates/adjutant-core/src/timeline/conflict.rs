//! Conflict detection between calendar occupants.
//!
//! Overlapping items are grouped into maximal transitive clusters: if A
//! overlaps B and B overlaps C, all three belong to one conflict even when
//! A and C never touch.

use serde::{Deserialize, Serialize};

use super::{ScheduleItem, TimeInterval};

/// A maximal cluster of mutually conflicting items.
///
/// `interval` is the contested window: the members' mutual intersection
/// when one exists, otherwise the full cluster span (which every member
/// still overlaps). Members are ordered by start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSet {
    pub interval: TimeInterval,
    pub members: Vec<ScheduleItem>,
}

impl ConflictSet {
    /// Build from a non-empty cluster ordered by start time.
    fn from_members(members: Vec<ScheduleItem>) -> Self {
        let mut core_start = members[0].interval.start();
        let mut core_end = members[0].interval.end();
        let mut span = members[0].interval;
        for m in &members[1..] {
            // Latest start vs earliest end across members.
            core_start = core_start.max(m.interval.start());
            core_end = core_end.min(m.interval.end());
            span = span.span(&m.interval);
        }

        let interval = if core_start < core_end {
            // Mutual intersection exists; report the contested window.
            TimeInterval {
                start: core_start,
                end: core_end,
            }
        } else {
            // Chain-shaped cluster with no common window: fall back to the
            // span, which overlaps every member.
            span
        };

        Self { interval, members }
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }
}

/// Group items into maximal transitive overlap clusters.
///
/// Input order does not matter: items are first sorted by (start, end, id)
/// so cluster membership and output order are identical for any
/// permutation of the same items. Clusters of one (no conflict) are not
/// reported.
pub fn find_conflicts(items: &[ScheduleItem]) -> Vec<ConflictSet> {
    if items.len() < 2 {
        return Vec::new();
    }

    // 1. Canonical order for deterministic grouping.
    let mut sorted: Vec<&ScheduleItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        a.interval
            .start()
            .cmp(&b.interval.start())
            .then(a.interval.end().cmp(&b.interval.end()))
            .then(a.id.cmp(&b.id))
    });

    // 2. Sweep: an item joins the open cluster while it starts strictly
    //    before the furthest end seen so far (half-open overlap).
    let mut conflicts = Vec::new();
    let mut cluster: Vec<ScheduleItem> = vec![sorted[0].clone()];
    let mut cluster_end = sorted[0].interval.end();

    for item in &sorted[1..] {
        if item.interval.start() < cluster_end {
            cluster_end = cluster_end.max(item.interval.end());
            cluster.push((*item).clone());
        } else {
            if cluster.len() >= 2 {
                conflicts.push(ConflictSet::from_members(cluster));
            }
            cluster = vec![(*item).clone()];
            cluster_end = item.interval.end();
        }
    }
    if cluster.len() >= 2 {
        conflicts.push(ConflictSet::from_members(cluster));
    }

    conflicts
}
