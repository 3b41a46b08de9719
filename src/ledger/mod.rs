//! Usage ledger: append-only hit/miss accounting.
//!
//! Every cache check is recorded as exactly one event. Events are never
//! mutated or deleted; aggregates are computed on read. Savings on a hit use
//! the cost recorded on the stored asset at generation time, not a
//! re-estimate from the current caller's tier — the asset is reused as-is.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hit,
    Miss,
}

/// One cache-check outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Collection identifier the request belonged to; "unscoped" when absent.
    pub scope: String,
    pub kind: EventKind,
    pub cost_saved: f64,
    pub cost_incurred: f64,
    pub timestamp: u64,
}

/// Scope label used for requests without a collection.
pub const UNSCOPED: &str = "unscoped";

/// Append-only in-memory usage ledger.
pub struct UsageLedger {
    events: Arc<RwLock<Vec<UsageEvent>>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn record_hit(&self, scope: &str, cost_saved: f64) {
        self.append(UsageEvent {
            scope: scope.to_string(),
            kind: EventKind::Hit,
            cost_saved,
            cost_incurred: 0.0,
            timestamp: unix_now(),
        });
    }

    pub fn record_miss(&self, scope: &str, cost_incurred: f64) {
        self.append(UsageEvent {
            scope: scope.to_string(),
            kind: EventKind::Miss,
            cost_saved: 0.0,
            cost_incurred,
            timestamp: unix_now(),
        });
    }

    fn append(&self, event: UsageEvent) {
        self.events.write().unwrap().push(event);
    }

    /// Hits divided by total checks for a scope; 0.0 when no events exist.
    pub fn hit_rate(&self, scope: &str) -> f64 {
        let events = self.events.read().unwrap();
        let (hits, total) = events
            .iter()
            .filter(|e| e.scope == scope)
            .fold((0u64, 0u64), |(h, t), e| {
                (h + (e.kind == EventKind::Hit) as u64, t + 1)
            });
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn total_saved(&self, scope: &str) -> f64 {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.scope == scope)
            .map(|e| e.cost_saved)
            .sum()
    }

    pub fn total_incurred(&self, scope: &str) -> f64 {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.scope == scope)
            .map(|e| e.cost_incurred)
            .sum()
    }

    /// Snapshot of all recorded events, in append order.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_counts_per_scope() {
        let ledger = UsageLedger::new();
        ledger.record_miss("course-7", 0.05);
        ledger.record_hit("course-7", 0.05);
        ledger.record_hit("course-7", 0.05);
        ledger.record_miss("course-9", 0.02);

        assert!((ledger.hit_rate("course-7") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(ledger.hit_rate("course-9"), 0.0);
        assert_eq!(ledger.hit_rate("missing"), 0.0);
    }

    #[test]
    fn totals_sum_per_scope() {
        let ledger = UsageLedger::new();
        ledger.record_miss("course-7", 0.05);
        ledger.record_hit("course-7", 0.05);
        ledger.record_hit("course-7", 0.05);

        assert!((ledger.total_incurred("course-7") - 0.05).abs() < 1e-9);
        assert!((ledger.total_saved("course-7") - 0.10).abs() < 1e-9);
    }

    #[test]
    fn events_are_append_only_and_ordered() {
        let ledger = UsageLedger::new();
        ledger.record_miss("s", 1.0);
        ledger.record_hit("s", 1.0);
        let events = ledger.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Miss);
        assert_eq!(events[1].kind, EventKind::Hit);
    }
}
