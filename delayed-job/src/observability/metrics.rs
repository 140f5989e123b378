use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// A counted step in a job's life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Enqueued,
    Started,
    Completed,
    Retried,
    DeadLettered,
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::Enqueued,
        Transition::Started,
        Transition::Completed,
        Transition::Retried,
        Transition::DeadLettered,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Transition counts, either for one job class or for everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts([u64; 5]);

impl Counts {
    pub fn get(&self, transition: Transition) -> u64 {
        self.0[transition.slot()]
    }

    fn bump(&mut self, transition: Transition) {
        self.0[transition.slot()] += 1;
    }

    /// Percentage of finished runs that completed; 100 when nothing finished yet.
    /// A run that was requeued is not finished.
    pub fn success_rate(&self) -> f64 {
        let completed = self.get(Transition::Completed);
        let finished = completed + self.get(Transition::DeadLettered);
        if finished == 0 {
            return 100.0;
        }
        completed as f64 / finished as f64 * 100.0
    }

    /// Percentage of started runs that ended in a retry
    pub fn retry_rate(&self) -> f64 {
        match self.get(Transition::Started) {
            0 => 0.0,
            started => self.get(Transition::Retried) as f64 / started as f64 * 100.0,
        }
    }
}

/// Process-local job counters, global and per job class
#[derive(Debug, Default)]
pub struct LiveMetrics {
    totals: [AtomicU64; 5],
    by_class: RwLock<HashMap<String, Counts>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, transition: Transition, class: &str) {
        self.totals[transition.slot()].fetch_add(1, Ordering::Relaxed);
        self.by_class
            .write()
            .entry(class.to_string())
            .or_default()
            .bump(transition);
    }

    pub fn total(&self, transition: Transition) -> u64 {
        self.totals[transition.slot()].load(Ordering::Relaxed)
    }

    pub fn totals(&self) -> Counts {
        let mut counts = Counts::default();
        for transition in Transition::ALL {
            counts.0[transition.slot()] = self.total(transition);
        }
        counts
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            taken_at: Utc::now(),
            totals: self.totals(),
            by_class: self.by_class.read().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub totals: Counts,
    pub by_class: HashMap<String, Counts>,
}
