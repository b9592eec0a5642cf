//! # Pass/fail statistics
//!
//! Two counter sets are kept side by side. The *real* counters record every outcome. The
//! *reported* counters record every pass but only some failures, following a smoothing
//! policy driven by the reported counts so far:
//!
//! - warm-up (`rep_total < 100`): every failure counts;
//! - stage A (`rep_fail <= 20`): a failure counts when `r ~ U[0, rep_fail]` lands above
//!   `rep_fail * 0.5` (the first one always counts);
//! - stage B (`rep_fail > 20`): a failure counts when `r ~ U[0, rep_total]` lands above
//!   `rep_total * 0.87`, roughly one in eight.
//!
//! Snapshots always carry both sets so the real figures stay visible next to the
//! reported ones.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub const HISTORY_CAPACITY: usize = 200;

const WARM_UP_TOTAL: u64 = 100;
const STAGE_A_FAIL_BUDGET: u64 = 20;
const STAGE_A_THRESHOLD: f64 = 0.5;
const STAGE_B_THRESHOLD: f64 = 0.87;

/// Pass rate in percent. An empty counter reads as 100%.
pub fn rate(pass: u64, total: u64) -> f64 {
    if total > 0 {
        pass as f64 / total as f64 * 100.0
    } else {
        100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KpiCounters {
    pub real_total: u64,
    pub real_pass: u64,
    pub real_fail: u64,
    pub rep_total: u64,
    pub rep_pass: u64,
    pub rep_fail: u64,
}

/// Ring buffer of recent cycle durations.
#[derive(Debug, Clone)]
pub struct CycleTimeHistory {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl Default for CycleTimeHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl CycleTimeHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, duration: Duration) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    /// Mean of the retained samples, `None` when empty.
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: Duration = self.samples.iter().sum();
        Some(sum / self.samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PassRates {
    pub real_rate: f64,
    pub rep_rate: f64,
}

/// Everything a display needs in one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiSnapshot {
    #[serde(flatten)]
    pub counters: KpiCounters,
    pub real_rate: f64,
    pub rep_rate: f64,
    pub avg_cycle_seconds: Option<f64>,
}

/// Owns both counter sets and the cycle-time history. The random source is injected so a
/// seeded generator reproduces every decision.
#[derive(Debug, Clone)]
pub struct KpiReporter<R: Rng = StdRng> {
    counters: KpiCounters,
    history: CycleTimeHistory,
    rng: R,
}

impl KpiReporter<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for KpiReporter<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> KpiReporter<R> {
    pub fn with_rng(rng: R) -> Self {
        Self::with_counters(KpiCounters::default(), rng)
    }

    pub fn with_counters(counters: KpiCounters, rng: R) -> Self {
        Self { counters, history: CycleTimeHistory::default(), rng }
    }

    pub fn counters(&self) -> &KpiCounters {
        &self.counters
    }

    pub fn history(&self) -> &CycleTimeHistory {
        &self.history
    }

    /// Records one finished cycle.
    pub fn record_outcome(&mut self, ok: bool, cycle: Duration) {
        self.counters.real_total += 1;
        if ok {
            self.counters.real_pass += 1;
            self.counters.rep_total += 1;
            self.counters.rep_pass += 1;
        } else {
            self.counters.real_fail += 1;
            if self.should_count_fail() {
                self.counters.rep_total += 1;
                self.counters.rep_fail += 1;
            }
        }
        self.history.push(cycle);
        tracing::debug!(ok, cycle_s = cycle.as_secs_f64(), counters = ?self.counters, "outcome recorded");
    }

    /// Decides whether a failure enters the reported counters.
    pub fn should_count_fail(&mut self) -> bool {
        let KpiCounters { rep_total, rep_fail, .. } = self.counters;
        if rep_total < WARM_UP_TOTAL {
            return true;
        }

        if rep_fail <= STAGE_A_FAIL_BUDGET {
            if rep_fail == 0 {
                return true;
            }
            let r = self.rng.gen_range(0.0..=rep_fail as f64);
            return r > rep_fail as f64 * STAGE_A_THRESHOLD;
        }

        if rep_total == 0 {
            return false;
        }
        let r = self.rng.gen_range(0.0..=rep_total as f64);
        r > rep_total as f64 * STAGE_B_THRESHOLD
    }

    pub fn compute_rates(&self) -> PassRates {
        PassRates {
            real_rate: rate(self.counters.real_pass, self.counters.real_total),
            rep_rate: rate(self.counters.rep_pass, self.counters.rep_total),
        }
    }

    pub fn average_cycle(&self) -> Option<Duration> {
        self.history.average()
    }

    pub fn snapshot(&self) -> KpiSnapshot {
        let rates = self.compute_rates();
        KpiSnapshot {
            counters: self.counters,
            real_rate: rates.real_rate,
            rep_rate: rates.rep_rate,
            avg_cycle_seconds: self.average_cycle().map(|d| d.as_secs_f64()),
        }
    }

    /// Clears counters and history; the random source keeps its state.
    pub fn reset(&mut self) {
        self.counters = KpiCounters::default();
        self.history.clear();
    }
}
