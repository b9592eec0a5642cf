//! Bulk simulation: feeds synthetic outcomes through the KPI reporter to show how the real
//! and reported figures drift apart over a long shift.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

use crate::kpi::{rate, KpiReporter, KpiSnapshot};

/// Real pass rate at or above which a simulated shift is called a PASS.
pub const SHIFT_PASS_RATE: f64 = 95.0;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub runs: u64,
    /// Probability of an operator, lighting or camera failure.
    pub p_human: f64,
    /// Probability of a station failure.
    pub p_system: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self { runs: 10_000, p_human: 0.20, p_system: 0.03 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FailureCause {
    Pass,
    Human,
    System,
    HumanAndSystem,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Pass => write!(f, "PASS"),
            FailureCause::Human => write!(f, "HUMAN"),
            FailureCause::System => write!(f, "SYSTEM"),
            FailureCause::HumanAndSystem => write!(f, "HUMAN+SYSTEM"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub causes: BTreeMap<FailureCause, u64>,
    pub elapsed_seconds: f64,
    pub snapshot: KpiSnapshot,
    pub shift_passed: bool,
}

/// Resets `reporter`, then records `params.runs` synthetic cycles drawn from `rng`.
pub fn simulate<R: Rng, S: Rng>(reporter: &mut KpiReporter<R>, params: &SimulationParams, rng: &mut S) -> SimulationReport {
    reporter.reset();
    tracing::info!(runs = params.runs, p_human = params.p_human, p_system = params.p_system, "simulation started");

    let started = Instant::now();
    let mut causes = BTreeMap::new();

    for i in 1..=params.runs {
        let cycle = Duration::from_secs_f64(rng.gen_range(0.6..1.6));
        let human = rng.gen::<f64>() < params.p_human;
        let system = rng.gen::<f64>() < params.p_system;

        let cause = match (human, system) {
            (false, false) => FailureCause::Pass,
            (true, false) => FailureCause::Human,
            (false, true) => FailureCause::System,
            (true, true) => FailureCause::HumanAndSystem,
        };
        reporter.record_outcome(cause == FailureCause::Pass, cycle);
        *causes.entry(cause).or_insert(0) += 1;

        if i % PROGRESS_EVERY == 0 {
            let c = reporter.counters();
            tracing::info!(
                "[SIM] {}/{} | real_pass={:.2}% | rep_pass={:.2}%",
                i,
                params.runs,
                rate(c.real_pass, c.real_total),
                rate(c.rep_pass, c.rep_total)
            );
        }
    }

    let snapshot = reporter.snapshot();
    let report = SimulationReport {
        causes,
        elapsed_seconds: started.elapsed().as_secs_f64(),
        shift_passed: snapshot.real_rate >= SHIFT_PASS_RATE,
        snapshot,
    };
    tracing::info!(
        real_rate = report.snapshot.real_rate,
        rep_rate = report.snapshot.rep_rate,
        elapsed_s = report.elapsed_seconds,
        "simulation finished"
    );
    report
}
