//! Station orchestration: runs a cycle, times it, and feeds the result into the KPI counters.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{self, StationConfig};
use crate::error::ConfigError;
use crate::kpi::{KpiReporter, KpiSnapshot};
use crate::serial::DeviceLink;
use crate::session::{BookInputs, BookMode};
use crate::workflow::{CycleOutcome, DeviceTimings, ValidationWorkflow};

/// A test station for one operator. `run_cycle` takes `&mut self`, so only one cycle can be
/// in flight at a time.
pub struct Station<L: DeviceLink, R: Rng = StdRng> {
    link: L,
    config: StationConfig,
    config_path: Option<PathBuf>,
    selected_model: Option<String>,
    timings: DeviceTimings,
    station_upc: Option<String>,
    books: BookInputs,
    reporter: KpiReporter<R>,
    committed_dsn: Option<String>,
    count_config_faults: bool,
}

impl<L: DeviceLink> Station<L, StdRng> {
    pub fn new(link: L, config: StationConfig) -> Self {
        Self::with_reporter(link, config, KpiReporter::new())
    }
}

impl<L: DeviceLink, R: Rng> Station<L, R> {
    pub fn with_reporter(link: L, config: StationConfig, reporter: KpiReporter<R>) -> Self {
        Self {
            link,
            config,
            config_path: None,
            selected_model: None,
            timings: DeviceTimings::default(),
            station_upc: None,
            books: BookInputs::default(),
            reporter,
            committed_dsn: None,
            count_config_faults: true,
        }
    }

    /// Re-reads the config file at the start of every cycle, so port and model edits
    /// apply from the next unit on. Missing `[COM]` keys are seeded first.
    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) {
        self.config_path = Some(path.into());
    }

    pub fn select_model(&mut self, model_code: impl Into<String>) {
        self.selected_model = Some(model_code.into());
    }

    pub fn set_mode(&mut self, mode: BookMode) {
        self.books = BookInputs::new(mode);
    }

    pub fn set_timings(&mut self, timings: DeviceTimings) {
        self.timings = timings;
    }

    pub fn set_station_upc(&mut self, upc: Option<String>) {
        self.station_upc = upc;
    }

    /// When false, configuration faults stay out of both counter sets.
    /// Defaults to true: a setup defect is counted like any failed cycle.
    pub fn set_count_config_faults(&mut self, count: bool) {
        self.count_config_faults = count;
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn books(&self) -> &BookInputs {
        &self.books
    }

    pub fn books_mut(&mut self) -> &mut BookInputs {
        &mut self.books
    }

    pub fn committed_dsn(&self) -> Option<&str> {
        self.committed_dsn.as_deref()
    }

    pub fn reporter(&self) -> &KpiReporter<R> {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut KpiReporter<R> {
        &mut self.reporter
    }

    pub fn snapshot(&self) -> KpiSnapshot {
        self.reporter.snapshot()
    }

    /// Starts a new unit: clears the book inputs and the previous DSN.
    pub fn begin_cycle(&mut self) {
        self.books.clear();
        self.committed_dsn = None;
    }

    /// Runs one cycle on the committed books, records it and clears the inputs.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        tracing::info!("FLOW started");

        let outcome = match self.reload_config() {
            Ok(()) => ValidationWorkflow::new(&self.link)
                .with_timings(self.timings)
                .with_station_upc(self.station_upc.clone())
                .run_for_model(&self.config, self.selected_model.as_deref(), &self.books),
            Err(error) => {
                tracing::error!(%error, "config reload failed");
                CycleOutcome::configuration_fault(error)
            }
        };
        let elapsed = started.elapsed();

        if outcome.is_configuration_fault() && !self.count_config_faults {
            tracing::warn!(message = %outcome.message, "configuration fault not counted");
        } else {
            self.reporter.record_outcome(outcome.ok, elapsed);
        }

        let verdict = if outcome.ok { "PASS" } else { "FAIL" };
        tracing::info!("[RESULT] {} cycle={:.3}s msg={}", verdict, elapsed.as_secs_f64(), outcome.message);

        if let Some(dsn) = outcome.dsn() {
            self.committed_dsn = Some(dsn.to_string());
        }
        self.books.clear();
        outcome
    }

    fn reload_config(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.config_path.as_deref() else { return Ok(()) };
        self.config = load_fresh(path)?;
        Ok(())
    }
}

fn load_fresh(path: &Path) -> Result<StationConfig, ConfigError> {
    config::ensure_com_defaults(path)?;
    StationConfig::load(path)
}
