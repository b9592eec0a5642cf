//! # Validation cycle
//!
//! One cycle walks a unit through every device in a fixed order and stops at the first
//! failure:
//!
//! `Start → BooksChecked → Scanned → GoldenEyeVerified → SfcQueried → SfcConfirmed → Done`
//!
//! Nothing is retried. Whatever goes wrong ends up as a failed [`CycleOutcome`] whose
//! message names the device, its port and the values that disagreed.

use std::time::Duration;

use serde::Serialize;

use crate::codec::{self, NULL_FIELD, SCAN_TRIGGER};
use crate::config::{DeviceRole, ModelProfile, StationConfig};
use crate::error::{ChannelError, ConfigError, CycleFailure, FailureKind};
use crate::serial::{self, DeviceLink};
use crate::session::{is_blank, BookInputs, BookMode, ReadySession, SessionReadiness};

pub const PASS_MESSAGE: &str = "ALL PASSED";

/// Baud rate and per-request deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimings {
    pub baud_rate: u32,
    pub scanner: Duration,
    pub golden_eye: Duration,
    /// SFC does a database lookup, so it gets the longest deadlines.
    pub sfc_query: Duration,
    pub sfc_confirm: Duration,
    /// Append CRLF to text requests.
    pub append_terminator: bool,
}

impl Default for DeviceTimings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            scanner: Duration::from_secs(5),
            golden_eye: Duration::from_secs(7),
            sfc_query: Duration::from_secs(10),
            sfc_confirm: Duration::from_secs(10),
            append_terminator: true,
        }
    }
}

/// Last step a cycle completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CycleStep {
    Start,
    BooksChecked,
    Scanned,
    GoldenEyeVerified,
    SfcQueried,
    SfcConfirmed,
    Done,
}

/// Values gathered while a cycle runs. One per cycle, never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationContext {
    pub book1: String,
    pub book2: String,
    pub scanned_sn: Option<String>,
    /// Committed once Golden Eye has echoed the scanned serial.
    pub dsn: Option<String>,
    pub upc: Option<String>,
    /// First six characters of the USB cable serial (SSN4) reported by Golden Eye.
    pub usb_cable6: Option<String>,
    pub sfc_dsn: Option<String>,
    pub sfc_upc: Option<String>,
    pub sfc_ssn4_6: Option<String>,
    pub sfc_ssn2: Option<String>,
    pub sfc_ssn8: Option<String>,
}

/// Result of one cycle as seen by the operator and the KPI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub ok: bool,
    pub message: String,
    pub kind: Option<FailureKind>,
    pub last_step: CycleStep,
    pub context: ValidationContext,
}

impl CycleOutcome {
    fn passed(context: ValidationContext) -> Self {
        Self {
            ok: true,
            message: PASS_MESSAGE.to_string(),
            kind: None,
            last_step: CycleStep::Done,
            context,
        }
    }

    fn failed(failure: &CycleFailure, last_step: CycleStep, context: ValidationContext) -> Self {
        Self {
            ok: false,
            message: failure.to_string(),
            kind: Some(failure.kind()),
            last_step,
            context,
        }
    }

    /// Outcome for a cycle that never started because the station is not set up.
    pub fn configuration_fault(error: ConfigError) -> Self {
        Self::failed(&CycleFailure::from(error), CycleStep::Start, ValidationContext::default())
    }

    /// The DSN committed during the cycle, if it got that far.
    pub fn dsn(&self) -> Option<&str> {
        self.context.dsn.as_deref()
    }

    pub fn is_configuration_fault(&self) -> bool {
        self.kind == Some(FailureKind::Configuration)
    }
}

/// Drives one validation cycle over a [`DeviceLink`].
pub struct ValidationWorkflow<'a, L: DeviceLink> {
    link: &'a L,
    timings: DeviceTimings,
    station_upc: Option<String>,
}

impl<'a, L: DeviceLink> ValidationWorkflow<'a, L> {
    pub fn new(link: &'a L) -> Self {
        Self { link, timings: DeviceTimings::default(), station_upc: None }
    }

    pub fn with_timings(mut self, timings: DeviceTimings) -> Self {
        self.timings = timings;
        self
    }

    /// UPC read at the station; checked against SFC only when both sides have one.
    pub fn with_station_upc(mut self, upc: Option<String>) -> Self {
        self.station_upc = upc;
        self
    }

    /// Resolves the session from configuration, then runs the cycle. Configuration faults
    /// are reported before any device is touched.
    pub fn run_for_model(
        &self,
        config: &StationConfig,
        selected_model: Option<&str>,
        books: &BookInputs,
    ) -> CycleOutcome {
        match SessionReadiness::check(config, selected_model) {
            Ok(session) => self.run(&session, books),
            Err(error) => {
                tracing::error!(%error, "station not ready");
                CycleOutcome::configuration_fault(error)
            }
        }
    }

    pub fn run(&self, session: &ReadySession, books: &BookInputs) -> CycleOutcome {
        let mut context = ValidationContext { upc: self.station_upc.clone(), ..Default::default() };
        let mut step = CycleStep::Start;
        tracing::info!(model = %session.profile.model_code, mode = ?books.mode, "cycle started");

        match self.execute(session, books, &mut context, &mut step) {
            Ok(()) => {
                tracing::info!(dsn = ?context.dsn, "{}", PASS_MESSAGE);
                CycleOutcome::passed(context)
            }
            Err(failure) => {
                tracing::warn!(step = ?step, kind = ?failure.kind(), "{}", failure);
                CycleOutcome::failed(&failure, step, context)
            }
        }
    }

    fn execute(
        &self,
        session: &ReadySession,
        books: &BookInputs,
        ctx: &mut ValidationContext,
        step: &mut CycleStep,
    ) -> Result<(), CycleFailure> {
        check_books(&session.profile, books, ctx)?;
        *step = CycleStep::BooksChecked;

        if !books.is_committed() {
            return Err(CycleFailure::BooksNotCommitted);
        }

        let scanned = self.scan(&session.scanner_port)?;
        ctx.scanned_sn = Some(scanned.clone());
        *step = CycleStep::Scanned;

        self.verify_golden_eye(&session.golden_eye_port, &scanned, ctx)?;
        *step = CycleStep::GoldenEyeVerified;

        self.query_sfc(&session.sfc_port, &scanned, ctx)?;
        *step = CycleStep::SfcQueried;

        self.confirm_sfc(&session.sfc_port, &scanned, books.mode, ctx)?;
        *step = CycleStep::SfcConfirmed;
        Ok(())
    }

    fn scan(&self, port: &str) -> Result<String, CycleFailure> {
        let raw = self
            .link
            .send_fixed_command(port, &SCAN_TRIGGER, self.timings.baud_rate, self.timings.scanner)
            .map_err(channel_failure(DeviceRole::CameraScanner, port))?;
        let scanned = serial::scan_text(&raw);
        tracing::info!(scanned_sn = %scanned, "unit scanned");
        if scanned.is_empty() {
            return Err(missing(DeviceRole::CameraScanner, port, "DSN"));
        }
        Ok(scanned)
    }

    fn verify_golden_eye(&self, port: &str, scanned: &str, ctx: &mut ValidationContext) -> Result<(), CycleFailure> {
        let reply = self.send_text(DeviceRole::GoldenEye, port, scanned, self.timings.golden_eye)?;
        let res = codec::parse(&reply);

        let dsn = res.dsn.as_deref().ok_or_else(|| missing(DeviceRole::GoldenEye, port, "DSN"))?;
        if dsn != scanned {
            return Err(mismatch(DeviceRole::GoldenEye, port, "DSN", scanned, dsn));
        }
        let usb_cable6 = res
            .field("SSN4")
            .map(codec::prefix6)
            .ok_or_else(|| missing(DeviceRole::GoldenEye, port, "SSN4"))?;

        ctx.dsn = Some(scanned.to_string());
        ctx.usb_cable6 = Some(usb_cable6);
        tracing::info!(dsn = %scanned, usb_cable6 = ?ctx.usb_cable6, "DSN committed");
        Ok(())
    }

    fn query_sfc(&self, port: &str, dsn: &str, ctx: &mut ValidationContext) -> Result<(), CycleFailure> {
        let reply = self.send_text(DeviceRole::Sfc, port, &codec::sfc_query(dsn), self.timings.sfc_query)?;
        let res = codec::parse(&reply);
        ctx.sfc_dsn = res.dsn.clone();
        ctx.sfc_upc = res.field("UPC").map(str::to_string);

        // An absent SSN4 reads as empty and is settled by the USB cable comparison below.
        let sfc_ssn4 = res.field("SSN4");
        if sfc_ssn4.is_none() {
            tracing::warn!(port, "SFC reply has no SSN4");
        }
        let sfc_ssn4_6 = sfc_ssn4.map(codec::prefix6).unwrap_or_default();
        ctx.sfc_ssn4_6 = Some(sfc_ssn4_6.clone());

        let sfc_dsn = ctx.sfc_dsn.as_deref().unwrap_or_default();
        if dsn != sfc_dsn {
            return Err(mismatch(DeviceRole::Sfc, port, "DSN", dsn, sfc_dsn));
        }

        if let (Some(upc), Some(sfc_upc)) = (ctx.upc.as_deref(), ctx.sfc_upc.as_deref()) {
            if !is_blank(upc) && !is_blank(sfc_upc) && upc != sfc_upc {
                return Err(mismatch(DeviceRole::Sfc, port, "UPC", upc, sfc_upc));
            }
        }

        let usb_cable6 = ctx.usb_cable6.as_deref().unwrap_or_default();
        if usb_cable6 != sfc_ssn4_6 {
            return Err(mismatch(DeviceRole::Sfc, port, "SSN4", usb_cable6, &sfc_ssn4_6));
        }
        Ok(())
    }

    fn confirm_sfc(
        &self,
        port: &str,
        dsn: &str,
        mode: BookMode,
        ctx: &mut ValidationContext,
    ) -> Result<(), CycleFailure> {
        let skipped = is_blank(&ctx.book2) || ctx.book2.to_ascii_lowercase().contains("skip");
        let book2 = if skipped || mode == BookMode::OneBook { NULL_FIELD } else { ctx.book2.as_str() };
        let book1 = if is_blank(&ctx.book1) { NULL_FIELD } else { ctx.book1.as_str() };

        let request = codec::sfc_confirm(dsn, book1, book2);
        let reply = self.send_text(DeviceRole::Sfc, port, &request, self.timings.sfc_confirm)?;

        // Recorded for the archive; the confirmation itself is the pass condition.
        let res = codec::parse(&reply);
        ctx.sfc_ssn2 = res.field("SSN2").map(str::to_string);
        ctx.sfc_ssn8 = res.field("SSN8").map(str::to_string);
        Ok(())
    }

    fn send_text(&self, device: DeviceRole, port: &str, text: &str, timeout: Duration) -> Result<String, CycleFailure> {
        self.link
            .send_text_and_wait(port, text, self.timings.baud_rate, self.timings.append_terminator, timeout)
            .map_err(channel_failure(device, port))
    }
}

fn check_books(profile: &ModelProfile, books: &BookInputs, ctx: &mut ValidationContext) -> Result<(), CycleFailure> {
    let ssn2 = profile.expected_ssn2.as_str();
    let ssn8 = profile.expected_ssn8.as_str();

    match books.mode {
        BookMode::OneBook => {
            if is_blank(&books.book1) {
                return Err(CycleFailure::BlankBooks { book1: books.book1.clone(), book2: books.book2.clone() });
            }
            if books.book1 != ssn2 && books.book1 != ssn8 {
                return Err(CycleFailure::BookMismatch {
                    expected: format!("SSN2={} or SSN8={}", ssn2, ssn8),
                    actual: format!("BOOK1={}", books.book1),
                });
            }
            ctx.book1 = books.book1.clone();
            ctx.book2 = books.book2.clone();
        }
        BookMode::TwoBook => {
            if is_blank(&books.book1) || is_blank(&books.book2) {
                return Err(CycleFailure::BlankBooks { book1: books.book1.clone(), book2: books.book2.clone() });
            }
            if books.book1 != ssn2 || books.book2 != ssn8 {
                return Err(CycleFailure::BookMismatch {
                    expected: format!("SSN2={}, SSN8={}", ssn2, ssn8),
                    actual: format!("BOOK1={}, BOOK2={}", books.book1, books.book2),
                });
            }
            ctx.book1 = ssn2.to_string();
            ctx.book2 = ssn8.to_string();
        }
    }
    tracing::info!(book1 = %ctx.book1, book2 = %ctx.book2, "books match model");
    Ok(())
}

fn channel_failure(device: DeviceRole, port: &str) -> impl FnOnce(ChannelError) -> CycleFailure + '_ {
    move |source| CycleFailure::Channel { device, port: port.to_string(), source }
}

fn missing(device: DeviceRole, port: &str, field: &'static str) -> CycleFailure {
    CycleFailure::MissingField { device, port: port.to_string(), field }
}

fn mismatch(device: DeviceRole, port: &str, field: &'static str, expected: &str, actual: &str) -> CycleFailure {
    CycleFailure::Mismatch {
        device,
        port: port.to_string(),
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
