//! Operator-side state for one unit: the book scans and the readiness gate.

use serde::Serialize;

use crate::config::{DeviceRole, ModelProfile, StationConfig};
use crate::error::ConfigError;

/// How many book labels a unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BookMode {
    OneBook,
    #[default]
    TwoBook,
}

/// Book serials scanned by the operator for the unit under test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookInputs {
    pub book1: String,
    pub book2: String,
    pub mode: BookMode,
    book1_locked: bool,
    book2_locked: bool,
}

impl BookInputs {
    pub fn new(mode: BookMode) -> Self {
        Self { mode, ..Self::default() }
    }

    /// Builds already-committed inputs.
    pub fn committed(mode: BookMode, book1: &str, book2: &str) -> Self {
        let mut books = Self::new(mode);
        books.commit_book1(book1);
        if mode == BookMode::TwoBook {
            books.commit_book2(book2);
        }
        books
    }

    /// Stores BOOK1 and locks the field. Scanners type a trailing CR/LF; it is dropped.
    pub fn commit_book1(&mut self, raw: &str) {
        self.book1 = strip_line_breaks(raw);
        self.book1_locked = true;
        tracing::info!(book1 = %self.book1, "BOOK1 committed");
    }

    pub fn commit_book2(&mut self, raw: &str) {
        self.book2 = strip_line_breaks(raw);
        self.book2_locked = true;
        tracing::info!(book2 = %self.book2, "BOOK2 committed");
    }

    /// True once every field the mode needs has been locked in.
    pub fn is_committed(&self) -> bool {
        self.book1_locked && (self.book2_locked || self.mode == BookMode::OneBook)
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.mode);
    }
}

fn strip_line_breaks(raw: &str) -> String {
    raw.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Ports and expected values resolved once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySession {
    pub profile: ModelProfile,
    pub scanner_port: String,
    pub golden_eye_port: String,
    pub sfc_port: String,
}

/// Checks that a cycle can start: a model is selected and known, and every device has a port.
pub struct SessionReadiness;

impl SessionReadiness {
    pub fn check(config: &StationConfig, selected_model: Option<&str>) -> Result<ReadySession, ConfigError> {
        if config.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let model = selected_model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(ConfigError::NoModelSelected)?;
        let profile = config.profile(model)?.clone();

        Ok(ReadySession {
            profile,
            scanner_port: config.ports.require(DeviceRole::CameraScanner)?.to_string(),
            golden_eye_port: config.ports.require(DeviceRole::GoldenEye)?.to_string(),
            sfc_port: config.ports.require(DeviceRole::Sfc)?.to_string(),
        })
    }
}
