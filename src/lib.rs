//! # Book Station Library
//!
//! This library contains the core logic of the book-labelling test station.
//! It drives the camera scanner, the Golden Eye verifier and the SFC tracker over
//! serial ports, cross-checks the identifiers they report against each other and
//! against the selected model, and keeps the station's pass/fail statistics.

pub mod codec;
pub mod config;
pub mod error;
pub mod kpi;
pub mod serial;
pub mod session;
pub mod simulation;
pub mod station;
pub mod workflow;

pub use codec::{parse, DeviceResponse, DeviceStatus};
pub use config::{DeviceRole, ModelProfile, PortMap, StationConfig};
pub use error::{ChannelError, ConfigError, CycleFailure, FailureKind};
pub use kpi::{rate, CycleTimeHistory, KpiCounters, KpiReporter, KpiSnapshot};
pub use serial::{DeviceLink, SerialChannel};
pub use session::{BookInputs, BookMode, ReadySession, SessionReadiness};
pub use station::Station;
pub use workflow::{CycleOutcome, CycleStep, DeviceTimings, ValidationContext, ValidationWorkflow};
