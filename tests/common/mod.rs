#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use bk_station::config::IniDocument;
use bk_station::{ChannelError, DeviceLink, StationConfig};

pub const SCANNER: &str = "COM5";
pub const GOLDEN_EYE: &str = "COM4";
pub const SFC: &str = "COM8";

/// One request seen by the scripted link.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub port: String,
    pub payload: String,
    pub timeout: Duration,
}

/// A `DeviceLink` that answers from a script and records every request.
/// Unscripted requests time out.
#[derive(Default)]
pub struct ScriptedLink {
    scans: RefCell<VecDeque<Result<Vec<u8>, ChannelError>>>,
    texts: RefCell<VecDeque<Result<String, ChannelError>>>,
    calls: RefCell<Vec<Call>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(self, bytes: &[u8]) -> Self {
        self.scans.borrow_mut().push_back(Ok(bytes.to_vec()));
        self
    }

    pub fn scan_err(self, err: ChannelError) -> Self {
        self.scans.borrow_mut().push_back(Err(err));
        self
    }

    pub fn reply(self, text: &str) -> Self {
        self.texts.borrow_mut().push_back(Ok(text.to_string()));
        self
    }

    pub fn reply_err(self, err: ChannelError) -> Self {
        self.texts.borrow_mut().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, port: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.port == port).count()
    }

    fn record(&self, port: &str, payload: String, timeout: Duration) {
        self.calls.borrow_mut().push(Call { port: port.to_string(), payload, timeout });
    }
}

impl DeviceLink for ScriptedLink {
    fn send_fixed_command(
        &self,
        port: &str,
        command: &[u8],
        _baud_rate: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        self.record(port, format!("{:02X?}", command), timeout);
        self.scans
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ChannelError::Timeout { port: port.to_string() }))
    }

    fn send_text_and_wait(
        &self,
        port: &str,
        text: &str,
        _baud_rate: u32,
        _append_terminator: bool,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        self.record(port, text.to_string(), timeout);
        self.texts
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ChannelError::Timeout { port: port.to_string() }))
    }
}

pub fn station_config() -> StationConfig {
    StationConfig::from_ini(&IniDocument::parse(
        "\
[COM]
camera_comscan = COM5
golden_eye_com = COM4
sfc_com = COM8

[M1]
SSN2 = AAA
SSN8 = BBB

[M-SKIP]
SSN2 = AAA
SSN8 = Skip-0
",
    ))
}

/// Link scripted for a unit that passes every check.
pub fn passing_link() -> ScriptedLink {
    ScriptedLink::new()
        .scan(b"SN123\r\n")
        .reply("DSN=SN123,SSN4=XYZ999,PASS")
        .reply("DSN=SN123,SSN4=XYZ999,PASS")
        .reply("DSN=SN123,SSN2=AAA,SSN8=BBB,PASS")
}
