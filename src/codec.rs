//! # Device reply codec
//!
//! The Golden Eye unit and the SFC tracker both speak the same line protocol: a list of
//! `KEY=value` tokens separated by `,`, `|` or `;`, closed by a bare status keyword
//! (`PASS`, `FAIL`, `ERRO`) on replies or by `END` on requests. Replies may carry a
//! leading `SFC:` tag.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Fixed binary command that fires the camera scanner.
pub const SCAN_TRIGGER: [u8; 3] = [0x16, 0x54, 0x0D];

/// Substitute sent to SFC for a book slot that was not scanned.
pub const NULL_FIELD: &str = "(NULL)";

const PROTOCOL_TAG: &str = "SFC";
const DELIMITERS: [char; 3] = [',', '|', ';'];

/// Verdict keyword carried by a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    Pass,
    Fail,
    Error,
}

impl DeviceStatus {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "PASS" => Some(DeviceStatus::Pass),
            "FAIL" => Some(DeviceStatus::Fail),
            // Devices abbreviate to four letters; both spellings are accepted.
            "ERRO" | "ERROR" => Some(DeviceStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Pass => write!(f, "PASS"),
            DeviceStatus::Fail => write!(f, "FAIL"),
            DeviceStatus::Error => write!(f, "ERRO"),
        }
    }
}

/// Parsed result of one textual device exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceResponse {
    pub dsn: Option<String>,
    pub status: Option<DeviceStatus>,
    /// Field values keyed by upper-cased key.
    pub fields: HashMap<String, String>,
}

impl DeviceResponse {
    /// Looks up a field by key, case-insensitively.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(&key.to_ascii_uppercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.dsn.is_none() && self.status.is_none() && self.fields.is_empty()
    }
}

/// Parses a raw reply. Never fails: anything unrecognised is dropped.
pub fn parse(raw: &str) -> DeviceResponse {
    let mut response = DeviceResponse::default();
    let body = strip_protocol_tag(raw.trim());

    for token in body.split(&DELIMITERS[..]).map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) => {
                let key = key.trim().to_ascii_uppercase();
                let value = value.trim().to_string();
                if key == "DSN" {
                    response.dsn = Some(value.clone());
                }
                response.fields.insert(key, value);
            }
            None => {
                if let Some(status) = DeviceStatus::from_token(token) {
                    response.status = Some(status);
                }
            }
        }
    }

    tracing::debug!(
        status = ?response.status,
        dsn = ?response.dsn,
        fields = response.fields.len(),
        "parsed device reply"
    );
    response
}

/// Parses an optional reply; `None` yields an empty response.
pub fn parse_opt(raw: Option<&str>) -> DeviceResponse {
    raw.map(parse).unwrap_or_default()
}

// With a colon everything up to it goes; without one the first three characters go along
// with any separator residue. Devices in the field rely on both forms.
fn strip_protocol_tag(s: &str) -> &str {
    let tagged = s
        .get(..PROTOCOL_TAG.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(PROTOCOL_TAG));
    if !tagged {
        return s;
    }
    match s.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => s[PROTOCOL_TAG.len()..].trim_start_matches(&[' ', ':'][..]),
    }
}

/// SFC lookup request for a unit.
pub fn sfc_query(dsn: &str) -> String {
    format!("DSN={},END", dsn)
}

/// SFC confirmation write binding both books to a unit.
pub fn sfc_confirm(dsn: &str, ssn2: &str, ssn8: &str) -> String {
    format!("DSN={},SSN2={},SSN8={},END", dsn, ssn2, ssn8)
}

/// First six characters of a serial field, trimmed.
pub fn prefix6(value: &str) -> String {
    value.chars().take(6).collect::<String>().trim().to_string()
}
