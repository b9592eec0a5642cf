//! Station configuration: the `[COM]` port map and one section per model code.
//!
//! ```ini
//! [COM]
//! camera_comscan = COM5
//! sfc_com = COM8
//! golden_eye_com = COM4
//!
//! [53-100252]
//! SSN2 = WSL-0001
//! SSN8 = QSG-0002
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ConfigError;

pub const COM_SECTION: &str = "COM";

/// Logical device attached to the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceRole {
    CameraScanner,
    GoldenEye,
    Sfc,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 3] = [DeviceRole::CameraScanner, DeviceRole::Sfc, DeviceRole::GoldenEye];

    /// Key of this role inside `[COM]`.
    pub fn config_key(self) -> &'static str {
        match self {
            DeviceRole::CameraScanner => "camera_comscan",
            DeviceRole::GoldenEye => "golden_eye_com",
            DeviceRole::Sfc => "sfc_com",
        }
    }

    pub fn default_port(self) -> &'static str {
        match self {
            DeviceRole::CameraScanner => "COM5",
            DeviceRole::GoldenEye => "COM4",
            DeviceRole::Sfc => "COM8",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::CameraScanner => write!(f, "Camera scanner"),
            DeviceRole::GoldenEye => write!(f, "Golden Eye"),
            DeviceRole::Sfc => write!(f, "SFC"),
        }
    }
}

/// Expected book serials for one model code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub model_code: String,
    pub expected_ssn2: String,
    pub expected_ssn8: String,
}

/// Port identifier per device role. Blank entries count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortMap {
    pub camera_scanner: Option<String>,
    pub golden_eye: Option<String>,
    pub sfc: Option<String>,
}

impl PortMap {
    pub fn get(&self, role: DeviceRole) -> Option<&str> {
        let port = match role {
            DeviceRole::CameraScanner => &self.camera_scanner,
            DeviceRole::GoldenEye => &self.golden_eye,
            DeviceRole::Sfc => &self.sfc,
        };
        port.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn set(&mut self, role: DeviceRole, port: impl Into<String>) {
        let slot = match role {
            DeviceRole::CameraScanner => &mut self.camera_scanner,
            DeviceRole::GoldenEye => &mut self.golden_eye,
            DeviceRole::Sfc => &mut self.sfc,
        };
        *slot = Some(port.into());
    }

    pub fn require(&self, role: DeviceRole) -> Result<&str, ConfigError> {
        self.get(role).ok_or(ConfigError::MissingPort(role))
    }
}

/// Everything the station reads from its config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationConfig {
    pub ports: PortMap,
    pub models: BTreeMap<String, ModelProfile>,
}

impl StationConfig {
    pub fn from_ini(doc: &IniDocument) -> Self {
        let mut ports = PortMap::default();
        for role in DeviceRole::ALL {
            if let Some(port) = doc.get(COM_SECTION, role.config_key()) {
                ports.set(role, port.trim());
            }
        }

        let models = doc
            .sections()
            .filter(|name| !name.eq_ignore_ascii_case(COM_SECTION))
            .map(|name| {
                let profile = ModelProfile {
                    model_code: name.to_string(),
                    expected_ssn2: doc.get(name, "SSN2").unwrap_or_default().trim().to_string(),
                    expected_ssn8: doc.get(name, "SSN8").unwrap_or_default().trim().to_string(),
                };
                (name.to_string(), profile)
            })
            .collect();

        Self { ports, models }
    }

    /// Reads the config file. A missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::from_ini(&IniDocument::read_or_default(path)?))
    }

    /// Model codes in sorted order.
    pub fn model_codes(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn profile(&self, model_code: &str) -> Result<&ModelProfile, ConfigError> {
        self.models
            .get(model_code)
            .ok_or_else(|| ConfigError::UnknownModel(model_code.to_string()))
    }
}

/// Adds the `[COM]` section and any missing port keys with their defaults, leaving
/// every other section alone. The file is only rewritten when something was added.
pub fn ensure_com_defaults(path: &Path) -> Result<bool, ConfigError> {
    let mut doc = IniDocument::read_or_default(path)?;
    let mut changed = false;
    for role in DeviceRole::ALL {
        if doc.get(COM_SECTION, role.config_key()).is_none() {
            doc.set(COM_SECTION, role.config_key(), role.default_port());
            changed = true;
        }
    }
    if changed {
        tracing::info!(path = %path.display(), "seeded default COM ports");
        doc.write(path)?;
    }
    Ok(changed)
}

/// Replaces all model sections in the file with `models`, keeping `[COM]`.
pub fn save_models(path: &Path, models: &BTreeMap<String, ModelProfile>) -> Result<(), ConfigError> {
    let mut doc = IniDocument::read_or_default(path)?;
    let stale: Vec<String> = doc
        .sections()
        .filter(|name| !name.eq_ignore_ascii_case(COM_SECTION))
        .map(str::to_string)
        .collect();
    for name in stale {
        doc.remove_section(&name);
    }

    for (code, profile) in models {
        doc.add_section(code);
        if !profile.expected_ssn2.is_empty() {
            doc.set(code, "SSN2", &profile.expected_ssn2);
        }
        if !profile.expected_ssn8.is_empty() {
            doc.set(code, "SSN8", &profile.expected_ssn8);
        }
    }
    doc.write(path)
}

/// Default config location: `config.ini` beside the running executable.
pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join("config.ini")
}

// Minimal INI document that keeps section and key order for round trips.
// Keys are matched case-insensitively and stored lower-cased; section names are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = IniDocument::default();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                doc.add_section(&name);
                current = Some(name);
                continue;
            }
            // Keys outside any section have nowhere to live.
            let Some(section) = current.as_deref() else { continue };
            let split = line.find(|c: char| c == '=' || c == ':').map(|i| line.split_at(i));
            if let Some((key, value)) = split {
                doc.set(section, key.trim(), value[1..].trim());
            }
        }
        doc
    }

    fn read_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.render()).map_err(io_err)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            out.push_str(&format!("[{}]\n", name));
            for (key, value) in entries {
                out.push_str(&format!("{} = {}\n", key, value));
            }
            out.push('\n');
        }
        out
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.section(section)?
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.add_section(section);
        let key = key.to_ascii_lowercase();
        if let Some((_, entries)) = self.sections.iter_mut().find(|(name, _)| name == section) {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => entries.push((key, value.to_string())),
            }
        }
    }

    pub fn add_section(&mut self, section: &str) {
        if self.section(section).is_none() {
            self.sections.push((section.to_string(), Vec::new()));
        }
    }

    pub fn remove_section(&mut self, section: &str) {
        self.sections.retain(|(name, _)| name != section);
    }

    fn section(&self, section: &str) -> Option<&Vec<(String, String)>> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, entries)| entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[COM]
camera_comscan = COM5
sfc_com = COM7
golden_eye_com =

; model sections
[53-100252]
SSN2 = WSL-0001
SSN8: QSG-0002

[11-000001]
ssn2=ONLY2
";

    #[test]
    fn reads_ports_and_models() {
        let config = StationConfig::from_ini(&IniDocument::parse(SAMPLE));
        assert_eq!(config.ports.get(DeviceRole::CameraScanner), Some("COM5"));
        assert_eq!(config.ports.get(DeviceRole::Sfc), Some("COM7"));
        // Blank value is the same as no value.
        assert_eq!(config.ports.get(DeviceRole::GoldenEye), None);
        assert!(matches!(
            config.ports.require(DeviceRole::GoldenEye),
            Err(ConfigError::MissingPort(DeviceRole::GoldenEye))
        ));

        assert_eq!(config.model_codes(), vec!["11-000001", "53-100252"]);
        let profile = config.profile("53-100252").unwrap();
        assert_eq!(profile.expected_ssn2, "WSL-0001");
        assert_eq!(profile.expected_ssn8, "QSG-0002");
        let partial = config.profile("11-000001").unwrap();
        assert_eq!(partial.expected_ssn2, "ONLY2");
        assert_eq!(partial.expected_ssn8, "");
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        let config = StationConfig::from_ini(&IniDocument::parse(SAMPLE));
        assert!(matches!(config.profile("nope"), Err(ConfigError::UnknownModel(code)) if code == "nope"));
    }

    #[test]
    fn ensure_defaults_creates_file_and_keeps_models() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        assert!(ensure_com_defaults(&path).unwrap());
        let config = StationConfig::load(&path).unwrap();
        assert_eq!(config.ports.get(DeviceRole::CameraScanner), Some("COM5"));
        assert_eq!(config.ports.get(DeviceRole::Sfc), Some("COM8"));
        assert_eq!(config.ports.get(DeviceRole::GoldenEye), Some("COM4"));

        fs::write(&path, "[COM]\nsfc_com = COM9\n\n[M1]\nSSN2 = A\nSSN8 = B\n").unwrap();
        assert!(ensure_com_defaults(&path).unwrap());
        assert!(!ensure_com_defaults(&path).unwrap());
        let config = StationConfig::load(&path).unwrap();
        assert_eq!(config.ports.get(DeviceRole::Sfc), Some("COM9"));
        assert_eq!(config.profile("M1").unwrap().expected_ssn8, "B");
    }

    #[test]
    fn save_models_replaces_model_sections_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, SAMPLE).unwrap();

        let mut models = BTreeMap::new();
        models.insert(
            "NEW".to_string(),
            ModelProfile {
                model_code: "NEW".into(),
                expected_ssn2: "X2".into(),
                expected_ssn8: String::new(),
            },
        );
        save_models(&path, &models).unwrap();

        let doc = IniDocument::parse(&fs::read_to_string(&path).unwrap());
        assert_eq!(doc.sections().collect::<Vec<_>>(), vec!["COM", "NEW"]);
        assert_eq!(doc.get("COM", "sfc_com"), Some("COM7"));
        assert_eq!(doc.get("NEW", "SSN2"), Some("X2"));
        assert_eq!(doc.get("NEW", "SSN8"), None);
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StationConfig::load(&dir.path().join("absent.ini")).unwrap();
        assert!(config.models.is_empty());
        assert_eq!(config.ports, PortMap::default());
    }
}
