//! Configuration file management for ais-log.
//!
//! Reads `~/.aislog/config.yaml` (or an explicit path) with contact aging
//! thresholds, own-position settings, route outputs, and input sources.

use std::path::{Path, PathBuf};

use crate::types::{AisError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub contacts: ContactConfig,
    pub position: PositionConfig,
    pub outputs: OutputConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactConfig {
    /// Seconds without update before a contact is marked old.
    pub grey_secs: f64,
    /// Seconds without update before a contact is removed.
    pub remove_secs: f64,
    /// Updates a contact needs before it is shown.
    pub min_updates: u32,
    pub show_base_stations: bool,
    pub show_class_b: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionConfig {
    /// Use the fixed `lat`/`lon` and ignore live fixes.
    pub override_enabled: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Source whose GGA fixes update own position.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputConfig {
    /// Device node raw lines are copied to.
    pub serial: Option<String>,
    /// Listen address raw lines are served on.
    pub network: Option<String>,
}

/// Where an input source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Tcp,
    Serial,
    File,
    Stdin,
}

impl SourceKind {
    fn parse(val: &str) -> Option<SourceKind> {
        match val {
            "tcp" => Some(SourceKind::Tcp),
            "serial" => Some(SourceKind::Serial),
            "file" => Some(SourceKind::File),
            "stdin" => Some(SourceKind::Stdin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub address: Option<String>,
    pub route_serial: bool,
    pub route_network: bool,
    /// Delay between replayed lines for `file` sources.
    pub line_delay_ms: u64,
}

impl SourceConfig {
    pub fn new(name: &str, kind: SourceKind) -> Self {
        SourceConfig {
            name: name.to_string(),
            kind,
            address: None,
            route_serial: false,
            route_network: false,
            line_delay_ms: 0,
        }
    }
}

impl Default for ContactConfig {
    fn default() -> Self {
        ContactConfig {
            grey_secs: 600.0,
            remove_secs: 3600.0,
            min_updates: 2,
            show_base_stations: true,
            show_class_b: true,
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        PositionConfig {
            override_enabled: false,
            lat: None,
            lon: None,
            source: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            contacts: ContactConfig::default(),
            position: PositionConfig::default(),
            outputs: OutputConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Reject configurations the runtime cannot honour.
    ///
    /// The removal threshold must not be shorter than the grey threshold.
    pub fn validate(&self) -> Result<()> {
        let c = &self.contacts;
        if c.grey_secs <= 0.0 || c.remove_secs <= 0.0 {
            return Err(AisError::Config("aging thresholds must be positive".into()));
        }
        if c.remove_secs < c.grey_secs {
            return Err(AisError::Config(format!(
                "remove_secs ({}) is shorter than grey_secs ({})",
                c.remove_secs, c.grey_secs
            )));
        }

        if self.position.override_enabled
            && (self.position.lat.is_none() || self.position.lon.is_none())
        {
            return Err(AisError::Config(
                "position override needs both lat and lon".into(),
            ));
        }

        for (i, src) in self.sources.iter().enumerate() {
            if src.kind != SourceKind::Stdin && src.address.is_none() {
                return Err(AisError::Config(format!(
                    "source '{}' needs an address",
                    src.name
                )));
            }
            if self.sources[..i].iter().any(|s| s.name == src.name) {
                return Err(AisError::Config(format!(
                    "duplicate source '{}'",
                    src.name
                )));
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Get the config directory path (`~/.aislog/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".aislog")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load and validate config from `path`.
///
/// Returns the default config if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    config.validate()?;
    Ok(config)
}

/// Parse simple YAML-like config text.
///
/// Sections are unindented `name:` lines; `source.<name>:` starts a
/// source definition. Unknown keys are ignored.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line = strip_comment(line);
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = Some(key.to_string());
            if let Some(name) = key.strip_prefix("source.") {
                if name.is_empty() {
                    return Err(AisError::Config(format!(
                        "line {}: source needs a name",
                        lineno + 1
                    )));
                }
                config
                    .sources
                    .push(SourceConfig::new(name, SourceKind::Tcp));
            }
            continue;
        }

        let bad = |what: &str| {
            AisError::Config(format!("line {}: invalid {what}: {val}", lineno + 1))
        };

        match current_section.as_deref() {
            Some("contacts") => {
                let c = &mut config.contacts;
                match key {
                    "grey_secs" => c.grey_secs = parse_float_value(val).ok_or_else(|| bad(key))?,
                    "remove_secs" => {
                        c.remove_secs = parse_float_value(val).ok_or_else(|| bad(key))?
                    }
                    "min_updates" => c.min_updates = val.parse().map_err(|_| bad(key))?,
                    "show_base_stations" => {
                        c.show_base_stations = parse_bool_value(val).ok_or_else(|| bad(key))?
                    }
                    "show_class_b" => {
                        c.show_class_b = parse_bool_value(val).ok_or_else(|| bad(key))?
                    }
                    _ => {}
                }
            }
            Some("position") => {
                let p = &mut config.position;
                match key {
                    "override" => {
                        p.override_enabled = parse_bool_value(val).ok_or_else(|| bad(key))?
                    }
                    "lat" => p.lat = parse_float_value(val),
                    "lon" => p.lon = parse_float_value(val),
                    "source" => p.source = parse_string_value(val),
                    _ => {}
                }
            }
            Some("outputs") => match key {
                "serial" => config.outputs.serial = parse_string_value(val),
                "network" => config.outputs.network = parse_string_value(val),
                _ => {}
            },
            Some(section) if section.starts_with("source.") => {
                let Some(src) = config.sources.last_mut() else {
                    continue;
                };
                match key {
                    "kind" => src.kind = SourceKind::parse(val).ok_or_else(|| bad(key))?,
                    "address" => src.address = parse_string_value(val),
                    "route_serial" => {
                        src.route_serial = parse_bool_value(val).ok_or_else(|| bad(key))?
                    }
                    "route_network" => {
                        src.route_network = parse_bool_value(val).ok_or_else(|| bad(key))?
                    }
                    "line_delay_ms" => src.line_delay_ms = val.parse().map_err(|_| bad(key))?,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(config)
}

/// Drop a trailing `# comment` that is not inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (c, in_quote) {
            ('"' | '\'', None) => in_quote = Some(c),
            (q, Some(open)) if q == open => in_quote = None,
            ('#', None) => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if (val.starts_with('"') && val.ends_with('"') && val.len() >= 2)
        || (val.starts_with('\'') && val.ends_with('\'') && val.len() >= 2)
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# ais-log configuration

contacts:
  grey_secs: 300
  remove_secs: 1800   # half an hour
  min_updates: 3
  show_base_stations: false
  show_class_b: true

position:
  override: true
  lat: 57.7
  lon: 11.97
  source: "gps"

outputs:
  serial: /dev/ttyS1
  network: 0.0.0.0:10110

source.north:
  kind: tcp
  address: 10.0.0.5:4001
  route_serial: true
  route_network: false

source.gps:
  kind: serial
  address: /dev/ttyUSB0
  route_network: yes

source.replay:
  kind: file
  address: "data/#night.nmea"
  line_delay_ms: 10
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.contacts.grey_secs, 600.0);
        assert_eq!(config.contacts.remove_secs, 3600.0);
        assert_eq!(config.contacts.min_updates, 2);
        assert!(config.sources.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.contacts.grey_secs, 300.0);
        assert_eq!(config.contacts.remove_secs, 1800.0);
        assert_eq!(config.contacts.min_updates, 3);
        assert!(!config.contacts.show_base_stations);
        assert!(config.position.override_enabled);
        assert_eq!(config.position.lat, Some(57.7));
        assert_eq!(config.position.source.as_deref(), Some("gps"));
        assert_eq!(config.outputs.serial.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(config.outputs.network.as_deref(), Some("0.0.0.0:10110"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sources() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.sources.len(), 3);

        let north = config.source("north").unwrap();
        assert_eq!(north.kind, SourceKind::Tcp);
        assert_eq!(north.address.as_deref(), Some("10.0.0.5:4001"));
        assert!(north.route_serial);
        assert!(!north.route_network);

        let gps = config.source("gps").unwrap();
        assert_eq!(gps.kind, SourceKind::Serial);
        assert!(gps.route_network);

        let replay = config.source("replay").unwrap();
        assert_eq!(replay.kind, SourceKind::File);
        assert_eq!(replay.address.as_deref(), Some("data/#night.nmea"));
        assert_eq!(replay.line_delay_ms, 10);
    }

    #[test]
    fn test_parse_invalid_value() {
        let text = "contacts:\n  grey_secs: soon\n";
        assert!(matches!(parse_config(text), Err(AisError::Config(_))));

        let text = "source.x:\n  kind: pigeon\n";
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn test_validate_rejects_removal_before_grey() {
        let text = "contacts:\n  grey_secs: 600\n  remove_secs: 60\n";
        let config = parse_config(text).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("remove_secs"));
    }

    #[test]
    fn test_validate_equal_thresholds_allowed() {
        let text = "contacts:\n  grey_secs: 600\n  remove_secs: 600\n";
        assert!(parse_config(text).unwrap().validate().is_ok());
    }

    #[test]
    fn test_validate_override_needs_coordinates() {
        let text = "position:\n  override: true\n  lat: 57.0\n";
        assert!(parse_config(text).unwrap().validate().is_err());
    }

    #[test]
    fn test_validate_source_address() {
        let text = "source.a:\n  kind: tcp\n";
        assert!(parse_config(text).unwrap().validate().is_err());

        let text = "source.a:\n  kind: stdin\n";
        assert!(parse_config(text).unwrap().validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_source() {
        let text = "source.a:\n  kind: stdin\nsource.a:\n  kind: stdin\n";
        assert!(parse_config(text).unwrap().validate().is_err());
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("a: 1 # x"), "a: 1 ");
        assert_eq!(strip_comment("a: \"#x\""), "a: \"#x\"");
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let config = load_config(Path::new("/nonexistent/aislog.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_bool_values() {
        assert_eq!(parse_bool_value("yes"), Some(true));
        assert_eq!(parse_bool_value("off"), Some(false));
        assert_eq!(parse_bool_value("maybe"), None);
    }
}
