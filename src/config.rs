//! Indicator timing and demo settings.
//!
//! Settings come from an optional JSON file and are then overridden by CLI flags.
//! Durations in the file use humantime notation (`"1s"`, `"250ms"`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timing of the indicator controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Period of the elapsed-time tick.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Wait between signalling cancellation and forcing the indicator idle.
    #[serde(with = "humantime_serde")]
    pub abort_grace: Duration,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            abort_grace: Duration::from_millis(100),
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            bail!("tick interval must be greater than zero");
        }
        Ok(())
    }
}

/// Contents of the optional config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub indicator: IndicatorConfig,
    /// Length of the simulated operation.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub can_abort: bool,
    pub show_step: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            indicator: IndicatorConfig::default(),
            duration: Duration::from_secs(15),
            can_abort: true,
            show_step: true,
        }
    }
}

/// `<config_dir>/busy-indicator/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("busy-indicator").join("config.json"))
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parse config {}", path.display()))?;
    cfg.indicator
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load an explicitly requested file, else the default location if it exists,
/// else built-in defaults.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(p) = explicit {
        return load_file(p);
    }
    match default_config_path() {
        Some(p) if p.is_file() => load_file(&p),
        _ => Ok(FileConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"indicator": {{"abort_grace": "250ms"}}, "duration": "3s"}}"#).unwrap();

        let cfg = load_file(f.path()).unwrap();
        assert_eq!(cfg.indicator.abort_grace, Duration::from_millis(250));
        assert_eq!(cfg.indicator.tick_interval, Duration::from_secs(1));
        assert_eq!(cfg.duration, Duration::from_secs(3));
        assert!(cfg.can_abort);
        assert!(cfg.show_step);
    }

    #[test]
    fn roundtrips_humantime_durations() {
        let cfg = FileConfig {
            indicator: IndicatorConfig {
                tick_interval: Duration::from_millis(500),
                abort_grace: Duration::from_millis(100),
            },
            duration: Duration::from_secs(90),
            can_abort: false,
            show_step: true,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"500ms\""));
        assert!(json.contains("\"1m 30s\""));
        let back: FileConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn rejects_zero_tick_interval() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"indicator": {{"tick_interval": "0s"}}}}"#).unwrap();
        let err = load_file(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("tick interval"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = load(Some(&missing)).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{not json").unwrap();
        let err = load_file(f.path()).unwrap_err();
        assert!(format!("{err:#}").starts_with("parse config"));
    }
}
