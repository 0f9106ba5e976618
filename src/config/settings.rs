//! Scan settings and their layering.
//!
//! Built-in defaults are overlaid by a JSON settings file and then by
//! command-line (or environment) overrides. The file lives in the XDG
//! config directory unless a path is given explicitly.

use crate::error::{ConfigError, ConfigResult};
use crate::output::OutputFormat;
use crate::scanner::{ScanConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT, DEFAULT_WORKERS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Location of the default settings file (`~/.config/bleedscan/settings.json`).
pub fn default_settings_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "bleedscan", "bleedscan")
        .map(|project| project.config_dir().join("settings.json"))
}

/// Settings that shape one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Per-step timeout in milliseconds.
    pub timeout_ms: u64,
    /// Queue capacity as a multiple of `workers`.
    pub queue_factor: usize,
    /// Collector idle timeout in seconds, 0 to disable.
    pub idle_timeout_secs: u64,
    /// Log skips, expansions, and per-target progress.
    pub verbose: bool,
    /// Record format.
    pub format: OutputFormat,
    /// Emit a CSV header row.
    pub header: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            queue_factor: 2,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            verbose: false,
            format: OutputFormat::default(),
            header: false,
        }
    }
}

/// Values given on the command line or in the environment.
///
/// `None` leaves the underlying setting alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub queue_factor: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    pub verbose: bool,
    pub format: Option<OutputFormat>,
    pub header: bool,
}

impl ScanSettings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match default_settings_file() {
                Some(file) if file.exists() => Self::load_from(&file),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded settings file");

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Apply overrides on top of these settings.
    pub fn merge(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(queue_factor) = overrides.queue_factor {
            self.queue_factor = queue_factor;
        }
        if let Some(idle) = overrides.idle_timeout_secs {
            self.idle_timeout_secs = idle;
        }
        if let Some(format) = overrides.format {
            self.format = format;
        }
        self.verbose |= overrides.verbose;
        self.header |= overrides.header;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be at least 1".into()));
        }
        if self.queue_factor == 0 {
            return Err(ConfigError::Invalid("queue_factor must be at least 1".into()));
        }
        // One command may spend a timeout dialing plus the 2x connection deadline.
        let longest_command_ms = self.timeout_ms.saturating_mul(3);
        if self.idle_timeout_secs > 0
            && self.idle_timeout_secs.saturating_mul(1000) < longest_command_ms
        {
            return Err(ConfigError::Invalid(format!(
                "idle_timeout_secs must cover at least {longest_command_ms} ms (three timeouts) or be 0"
            )));
        }
        Ok(())
    }

    /// Engine parameters derived from these settings.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            workers: self.workers,
            timeout: Duration::from_millis(self.timeout_ms),
            queue_capacity: self.workers.saturating_mul(self.queue_factor),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn settings_file(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_settings() {
        let settings = ScanSettings::default();
        assert_eq!(settings.workers, 512);
        assert_eq!(settings.timeout_ms, 1000);
        assert_eq!(settings.queue_factor, 2);
        assert_eq!(settings.idle_timeout_secs, 30);
        assert_eq!(settings.format, OutputFormat::Csv);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = settings_file(r#"{"workers": 64, "format": "json"}"#);
        let settings = ScanSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.workers, 64);
        assert_eq!(settings.format, OutputFormat::Json);
        assert_eq!(settings.timeout_ms, 1000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScanSettings::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let file = settings_file("{ workers: ");
        let err = ScanSettings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat(_)));
    }

    #[test]
    fn test_overrides_win() {
        let file = settings_file(r#"{"workers": 64, "timeout_ms": 2500}"#);
        let settings = ScanSettings::load(Some(file.path()))
            .unwrap()
            .merge(SettingsOverrides {
                workers: Some(8),
                verbose: true,
                ..Default::default()
            });
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.timeout_ms, 2500);
        assert!(settings.verbose);
    }

    #[test]
    fn test_validation() {
        for bad in [
            SettingsOverrides {
                workers: Some(0),
                ..Default::default()
            },
            SettingsOverrides {
                timeout_ms: Some(0),
                ..Default::default()
            },
            SettingsOverrides {
                queue_factor: Some(0),
                ..Default::default()
            },
        ] {
            let settings = ScanSettings::default().merge(bad);
            assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_idle_timeout_must_outlast_a_command() {
        let with = |timeout_ms, idle| {
            ScanSettings::default().merge(SettingsOverrides {
                timeout_ms: Some(timeout_ms),
                idle_timeout_secs: Some(idle),
                ..Default::default()
            })
        };
        assert!(matches!(
            with(1500, 2).validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(with(1500, 5).validate().is_ok());
        assert!(with(1000, 3).validate().is_ok());
        // 0 disables the idle timeout, so any timeout goes
        assert!(with(15_000, 0).validate().is_ok());
    }

    #[test]
    fn test_scan_config() {
        let config = ScanSettings::default()
            .merge(SettingsOverrides {
                workers: Some(10),
                queue_factor: Some(3),
                idle_timeout_secs: Some(0),
                ..Default::default()
            })
            .scan_config();
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_capacity, 30);
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert_eq!(config.idle_timeout, None);
    }
}
