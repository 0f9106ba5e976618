//! Configuration management for bleedscan.
//!
//! Provides the XDG-located settings file and its layering with
//! command-line overrides.

mod settings;

pub use settings::{default_settings_file, ScanSettings, SettingsOverrides};
