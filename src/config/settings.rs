//! Application settings structs, defaults and TOML loading.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to override.  Settings are read once at startup; changes
//! made at runtime (update rate, history length) live in memory only and
//! are never written back.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{chunk_size_for, CaptureError, Detrend, Scaling};

// ---------------------------------------------------------------------------
// StreamSettings
// ---------------------------------------------------------------------------

/// Capture stream parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Sample rate in Hz; fixed for the process lifetime.
    pub sample_rate: u32,
    /// Initial update rate in Hz (blocks per second).
    pub update_rate: f64,
    /// Initial history window length in samples.
    pub history_length: usize,
    /// Start capturing immediately after launch.
    pub autostart: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sample_rate: 40_000,
            update_rate: 50.0,
            history_length: 5_000,
            autostart: false,
        }
    }
}

// ---------------------------------------------------------------------------
// EstimationMode / SpectrumSettings
// ---------------------------------------------------------------------------

/// Where the periodogram is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMode {
    /// In the capture callback, before hand-off.  Only suitable when an
    /// estimate over the whole history finishes well inside one block
    /// period.
    Inline,
    /// On a background task with latest-wins coalescing.
    #[default]
    Worker,
}

/// Spectral estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSettings {
    pub detrend: Detrend,
    pub scaling: Scaling,
    pub mode: EstimationMode,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            detrend: Detrend::Constant,
            scaling: Scaling::Density,
            mode: EstimationMode::Worker,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceSettings
// ---------------------------------------------------------------------------

/// Audio input selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
}

// ---------------------------------------------------------------------------
// DisplaySettings
// ---------------------------------------------------------------------------

/// Console summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Upper end of the frequency range considered for the peak readout.
    pub max_frequency: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_frequency: 2_000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, read from `settings.toml`.
///
/// ```rust,no_run
/// use audio_jack_streamer::config::AppConfig;
///
/// // Returns Default when the file is missing.
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamSettings,
    pub spectrum: SpectrumSettings,
    pub device: DeviceSettings,
    pub display: DisplaySettings,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        log::info!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Check the stream parameters before any device is touched.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for a zero sample rate, an update
    /// rate that yields less than one sample per block, or a zero history
    /// length.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let stream = &self.stream;
        if stream.sample_rate == 0 {
            return Err(CaptureError::InvalidConfig(
                "sample_rate must be positive".into(),
            ));
        }
        chunk_size_for(stream.sample_rate, stream.update_rate)?;
        if stream.history_length == 0 {
            return Err(CaptureError::InvalidConfig(
                "history_length must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.stream.sample_rate, 40_000);
        assert_eq!(cfg.stream.update_rate, 50.0);
        assert_eq!(cfg.stream.history_length, 5_000);
        assert!(!cfg.stream.autostart);
        assert_eq!(cfg.spectrum.detrend, Detrend::Constant);
        assert_eq!(cfg.spectrum.scaling, Scaling::Density);
        assert_eq!(cfg.spectrum.mode, EstimationMode::Worker);
        assert!(cfg.device.input_device.is_none());
        assert_eq!(cfg.display.max_frequency, 2_000.0);
        assert!(cfg.validate().is_ok());
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
[stream]
update_rate = 25.0
autostart = true

[spectrum]
mode = "inline"
scaling = "spectrum"

[device]
input_device = "USB Audio CODEC"
"#,
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.stream.update_rate, 25.0);
        assert!(cfg.stream.autostart);
        assert_eq!(cfg.stream.sample_rate, 40_000);
        assert_eq!(cfg.stream.history_length, 5_000);
        assert_eq!(cfg.spectrum.mode, EstimationMode::Inline);
        assert_eq!(cfg.spectrum.scaling, Scaling::Spectrum);
        assert_eq!(cfg.spectrum.detrend, Detrend::Constant);
        assert_eq!(cfg.device.input_device.as_deref(), Some("USB Audio CODEC"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[stream]\nsample_rate = \"fast\"\n").expect("write");

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn validate_rejects_bad_stream_settings() {
        let mut cfg = AppConfig::default();
        cfg.stream.update_rate = 0.0;
        assert!(matches!(cfg.validate(), Err(CaptureError::InvalidConfig(_))));

        let mut cfg = AppConfig::default();
        cfg.stream.history_length = 0;
        assert!(matches!(cfg.validate(), Err(CaptureError::InvalidConfig(_))));

        let mut cfg = AppConfig::default();
        cfg.stream.sample_rate = 0;
        assert!(matches!(cfg.validate(), Err(CaptureError::InvalidConfig(_))));

        let mut cfg = AppConfig::default();
        cfg.stream.update_rate = 50_000.0;
        assert!(matches!(cfg.validate(), Err(CaptureError::InvalidConfig(_))));
    }
}
