//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per subsystem,
//! and `AppPaths` for the platform settings location.  Loading is
//! read-only via `AppConfig::load` / `AppConfig::load_from`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, DeviceSettings, DisplaySettings, EstimationMode, SpectrumSettings, StreamSettings,
};
