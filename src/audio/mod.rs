//! Audio pipeline: device capture → history window → spectral estimate.
//!
//! # Pipeline
//!
//! ```text
//! AudioDevice callback → CaptureEngine (epoch + elapsed) → AudioBlock
//!                      → HistoryBuffer (FIFO window) → SpectralEstimator
//! ```
//!
//! [`AudioDevice`] is the hardware boundary; [`CpalDevice`] implements it
//! on top of `cpal`.

pub mod capture;
pub mod cpal_device;
pub mod device;
pub mod history;
pub mod spectrum;

pub use capture::{
    chunk_size_for, AudioBlock, BlockConsumer, CaptureEngine, CaptureError, DiagnosticConsumer,
};
pub use cpal_device::{CpalDevice, CpalStream};
pub use device::{
    AudioDevice, BlockCallback, DeviceError, DeviceParams, RawBlock, StreamTimestamp,
};
pub use history::{new_shared_history, HistoryBuffer, SharedHistory};
pub use spectrum::{periodogram, Detrend, Scaling, SpectralEstimator, SpectrumEstimate};

// test-only re-export so other modules' tests can drive a scripted device.
#[cfg(test)]
pub use device::{MockDevice, MockStream};
