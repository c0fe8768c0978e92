//! Capture-to-spectrum pipeline orchestration.
//!
//! This module wires the capture engine, the history window and the
//! spectral estimator together and exposes the presentation boundary.
//!
//! # Architecture
//!
//! ```text
//! AudioDevice ─▶ CaptureEngine ─▶ HistoryBuffer ─▶ SpectralEstimator ─▶ UpdateSink
//!                      ▲                 ▲
//!                      └──── PipelineController ◀── start / stop / rate / history
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audio_jack_streamer::audio::{CpalDevice, SpectralEstimator};
//! use audio_jack_streamer::config::AppConfig;
//! use audio_jack_streamer::pipeline::{LogSink, PipelineController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let device = CpalDevice::new(None)?;
//!     let (mut controller, worker) = PipelineController::with_worker(
//!         device,
//!         &config.stream,
//!         SpectralEstimator::default(),
//!         Arc::new(LogSink),
//!     )?;
//!     tokio::spawn(worker.run());
//!
//!     controller.start()?;
//!     let chunk = controller.set_update_rate(25.0)?; // restarts the device
//!     assert_eq!(chunk, 1_600);
//!     controller.stop()?;
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod sink;
pub mod state;
pub mod worker;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::PipelineController;
pub use sink::{ChannelSink, LogSink, PipelineUpdate, UpdateSink};
pub use state::{HistoryFill, StreamConfig, StreamLifecycleState};
pub use worker::SpectrumWorker;
