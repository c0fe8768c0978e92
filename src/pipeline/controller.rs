//! Pipeline controller: start/stop/restart and block routing.
//!
//! [`PipelineController`] owns the [`CaptureEngine`] and the shared history
//! window.  The engine's single consumer is a `BlockRouter`:
//!
//! ```text
//! device callback ─▶ CaptureEngine ─▶ BlockRouter
//!                                       ├─ HistoryBuffer::append   (short lock)
//!                                       ├─ Inline: estimate + publish here
//!                                       └─ Worker: bump watch seq ─▶ SpectrumWorker
//!                                                                     ├─ snapshot (short lock)
//!                                                                     ├─ spawn_blocking(estimate)
//!                                                                     └─ UpdateSink
//! ```
//!
//! Commands come from the presentation layer on one thread; the controller
//! is not shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::audio::{
    chunk_size_for, new_shared_history, AudioBlock, AudioDevice, BlockConsumer, CaptureEngine,
    CaptureError, SharedHistory, SpectralEstimator,
};
use crate::config::StreamSettings;

use super::sink::{PipelineUpdate, UpdateSink};
use super::state::{HistoryFill, StreamConfig, StreamLifecycleState};
use super::worker::SpectrumWorker;

// ---------------------------------------------------------------------------
// BlockRouter
// ---------------------------------------------------------------------------

enum Dispatch {
    Inline {
        estimator: Mutex<SpectralEstimator>,
        sink: Arc<dyn UpdateSink>,
    },
    Worker(watch::Sender<u64>),
}

/// The consumer registered with the capture engine.
pub struct BlockRouter {
    history: SharedHistory,
    overruns: Arc<AtomicU64>,
    dispatch: Dispatch,
}

impl BlockConsumer for BlockRouter {
    fn on_block(&self, block: AudioBlock) {
        match &self.dispatch {
            Dispatch::Inline { estimator, sink } => {
                let window = {
                    let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
                    history.append(&block);
                    history.current().to_vec()
                };
                let spectrum = estimator
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .estimate(&window, block.sample_rate);
                sink.on_pipeline_update(PipelineUpdate {
                    time_window: window,
                    spectrum,
                    elapsed: block.elapsed,
                    sample_rate: block.sample_rate,
                    overruns: self.overruns.load(Ordering::Relaxed),
                });
            }
            Dispatch::Worker(notify) => {
                self.history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(&block);
                notify.send_modify(|seq| *seq = seq.wrapping_add(1));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineController
// ---------------------------------------------------------------------------

/// Orchestrates the capture-to-spectrum pipeline.
///
/// Construct with [`inline`](Self::inline) or
/// [`with_worker`](Self::with_worker).  Dropping the controller closes the
/// device and ends the worker.
pub struct PipelineController<D: AudioDevice> {
    engine: CaptureEngine<D, BlockRouter>,
    history: SharedHistory,
    overruns: Arc<AtomicU64>,
    state: StreamLifecycleState,
}

impl<D: AudioDevice> PipelineController<D> {
    /// Controller that estimates and publishes inside the capture callback.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for invalid stream settings.
    pub fn inline(
        device: D,
        settings: &StreamSettings,
        estimator: SpectralEstimator,
        sink: Arc<dyn UpdateSink>,
    ) -> Result<Self, CaptureError> {
        Self::build(
            device,
            settings,
            Dispatch::Inline {
                estimator: Mutex::new(estimator),
                sink,
            },
        )
    }

    /// Controller that hands estimation to a [`SpectrumWorker`].
    ///
    /// The returned worker must be spawned on a tokio runtime for updates
    /// to be published.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for invalid stream settings.
    pub fn with_worker(
        device: D,
        settings: &StreamSettings,
        estimator: SpectralEstimator,
        sink: Arc<dyn UpdateSink>,
    ) -> Result<(Self, SpectrumWorker), CaptureError> {
        let (notify, notices) = watch::channel(0u64);
        let controller = Self::build(device, settings, Dispatch::Worker(notify))?;
        let worker = SpectrumWorker {
            history: Arc::clone(&controller.history),
            notices,
            estimator,
            sink,
            sample_rate: settings.sample_rate,
            overruns: Arc::clone(&controller.overruns),
        };
        Ok((controller, worker))
    }

    fn build(device: D, settings: &StreamSettings, dispatch: Dispatch) -> Result<Self, CaptureError> {
        if settings.history_length == 0 {
            return Err(CaptureError::InvalidConfig(
                "history length must be positive".into(),
            ));
        }
        let engine = CaptureEngine::new(device, settings.sample_rate, settings.update_rate)?;
        let overruns = engine.overrun_counter();
        let history = new_shared_history(settings.history_length);

        let engine = engine.on_block(BlockRouter {
            history: Arc::clone(&history),
            overruns: Arc::clone(&overruns),
            dispatch,
        });

        Ok(Self {
            engine,
            history,
            overruns,
            state: StreamLifecycleState::Stopped,
        })
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Stopped → Running.
    ///
    /// # Errors
    ///
    /// [`CaptureError::AlreadyRunning`] when running (the current session
    /// is untouched), [`CaptureError::DeviceUnavailable`] when the device
    /// cannot be opened; the state stays `Stopped` and nothing is retried.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }
        self.engine.start()?;
        self.state = StreamLifecycleState::Running;
        log::info!("pipeline: Stopped → Running");
        Ok(())
    }

    /// Running → Stopped.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotRunning`] when already stopped; the state stays
    /// `Stopped`.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_running() {
            return Err(CaptureError::NotRunning);
        }
        self.state = StreamLifecycleState::Stopped;
        self.engine.stop()?;
        log::info!("pipeline: Running → Stopped");
        Ok(())
    }

    /// Change the update rate and return the new chunk size.
    ///
    /// While running the device is stopped, reconfigured and started again;
    /// a live device handle is never reconfigured.  While stopped only the
    /// configuration changes.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] before anything is touched, or the
    /// error of the restart, after which the pipeline is `Stopped` with the
    /// new rate applied.
    pub fn set_update_rate(&mut self, hz: f64) -> Result<usize, CaptureError> {
        let sample_rate = self.engine.sample_rate();
        chunk_size_for(sample_rate, hz)?;

        let chunk_size = if self.state.is_running() {
            self.stop()?;
            let chunk_size = self.engine.configure(sample_rate, hz)?;
            self.start()?;
            chunk_size
        } else {
            self.engine.configure(sample_rate, hz)?
        };

        log::info!("pipeline: update rate {hz} Hz, chunk size {chunk_size}");
        Ok(chunk_size)
    }

    /// Change the history window length.  Safe in either state.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for a zero length.
    pub fn set_history_length(&mut self, samples: usize) -> Result<(), CaptureError> {
        if samples == 0 {
            return Err(CaptureError::InvalidConfig(
                "history length must be positive".into(),
            ));
        }
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(samples);
        log::info!("pipeline: history length {samples}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn state(&self) -> StreamLifecycleState {
        self.state
    }

    pub fn current_config(&self) -> StreamConfig {
        let history_length = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity();
        StreamConfig {
            sample_rate: self.engine.sample_rate(),
            update_rate: self.engine.update_rate(),
            chunk_size: self.engine.chunk_size(),
            history_length,
        }
    }

    /// Current fill level of the history window.
    pub fn history_fill(&self) -> HistoryFill {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        HistoryFill {
            len: history.len(),
            capacity: history.capacity(),
            full: history.is_full(),
            span_secs: history.duration_secs(self.engine.sample_rate()),
        }
    }

    /// Handle to the shared history window, for snapshot reads.
    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.history)
    }

    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
