//! Spectral estimation off the capture context.
//!
//! The capture-side router bumps a `watch` sequence number after each
//! append.  [`SpectrumWorker::run`] wakes on the newest value only, so a
//! burst of blocks that arrives while an estimate is running collapses
//! into a single follow-up computation (latest wins).  Each computation
//! snapshots the window and its elapsed time under one short lock, then
//! runs the FFT on the blocking pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::sync::watch;

use crate::audio::{SharedHistory, SpectralEstimator};

use super::sink::{PipelineUpdate, UpdateSink};

/// Async consumer that turns history snapshots into [`PipelineUpdate`]s.
///
/// Obtained from [`PipelineController::with_worker`](super::PipelineController::with_worker);
/// spawn [`run`](Self::run) on a tokio runtime.  The loop ends when the
/// controller is dropped.
pub struct SpectrumWorker {
    pub(super) history: SharedHistory,
    pub(super) notices: watch::Receiver<u64>,
    pub(super) estimator: SpectralEstimator,
    pub(super) sink: Arc<dyn UpdateSink>,
    pub(super) sample_rate: u32,
    pub(super) overruns: Arc<AtomicU64>,
}

impl SpectrumWorker {
    pub async fn run(mut self) {
        let mut seen = 0u64;
        let mut reported_overruns = 0;

        while self.notices.changed().await.is_ok() {
            let sequence = *self.notices.borrow_and_update();
            let superseded = sequence.saturating_sub(seen).saturating_sub(1);
            if superseded > 0 {
                log::trace!("spectrum: skipped {superseded} superseded block(s)");
            }
            seen = sequence;

            let (window, elapsed) = self
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot();
            let Some(elapsed) = elapsed else {
                continue;
            };

            let mut estimator = std::mem::take(&mut self.estimator);
            let sample_rate = self.sample_rate;
            let computed = tokio::task::spawn_blocking(move || {
                let spectrum = estimator.estimate(&window, sample_rate);
                (estimator, window, spectrum)
            })
            .await;

            let (estimator, window, spectrum) = match computed {
                Ok(parts) => parts,
                Err(e) => {
                    log::error!("spectrum: estimation task failed: {e}");
                    break;
                }
            };
            self.estimator = estimator;

            let overruns = self.overruns.load(Ordering::Relaxed);
            if overruns > reported_overruns {
                log::warn!(
                    "spectrum: device reported {} overrun(s) so far",
                    overruns
                );
                reported_overruns = overruns;
            }

            self.sink.on_pipeline_update(PipelineUpdate {
                time_window: window,
                spectrum,
                elapsed,
                sample_rate,
                overruns,
            });
        }

        log::info!("spectrum: notice channel closed, worker shutting down");
    }
}
