//! Presentation boundary: what the pipeline publishes after each processed
//! block, and where it goes.
//!
//! [`UpdateSink::on_pipeline_update`] may be called from the capture context
//! (inline estimation) or from the spectral worker, so sinks must be
//! `Send + Sync` and must not block.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::SpectrumEstimate;

// ---------------------------------------------------------------------------
// PipelineUpdate
// ---------------------------------------------------------------------------

/// One published result: the time-domain window, its spectrum, and the
/// elapsed stream time of the newest block in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineUpdate {
    pub time_window: Vec<i16>,
    pub spectrum: SpectrumEstimate,
    pub elapsed: Duration,
    pub sample_rate: u32,
    /// Device overruns counted so far.
    pub overruns: u64,
}

impl PipelineUpdate {
    /// Time of each window sample in seconds, starting at 0.
    pub fn time_axis(&self) -> impl Iterator<Item = f64> + '_ {
        let fs = self.sample_rate.max(1) as f64;
        (0..self.time_window.len()).map(move |i| i as f64 / fs)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Peak absolute sample value in the window.
    pub fn peak_amplitude(&self) -> u16 {
        self.time_window
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// UpdateSink
// ---------------------------------------------------------------------------

/// Receiver of [`PipelineUpdate`]s.
pub trait UpdateSink: Send + Sync {
    fn on_pipeline_update(&self, update: PipelineUpdate);
}

impl<F> UpdateSink for F
where
    F: Fn(PipelineUpdate) + Send + Sync,
{
    fn on_pipeline_update(&self, update: PipelineUpdate) {
        self(update)
    }
}

/// Sink that only logs a one-line summary at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl UpdateSink for LogSink {
    fn on_pipeline_update(&self, update: PipelineUpdate) {
        match update.spectrum.peak() {
            Some((freq, power)) => log::debug!(
                "pipeline: t={:.3}s window={} peak {:.1} Hz ({:.3e})",
                update.elapsed_secs(),
                update.time_window.len(),
                freq,
                power
            ),
            None => log::debug!(
                "pipeline: t={:.3}s window={} (no spectrum)",
                update.elapsed_secs(),
                update.time_window.len()
            ),
        }
    }
}

/// Forwards updates over a bounded tokio channel.
///
/// Uses `try_send`: when the consumer falls behind the update is dropped
/// instead of blocking the producer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PipelineUpdate>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<PipelineUpdate>) -> Self {
        Self { tx }
    }
}

impl UpdateSink for ChannelSink {
    fn on_pipeline_update(&self, update: PipelineUpdate) {
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::trace!("pipeline: presentation channel full, update dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::trace!("pipeline: presentation channel closed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn update(window: Vec<i16>) -> PipelineUpdate {
        PipelineUpdate {
            time_window: window,
            spectrum: SpectrumEstimate::default(),
            elapsed: Duration::from_millis(1_250),
            sample_rate: 4,
            overruns: 0,
        }
    }

    #[test]
    fn time_axis_is_sample_index_over_rate() {
        let u = update(vec![0, 0, 0, 0, 0]);
        let axis: Vec<f64> = u.time_axis().collect();
        assert_eq!(axis, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!((u.elapsed_secs() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn peak_amplitude_handles_i16_min() {
        assert_eq!(update(vec![3, -7, 5]).peak_amplitude(), 7);
        assert_eq!(update(vec![i16::MIN, 1]).peak_amplitude(), 32_768);
        assert_eq!(update(Vec::new()).peak_amplitude(), 0);
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);

        sink.on_pipeline_update(update(vec![1]));
        sink.on_pipeline_update(update(vec![2]));

        assert_eq!(rx.try_recv().unwrap().time_window, vec![1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ChannelSink::new(tx).on_pipeline_update(update(vec![1]));
    }

    #[test]
    fn log_sink_accepts_empty_spectrum() {
        LogSink.on_pipeline_update(update(Vec::new()));
    }
}
