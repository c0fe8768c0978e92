//! Lifecycle state and the configuration snapshot exposed to the front end.
//!
//! [`StreamLifecycleState`] only changes through
//! [`PipelineController`](super::PipelineController) commands.
//! [`StreamConfig`] is a read-only snapshot returned by
//! [`PipelineController::current_config`](super::PipelineController::current_config);
//! `chunk_size` is always derived, never set.

// ---------------------------------------------------------------------------
// StreamLifecycleState
// ---------------------------------------------------------------------------

/// Whether the capture device is open.
///
/// ```text
/// Stopped ──start()──▶ Running
/// Running ──stop()───▶ Stopped
/// Running ──set_update_rate()──▶ Stopped ──▶ Running   (restart to apply)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamLifecycleState {
    #[default]
    Stopped,
    Running,
}

impl StreamLifecycleState {
    pub fn is_running(&self) -> bool {
        matches!(self, StreamLifecycleState::Running)
    }

    /// A short human-readable label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            StreamLifecycleState::Stopped => "Stopped",
            StreamLifecycleState::Running => "Running",
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Current stream parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// Sample rate in Hz, fixed for the process lifetime.
    pub sample_rate: u32,
    /// Blocks per second requested from the device.
    pub update_rate: f64,
    /// `floor(sample_rate / update_rate)`.
    pub chunk_size: usize,
    /// Capacity of the history window in samples.
    pub history_length: usize,
}

impl StreamConfig {
    /// Update rate actually achieved with a whole number of frames per block.
    pub fn effective_update_rate(&self) -> f64 {
        self.sample_rate as f64 / self.chunk_size as f64
    }

    /// Seconds covered by one block.
    pub fn block_period_secs(&self) -> f64 {
        self.chunk_size as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// HistoryFill
// ---------------------------------------------------------------------------

/// How far the history window has filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryFill {
    pub len: usize,
    pub capacity: usize,
    pub full: bool,
    /// Seconds of signal currently held.
    pub span_secs: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
