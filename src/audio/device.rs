//! The device boundary: what the capture engine needs from an audio input.
//!
//! [`AudioDevice`] opens a single-channel 16-bit input stream and invokes a
//! [`BlockCallback`] once per captured block, from whatever thread the audio
//! subsystem owns.  The returned `Stream` value is a RAII guard: dropping it
//! closes the device.
//!
//! Timestamps are device specific.  Each backend picks a
//! [`StreamTimestamp`] type; the engine only ever asks one timestamp how far
//! it lies after another.

use std::time::{Duration, Instant};

use thiserror::Error;

// ---------------------------------------------------------------------------
// StreamTimestamp
// ---------------------------------------------------------------------------

/// A point in time on a device's capture clock.
pub trait StreamTimestamp: Copy + Send + 'static {
    /// Time elapsed from `epoch` to `self`, saturating at zero.
    fn elapsed_since(&self, epoch: &Self) -> Duration;
}

impl StreamTimestamp for Duration {
    fn elapsed_since(&self, epoch: &Self) -> Duration {
        self.saturating_sub(*epoch)
    }
}

impl StreamTimestamp for Instant {
    fn elapsed_since(&self, epoch: &Self) -> Duration {
        self.saturating_duration_since(*epoch)
    }
}

// ---------------------------------------------------------------------------
// RawBlock / BlockCallback
// ---------------------------------------------------------------------------

/// One block as handed over by the device, borrowed for the duration of the
/// callback.
#[derive(Debug, Clone, Copy)]
pub struct RawBlock<'a, T> {
    /// Mono 16-bit PCM samples.
    pub samples: &'a [i16],
    /// Capture time of the first sample in `samples`.
    pub timestamp: T,
    /// The device reported dropped input since the previous block.
    pub overrun: bool,
}

/// Callback invoked by the device from its capture context.
pub type BlockCallback<T> = Box<dyn FnMut(RawBlock<'_, T>) + Send + 'static>;

// ---------------------------------------------------------------------------
// DeviceParams
// ---------------------------------------------------------------------------

/// Parameters for opening an input stream.
///
/// The stream is always mono, 16-bit linear PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Requested frames per callback.
    pub block_size: usize,
}

impl DeviceParams {
    pub const CHANNELS: u16 = 1;
    pub const BIT_DEPTH: u16 = 16;
}

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Reasons a device could not be opened.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("input device is busy")]
    Busy,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to enumerate input devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioDevice
// ---------------------------------------------------------------------------

/// An audio input that can be opened and closed repeatedly.
pub trait AudioDevice {
    /// Capture clock of this device.
    type Timestamp: StreamTimestamp;

    /// Live stream handle; dropping it closes the device.
    type Stream;

    /// Open the device and begin delivering blocks to `callback`.
    ///
    /// # Errors
    ///
    /// Any [`DeviceError`] when the device is missing, busy, or rejects the
    /// parameters.  Nothing is left open on failure.
    fn open(
        &mut self,
        params: DeviceParams,
        callback: BlockCallback<Self::Timestamp>,
    ) -> Result<Self::Stream, DeviceError>;
}

// ---------------------------------------------------------------------------
// MockDevice
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockDevice, MockStream};

#[cfg(test)]
mod mock {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{AudioDevice, BlockCallback, DeviceError, DeviceParams, RawBlock};

    type Slot = Arc<Mutex<Option<BlockCallback<Duration>>>>;

    #[derive(Default)]
    struct MockState {
        opens: usize,
        closes: usize,
        last_params: Option<DeviceParams>,
        fail_next_open: bool,
        live: Option<Slot>,
    }

    /// Scripted device for tests.
    ///
    /// Clones share state, so a test keeps one clone to drive blocks and
    /// inspect calls while the engine owns another.  Blocks are delivered
    /// synchronously on the calling thread.
    #[derive(Clone, Default)]
    pub struct MockDevice {
        state: Arc<Mutex<MockState>>,
    }

    pub struct MockStream {
        slot: Slot,
        state: Arc<Mutex<MockState>>,
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            // Waits for an in-flight delivery before the callback goes away.
            self.slot.lock().unwrap().take();
            let mut st = self.state.lock().unwrap();
            st.closes += 1;
            if st.live.as_ref().is_some_and(|s| Arc::ptr_eq(s, &self.slot)) {
                st.live = None;
            }
        }
    }

    impl MockDevice {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_open(&self) {
            self.state.lock().unwrap().fail_next_open = true;
        }

        pub fn opens(&self) -> usize {
            self.state.lock().unwrap().opens
        }

        pub fn closes(&self) -> usize {
            self.state.lock().unwrap().closes
        }

        pub fn is_open(&self) -> bool {
            self.state.lock().unwrap().live.is_some()
        }

        pub fn last_params(&self) -> Option<DeviceParams> {
            self.state.lock().unwrap().last_params
        }

        /// Deliver one block; returns `false` when no stream is open.
        pub fn deliver(&self, samples: &[i16], timestamp: Duration) -> bool {
            self.deliver_with(samples, timestamp, false)
        }

        pub fn deliver_with(&self, samples: &[i16], timestamp: Duration, overrun: bool) -> bool {
            let slot = match self.state.lock().unwrap().live.clone() {
                Some(slot) => slot,
                None => return false,
            };
            let mut guard = slot.lock().unwrap();
            match guard.as_mut() {
                Some(callback) => {
                    callback(RawBlock {
                        samples,
                        timestamp,
                        overrun,
                    });
                    true
                }
                None => false,
            }
        }
    }

    impl AudioDevice for MockDevice {
        type Timestamp = Duration;
        type Stream = MockStream;

        fn open(
            &mut self,
            params: DeviceParams,
            callback: BlockCallback<Duration>,
        ) -> Result<MockStream, DeviceError> {
            let mut st = self.state.lock().unwrap();
            if std::mem::take(&mut st.fail_next_open) || st.live.is_some() {
                return Err(DeviceError::Busy);
            }
            st.opens += 1;
            st.last_params = Some(params);
            let slot: Slot = Arc::new(Mutex::new(Some(callback)));
            st.live = Some(Arc::clone(&slot));
            Ok(MockStream {
                slot,
                state: Arc::clone(&self.state),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
