//! Capture engine: chunk-size derivation, stream epoch, and block hand-off.
//!
//! [`CaptureEngine`] owns an [`AudioDevice`] and one registered
//! [`BlockConsumer`].  [`start`](CaptureEngine::start) opens the device with
//! `chunk_size = floor(sample_rate / update_rate)` frames per block; every
//! block is stamped with its time since the first block of that session and
//! forwarded to the consumer as an [`AudioBlock`].
//!
//! The device callback runs in the audio subsystem's capture context.  While
//! the engine is running it takes no locks, performs no I/O, and allocates
//! only the block it hands over.  [`stop`](CaptureEngine::stop) parks until
//! an in-flight callback has returned, so a stopped engine never calls into
//! its consumer again.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use super::device::{
    AudioDevice, BlockCallback, DeviceError, DeviceParams, RawBlock, StreamTimestamp,
};

// ---------------------------------------------------------------------------
// AudioBlock
// ---------------------------------------------------------------------------

/// A block of mono 16-bit samples delivered by one device callback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Time since the first block of the current capture session.
    pub elapsed: Duration,
}

impl AudioBlock {
    /// Mean sample value, `0.0` for an empty block.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|&s| s as f64).sum::<f64>() / self.samples.len() as f64
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Configuration and lifecycle errors of the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    #[error("capture is already running")]
    AlreadyRunning,

    #[error("capture is not running")]
    NotRunning,
}

// ---------------------------------------------------------------------------
// chunk_size_for
// ---------------------------------------------------------------------------

/// Frames per block for a given sample rate and update rate.
///
/// ```
/// use audio_jack_streamer::audio::chunk_size_for;
///
/// assert_eq!(chunk_size_for(40_000, 50.0).unwrap(), 800);
/// assert_eq!(chunk_size_for(40_000, 30.0).unwrap(), 1333);
/// assert!(chunk_size_for(40_000, 0.0).is_err());
/// ```
///
/// # Errors
///
/// [`CaptureError::InvalidConfig`] when `update_rate` is not a positive
/// finite number, when the resulting chunk would hold no samples, or when
/// it would not fit a device buffer size (`u32` frames).
pub fn chunk_size_for(sample_rate: u32, update_rate: f64) -> Result<usize, CaptureError> {
    if !update_rate.is_finite() || update_rate <= 0.0 {
        return Err(CaptureError::InvalidConfig(format!(
            "update rate must be positive, got {update_rate}"
        )));
    }
    let chunk = (sample_rate as f64 / update_rate).floor();
    if chunk < 1.0 {
        return Err(CaptureError::InvalidConfig(format!(
            "update rate {update_rate} Hz exceeds sample rate {sample_rate} Hz"
        )));
    }
    // `as u64` saturates, so anything past u32::MAX fails the conversion.
    let frames = u32::try_from(chunk as u64).map_err(|_| {
        CaptureError::InvalidConfig(format!(
            "update rate {update_rate} Hz gives {chunk} frames per block, more than a device buffer holds"
        ))
    })?;
    Ok(frames as usize)
}

// ---------------------------------------------------------------------------
// BlockConsumer
// ---------------------------------------------------------------------------

/// The single subscriber that receives every captured block.
///
/// Called from the capture context: implementations must return promptly
/// and must not wait on slower threads.
pub trait BlockConsumer: Send + Sync + 'static {
    fn on_block(&self, block: AudioBlock);
}

impl<F> BlockConsumer for F
where
    F: Fn(AudioBlock) + Send + Sync + 'static,
{
    fn on_block(&self, block: AudioBlock) {
        self(block)
    }
}

/// Consumer used until another one is registered: logs each block's mean
/// and elapsed time at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticConsumer;

impl BlockConsumer for DiagnosticConsumer {
    fn on_block(&self, block: AudioBlock) {
        log::debug!(
            "capture: block mean={:.2} elapsed={:.3}s",
            block.mean(),
            block.elapsed.as_secs_f64()
        );
    }
}

// ---------------------------------------------------------------------------
// CallbackGate
// ---------------------------------------------------------------------------

/// Gate between [`CaptureEngine::stop`] and the device callback.
///
/// Entering and leaving are lock-free.  Only the last callback to leave a
/// closed gate touches `drained`, to wake the thread parked in
/// [`close_and_drain`](Self::close_and_drain).
struct CallbackGate {
    open: AtomicBool,
    in_flight: AtomicUsize,
    drained: Mutex<()>,
    drained_cv: Condvar,
}

struct InFlight<'a>(&'a CallbackGate);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let gate = self.0;
        if gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 && !gate.open.load(Ordering::SeqCst)
        {
            let _guard = gate.drained.lock().unwrap_or_else(PoisonError::into_inner);
            gate.drained_cv.notify_all();
        }
    }
}

impl CallbackGate {
    fn opened() -> Self {
        Self {
            open: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            drained: Mutex::new(()),
            drained_cv: Condvar::new(),
        }
    }

    fn enter(&self) -> Option<InFlight<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let token = InFlight(self);
        self.open.load(Ordering::SeqCst).then_some(token)
    }

    /// Close the gate and wait for callbacks already inside to leave.
    fn close_and_drain(&self) {
        self.open.store(false, Ordering::SeqCst);
        let mut guard = self.drained.lock().unwrap_or_else(PoisonError::into_inner);
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            guard = self
                .drained_cv
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureEngine
// ---------------------------------------------------------------------------

/// A live capture session.  Dropping it drains the callback, then closes
/// the device by dropping the stream.
struct Session<S> {
    gate: Arc<CallbackGate>,
    _stream: S,
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.gate.close_and_drain();
    }
}

/// Owns the device handle and forwards stamped blocks to one consumer.
///
/// Dropping the engine ends a running session the same way
/// [`stop`](Self::stop) does.
pub struct CaptureEngine<D: AudioDevice, C: BlockConsumer = DiagnosticConsumer> {
    device: D,
    consumer: Arc<C>,
    sample_rate: u32,
    update_rate: f64,
    chunk_size: usize,
    overruns: Arc<AtomicU64>,
    session: Option<Session<D::Stream>>,
}

impl<D: AudioDevice> CaptureEngine<D> {
    /// Create a stopped engine with the diagnostic consumer registered.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for a zero sample rate or an update
    /// rate that yields no whole sample per block.
    pub fn new(device: D, sample_rate: u32, update_rate: f64) -> Result<Self, CaptureError> {
        if sample_rate == 0 {
            return Err(CaptureError::InvalidConfig(
                "sample rate must be positive".into(),
            ));
        }
        let chunk_size = chunk_size_for(sample_rate, update_rate)?;
        Ok(Self {
            device,
            consumer: Arc::new(DiagnosticConsumer),
            sample_rate,
            update_rate,
            chunk_size,
            overruns: Arc::new(AtomicU64::new(0)),
            session: None,
        })
    }
}

impl<D: AudioDevice, C: BlockConsumer> CaptureEngine<D, C> {
    /// Register `consumer` as the single block subscriber, replacing the
    /// current one.  A running session is stopped first.
    pub fn on_block<C2: BlockConsumer>(self, consumer: C2) -> CaptureEngine<D, C2> {
        let CaptureEngine {
            device,
            sample_rate,
            update_rate,
            chunk_size,
            overruns,
            session,
            ..
        } = self;
        if session.is_some() {
            log::warn!("capture: consumer replaced while running; stopping session");
            drop(session);
        }
        CaptureEngine {
            device,
            consumer: Arc::new(consumer),
            sample_rate,
            update_rate,
            chunk_size,
            overruns,
            session: None,
        }
    }

    /// Set the update rate and recompute the chunk size.
    ///
    /// `sample_rate` must match the rate the engine was created with; it is
    /// fixed for the lifetime of the engine.  Rate changes are never
    /// applied to a live device handle.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidConfig`] for a bad rate or a different sample
    /// rate, [`CaptureError::AlreadyRunning`] while a session is active.
    /// The engine is unchanged on error.
    pub fn configure(&mut self, sample_rate: u32, update_rate: f64) -> Result<usize, CaptureError> {
        if sample_rate != self.sample_rate {
            return Err(CaptureError::InvalidConfig(format!(
                "sample rate is fixed at {} Hz, got {sample_rate} Hz",
                self.sample_rate
            )));
        }
        let chunk_size = chunk_size_for(sample_rate, update_rate)?;
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        self.update_rate = update_rate;
        self.chunk_size = chunk_size;
        log::debug!("capture: update rate {update_rate} Hz -> {chunk_size} frames per block");
        Ok(chunk_size)
    }

    /// Open the device and start forwarding blocks.
    ///
    /// The first block delivered after this call becomes the stream epoch.
    ///
    /// # Errors
    ///
    /// [`CaptureError::AlreadyRunning`] if a session is active (that session
    /// keeps running), [`CaptureError::DeviceUnavailable`] if the device
    /// cannot be opened.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let gate = Arc::new(CallbackGate::opened());
        let callback = self.session_callback(Arc::clone(&gate));
        let params = DeviceParams {
            sample_rate: self.sample_rate,
            block_size: self.chunk_size,
        };

        let stream = self.device.open(params, callback)?;
        self.session = Some(Session {
            gate,
            _stream: stream,
        });
        log::info!(
            "capture: started at {} Hz, {} frames per block ({:.2} Hz updates)",
            self.sample_rate,
            self.chunk_size,
            self.sample_rate as f64 / self.chunk_size as f64
        );
        Ok(())
    }

    /// Close the device.
    ///
    /// When this returns the device is closed and no callback of the old
    /// session is still running.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotRunning`] if there is no active session.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        let session = self.session.take().ok_or(CaptureError::NotRunning)?;
        drop(session);
        log::info!("capture: stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn update_rate(&self) -> f64 {
        self.update_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overruns reported by the device since the engine was created.
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Shared overrun counter, for consumers that report it alongside
    /// their own output.
    pub fn overrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.overruns)
    }

    fn session_callback(&self, gate: Arc<CallbackGate>) -> BlockCallback<D::Timestamp> {
        let consumer = Arc::clone(&self.consumer);
        let overruns = Arc::clone(&self.overruns);
        let sample_rate = self.sample_rate;
        let mut epoch: Option<D::Timestamp> = None;

        Box::new(move |raw: RawBlock<'_, D::Timestamp>| {
            let Some(_in_flight) = gate.enter() else {
                return;
            };
            if raw.overrun {
                overruns.fetch_add(1, Ordering::Relaxed);
            }
            let epoch = *epoch.get_or_insert(raw.timestamp);
            consumer.on_block(AudioBlock {
                samples: raw.samples.to_vec(),
                sample_rate,
                elapsed: raw.timestamp.elapsed_since(&epoch),
            });
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
