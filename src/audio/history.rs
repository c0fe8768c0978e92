//! Fixed-capacity sliding window over the most recent captured samples.
//!
//! Appending a block that would push the window past `capacity` evicts the
//! oldest samples first, so the window always holds the newest `capacity`
//! samples in arrival order.  Unlike a ring buffer the contents stay
//! contiguous, so [`HistoryBuffer::current`] can hand out a plain slice.
//!
//! # Example
//!
//! ```rust
//! use audio_jack_streamer::audio::HistoryBuffer;
//!
//! let mut buf = HistoryBuffer::new(4);
//! buf.push_samples(&[1, 2, 3, 4, 5]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.current(), &[2, 3, 4, 5]);
//!
//! buf.resize(2);
//! assert_eq!(buf.current(), &[4, 5]);
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::capture::AudioBlock;

// ---------------------------------------------------------------------------
// HistoryBuffer
// ---------------------------------------------------------------------------

/// FIFO window of `i16` samples with a configurable capacity.
///
/// ## Overflow behaviour
///
/// When an append would exceed `capacity`, the oldest `len - capacity`
/// samples are discarded.  Growing the capacity never synthesises samples;
/// the window simply fills up as new blocks arrive.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: Vec<i16>,
    capacity: usize,
    /// Elapsed time of the newest appended block.
    last_elapsed: Option<Duration>,
}

impl HistoryBuffer {
    /// Default number of retained samples.
    pub const DEFAULT_CAPACITY: usize = 5_000;

    /// Create an empty window holding at most `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "HistoryBuffer capacity must be > 0");
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            last_elapsed: None,
        }
    }

    /// Append a captured block and remember its elapsed time.
    pub fn append(&mut self, block: &AudioBlock) {
        self.push_samples(&block.samples);
        self.last_elapsed = Some(block.elapsed);
    }

    /// Append raw samples, evicting from the front past `capacity`.
    pub fn push_samples(&mut self, data: &[i16]) {
        if data.len() >= self.capacity {
            // The block alone fills the window.
            self.samples.clear();
            self.samples.extend_from_slice(&data[data.len() - self.capacity..]);
            return;
        }
        let overflow = (self.samples.len() + data.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
        self.samples.extend_from_slice(data);
    }

    /// Change the capacity, truncating from the front when shrinking.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn resize(&mut self, capacity: usize) {
        assert!(capacity > 0, "HistoryBuffer capacity must be > 0");
        if self.samples.len() > capacity {
            let excess = self.samples.len() - capacity;
            self.samples.drain(..excess);
        }
        self.samples.shrink_to(capacity);
        self.capacity = capacity;
    }

    /// Present window contents, oldest first.
    pub fn current(&self) -> &[i16] {
        &self.samples
    }

    /// Owned copy of the window together with the elapsed time of the
    /// newest block in it.
    pub fn snapshot(&self) -> (Vec<i16>, Option<Duration>) {
        (self.samples.clone(), self.last_elapsed)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once the window holds `capacity` samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Window span in seconds at `sample_rate` Hz.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / sample_rate as f64
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// SharedHistory
// ---------------------------------------------------------------------------

/// History window shared between the capture context (writer) and the
/// spectral worker (snapshot reader).
///
/// Lock only for an append or a snapshot; never hold the lock across the
/// spectral computation.
pub type SharedHistory = Arc<Mutex<HistoryBuffer>>;

/// Construct a new [`SharedHistory`] with the given capacity.
pub fn new_shared_history(capacity: usize) -> SharedHistory {
    Arc::new(Mutex::new(HistoryBuffer::new(capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &[i16], elapsed_ms: u64) -> AudioBlock {
        AudioBlock {
            samples: samples.to_vec(),
            sample_rate: 40_000,
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    // ---- append / eviction -------------------------------------------------

    #[test]
    fn append_within_capacity_keeps_everything() {
        let mut buf = HistoryBuffer::new(8);
        buf.push_samples(&[1, 2, 3]);
        assert_eq!(buf.current(), &[1, 2, 3]);
        assert!(!buf.is_full());
    }

    #[test]
    fn overflow_by_one_drops_oldest() {
        let mut buf = HistoryBuffer::new(4);
        buf.push_samples(&[1, 2, 3, 4, 5]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.current(), &[2, 3, 4, 5]);
    }

    #[test]
    fn multiple_overflows_in_separate_calls() {
        let mut buf = HistoryBuffer::new(3);
        buf.push_samples(&[1, 2, 3]);
        buf.push_samples(&[4, 5]);
        assert_eq!(buf.current(), &[3, 4, 5]);
    }

    #[test]
    fn block_larger_than_capacity_keeps_its_tail() {
        let mut buf = HistoryBuffer::new(3);
        buf.push_samples(&[9, 9]);
        buf.push_samples(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.current(), &[4, 5, 6]);
    }

    #[test]
    fn window_equals_last_capacity_samples_of_stream() {
        let mut buf = HistoryBuffer::new(50);
        let mut stream: Vec<i16> = Vec::new();
        for (i, size) in [7usize, 13, 1, 40, 3, 29, 50, 11].iter().enumerate() {
            let chunk: Vec<i16> = (0..*size).map(|k| (i * 100 + k) as i16).collect();
            stream.extend_from_slice(&chunk);
            buf.push_samples(&chunk);

            assert!(buf.len() <= buf.capacity());
            let start = stream.len().saturating_sub(50);
            assert_eq!(buf.current(), &stream[start..]);
        }
    }

    #[test]
    fn append_tracks_latest_elapsed() {
        let mut buf = HistoryBuffer::new(10);
        assert_eq!(buf.snapshot().1, None);

        buf.append(&block(&[1, 2], 0));
        buf.append(&block(&[3], 20));

        let (samples, elapsed) = buf.snapshot();
        assert_eq!(samples, vec![1, 2, 3]);
        assert_eq!(elapsed, Some(Duration::from_millis(20)));
    }

    // ---- resize ------------------------------------------------------------

    #[test]
    fn shrinking_truncates_immediately_to_newest() {
        let mut buf = HistoryBuffer::new(6);
        buf.push_samples(&[1, 2, 3, 4, 5, 6]);
        buf.resize(2);
        assert_eq!(buf.capacity(), 2);
        assert_eq!(buf.current(), &[5, 6]);
    }

    #[test]
    fn growing_does_not_fabricate_samples() {
        let mut buf = HistoryBuffer::new(3);
        buf.push_samples(&[1, 2, 3, 4]);
        buf.resize(6);
        assert_eq!(buf.current(), &[2, 3, 4]);

        buf.push_samples(&[5, 6, 7]);
        assert_eq!(buf.current(), &[2, 3, 4, 5, 6, 7]);

        buf.push_samples(&[8]);
        assert_eq!(buf.current(), &[3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn resize_to_same_capacity_is_a_no_op() {
        let mut buf = HistoryBuffer::new(4);
        buf.push_samples(&[1, 2, 3]);
        buf.resize(4);
        assert_eq!(buf.current(), &[1, 2, 3]);
    }

    // ---- misc --------------------------------------------------------------

    #[test]
    fn fills_up_then_stays_full() {
        let mut buf = HistoryBuffer::new(4);
        assert!(buf.is_empty());
        buf.append(&block(&[1, 2, 3], 5));
        assert!(!buf.is_full());
        buf.append(&block(&[4, 5], 25));
        assert!(buf.is_full());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn default_capacity_is_five_thousand() {
        assert_eq!(HistoryBuffer::default().capacity(), 5_000);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut buf = HistoryBuffer::new(40_000);
        buf.push_samples(&vec![0; 20_000]);
        assert!((buf.duration_secs(40_000) - 0.5).abs() < 1e-12);
        assert_eq!(buf.duration_secs(0), 0.0);
    }

    #[test]
    fn shared_history_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedHistory>();
    }

    #[test]
    #[should_panic(expected = "HistoryBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf = HistoryBuffer::new(0);
    }
}
