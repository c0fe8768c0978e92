//! One-sided periodogram over the history window.
//!
//! The whole window is treated as a single segment with a rectangular
//! window: optional mean removal, one forward FFT, then squared magnitudes
//! scaled to power spectral density (or power spectrum) units.
//!
//! | Scaling   | Factor          | Units |
//! |-----------|-----------------|-------|
//! | Density   | `1 / (fs · N)`  | V²/Hz |
//! | Spectrum  | `1 / N²`        | V²    |
//!
//! Every bin except DC and, for even `N`, Nyquist is doubled to fold the
//! negative frequencies in, so `Σ power · fs/N` equals the signal variance
//! under density scaling.
//!
//! # Example
//!
//! ```rust
//! use audio_jack_streamer::audio::SpectralEstimator;
//!
//! let mut estimator = SpectralEstimator::default();
//! let window: Vec<i16> = (0..400).map(|i| if i % 2 == 0 { 100 } else { -100 }).collect();
//!
//! let spectrum = estimator.estimate(&window, 40_000);
//! assert_eq!(spectrum.len(), 201);
//! assert_eq!(spectrum.frequencies[200], 20_000.0);
//!
//! assert!(estimator.estimate::<i16>(&[], 40_000).is_empty());
//! ```

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Detrend / Scaling
// ---------------------------------------------------------------------------

/// Trend removal applied before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detrend {
    /// Use the samples as captured.
    None,
    /// Subtract the window mean (removes the DC offset of the input jack).
    #[default]
    Constant,
}

/// Units of the returned power values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// Power spectral density, `1 / (fs · N)`.
    #[default]
    Density,
    /// Power spectrum, `1 / N²`.
    Spectrum,
}

// ---------------------------------------------------------------------------
// SpectrumEstimate
// ---------------------------------------------------------------------------

/// Frequency bins (ascending, Hz, from 0) and their power values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumEstimate {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl SpectrumEstimate {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Bin spacing in Hz, `None` when there is fewer than two bins.
    pub fn resolution(&self) -> Option<f64> {
        match self.frequencies.as_slice() {
            [first, second, ..] => Some(second - first),
            _ => None,
        }
    }

    /// The strongest non-DC bin as `(frequency, power)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .zip(&self.power)
            .skip(1)
            .fold(None, |best: Option<(f64, f64)>, (&f, &p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((f, p)),
            })
    }

    /// Bins at or below `max_hz`.
    pub fn up_to(&self, max_hz: f64) -> SpectrumEstimate {
        let keep = self.frequencies.partition_point(|&f| f <= max_hz);
        SpectrumEstimate {
            frequencies: self.frequencies[..keep].to_vec(),
            power: self.power[..keep].to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpectralEstimator
// ---------------------------------------------------------------------------

/// Single-segment periodogram estimator.
///
/// The only state kept between calls is rustfft's plan cache, which never
/// affects results: the output is a pure function of the window, the
/// sample rate and the configured [`Detrend`] / [`Scaling`].
pub struct SpectralEstimator {
    detrend: Detrend,
    scaling: Scaling,
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("detrend", &self.detrend)
            .field("scaling", &self.scaling)
            .finish_non_exhaustive()
    }
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self::new(Detrend::default(), Scaling::default())
    }
}

impl SpectralEstimator {
    pub fn new(detrend: Detrend, scaling: Scaling) -> Self {
        Self {
            detrend,
            scaling,
            planner: FftPlanner::new(),
        }
    }

    pub fn detrend(&self) -> Detrend {
        self.detrend
    }

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    /// Estimate the one-sided spectrum of `window` sampled at `sample_rate`.
    ///
    /// Returns `⌊N/2⌋ + 1` bins spaced `sample_rate / N` apart.  An empty
    /// window (or a zero sample rate) yields an empty estimate.
    pub fn estimate<S>(&mut self, window: &[S], sample_rate: u32) -> SpectrumEstimate
    where
        S: Copy + Into<f64>,
    {
        let n = window.len();
        if n == 0 || sample_rate == 0 {
            return SpectrumEstimate::default();
        }
        let fs = sample_rate as f64;

        let offset = match self.detrend {
            Detrend::None => 0.0,
            Detrend::Constant => window.iter().map(|&s| s.into()).sum::<f64>() / n as f64,
        };
        let mut buffer: Vec<Complex<f64>> = window
            .iter()
            .map(|&s| Complex::new(s.into() - offset, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let scale = match self.scaling {
            Scaling::Density => 1.0 / (fs * n as f64),
            Scaling::Spectrum => 1.0 / (n as f64 * n as f64),
        };

        let bins = n / 2 + 1;
        let has_nyquist = n % 2 == 0;
        let power = buffer[..bins]
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let p = c.norm_sqr() * scale;
                let unpaired = k == 0 || (has_nyquist && k == n / 2);
                if unpaired {
                    p
                } else {
                    2.0 * p
                }
            })
            .collect();
        let frequencies = (0..bins).map(|k| k as f64 * fs / n as f64).collect();

        SpectrumEstimate { frequencies, power }
    }
}

/// One-off periodogram with default detrending and density scaling.
pub fn periodogram<S>(window: &[S], sample_rate: u32) -> SpectrumEstimate
where
    S: Copy + Into<f64>,
{
    SpectralEstimator::default().estimate(window, sample_rate)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
