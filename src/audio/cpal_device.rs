//! Microphone / line-in capture via `cpal`.
//!
//! [`CpalDevice`] resolves an input device once and opens a fresh stream on
//! every [`AudioDevice::open`].  The stream runs at the requested sample
//! rate but otherwise in whatever layout the device supports: the fewest
//! channels it offers, its preferred sample format, and a buffer size
//! clamped to its range.  Inside the callback each frame is averaged down
//! to mono and converted to `i16`, into a scratch buffer that is reused
//! across callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamInstant,
    SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange,
};

use super::device::{
    AudioDevice, BlockCallback, DeviceError, DeviceParams, RawBlock, StreamTimestamp,
};

impl StreamTimestamp for StreamInstant {
    fn elapsed_since(&self, epoch: &Self) -> std::time::Duration {
        self.duration_since(epoch).unwrap_or_default()
    }
}

/// Sample formats the callback converts, most preferred first.
const FORMAT_PREFERENCE: [SampleFormat; 4] = [
    SampleFormat::I16,
    SampleFormat::F32,
    SampleFormat::I32,
    SampleFormat::U16,
];

// ---------------------------------------------------------------------------
// Config selection
// ---------------------------------------------------------------------------

/// Pick the supported range that can run at `sample_rate`: fewest channels
/// first, then the most preferred sample format.
fn pick_config<I>(ranges: I, sample_rate: u32) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    ranges
        .into_iter()
        .filter_map(|range| {
            let rank = FORMAT_PREFERENCE
                .iter()
                .position(|&f| f == range.sample_format())?;
            let channels = range.channels();
            let config = range.try_with_sample_rate(SampleRate(sample_rate))?;
            Some((channels, rank, config))
        })
        .filter(|(channels, _, _)| *channels > 0)
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, config)| config)
}

/// `frames` clamped to what the device accepts, or the host default when
/// the device does not report a range.
fn buffer_size_for(supported: &SupportedBufferSize, frames: u32) -> BufferSize {
    match *supported {
        SupportedBufferSize::Range { min, max } if min <= max => {
            BufferSize::Fixed(frames.clamp(min, max))
        }
        _ => BufferSize::Default,
    }
}

/// Average each interleaved frame of `data` down to one `i16` sample.
fn downmix_into<T>(data: &[T], channels: usize, out: &mut Vec<i16>)
where
    T: Sample,
    i16: FromSample<T>,
{
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().map(|s| s.to_sample::<i16>()));
        return;
    }
    out.extend(data.chunks(channels).map(|frame| {
        let sum: i32 = frame.iter().map(|s| i32::from(s.to_sample::<i16>())).sum();
        (sum / frame.len() as i32) as i16
    }));
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value drops the `cpal::Stream`, which stops the hardware
/// stream and joins the backend's capture thread.
pub struct CpalStream {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// Input device wrapper built on top of `cpal`.
pub struct CpalDevice {
    device: cpal::Device,
    name: String,
}

impl CpalDevice {
    /// Resolve an input device on the default host.
    ///
    /// `name` selects a device by its exact cpal name; `None` picks the
    /// system default input.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NoDevice`] / [`DeviceError::DeviceNotFound`] when
    /// nothing matches, [`DeviceError::Enumerate`] when the host cannot list
    /// its inputs.
    pub fn new(name: Option<&str>) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = match name {
            None => host.default_input_device().ok_or(DeviceError::NoDevice)?,
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(wanted.to_string()))?,
        };

        let name = device.name().unwrap_or_else(|_| "<unnamed>".into());
        log::info!("capture: using input device {name:?}");

        Ok(Self { device, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build<T>(
        &self,
        config: &cpal::StreamConfig,
        mut callback: BlockCallback<StreamInstant>,
    ) -> Result<cpal::Stream, DeviceError>
    where
        T: SizedSample,
        i16: FromSample<T>,
    {
        let faulted = Arc::new(AtomicBool::new(false));
        let faulted_err = Arc::clone(&faulted);
        let channels = config.channels as usize;
        let mut scratch: Vec<i16> = Vec::new();

        let stream = self.device.build_input_stream(
            config,
            move |data: &[T], info: &cpal::InputCallbackInfo| {
                downmix_into(data, channels, &mut scratch);
                callback(RawBlock {
                    samples: &scratch,
                    timestamp: info.timestamp().capture,
                    overrun: faulted.swap(false, Ordering::AcqRel),
                });
            },
            move |err: cpal::StreamError| {
                faulted_err.store(true, Ordering::Release);
                log::warn!("capture: cpal stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }
}

impl AudioDevice for CpalDevice {
    type Timestamp = StreamInstant;
    type Stream = CpalStream;

    fn open(
        &mut self,
        params: DeviceParams,
        callback: BlockCallback<StreamInstant>,
    ) -> Result<CpalStream, DeviceError> {
        let frames = u32::try_from(params.block_size).map_err(|_| {
            DeviceError::UnsupportedFormat(format!(
                "block size of {} frames exceeds a device buffer",
                params.block_size
            ))
        })?;

        let supported = pick_config(self.device.supported_input_configs()?, params.sample_rate)
            .ok_or_else(|| {
                DeviceError::UnsupportedFormat(format!(
                    "{:?} cannot capture at {} Hz",
                    self.name, params.sample_rate
                ))
            })?;

        let buffer_size = buffer_size_for(supported.buffer_size(), frames);
        match buffer_size {
            BufferSize::Fixed(n) if n != frames => log::warn!(
                "capture: {:?} accepts no {frames}-frame buffer, using {n}",
                self.name
            ),
            BufferSize::Default => log::debug!(
                "capture: {:?} reports no buffer range, using host default",
                self.name
            ),
            _ => {}
        }

        let sample_format = supported.sample_format();
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(params.sample_rate),
            buffer_size,
        };

        let stream = match sample_format {
            SampleFormat::I16 => self.build::<i16>(&config, callback)?,
            SampleFormat::F32 => self.build::<f32>(&config, callback)?,
            SampleFormat::I32 => self.build::<i32>(&config, callback)?,
            SampleFormat::U16 => self.build::<u16>(&config, callback)?,
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        };

        // On failure `stream` is dropped here, closing the device.
        stream.play()?;
        log::debug!(
            "capture: opened {:?} at {} Hz, {} channel(s) {:?} downmixed to mono, {:?}",
            self.name,
            params.sample_rate,
            config.channels,
            sample_format,
            config.buffer_size
        );
        Ok(CpalStream { _stream: stream })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Range { min: 64, max: 4_096 },
            format,
        )
    }

    // ---- config selection ---------------------------------------------------

    #[test]
    fn picks_fewest_channels_at_requested_rate() {
        let ranges = [
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::F32),
            range(1, 44_100, 48_000, SampleFormat::I16),
        ];
        let config = pick_config(ranges, 40_000).unwrap();
        assert_eq!(config.channels(), 1);
        assert_eq!(config.sample_rate(), SampleRate(40_000));
        assert_eq!(config.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn stereo_only_device_is_accepted() {
        let config = pick_config([range(2, 44_100, 48_000, SampleFormat::F32)], 48_000).unwrap();
        assert_eq!(config.channels(), 2);
    }

    #[test]
    fn prefers_i16_among_equal_channel_counts() {
        let ranges = [
            range(1, 8_000, 48_000, SampleFormat::U16),
            range(1, 8_000, 48_000, SampleFormat::I16),
            range(1, 8_000, 48_000, SampleFormat::F32),
        ];
        assert_eq!(
            pick_config(ranges, 40_000).unwrap().sample_format(),
            SampleFormat::I16
        );
    }

    #[test]
    fn rate_outside_every_range_finds_nothing() {
        let ranges = [
            range(2, 44_100, 48_000, SampleFormat::F32),
            range(1, 44_100, 44_100, SampleFormat::I16),
        ];
        assert!(pick_config(ranges, 40_000).is_none());
    }

    #[test]
    fn unconvertible_formats_are_skipped() {
        let ranges = [
            range(1, 8_000, 48_000, SampleFormat::F64),
            range(2, 8_000, 48_000, SampleFormat::I32),
        ];
        let config = pick_config(ranges, 40_000).unwrap();
        assert_eq!(config.sample_format(), SampleFormat::I32);
        assert!(pick_config([range(1, 8_000, 48_000, SampleFormat::U8)], 40_000).is_none());
    }

    // ---- buffer size --------------------------------------------------------

    #[test]
    fn buffer_size_is_clamped_to_device_range() {
        let supported = SupportedBufferSize::Range { min: 64, max: 4_096 };
        assert_eq!(buffer_size_for(&supported, 800), BufferSize::Fixed(800));
        assert_eq!(buffer_size_for(&supported, 16), BufferSize::Fixed(64));
        assert_eq!(buffer_size_for(&supported, 40_000), BufferSize::Fixed(4_096));
    }

    #[test]
    fn unknown_buffer_range_uses_host_default() {
        assert_eq!(
            buffer_size_for(&SupportedBufferSize::Unknown, 800),
            BufferSize::Default
        );
    }

    // ---- downmix ------------------------------------------------------------

    #[test]
    fn mono_passes_through() {
        let mut out = vec![99];
        downmix_into(&[1i16, -2, 3], 1, &mut out);
        assert_eq!(out, vec![1, -2, 3]);
    }

    #[test]
    fn stereo_frames_are_averaged() {
        let mut out = Vec::new();
        downmix_into(&[100i16, 300, -50, -150, i16::MAX, i16::MAX], 2, &mut out);
        assert_eq!(out, vec![200, -100, i16::MAX]);
    }

    #[test]
    fn float_input_is_converted_then_averaged() {
        let mut out = Vec::new();
        downmix_into(&[0.0f32, 0.0, -1.0, -1.0, 0.5, -0.5], 2, &mut out);
        assert_eq!(out, vec![0, i16::MIN, 0]);
    }

    #[test]
    fn scratch_is_reused_across_calls() {
        let mut out = Vec::new();
        downmix_into(&[1i16, 1, 1, 1, 1, 1, 1, 1], 2, &mut out);
        let cap = out.capacity();
        downmix_into(&[2i16, 4], 2, &mut out);
        assert_eq!(out, vec![3]);
        assert_eq!(out.capacity(), cap);
    }
}
