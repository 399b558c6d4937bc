mod default_loader;
mod load_options;
mod resampler;

use crate::error::{GardenSonicError, Result};
pub use default_loader::DefaultSegmentLoader;
pub use load_options::{ConvertToMono, LoadOptions};
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Decoded audio of one emitter segment (an intro or a loop).
///
/// Cloning is cheap: the samples sit behind an `Arc`, so the two loop
/// instances of a segment chain share one decoded buffer.
///
/// # Data Format
/// Samples are **INTERLEAVED**: stereo is `[L0, R0, L1, R1, ...]`.
#[derive(Debug, Clone)]
pub struct SegmentData {
    inner: Arc<SegmentDataInner>,
}

#[derive(Debug)]
struct SegmentDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    total_frames: usize,
}

impl SegmentData {
    /// Wraps interleaved samples. The duration is derived from the frame count.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(GardenSonicError::AudioFormat(format!(
                "Invalid segment layout: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        let total_frames = samples.len() / channels as usize;
        let duration = Duration::from_secs_f64(total_frames as f64 / sample_rate as f64);
        Ok(Self {
            inner: Arc::new(SegmentDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        })
    }

    /// Load a segment from a file path using the default loader.
    pub fn from_path(path: &str, options: &LoadOptions) -> Result<Self> {
        DefaultSegmentLoader.load(path, options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    /// Declared length of the segment; splice points are computed from it
    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Sample of `frame` for output channel `channel`. Channels beyond the
    /// segment's own wrap around, so mono feeds every output channel.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.inner.channels as usize;
        self.inner
            .samples
            .get(frame * channels + channel % channels)
            .copied()
            .unwrap_or(0.0)
    }

    /// True when both handles point at the same decoded buffer.
    pub fn shares_buffer_with(&self, other: &SegmentData) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Convert to mono by averaging all channels
    pub fn to_mono(&self) -> Result<Self> {
        if self.inner.channels == 1 {
            return Ok(self.clone());
        }
        let channels = self.inner.channels as usize;
        let mono: Vec<f32> = self
            .inner
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::from_samples(mono, self.inner.sample_rate, 1)
    }

    /// Resample to a different sample rate using rubato
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;
        let resampled = resampler.resample_interleaved(&self.inner.samples)?;
        Self::from_samples(resampled, target_sample_rate, self.inner.channels)
    }
}

/// Loads emitter segments from asset locations.
///
/// Loads run on background tasks, so loaders must be shareable across
/// threads. Failures are reported as [`GardenSonicError::AssetLoad`] or
/// [`GardenSonicError::AudioFormat`]; neither is retried.
pub trait SegmentLoader: Send + Sync {
    fn load(&self, location: &str, options: &LoadOptions) -> Result<SegmentData>;
}

impl<L: SegmentLoader + ?Sized> SegmentLoader for Arc<L> {
    fn load(&self, location: &str, options: &LoadOptions) -> Result<SegmentData> {
        (**self).load(location, options)
    }
}
