use crate::error::{GardenSonicError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline resampler used when a decoded segment's rate differs from the
/// world's.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    /// # Arguments
    /// * `source_sample_rate` - The sample rate of the input audio
    /// * `target_sample_rate` - The desired sample rate of the output audio
    /// * `channels` - Number of channels in the audio data
    /// * `chunk_size` - Optional size of processing chunks (defaults to 1024)
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(GardenSonicError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(GardenSonicError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    /// Resamples multi-channel interleaved audio data.
    ///
    /// # Data Format
    /// - **Input**: INTERLEAVED `[L0, R0, L1, R1, ...]`
    /// - **Output**: INTERLEAVED, at the target rate
    ///
    /// The output is trimmed of the resampler's delay, so it starts at the
    /// same instant as the input and lasts as long.
    pub fn resample_interleaved(&self, interleaved_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved_samples.to_vec());
        }

        let channels = self.channels as usize;
        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                interleaved_samples
                    .chunks(channels)
                    .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();
        let input_frames = planar[0].len();
        let expected_frames = self.output_frames(input_frames);

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            channels,
        )
        .map_err(|e| GardenSonicError::AssetLoad(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut input_index = 0;

        // Keep feeding (zero padded past the end) until the delayed tail is out.
        while output[0].len() < delay + expected_frames {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = planar
                .iter()
                .map(|channel| {
                    let mut chunk = vec![0.0f32; needed];
                    if input_index < input_frames {
                        let end = (input_index + needed).min(input_frames);
                        chunk[..end - input_index].copy_from_slice(&channel[input_index..end]);
                    }
                    chunk
                })
                .collect();
            input_index += needed;

            let waves_out = resampler
                .process(&chunk, None)
                .map_err(|e| GardenSonicError::AssetLoad(format!("Resampling error: {}", e)))?;
            for (out, wave) in output.iter_mut().zip(waves_out) {
                out.extend_from_slice(&wave);
            }
        }

        let mut interleaved = Vec::with_capacity(expected_frames * channels);
        for frame in delay..delay + expected_frames {
            for channel in &output {
                interleaved.push(channel[frame]);
            }
        }
        Ok(interleaved)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Frames produced from `input_frames` frames: the exact ratio, rounded
    /// up. Integer math, so whole seconds map to whole seconds.
    pub fn output_frames(&self, input_frames: usize) -> usize {
        let source = self.source_sample_rate as u64;
        let target = self.target_sample_rate as u64;
        ((input_frames as u64 * target).div_ceil(source)) as usize
    }

    /// `> 1.0` means upsampling, `< 1.0` downsampling.
    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}
