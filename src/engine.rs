use crate::config::GardenSonicWorldDesc;
use crate::error::{GardenSonicError, Result};
use crate::events::GardenSonicEvent;
use crate::mixer::Mixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Renders one block from `mixer` into `out`.
///
/// Never blocks: if the mixer is held elsewhere the block is silent and 0
/// frames are reported.
pub fn fill_from_mixer(mixer: &Mutex<Mixer>, out: &mut [f32]) -> usize {
    match mixer.try_lock() {
        Ok(mut mixer) => mixer.render(out),
        Err(_) => {
            out.fill(0.0);
            0
        }
    }
}

/// Fills a device buffer of any length through the fixed `block` scratch,
/// one block-sized chunk at a time. Returns the frames rendered.
pub fn fill_device_buffer<T>(
    mixer: &Mutex<Mixer>,
    block: &mut [f32],
    channels: u16,
    data: &mut [T],
) -> usize
where
    T: SizedSample + FromSample<f32>,
{
    let channels = channels.max(1) as usize;
    let chunk = (block.len() / channels).max(1) * channels;
    if block.len() < chunk {
        // A block shorter than one frame cannot carry audio.
        data.fill(T::from_sample(0.0f32));
        return 0;
    }

    let mut frames = 0;
    for out in data.chunks_mut(chunk) {
        let scratch = &mut block[..out.len()];
        frames += fill_from_mixer(mixer, scratch);
        for (sample, value) in out.iter_mut().zip(scratch.iter()) {
            *sample = T::from_sample(*value);
        }
    }
    frames
}

/// Drives the output device from the world's mixer.
pub struct GardenSonicEngine {
    desc: GardenSonicWorldDesc,
    mixer: Arc<Mutex<Mixer>>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    events: Option<Sender<GardenSonicEvent>>,
}

impl GardenSonicEngine {
    /// Wraps `mixer` for output. Fails if its format differs from the world's.
    pub fn new(desc: GardenSonicWorldDesc, mut mixer: Mixer) -> Result<Self> {
        if mixer.sample_rate() != desc.sample_rate || mixer.channels() != desc.channels {
            return Err(GardenSonicError::Configuration(format!(
                "mixer runs at {} Hz x {}, world at {} Hz x {}",
                mixer.sample_rate(),
                mixer.channels(),
                desc.sample_rate,
                desc.channels
            )));
        }
        mixer.reserve(desc.block_size * desc.channels as usize);
        Ok(Self {
            desc,
            mixer: Arc::new(Mutex::new(mixer)),
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            events: None,
        })
    }

    /// Reports engine lifecycle and stream errors to `sender`.
    pub fn with_events(mut self, sender: Sender<GardenSonicEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Shared mixer, for rendering without a device.
    pub fn mixer(&self) -> Arc<Mutex<Mixer>> {
        self.mixer.clone()
    }

    /// Opens the default output device and starts rendering.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            GardenSonicError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            GardenSonicError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            format => {
                return Err(GardenSonicError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    format
                )));
            }
        };

        stream.play().map_err(|e| {
            GardenSonicError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Engine started: {} Hz, {} channels, {} frame blocks",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.block_size
        );
        self.emit(GardenSonicEvent::EngineStarted);

        Ok(())
    }

    /// Closes the stream. Does nothing if it is not running.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Engine stopped");
            self.emit(GardenSonicEvent::EngineStopped);
        }
        Ok(())
    }

    /// True between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames rendered from the mixer since the engine was created.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// The world description the stream was opened with.
    pub fn config(&self) -> &GardenSonicWorldDesc {
        &self.desc
    }

    fn emit(&self, event: GardenSonicEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mixer = self.mixer.clone();
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let errors = self.events.clone();
        let channels = self.desc.channels;
        let mut block = vec![0.0f32; self.desc.block_size * channels as usize];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    // The device may ask for more than one block.
                    let frames = fill_device_buffer(&mixer, &mut block, channels, data);
                    frames_processed.fetch_add(frames, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    if let Some(sender) = &errors {
                        let _ = sender.send(GardenSonicEvent::EngineError {
                            error: err.to_string(),
                        });
                    }
                },
                None,
            )
            .map_err(|e| GardenSonicError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

impl Drop for GardenSonicEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
