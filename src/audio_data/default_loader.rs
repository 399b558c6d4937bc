use crate::{
    audio_data::{ConvertToMono, LoadOptions, SegmentData, SegmentLoader},
    error::{GardenSonicError, Result},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Segment loader backed by Symphonia.
///
/// Reads local files; the location of a segment is its path. Decoded audio
/// is converted to f32, optionally downmixed, and resampled to
/// [`LoadOptions::target_sample_rate`] when one is set.
///
/// ```ignore
/// use gardensonic::audio_data::{DefaultSegmentLoader, LoadOptions, SegmentLoader};
///
/// let intro = DefaultSegmentLoader.load("assets/vib_2_3_p_1_intro.mp3", &LoadOptions::default())?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSegmentLoader;

impl SegmentLoader for DefaultSegmentLoader {
    fn load(&self, location: &str, options: &LoadOptions) -> Result<SegmentData> {
        let file = File::open(location).map_err(|e| {
            GardenSonicError::AssetLoad(format!("Failed to open {}: {}", location, e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(location).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                GardenSonicError::AssetLoad(format!("Failed to probe {}: {:?}", location, e))
            })?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            GardenSonicError::AudioFormat(format!("No default audio track in {}", location))
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| GardenSonicError::AudioFormat("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| GardenSonicError::AudioFormat("Channel count not found".to_string()))?
            .count() as u16;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                GardenSonicError::AudioFormat(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(e) => {
                    return Err(GardenSonicError::AssetLoad(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(e)) => {
                    log::debug!("Skipping corrupt packet in {}: {}", location, e);
                    continue;
                }
                Err(e) => {
                    return Err(GardenSonicError::AssetLoad(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        let mut data = SegmentData::from_samples(samples, sample_rate, channels)?;
        if options.convert_to_mono == ConvertToMono::ForceMono {
            data = data.to_mono()?;
        }
        if let Some(rate) = options.target_sample_rate {
            data = data.resample(rate)?;
        }

        log::debug!(
            "Loaded {} ({:.2}s, {} Hz, {} ch)",
            location,
            data.duration().as_secs_f64(),
            data.sample_rate(),
            data.channels()
        );
        Ok(data)
    }
}
