use crate::audio_data::PcmBuffer;
use crate::error::{Result, StemflowError};
use std::io::Cursor;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Second half of the asset pipeline: encoded bytes to PCM.
///
/// Implementations run on loader threads and must not touch playback state.
pub trait AssetDecoder: Send + Sync {
    /// Decodes `bytes` fetched from `url`. The URL is only a format hint.
    fn decode(&self, url: &str, bytes: Vec<u8>) -> Result<PcmBuffer>;
}

/// Default decoder built on Symphonia (WAV, MP3, FLAC, OGG/Vorbis, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AssetDecoder for SymphoniaDecoder {
    fn decode(&self, url: &str, bytes: Vec<u8>) -> Result<PcmBuffer> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
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
                StemflowError::AudioLoading(format!("Failed to probe audio format: {:?}", e))
            })?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            StemflowError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| StemflowError::AudioLoading("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| StemflowError::AudioLoading("Channel count not found".to_string()))?
            .count() as u16;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                StemflowError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-stream
                Err(e) => {
                    return Err(StemflowError::AudioLoading(format!(
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
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => {
                    return Err(StemflowError::AudioLoading(format!(
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

        log::debug!(
            "Decoded {}: {} frames, {} Hz, {} channel(s)",
            url,
            samples.len() / channels.max(1) as usize,
            sample_rate,
            channels
        );

        PcmBuffer::new(samples, sample_rate, channels)
    }
}
