//! Decoded audio and the fetch/decode primitives that produce it.
//!
//! Asset delivery is a two-step primitive: an [`AssetFetcher`] turns a URL into encoded
//! bytes, and an [`AssetDecoder`] turns those bytes into a [`PcmBuffer`]. Both run on a
//! loader thread (see [`crate::asset`]); neither holds playback state.

mod decoder;
mod fetcher;
mod resampler;

use crate::error::{Result, StemflowError};
pub use decoder::{AssetDecoder, SymphoniaDecoder};
pub use fetcher::{AssetFetcher, FileFetcher, HttpFetcher};
pub use resampler::BatchResampler;
use std::time::Duration;

/// Immutable decoded PCM audio.
///
/// # Data Format
/// Samples are stored **INTERLEAVED**: stereo is `[L0, R0, L1, R1, ...]`, mono is
/// `[M0, M1, ...]`. Total length is `total_frames * channels`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(StemflowError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(StemflowError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        let total_frames = samples.len() / channels as usize;
        Ok(Self {
            samples,
            sample_rate,
            channels,
            total_frames,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.total_frames == 0
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Returns frame `index` as a stereo pair. Mono is duplicated, extra channels beyond
    /// the first two are ignored.
    pub fn stereo_frame(&self, index: usize) -> (f32, f32) {
        if index >= self.total_frames {
            return (0.0, 0.0);
        }
        let base = index * self.channels as usize;
        match self.channels {
            1 => (self.samples[base], self.samples[base]),
            _ => (self.samples[base], self.samples[base + 1]),
        }
    }

    /// Resample to a different sample rate using rubato, returns a new buffer.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let resampler = BatchResampler::new(
            self.sample_rate,
            target_sample_rate,
            self.channels,
            Some(1024),
        )?;
        let resampled = resampler.resample_interleaved(&self.samples)?;
        Self::new(resampled, target_sample_rate, self.channels)
    }
}
