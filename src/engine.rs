use crate::config::EngineDesc;
use crate::error::{Result, StemflowError};
use crate::render::GraphRenderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Output engine that pulls blocks from a [`GraphRenderer`] on the device thread.
///
/// The renderer advances the clock the control side schedules against, so nothing
/// scheduled on a [`SoundManager`](crate::SoundManager) moves until the engine runs.
pub struct SoundEngine {
    desc: EngineDesc,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    renderer: Arc<Mutex<GraphRenderer>>,
}

impl SoundEngine {
    pub fn new(desc: EngineDesc, renderer: GraphRenderer) -> Self {
        Self {
            desc,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            renderer: Arc::new(Mutex::new(renderer)),
        }
    }

    /// Opens the default output device and starts rendering.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            StemflowError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            StemflowError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            other => {
                return Err(StemflowError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            StemflowError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Sound engine started ({} Hz, {} channels, {} frames per block)",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.block_size
        );

        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Sound engine stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames rendered since the engine was created.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let renderer = self.renderer.clone();
        let mut block = vec![0.0f32; self.desc.block_size * self.desc.channels as usize];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(T::from_sample(0.0f32));
                        return;
                    }

                    block.resize(data.len(), 0.0);
                    // Never block the device thread; a contended block plays as silence.
                    let frames = match renderer.try_lock() {
                        Ok(mut renderer) => renderer.render(&mut block),
                        Err(_) => {
                            block.fill(0.0);
                            0
                        }
                    };

                    for (sample, &value) in data.iter_mut().zip(block.iter()) {
                        *sample = T::from_sample(value);
                    }
                    frames_processed.fetch_add(frames, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| StemflowError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
