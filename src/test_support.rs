//! Shared fixtures for unit tests.

use crate::audio_data::AssetFetcher;
use crate::clock::ManualClock;
use crate::config::EngineDesc;
use crate::error::{Result, StemflowError};
use crate::graph::GraphCommand;
use crate::manager::SoundManager;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);
pub const TEST_RATE: u32 = 8000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Mono 16-bit WAV of constant `amplitude`.
pub fn wav_bytes(sample_rate: u32, seconds: f64, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (seconds * sample_rate as f64).round() as usize;
        let sample = (amplitude * i16::MAX as f32) as i16;
        for _ in 0..frames {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// In-memory fetcher that counts requests per URL. Unknown URLs fail.
#[derive(Default)]
pub struct MemoryFetcher {
    assets: HashMap<String, Vec<u8>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(url.to_string(), bytes);
        self
    }

    pub fn requests(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        *self
            .requests
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| StemflowError::Fetch(format!("404 {}", url)))
    }
}

/// A manager on a manual clock, with its command channel exposed.
pub struct Harness {
    pub manager: SoundManager,
    pub clock: Arc<ManualClock>,
    pub commands: Receiver<GraphCommand>,
}

impl Harness {
    pub fn new(fetcher: MemoryFetcher) -> Self {
        init_logger();
        let clock = Arc::new(ManualClock::new());
        let desc = EngineDesc {
            sample_rate: TEST_RATE,
            ..Default::default()
        };
        let manager = SoundManager::with_clock(desc, Arc::new(fetcher), clock.clone());
        let commands = manager.command_receiver().clone();
        Self {
            manager,
            clock,
            commands,
        }
    }

    /// Drains and returns every command sent so far.
    pub fn drain(&self) -> Vec<GraphCommand> {
        self.commands.try_iter().collect()
    }
}

pub fn starts(commands: &[GraphCommand]) -> Vec<&GraphCommand> {
    commands
        .iter()
        .filter(|c| matches!(c, GraphCommand::StartSource { .. }))
        .collect()
}

pub fn stops(commands: &[GraphCommand]) -> Vec<&GraphCommand> {
    commands
        .iter()
        .filter(|c| matches!(c, GraphCommand::StopSource { .. }))
        .collect()
}
