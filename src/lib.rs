//! Dynamic music and sound engine.
//!
//! A [`SoundManager`] loads audio assets in the background, hands out one-shot
//! [`Effect`]s and looping [`LoopStream`]s, and builds [`MusicStateMachine`]s that
//! crossfade between stems when game events arrive. Everything routes through the
//! four-bus [`Mixer`]. Scheduling happens against an audio clock; the samples are
//! produced by a [`GraphRenderer`], usually driven by a [`SoundEngine`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use stemflow::{EngineDesc, FileFetcher, MusicConfig, SoundEngine, SoundManager};
//!
//! # fn main() -> stemflow::Result<()> {
//! let desc = EngineDesc::default();
//! let mut manager = SoundManager::new(desc.clone(), Arc::new(FileFetcher::new("assets")));
//! let mut engine = SoundEngine::new(desc, manager.renderer()?);
//! engine.start()?;
//!
//! let config = MusicConfig::from_json(&std::fs::read_to_string("battle.json")?)?;
//! let mut music = manager.create_music_state_machine(&config)?;
//! music.play();
//! loop {
//!     music.update();
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod audio_data;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod manager;
pub mod mixer;
pub mod music;
pub mod playback;
pub mod render;

#[cfg(test)]
mod test_support;

pub use asset::{AssetLoader, AssetStatus, AudioAsset};
pub use audio_data::{AssetFetcher, FileFetcher, HttpFetcher, PcmBuffer};
pub use clock::{AudioClock, FrameClock, ManualClock};
pub use config::{EngineDesc, MusicConfig, SoundConfig, SoundKind};
pub use engine::SoundEngine;
pub use error::{Result, StemflowError};
pub use manager::SoundManager;
pub use mixer::{Bus, Mixer, loudness_to_gain};
pub use music::{MsmState, MusicStateMachine, PauseBehavior};
pub use playback::{
    Effect, LoopStream, LoopWindow, PlayOffset, PlayState, Playable, TransitionPolicy,
};
pub use render::GraphRenderer;
