//! Configuration types: engine descriptor, sound definitions and music state-machine
//! tables.

mod engine_desc;
mod music_config;
mod sound_config;

pub use engine_desc::EngineDesc;
pub use music_config::{MusicConfig, StateConfig, StreamConfig, parse_stream_ref};
pub use sound_config::{SoundConfig, SoundKind};
