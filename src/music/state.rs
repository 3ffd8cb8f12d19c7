use crate::config::StateConfig;
use crate::error::Result;
use serde::Deserialize;
use std::collections::HashSet;

/// What a state does to its streams while the state machine is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseBehavior {
    /// Stop the streams; on resume they restart at a random point in their loop.
    Cut,
    /// Pause in place and resume where they left off.
    #[default]
    #[serde(alias = "lowpass")]
    Pause,
}

/// One state of a [`MusicStateMachine`](super::MusicStateMachine): the streams that
/// play in it, at which volume, and the triggers and edges that lead here.
#[derive(Debug, Clone)]
pub struct MsmState {
    pub id: String,
    pub triggers: HashSet<String>,
    pub stream_ids: Vec<String>,
    /// Aligned with `stream_ids`, 0..=100.
    pub stream_volumes: Vec<u8>,
    /// Checked in list order.
    pub allowed_next: Vec<String>,
    pub pause: PauseBehavior,
    pub disable_in_replay: bool,
}

impl MsmState {
    pub fn from_config(id: &str, config: &StateConfig) -> Result<Self> {
        let (stream_ids, stream_volumes) = config.stream_refs()?.into_iter().unzip();
        Ok(Self {
            id: id.to_string(),
            triggers: config.triggers.iter().cloned().collect(),
            stream_ids,
            stream_volumes,
            allowed_next: config.allowed_next.clone(),
            pause: config.pause,
            disable_in_replay: config.disable_in_replay,
        })
    }

    pub fn responds_to(&self, event: &str) -> bool {
        self.triggers.contains(event)
    }

    pub fn has_stream(&self, stream_id: &str) -> bool {
        self.stream_ids.iter().any(|id| id == stream_id)
    }

    /// `(stream id, volume)` pairs.
    pub fn streams(&self) -> impl Iterator<Item = (&str, u8)> {
        self.stream_ids
            .iter()
            .map(String::as_str)
            .zip(self.stream_volumes.iter().copied())
    }
}
