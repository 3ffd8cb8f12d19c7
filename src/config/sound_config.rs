use serde::Deserialize;

/// Which bus a sound is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundKind {
    /// Sound effects, routed to the effects bus
    #[default]
    Sound,
    /// Notifications, routed to their own bus
    Notify,
    /// Music, routed to the music bus
    Music,
}

/// Definition of a single effect or loop stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundConfig {
    pub id: String,
    pub url: String,
    /// 0..=100
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// -100 (left) ..= 100 (right)
    #[serde(default)]
    pub pan: f32,
    #[serde(default, alias = "loopstart")]
    pub loop_start: Option<f64>,
    #[serde(default, alias = "loopend")]
    pub loop_end: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: SoundKind,
}

fn default_volume() -> f32 {
    50.0
}

impl SoundConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            volume: default_volume(),
            pan: 0.0,
            loop_start: None,
            loop_end: None,
            kind: SoundKind::Sound,
        }
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn loop_points(mut self, start: f64, end: f64) -> Self {
        self.loop_start = Some(start);
        self.loop_end = Some(end);
        self
    }

    pub fn kind(mut self, kind: SoundKind) -> Self {
        self.kind = kind;
        self
    }
}
