//! Category buses and the master mute gate.
//!
//! ```text
//! effects ─┐
//! music  ──┼─> master -> destination
//! notify ──┘
//! ```
//!
//! Category volumes are perceptual loudness percentages; the master bus is a binary
//! gate driven only by [`Mixer::set_mute`].

use crate::graph::{GainNode, GraphHandle, NodeId, Output};

/// A category bus that playables route into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bus {
    Effects,
    Music,
    Notify,
}

/// Converts a loudness percentage (0..=100) to a linear gain multiplier.
///
/// Halving the loudness takes 10 dB off: 50% is -10 dB, 25% is -20 dB, 0% is silence.
pub fn loudness_to_gain(loudness: f32) -> f32 {
    let loudness = loudness.clamp(0.0, 100.0);
    if loudness == 0.0 {
        return 0.0;
    }
    let decibels = 10.0 * (loudness / 100.0).log10() / 2f32.log10();
    10f32.powf(decibels / 20.0)
}

pub struct Mixer {
    effects: GainNode,
    music: GainNode,
    notify: GainNode,
    master: GainNode,
    effects_volume: f32,
    music_volume: f32,
    notify_volume: f32,
    muted: bool,
}

impl Mixer {
    pub fn new(graph: &GraphHandle) -> Self {
        let master = graph.create_gain(Output::Destination, 1.0);
        let effects = graph.create_gain(master.output(), 1.0);
        let music = graph.create_gain(master.output(), 1.0);
        let notify = graph.create_gain(master.output(), 1.0);
        Self {
            effects,
            music,
            notify,
            master,
            effects_volume: 100.0,
            music_volume: 100.0,
            notify_volume: 100.0,
            muted: false,
        }
    }

    /// Where a playable on `bus` should send its signal.
    pub fn bus_output(&self, bus: Bus) -> Output {
        Output::Node(self.bus_node(bus))
    }

    pub fn bus_node(&self, bus: Bus) -> NodeId {
        match bus {
            Bus::Effects => self.effects.id(),
            Bus::Music => self.music.id(),
            Bus::Notify => self.notify.id(),
        }
    }

    pub fn master_node(&self) -> NodeId {
        self.master.id()
    }

    pub fn set_effects_volume(&mut self, loudness: f32) {
        self.effects_volume = loudness.clamp(0.0, 100.0);
        self.effects.set_value(loudness_to_gain(loudness));
    }

    pub fn set_music_volume(&mut self, loudness: f32) {
        self.music_volume = loudness.clamp(0.0, 100.0);
        self.music.set_value(loudness_to_gain(loudness));
    }

    pub fn set_notify_volume(&mut self, loudness: f32) {
        self.notify_volume = loudness.clamp(0.0, 100.0);
        self.notify.set_value(loudness_to_gain(loudness));
    }

    /// Gates the master bus. Category volumes are left untouched.
    pub fn set_mute(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        log::debug!("Master bus {}", if muted { "muted" } else { "unmuted" });
        self.muted = muted;
        self.master.set_value(if muted { 0.0 } else { 1.0 });
    }

    pub fn effects_volume(&self) -> f32 {
        self.effects_volume
    }

    pub fn music_volume(&self) -> f32 {
        self.music_volume
    }

    pub fn notify_volume(&self) -> f32 {
        self.notify_volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Linear gain currently applied on `bus`.
    pub fn bus_gain(&self, bus: Bus) -> f32 {
        let node = match bus {
            Bus::Effects => &self.effects,
            Bus::Music => &self.music,
            Bus::Notify => &self.notify,
        };
        node.param().value_at(0.0)
    }

    pub fn master_gain(&self) -> f32 {
        self.master.param().value_at(0.0)
    }
}
