use crate::asset::{AssetLoader, AssetStatus, AudioAsset};
use crate::graph::{GainNode, GraphHandle, NodeId, Output, PannerNode};
use crate::playback::{PendingPlay, PlayOffset, Playable};
use std::time::Duration;

/// One-shot sound: `source -> panner -> volume gain -> bus`.
pub struct Effect {
    id: String,
    graph: GraphHandle,
    asset: AudioAsset,
    generation: u64,
    source: Option<NodeId>,
    ends_at: Option<f64>,
    pending: Option<PendingPlay>,
    panner: PannerNode,
    volume: GainNode,
}

impl Effect {
    /// Creates the effect and starts loading its asset.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        graph: &GraphHandle,
        loader: AssetLoader,
        output: Output,
    ) -> Self {
        let volume = graph.create_gain(output, 0.5);
        let panner = graph.create_panner(volume.output());
        let mut asset = AudioAsset::new(url, loader);
        asset.load();

        Self {
            id: id.into(),
            graph: graph.clone(),
            asset,
            generation: 0,
            source: None,
            ends_at: None,
            pending: None,
            panner,
            volume,
        }
    }

    pub fn asset_status(&self) -> AssetStatus {
        self.asset.status()
    }

    /// 0..=100, applied immediately.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume.set_value(volume.clamp(0.0, 100.0) / 100.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume.value_at(self.graph.now()) * 100.0
    }

    /// -100 (left) ..= 100 (right).
    pub fn set_pan(&mut self, pan: f32) {
        self.panner.set_pan(pan / 100.0);
    }

    pub fn pan(&self) -> f32 {
        self.panner.pan() * 100.0
    }

    pub fn wait_for_load(&mut self, timeout: Duration) -> AssetStatus {
        if let Some(status) = self.asset.wait(timeout) {
            self.on_asset_settled(status);
        }
        self.asset.status()
    }

    pub fn unload(&mut self) {
        self.asset.unload();
    }

    fn play_at(&mut self, now: f64, delay: f64, offset: PlayOffset) -> bool {
        self.generation += 1;
        if self.is_playing() {
            return true;
        }

        let Some(buffer) = self.asset.buffer().cloned() else {
            if self.asset.load() == AssetStatus::Loading {
                self.pending = Some(PendingPlay {
                    generation: self.generation,
                    delay,
                    offset,
                });
            }
            return false;
        };

        let when = now + delay.max(0.0);
        let offset = match offset {
            PlayOffset::Seconds(seconds) => seconds.clamp(0.0, buffer.duration_secs()),
            PlayOffset::RandomInLoop => 0.0,
        };
        let duration = buffer.duration_secs();
        let source = self
            .graph
            .start_source(buffer, self.panner.id(), when, offset, None);

        log::trace!("Effect {} playing at {:.3}s", self.id, when);
        self.source = Some(source);
        self.ends_at = Some(when + (duration - offset));
        self.pending = None;
        true
    }

    fn on_asset_settled(&mut self, status: AssetStatus) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if status == AssetStatus::Ready && pending.generation == self.generation {
            let now = self.graph.now();
            self.play_at(now, pending.delay, pending.offset);
        }
    }
}

impl Playable for Effect {
    fn id(&self) -> &str {
        &self.id
    }

    fn play(&mut self, delay: f64, offset: PlayOffset) -> bool {
        let now = self.graph.now();
        self.play_at(now, delay, offset)
    }

    fn stop(&mut self, delay: f64) -> bool {
        self.generation += 1;
        if let Some(source) = self.source.take() {
            self.graph.stop_source(source, self.graph.now() + delay.max(0.0));
        }
        self.ends_at = None;
        true
    }

    fn is_playing(&self) -> bool {
        self.source.is_some() && self.ends_at.is_some_and(|end| self.graph.now() < end)
    }

    fn update(&mut self) {
        if let Some(status) = self.asset.poll() {
            self.on_asset_settled(status);
        }
        if self.source.is_some() && !self.is_playing() {
            self.source = None;
            self.ends_at = None;
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            self.graph.stop_source(source, self.graph.now());
        }
    }
}
