//! Top-level factory and owner of the mixer.
//!
//! One `SoundManager` per session. It owns the control end of the audio graph, the
//! shared asset loader and the [`Mixer`], and binds everything it creates to the
//! right bus.

use crate::asset::AssetLoader;
use crate::audio_data::AssetFetcher;
use crate::clock::{AudioClock, FrameClock};
use crate::config::{EngineDesc, MusicConfig, SoundConfig, SoundKind};
use crate::error::{Result, StemflowError};
use crate::graph::{GraphCommand, GraphHandle};
use crate::mixer::{Bus, Mixer};
use crate::music::MusicStateMachine;
use crate::playback::{Effect, LoopStream, LoopWindow, PlayOffset, Playable};
use crate::render::GraphRenderer;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SoundManager {
    desc: EngineDesc,
    graph: GraphHandle,
    commands: Receiver<GraphCommand>,
    frame_clock: Option<Arc<FrameClock>>,
    renderer_taken: bool,
    loader: AssetLoader,
    effect_cache: HashMap<String, Effect>,
    mixer: Mixer,
}

impl SoundManager {
    /// Creates a manager whose clock is driven by the renderer returned from
    /// [`renderer`](Self::renderer).
    pub fn new(desc: EngineDesc, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let clock = Arc::new(FrameClock::new(desc.sample_rate));
        let mut manager = Self::with_clock(desc, fetcher, clock.clone());
        manager.frame_clock = Some(clock);
        manager
    }

    /// Creates a manager scheduled against an external clock. No renderer can be
    /// attached; the host consumes [`command_receiver`](Self::command_receiver) itself.
    pub fn with_clock(
        desc: EngineDesc,
        fetcher: Arc<dyn AssetFetcher>,
        clock: Arc<dyn AudioClock>,
    ) -> Self {
        let (graph, commands) = GraphHandle::new(clock, desc.sample_rate);
        let loader = AssetLoader::new(fetcher, desc.sample_rate);
        let mixer = Mixer::new(&graph);
        log::debug!(
            "Sound manager created ({} Hz, {} channels)",
            desc.sample_rate,
            desc.channels
        );

        Self {
            desc,
            graph,
            commands,
            frame_clock: None,
            renderer_taken: false,
            loader,
            effect_cache: HashMap::new(),
            mixer,
        }
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn command_receiver(&self) -> &Receiver<GraphCommand> {
        &self.commands
    }

    /// Current audio clock time in seconds.
    pub fn now(&self) -> f64 {
        self.graph.now()
    }

    /// Hands out the renderer that consumes this manager's graph commands and drives
    /// its clock. Only one renderer can exist per manager.
    pub fn renderer(&mut self) -> Result<GraphRenderer> {
        let clock = self.frame_clock.clone().ok_or_else(|| {
            StemflowError::Engine("manager runs on an external clock".into())
        })?;
        if self.renderer_taken {
            return Err(StemflowError::Engine("renderer already taken".into()));
        }
        self.renderer_taken = true;
        Ok(GraphRenderer::new(
            self.commands.clone(),
            clock,
            self.desc.channels,
        ))
    }

    /// Creates a one-shot effect. `Sound` goes to the effects bus, `Notify` to the
    /// notification bus.
    pub fn create_effect(&self, config: SoundConfig) -> Result<Effect> {
        let bus = match config.kind {
            SoundKind::Sound => Bus::Effects,
            SoundKind::Notify => Bus::Notify,
            SoundKind::Music => {
                return Err(StemflowError::Configuration(format!(
                    "'{}' is music, not an effect",
                    config.id
                )));
            }
        };
        let mut effect = Effect::new(
            config.id,
            config.url,
            &self.graph,
            self.loader.clone(),
            self.mixer.bus_output(bus),
        );
        effect.set_volume(config.volume);
        effect.set_pan(config.pan);
        Ok(effect)
    }

    /// Creates a standalone loop stream on the music bus (notification bus for
    /// `Notify` sounds).
    pub fn create_loop_stream(&self, config: SoundConfig) -> Result<LoopStream> {
        let window = LoopWindow::from_points(
            config.loop_start.unwrap_or(0.0),
            config.loop_end.unwrap_or(0.0),
        )?;
        let bus = match config.kind {
            SoundKind::Notify => Bus::Notify,
            SoundKind::Sound | SoundKind::Music => Bus::Music,
        };
        Ok(LoopStream::new(
            config.id,
            config.url,
            &self.graph,
            self.loader.clone(),
            self.mixer.bus_output(bus),
        )
        .with_loop(window)
        .with_volume(config.volume))
    }

    /// Creates a loop stream on the music bus from an already-built loop window.
    pub fn create_loop_stream_with(
        &self,
        id: &str,
        url: &str,
        loop_window: Option<LoopWindow>,
    ) -> LoopStream {
        LoopStream::new(
            id,
            url,
            &self.graph,
            self.loader.clone(),
            self.mixer.bus_output(Bus::Music),
        )
        .with_loop(loop_window)
    }

    /// Validates `config` and builds a state machine on the music bus.
    pub fn create_music_state_machine(&self, config: &MusicConfig) -> Result<MusicStateMachine> {
        if let Some(kind) = config.kind.filter(|kind| *kind != SoundKind::Music) {
            return Err(StemflowError::Configuration(format!(
                "'{}' is a {:?} config, not music",
                config.id, kind
            )));
        }
        MusicStateMachine::new(
            config,
            &self.graph,
            self.loader.clone(),
            self.mixer.bus_output(Bus::Music),
        )
    }

    /// Plays the effect at `url`, creating and caching it on first use. Does nothing
    /// while muted or with the effects bus at zero.
    pub fn play_effect(&mut self, url: &str) -> bool {
        if self.mixer.is_muted() || self.mixer.effects_volume() <= 0.0 {
            return false;
        }
        let output = self.mixer.bus_output(Bus::Effects);
        let effect = self.effect_cache.entry(url.to_string()).or_insert_with(|| {
            let mut effect = Effect::new(url, url, &self.graph, self.loader.clone(), output);
            effect.set_volume(100.0);
            effect
        });
        effect.play(0.0, PlayOffset::default())
    }

    /// The cached effect for `url`, if [`play_effect`](Self::play_effect) created one.
    pub fn cached_effect_mut(&mut self, url: &str) -> Option<&mut Effect> {
        self.effect_cache.get_mut(url)
    }

    /// Pumps load completions and natural-end detection for cached effects.
    pub fn update(&mut self) {
        for effect in self.effect_cache.values_mut() {
            effect.update();
        }
    }

    /// Drops every cached effect, stopping any that still play.
    pub fn clear_effect_cache(&mut self) {
        self.effect_cache.clear();
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn set_effects_volume(&mut self, loudness: f32) {
        self.mixer.set_effects_volume(loudness);
    }

    pub fn set_music_volume(&mut self, loudness: f32) {
        self.mixer.set_music_volume(loudness);
    }

    pub fn set_notify_volume(&mut self, loudness: f32) {
        self.mixer.set_notify_volume(loudness);
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.mixer.set_mute(muted);
    }
}
