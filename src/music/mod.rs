//! Music state machine: crossfade choreography between looping stems.
//!
//! A transition partitions the streams of the current and next state into
//! exiting, continuing and entering sets. Exiting streams transition out according
//! to their policy, continuing streams crossfade to their new volume over
//! [`CROSSFADE_SECS`] right away, and entering streams start once the slowest
//! exiting stream is silent. All of it is scheduled against a single clock
//! snapshot taken when the event arrives.

mod state;

pub use state::{MsmState, PauseBehavior};

use crate::asset::{AssetLoader, AssetStatus};
use crate::config::MusicConfig;
use crate::error::Result;
use crate::graph::{GainNode, GraphHandle, Output};
use crate::playback::{LoopStream, PlayOffset, PlayState, Playable};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Volume ramp length for streams shared by two consecutive states.
pub const CROSSFADE_SECS: f64 = 2.0;

/// Event fired by [`MusicStateMachine::play`].
pub const START_EVENT: &str = "start";

pub struct MusicStateMachine {
    id: String,
    graph: GraphHandle,
    states: Vec<MsmState>,
    state_index: HashMap<String, usize>,
    streams: HashMap<String, LoopStream>,
    active: Option<usize>,
    paused: bool,
    replay_mode: bool,
    // Declared last so the streams release their nodes before the node they feed.
    output: GainNode,
}

impl MusicStateMachine {
    /// Validates `config`, then creates every stream (which starts loading its audio).
    pub fn new(
        config: &MusicConfig,
        graph: &GraphHandle,
        loader: AssetLoader,
        output: Output,
    ) -> Result<Self> {
        config.validate()?;

        let output = graph.create_gain(output, 1.0);
        let base = config.url.as_deref();

        let mut streams = HashMap::with_capacity(config.streams.len());
        for (id, stream) in &config.streams {
            let url = stream.resolved_url(id, base)?;
            let loop_stream = LoopStream::new(id.clone(), url, graph, loader.clone(), output.output())
                .with_loop(stream.loop_window()?)
                .with_transition(stream.transition_policy)
                .with_beat(
                    stream.beat.unwrap_or(0.0),
                    stream.beat_offset.unwrap_or(0.0),
                );
            streams.insert(id.clone(), loop_stream);
        }

        let states = config
            .states
            .iter()
            .map(|(id, state)| MsmState::from_config(id, state))
            .collect::<Result<Vec<_>>>()?;
        let state_index = states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.id.clone(), i))
            .collect();

        log::debug!(
            "Music state machine '{}' created: {} streams, {} states",
            config.id,
            streams.len(),
            states.len()
        );

        Ok(Self {
            id: config.id.clone(),
            graph: graph.clone(),
            states,
            state_index,
            streams,
            active: None,
            paused: false,
            replay_mode: false,
            output,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_state(&self) -> Option<&str> {
        self.active.map(|i| self.states[i].id.as_str())
    }

    pub fn state(&self, id: &str) -> Option<&MsmState> {
        self.state_index.get(id).map(|&i| &self.states[i])
    }

    pub fn stream(&self, id: &str) -> Option<&LoopStream> {
        self.streams.get(id)
    }

    pub fn stream_mut(&mut self, id: &str) -> Option<&mut LoopStream> {
        self.streams.get_mut(id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn replay_mode(&self) -> bool {
        self.replay_mode
    }

    /// While on, states flagged `disableInReplay` cannot be entered.
    pub fn set_replay_mode(&mut self, replay_mode: bool) {
        self.replay_mode = replay_mode;
    }

    /// Routes a trigger event. Returns `true` if it caused a state change.
    ///
    /// Unknown or unreachable triggers, and triggers that resolve to the active
    /// state, change nothing.
    pub fn handle_event(&mut self, event: &str) -> bool {
        if self.paused {
            log::debug!("Music '{}' is paused, ignoring event '{}'", self.id, event);
            return false;
        }

        let now = self.graph.now();
        let Some(next) = self.find_next(event) else {
            log::debug!(
                "Music '{}': no transition for event '{}' from {:?}",
                self.id,
                event,
                self.active_state()
            );
            return false;
        };
        if self.active == Some(next) {
            return false;
        }

        let next_state = &self.states[next];
        let current = self.active.map(|i| &self.states[i]);

        let mut latest_exit: f64 = 0.0;
        if let Some(current) = current {
            for stream_id in current.stream_ids.iter().filter(|id| !next_state.has_stream(id)) {
                if let Some(stream) = self.streams.get_mut(stream_id) {
                    latest_exit = latest_exit.max(stream.transition_out_at(now));
                }
            }
        }

        for (stream_id, volume) in next_state.streams() {
            let Some(stream) = self.streams.get_mut(stream_id) else {
                continue;
            };
            if current.is_some_and(|current| current.has_stream(stream_id)) {
                stream.set_volume_at(now, volume as f32, CROSSFADE_SECS);
            } else {
                stream.set_volume_immediate_at(now, volume as f32);
                stream.play_at(now, latest_exit, PlayOffset::default());
            }
        }

        log::info!(
            "Music '{}': {} -> {} on '{}' (entries delayed {:.3}s)",
            self.id,
            current.map_or("none", |s| s.id.as_str()),
            next_state.id,
            event,
            latest_exit
        );
        self.active = Some(next);
        true
    }

    fn find_next(&self, event: &str) -> Option<usize> {
        let eligible = |&i: &usize| {
            let state = &self.states[i];
            !(self.replay_mode && state.disable_in_replay) && state.responds_to(event)
        };
        match self.active {
            None => (0..self.states.len()).find(eligible),
            Some(active) => self.states[active]
                .allowed_next
                .iter()
                .filter_map(|id| self.state_index.get(id).copied())
                .find(eligible),
        }
    }

    /// Fires the `"start"` event.
    pub fn play(&mut self) -> bool {
        self.handle_event(START_EVENT)
    }

    /// Stops every stream after `delay` seconds and forgets the active state.
    pub fn stop(&mut self, delay: f64) -> bool {
        let now = self.graph.now();
        for stream in self.streams.values_mut() {
            stream.stop_at(now, delay);
        }
        if let Some(active) = self.active.take() {
            log::info!("Music '{}' stopped in state {}", self.id, self.states[active].id);
        }
        self.paused = false;
        true
    }

    pub fn is_playing(&self) -> bool {
        self.streams.values().any(|s| s.is_playing())
    }

    /// Overall level of the machine, 0..=100, applied after every stream volume.
    pub fn set_volume(&mut self, volume: f32) {
        self.output.set_value(volume.clamp(0.0, 100.0) / 100.0);
    }

    pub fn volume(&self) -> f32 {
        self.output.value_at(self.graph.now()) * 100.0
    }

    /// Pauses (or cuts, per the active state's pause behaviour) the active streams.
    pub fn pause(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        if self.paused {
            return false;
        }
        let state = &self.states[active];
        for stream_id in &state.stream_ids {
            let Some(stream) = self.streams.get_mut(stream_id) else {
                continue;
            };
            match state.pause {
                PauseBehavior::Pause => {
                    stream.pause();
                }
                PauseBehavior::Cut => {
                    stream.stop(0.0);
                }
            }
        }
        log::debug!("Music '{}' paused ({:?})", self.id, state.pause);
        self.paused = true;
        true
    }

    pub fn resume(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        if !self.paused {
            return false;
        }
        let state = &self.states[active];
        for stream_id in &state.stream_ids {
            let Some(stream) = self.streams.get_mut(stream_id) else {
                continue;
            };
            match stream.state() {
                PlayState::Paused => {
                    stream.resume();
                }
                PlayState::Stopped => {
                    stream.play(0.0, PlayOffset::RandomInLoop);
                }
                PlayState::Playing => {}
            }
        }
        log::debug!("Music '{}' resumed", self.id);
        self.paused = false;
        true
    }

    /// Pumps load completions and natural-end detection for every stream.
    pub fn update(&mut self) {
        for stream in self.streams.values_mut() {
            stream.update();
        }
    }

    /// Blocks until every stream's asset has settled or `timeout` elapses. Returns
    /// `true` if all of them loaded.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut all_ready = true;
        for stream in self.streams.values_mut() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            all_ready &= stream.wait_for_load(remaining) == AssetStatus::Ready;
        }
        all_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphCommand;
    use crate::graph::param::ParamEvent;
    use crate::playback::{FADE_OUT_GUARD_SECS, FADE_OUT_SECS};
    use crate::test_support::{Harness, MemoryFetcher, TEST_RATE, WAIT, starts, wav_bytes};

    const BATTLE: &str = r#"{
        "id": "battle",
        "streams": {
            "main": { "url": "main.wav", "loop": [1.0, 7.0], "trans": "fade-out" },
            "win":  { "url": "win.wav", "trans": "cut" },
            "tie":  { "url": "tie.wav" }
        },
        "states": {
            "main": { "triggers": ["start"], "streams": ["main@100"], "next": ["win", "tie"] },
            "win":  { "triggers": ["win"], "streams": ["win@80"], "next": [] },
            "tie":  { "triggers": ["tie"], "streams": ["tie@80"], "next": [] }
        }
    }"#;

    fn fetcher() -> MemoryFetcher {
        let mut fetcher = MemoryFetcher::new();
        for url in ["main.wav", "win.wav", "tie.wav", "bed.wav", "lead.wav", "hi.wav"] {
            fetcher = fetcher.with(url, wav_bytes(TEST_RATE, 8.0, 0.25));
        }
        fetcher
    }

    fn machine(h: &Harness, json: &str) -> MusicStateMachine {
        let config = MusicConfig::from_json(json).unwrap();
        let mut msm = h.manager.create_music_state_machine(&config).unwrap();
        msm.wait_for_load(WAIT);
        msm
    }

    #[test]
    fn first_event_enters_matching_state() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        h.drain();

        assert!(msm.handle_event("start"));
        assert_eq!(msm.active_state(), Some("main"));
        let main = msm.stream("main").unwrap();
        assert!(main.is_playing());
        assert_eq!(main.volume(), 100.0);
        assert_eq!(main.scheduled_start(), Some(0.0));
        assert!(!msm.stream("win").unwrap().is_playing());
        assert_eq!(starts(&h.drain()).len(), 1);
    }

    #[test]
    fn fade_out_exit_delays_entry() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        msm.handle_event("start");
        h.clock.set(5.0);

        assert!(msm.handle_event("win"));
        assert_eq!(msm.active_state(), Some("win"));

        let main = msm.stream("main").unwrap();
        assert_eq!(main.state(), PlayState::Stopped);
        assert!(main.volume_at(5.0) > 0.0);

        let win = msm.stream("win").unwrap();
        let start = win.scheduled_start().unwrap();
        assert!((start - (5.0 + FADE_OUT_SECS + FADE_OUT_GUARD_SECS)).abs() < 1e-9);
        assert_eq!(win.volume(), 80.0);
    }

    #[test]
    fn entering_stream_waits_for_slowest_exit() {
        let json = r#"{
            "streams": {
                "a": { "url": "bed.wav", "trans": "wait-end" },
                "b": { "url": "lead.wav", "trans": "cut" },
                "c": { "url": "hi.wav" }
            },
            "states": {
                "one": { "triggers": ["start"], "streams": ["a", "b"], "next": ["two"] },
                "two": { "triggers": ["go"], "streams": ["c"], "next": [] }
            }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        msm.handle_event("start");

        // 8s buffer, 5s in: wait-end reports 3s, cut reports 0.
        h.clock.set(5.0);
        assert!(msm.handle_event("go"));
        let start = msm.stream("c").unwrap().scheduled_start().unwrap();
        assert!(start - 5.0 >= 3.0 - 1e-9);
    }

    #[test]
    fn continuing_stream_crossfades_over_two_seconds() {
        let json = r#"{
            "streams": {
                "bed": { "url": "bed.wav", "loop": [1.0, 7.0] },
                "lead": { "url": "lead.wav" },
                "hi": { "url": "hi.wav" }
            },
            "states": {
                "calm": { "triggers": ["start"], "streams": ["bed@100", "lead@50"], "next": ["tense"] },
                "tense": { "triggers": ["danger"], "streams": ["bed@40", "hi@100"], "next": ["calm"] }
            }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        msm.handle_event("start");
        h.clock.set(1.0);
        h.drain();

        assert!(msm.handle_event("danger"));
        let bed = msm.stream("bed").unwrap();
        assert!(bed.is_playing());
        assert!((bed.volume_at(1.0) - 100.0).abs() < 1e-3);
        assert!((bed.volume_at(2.0) - 70.0).abs() < 1e-3);
        assert!((bed.volume_at(3.0) - 40.0).abs() < 1e-3);
        for step in 0..=20 {
            assert!(bed.volume_at(1.0 + step as f64 * 0.1) > 0.0);
        }

        let bed_node = bed.volume_node();
        let ramps: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|c| match c {
                GraphCommand::ParamEvent { node, event } if node == bed_node => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(
            ramps,
            [
                ParamEvent::SetValue { value: 1.0, time: 1.0 },
                ParamEvent::LinearRamp { value: 0.4, time: 1.0 + CROSSFADE_SECS },
            ]
        );

        // Not restarted, and the new stem is not held back by the cut exit.
        assert_eq!(bed.scheduled_start(), Some(0.0));
        assert_eq!(msm.stream("hi").unwrap().scheduled_start(), Some(1.0));
    }

    #[test]
    fn unreachable_trigger_changes_nothing() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        msm.handle_event("start");
        h.clock.set(2.0);
        h.drain();

        assert!(!msm.handle_event("start"));
        assert!(!msm.handle_event("nonsense"));
        assert_eq!(msm.active_state(), Some("main"));
        assert!(msm.stream("main").unwrap().is_playing());
        assert!(h.drain().is_empty());
    }

    #[test]
    fn self_transition_is_a_no_op() {
        let json = r#"{
            "streams": { "bed": { "url": "bed.wav" } },
            "states": { "loop": { "triggers": ["start"], "streams": ["bed"], "next": ["loop"] } }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        assert!(msm.play());
        h.drain();
        assert!(!msm.play());
        assert!(h.drain().is_empty());
    }

    #[test]
    fn first_matching_state_in_declaration_order_wins() {
        let json = r#"{
            "streams": { "bed": { "url": "bed.wav" }, "hi": { "url": "hi.wav" } },
            "states": {
                "second": { "triggers": ["start"], "streams": ["hi"] },
                "first": { "triggers": ["start"], "streams": ["bed"] }
            }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        msm.play();
        assert_eq!(msm.active_state(), Some("second"));
    }

    #[test]
    fn failed_stream_stays_silent() {
        let h = Harness::new(MemoryFetcher::new().with("win.wav", wav_bytes(TEST_RATE, 1.0, 0.25)));
        let config = MusicConfig::from_json(BATTLE).unwrap();
        let mut msm = h.manager.create_music_state_machine(&config).unwrap();
        assert!(!msm.wait_for_load(WAIT));

        assert!(msm.handle_event("start"));
        msm.update();
        let main = msm.stream_mut("main").unwrap();
        assert_eq!(main.asset_status(), AssetStatus::Failed);
        assert!(!main.play(0.0, PlayOffset::default()));
        assert!(!main.is_playing());
        assert!(starts(&h.drain()).is_empty());
    }

    #[test]
    fn entering_before_load_plays_once_loaded() {
        let h = Harness::new(fetcher());
        let config = MusicConfig::from_json(BATTLE).unwrap();
        let mut msm = h.manager.create_music_state_machine(&config).unwrap();

        assert!(msm.play());
        assert!(!msm.stream("main").unwrap().is_playing());
        msm.wait_for_load(WAIT);
        assert!(msm.stream("main").unwrap().is_playing());
    }

    #[test]
    fn stream_exiting_before_load_stays_silent() {
        let h = Harness::new(fetcher());
        let config = MusicConfig::from_json(BATTLE).unwrap();
        let mut msm = h.manager.create_music_state_machine(&config).unwrap();

        assert!(msm.handle_event("start"));
        assert!(msm.handle_event("win"));
        assert!(msm.wait_for_load(WAIT));
        msm.update();

        assert_eq!(msm.active_state(), Some("win"));
        assert!(!msm.stream("main").unwrap().is_playing());
        assert!(msm.stream("win").unwrap().is_playing());
        assert_eq!(starts(&h.drain()).len(), 1);
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        msm.play();
        h.clock.set(9.0);

        assert!(msm.pause());
        assert!(!msm.is_playing());
        assert!(!msm.handle_event("win"));

        assert!(msm.resume());
        let main = msm.stream("main").unwrap();
        let elapsed = 9.0 - main.start_clock_time().unwrap();
        // 9s into a [1, 7) loop is 3s into the second pass.
        assert!((main.loop_window().unwrap().position(elapsed) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn cut_pause_restarts_inside_loop() {
        let json = r#"{
            "streams": { "bed": { "url": "bed.wav", "loop": [2.0, 6.0] } },
            "states": { "calm": { "triggers": ["start"], "streams": ["bed"], "pause": "cut" } }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        msm.play();
        h.clock.set(3.0);

        assert!(msm.pause());
        assert_eq!(msm.stream("bed").unwrap().state(), PlayState::Stopped);
        assert!(msm.resume());
        let bed = msm.stream("bed").unwrap();
        let offset = bed.scheduled_start().unwrap() - bed.start_clock_time().unwrap();
        assert!((2.0..6.0).contains(&offset));
    }

    #[test]
    fn replay_mode_skips_flagged_states() {
        let json = r#"{
            "streams": { "bed": { "url": "bed.wav" }, "hi": { "url": "hi.wav" } },
            "states": {
                "intro": { "triggers": ["start"], "streams": ["hi"], "disableInReplay": true },
                "main": { "triggers": ["start"], "streams": ["bed"] }
            }
        }"#;
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, json);
        msm.set_replay_mode(true);
        msm.play();
        assert_eq!(msm.active_state(), Some("main"));
    }

    #[test]
    fn stop_silences_everything() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        msm.play();
        assert!(msm.is_playing());
        assert!(msm.stop(0.0));
        assert!(!msm.is_playing());
        assert_eq!(msm.active_state(), None);
        assert!(msm.play());
    }

    #[test]
    fn machine_volume_sits_above_stream_volumes() {
        let h = Harness::new(fetcher());
        let mut msm = machine(&h, BATTLE);
        msm.play();
        msm.set_volume(25.0);
        assert_eq!(msm.volume(), 25.0);
        assert_eq!(msm.stream("main").unwrap().volume(), 100.0);
    }

    #[test]
    fn rejects_dangling_stream_reference() {
        let json = r#"{
            "streams": { "bed": { "url": "bed.wav" } },
            "states": { "calm": { "triggers": ["start"], "streams": ["bed", "ghost@20"] } }
        }"#;
        let h = Harness::new(fetcher());
        let config = MusicConfig::from_json(json).unwrap();
        assert!(h.manager.create_music_state_machine(&config).is_err());
    }
}
