use crate::asset::{AssetLoader, AssetStatus, AudioAsset};
use crate::graph::{GainNode, GraphHandle, NodeId, Output};
use crate::playback::{
    FADE_OUT_GUARD_SECS, FADE_OUT_SECS, LoopWindow, PendingPlay, PlayOffset, PlayState, Playable,
    TransitionPolicy,
};
use rand::Rng;
use std::time::Duration;

/// A loop-aware music stem.
///
/// Signal chain: `source -> volume gain -> fade gain -> output`. The volume gain carries
/// user and state-machine volume ramps; the fade gain is reserved for the `fade-out`
/// transition so the two never fight over one parameter.
///
/// # Invariants
/// - `pause_offset` is set iff the stream is [`PlayState::Paused`]
/// - `start_clock_time` is set iff the stream is [`PlayState::Playing`]
/// - every `play`/`stop` call bumps `generation`, which invalidates any deferred
///   play parked while the asset was loading
pub struct LoopStream {
    id: String,
    graph: GraphHandle,
    asset: AudioAsset,
    loop_window: Option<LoopWindow>,
    transition: TransitionPolicy,
    beat_interval: f64,
    beat_offset: f64,
    generation: u64,
    state: PlayState,
    source: Option<NodeId>,
    /// Source whose stop is scheduled in the future (wait-end, fade-out, ...).
    releasing: Option<NodeId>,
    pause_offset: Option<f64>,
    /// Clock time at which buffer position 0 would have played.
    start_clock_time: Option<f64>,
    /// Clock time at which the current source actually starts.
    scheduled_start: Option<f64>,
    /// Natural end of a non-looping source.
    ends_at: Option<f64>,
    pending: Option<PendingPlay>,
    volume: GainNode,
    fade: GainNode,
}

impl LoopStream {
    /// Creates the stream and starts loading its asset.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        graph: &GraphHandle,
        loader: AssetLoader,
        output: Output,
    ) -> Self {
        let id = id.into();
        let fade = graph.create_gain(output, 1.0);
        let volume = graph.create_gain(fade.output(), 0.5);
        let mut asset = AudioAsset::new(url, loader);
        log::debug!("Stream {} created ({})", id, asset.url());
        asset.load();

        Self {
            id,
            graph: graph.clone(),
            asset,
            loop_window: None,
            transition: TransitionPolicy::Cut,
            beat_interval: 0.0,
            beat_offset: 0.0,
            generation: 0,
            state: PlayState::Stopped,
            source: None,
            releasing: None,
            pause_offset: None,
            start_clock_time: None,
            scheduled_start: None,
            ends_at: None,
            pending: None,
            volume,
            fade,
        }
    }

    pub fn with_loop(mut self, loop_window: Option<LoopWindow>) -> Self {
        self.loop_window = loop_window;
        self
    }

    pub fn with_transition(mut self, transition: TransitionPolicy) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_beat(mut self, interval: f64, offset: f64) -> Self {
        self.beat_interval = interval;
        self.beat_offset = offset;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        let now = self.graph.now();
        self.set_volume_immediate_at(now, volume);
        self
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loop_window(&self) -> Option<LoopWindow> {
        self.loop_window
    }

    pub fn transition_policy(&self) -> TransitionPolicy {
        self.transition
    }

    pub fn asset_status(&self) -> AssetStatus {
        self.asset.status()
    }

    pub fn pause_offset(&self) -> Option<f64> {
        self.pause_offset
    }

    pub fn start_clock_time(&self) -> Option<f64> {
        self.start_clock_time
    }

    /// Clock time at which the current source starts sounding.
    pub fn scheduled_start(&self) -> Option<f64> {
        self.scheduled_start
    }

    /// Current volume, 0..=100.
    pub fn volume(&self) -> f32 {
        self.volume_at(self.graph.now())
    }

    pub fn volume_at(&self, time: f64) -> f32 {
        self.volume.value_at(time) * 100.0
    }

    #[cfg(test)]
    pub(crate) fn volume_node(&self) -> NodeId {
        self.volume.id()
    }

    #[cfg(test)]
    pub(crate) fn fade_node(&self) -> NodeId {
        self.fade.id()
    }

    /// Time elapsed since the logical start, measured at `now`. Before a delayed source
    /// has started this is its start offset; the first value is how long until it does.
    fn playhead(&self, now: f64) -> Option<(f64, f64)> {
        let logical_start = self.start_clock_time?;
        let start = self.scheduled_start.unwrap_or(logical_start);
        if now < start {
            Some((start - now, start - logical_start))
        } else {
            Some((0.0, now - logical_start))
        }
    }

    fn position(&self, elapsed: f64) -> f64 {
        match self.loop_window {
            Some(window) => window.position(elapsed),
            None => elapsed,
        }
    }

    pub(crate) fn play_at(&mut self, now: f64, delay: f64, offset: PlayOffset) -> bool {
        self.generation += 1;
        if self.state == PlayState::Playing {
            return true;
        }

        let Some(buffer) = self.asset.buffer().cloned() else {
            if self.asset.load() == AssetStatus::Loading {
                log::debug!(
                    "Stream {} not loaded yet, play deferred (generation {})",
                    self.id,
                    self.generation
                );
                self.pending = Some(PendingPlay {
                    generation: self.generation,
                    delay,
                    offset,
                });
            } else {
                log::debug!("Stream {} has no audio, play ignored", self.id);
            }
            return false;
        };

        let when = now + delay.max(0.0);
        let offset = match (offset, self.loop_window) {
            (PlayOffset::Seconds(seconds), _) => seconds.max(0.0),
            (PlayOffset::RandomInLoop, Some(window)) => {
                rand::thread_rng().gen_range(window.start()..window.end())
            }
            (PlayOffset::RandomInLoop, None) => 0.0,
        };

        if let Some(old) = self.releasing.take() {
            self.graph.stop_source(old, when);
        }

        // Let an in-flight fade run on until the new source starts, then snap back to unity.
        let fade_level = self.fade.value_at(when);
        self.fade.cancel_scheduled_values(when);
        self.fade.linear_ramp_to_value_at_time(fade_level, when);
        self.fade.set_value_at_time(1.0, when);

        let source = self.graph.start_source(
            buffer.clone(),
            self.volume.id(),
            when,
            offset,
            self.loop_window,
        );

        log::debug!(
            "Stream {} playing at {:.3}s from offset {:.3}s",
            self.id,
            when,
            offset
        );

        self.source = Some(source);
        self.scheduled_start = Some(when);
        self.start_clock_time = Some(when - offset);
        self.ends_at = match self.loop_window {
            Some(_) => None,
            None => Some(when + (buffer.duration_secs() - offset).max(0.0)),
        };
        self.pause_offset = None;
        self.pending = None;
        self.state = PlayState::Playing;
        true
    }

    pub(crate) fn stop_at(&mut self, now: f64, delay: f64) -> bool {
        self.generation += 1;
        match self.state {
            PlayState::Stopped => {}
            PlayState::Paused => {
                self.pause_offset = None;
                self.state = PlayState::Stopped;
            }
            PlayState::Playing => {
                let when = now + delay.max(0.0);
                if let Some(source) = self.source.take() {
                    self.graph.stop_source(source, when);
                    if when > now {
                        self.releasing = Some(source);
                    }
                }
                log::debug!("Stream {} stopping at {:.3}s", self.id, when);
                self.clear_playing();
            }
        }
        true
    }

    /// Pauses a playing stream, remembering where inside the loop it was.
    pub fn pause(&mut self) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }
        let now = self.graph.now();
        let elapsed = self.playhead(now).map(|(_, e)| e).unwrap_or(0.0);
        let offset = match self.loop_window {
            Some(window) => window.position(elapsed) - window.start(),
            None => elapsed,
        };

        if let Some(source) = self.source.take() {
            self.graph.stop_source(source, now);
        }
        log::debug!("Stream {} paused at offset {:.3}s", self.id, offset);

        self.clear_playing();
        self.pause_offset = Some(offset);
        self.state = PlayState::Paused;
        true
    }

    /// Resumes a paused stream where it left off.
    pub fn resume(&mut self) -> bool {
        if self.state != PlayState::Paused {
            return false;
        }
        let pause_offset = self.pause_offset.take().unwrap_or(0.0);
        let offset = match self.loop_window {
            Some(window) => window.start() + pause_offset,
            None => pause_offset,
        };
        self.state = PlayState::Stopped;
        self.play(0.0, PlayOffset::Seconds(offset))
    }

    /// Ramps the volume to `target` (0..=100) over `duration` seconds, starting from
    /// whatever is audible right now.
    pub fn set_volume(&mut self, target: f32, duration: f64) {
        let now = self.graph.now();
        self.set_volume_at(now, target, duration);
    }

    pub(crate) fn set_volume_at(&mut self, now: f64, target: f32, duration: f64) {
        let target = target.clamp(0.0, 100.0) / 100.0;
        self.volume.hold_at(now);
        if duration > 0.0 {
            self.volume
                .linear_ramp_to_value_at_time(target, now + duration);
        } else {
            self.volume.set_value_at_time(target, now);
        }
    }

    /// Jumps to `volume` (0..=100), discarding any ramp in flight.
    pub fn set_volume_immediate(&mut self, volume: f32) {
        let now = self.graph.now();
        self.set_volume_immediate_at(now, volume);
    }

    pub(crate) fn set_volume_immediate_at(&mut self, now: f64, volume: f32) {
        self.volume.cancel_scheduled_values(0.0);
        self.volume
            .set_value_at_time(volume.clamp(0.0, 100.0) / 100.0, now);
    }

    /// Schedules this stream's exit according to its transition policy and returns the
    /// seconds until it is silent. A stream that is not playing returns 0.
    pub fn transition_out(&mut self) -> f64 {
        let now = self.graph.now();
        self.transition_out_at(now)
    }

    pub(crate) fn transition_out_at(&mut self, now: f64) -> f64 {
        // Also invalidates a play still parked on the asset load.
        if self.state != PlayState::Playing {
            self.stop_at(now, 0.0);
            return 0.0;
        }
        let Some((lead, elapsed)) = self.playhead(now) else {
            return 0.0;
        };
        let position = self.position(elapsed);

        let remaining = match self.transition {
            TransitionPolicy::Cut => 0.0,
            TransitionPolicy::WaitEnd => {
                let boundary = match (self.loop_window, self.asset.buffer()) {
                    (Some(window), _) => window.end(),
                    (None, Some(buffer)) => buffer.duration_secs(),
                    (None, None) => position,
                };
                lead + (boundary - position).max(0.0)
            }
            TransitionPolicy::CutOnBeat if self.beat_interval > 0.0 => {
                lead + self.beat_interval
                    - (position - self.beat_offset).rem_euclid(self.beat_interval)
            }
            TransitionPolicy::CutOnBeat => 0.0,
            TransitionPolicy::FadeOut => {
                self.fade.hold_at(now);
                self.fade
                    .linear_ramp_to_value_at_time(0.0, now + FADE_OUT_SECS);
                FADE_OUT_SECS + FADE_OUT_GUARD_SECS
            }
        };

        log::debug!(
            "Stream {} transitioning out ({:?}) in {:.3}s",
            self.id,
            self.transition,
            remaining
        );
        self.stop_at(now, remaining);
        remaining
    }

    /// Blocks up to `timeout` for the asset, then runs any deferred play.
    pub fn wait_for_load(&mut self, timeout: Duration) -> AssetStatus {
        if let Some(status) = self.asset.wait(timeout) {
            self.on_asset_settled(status);
        }
        self.asset.status()
    }

    /// Drops the decoded audio; the next play reloads it.
    pub fn unload(&mut self) {
        self.asset.unload();
    }

    fn on_asset_settled(&mut self, status: AssetStatus) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if status != AssetStatus::Ready {
            return;
        }
        if pending.generation != self.generation {
            log::debug!(
                "Stream {} dropping stale deferred play (generation {} != {})",
                self.id,
                pending.generation,
                self.generation
            );
            return;
        }
        let now = self.graph.now();
        self.play_at(now, pending.delay, pending.offset);
    }

    fn clear_playing(&mut self) {
        self.start_clock_time = None;
        self.scheduled_start = None;
        self.ends_at = None;
        self.state = PlayState::Stopped;
    }
}

impl Playable for LoopStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn play(&mut self, delay: f64, offset: PlayOffset) -> bool {
        let now = self.graph.now();
        self.play_at(now, delay, offset)
    }

    fn stop(&mut self, delay: f64) -> bool {
        let now = self.graph.now();
        self.stop_at(now, delay)
    }

    fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    fn update(&mut self) {
        if let Some(status) = self.asset.poll() {
            self.on_asset_settled(status);
        }
        if self.state == PlayState::Playing
            && self.ends_at.is_some_and(|end| self.graph.now() >= end)
        {
            log::debug!("Stream {} reached its end", self.id);
            self.source = None;
            self.clear_playing();
        }
    }
}

impl Drop for LoopStream {
    fn drop(&mut self) {
        let now = self.graph.now();
        for source in self.source.take().into_iter().chain(self.releasing.take()) {
            self.graph.stop_source(source, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AudioClock;
    use crate::graph::GraphCommand;
    use crate::graph::param::ParamEvent;
    use crate::test_support::{Harness, MemoryFetcher, TEST_RATE, WAIT, starts, stops, wav_bytes};

    fn harness() -> Harness {
        Harness::new(
            MemoryFetcher::new()
                .with("loop.wav", wav_bytes(TEST_RATE, 8.0, 0.5))
                .with("short.wav", wav_bytes(TEST_RATE, 3.0, 0.5)),
        )
    }

    fn looping(h: &Harness, policy: TransitionPolicy) -> LoopStream {
        let mut stream = h
            .manager
            .create_loop_stream_with("loop", "loop.wav", LoopWindow::from_points(2.0, 6.0).unwrap())
            .with_transition(policy)
            .with_beat(0.5, 0.0);
        assert_eq!(stream.wait_for_load(WAIT), AssetStatus::Ready);
        stream
    }

    #[test]
    fn play_is_idempotent_while_playing() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        h.drain();

        assert!(stream.play(0.0, PlayOffset::default()));
        assert!(stream.play(0.0, PlayOffset::default()));
        assert_eq!(starts(&h.drain()).len(), 1);
        assert_eq!(stream.state(), PlayState::Playing);
    }

    #[test]
    fn stop_twice_schedules_once() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        stream.play(0.0, PlayOffset::default());
        h.drain();

        assert!(stream.stop(0.0));
        assert!(stream.stop(0.0));
        assert_eq!(stops(&h.drain()).len(), 1);
        assert_eq!(stream.state(), PlayState::Stopped);
        assert_eq!(stream.start_clock_time(), None);
    }

    #[test]
    fn play_records_logical_start() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        h.clock.set(10.0);
        stream.play(1.0, PlayOffset::Seconds(3.0));

        assert_eq!(stream.scheduled_start(), Some(11.0));
        assert_eq!(stream.start_clock_time(), Some(8.0));
        let sent = h.drain();
        assert!(matches!(
            starts(&sent)[0],
            GraphCommand::StartSource { when, offset, loop_window: Some(_), .. }
                if *when == 11.0 && *offset == 3.0
        ));
    }

    #[test]
    fn random_offset_lands_inside_loop() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        for _ in 0..20 {
            stream.play(0.0, PlayOffset::RandomInLoop);
            let offset = stream.scheduled_start().unwrap() - stream.start_clock_time().unwrap();
            assert!((2.0..6.0).contains(&offset), "offset {}", offset);
            stream.stop(0.0);
        }
    }

    #[test]
    fn pause_resume_round_trip_in_loop() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        stream.play(0.0, PlayOffset::default());

        // 2s intro, then 4s loop: 13s elapsed is 3s into the third pass.
        h.clock.set(13.0);
        assert!(stream.pause());
        assert_eq!(stream.state(), PlayState::Paused);
        assert_eq!(stream.start_clock_time(), None);
        assert!((stream.pause_offset().unwrap() - 3.0).abs() < 1e-9);

        assert!(stream.resume());
        assert_eq!(stream.pause_offset(), None);
        let elapsed = h.clock.now() - stream.start_clock_time().unwrap();
        assert!((stream.position(elapsed) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn pause_in_intro_resumes_before_loop_start() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        stream.play(0.0, PlayOffset::default());

        h.clock.set(1.5);
        assert!(stream.pause());
        assert!((stream.pause_offset().unwrap() + 0.5).abs() < 1e-9);

        h.clock.set(4.0);
        assert!(stream.resume());
        assert_eq!(stream.start_clock_time(), Some(2.5));
        let sent = h.drain();
        let resumed = starts(&sent).into_iter().last().unwrap();
        assert!(matches!(
            resumed,
            GraphCommand::StartSource { offset, .. } if (offset - 1.5).abs() < 1e-9
        ));
    }

    #[test]
    fn pause_resume_round_trip_without_loop() {
        let h = harness();
        let mut stream = h.manager.create_loop_stream_with("short", "short.wav", None);
        stream.wait_for_load(WAIT);
        stream.play(0.0, PlayOffset::default());

        h.clock.set(1.25);
        assert!(stream.pause());
        assert!((stream.pause_offset().unwrap() - 1.25).abs() < 1e-9);
        assert!(stream.resume());
        let elapsed = h.clock.now() - stream.start_clock_time().unwrap();
        assert!((elapsed - 1.25).abs() < 1e-9);
    }

    #[test]
    fn pause_and_resume_reject_wrong_states() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        assert!(!stream.pause());
        assert!(!stream.resume());
        stream.play(0.0, PlayOffset::default());
        assert!(!stream.resume());
        stream.pause();
        assert!(!stream.pause());
    }

    #[test]
    fn volume_ramp_is_anchored_at_current_value() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut).with_volume(100.0);
        stream.set_volume(0.0, 4.0);
        h.clock.set(2.0);
        // Half way down, ramp back up: the curve must continue from 50, not jump.
        stream.set_volume(100.0, 2.0);

        assert!((stream.volume_at(2.0) - 50.0).abs() < 1e-3);
        assert!((stream.volume_at(3.0) - 75.0).abs() < 1e-3);
        assert!((stream.volume_at(4.0) - 100.0).abs() < 1e-3);

        let sent = h.drain();
        let volume_node = stream.volume_node();
        let last_events: Vec<_> = sent
            .iter()
            .filter_map(|c| match c {
                GraphCommand::ParamEvent { node, event } if *node == volume_node => Some(*event),
                _ => None,
            })
            .collect();
        assert_eq!(
            &last_events[last_events.len() - 2..],
            [
                ParamEvent::SetValue { value: 0.5, time: 2.0 },
                ParamEvent::LinearRamp { value: 1.0, time: 4.0 },
            ]
        );
    }

    #[test]
    fn transition_out_cut_is_immediate() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::Cut);
        stream.play(0.0, PlayOffset::default());
        h.clock.set(3.0);
        assert_eq!(stream.transition_out(), 0.0);
        assert_eq!(stream.state(), PlayState::Stopped);
    }

    #[test]
    fn transition_out_wait_end_runs_to_loop_end() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::WaitEnd);
        stream.play(0.0, PlayOffset::default());
        h.clock.set(7.0); // position 3.0 in loop [2, 6)
        h.drain();

        let remaining = stream.transition_out();
        assert!((remaining - 3.0).abs() < 1e-9);
        assert!(matches!(
            stops(&h.drain())[0],
            GraphCommand::StopSource { when, .. } if (*when - 10.0).abs() < 1e-9
        ));
    }

    #[test]
    fn transition_out_wait_end_without_loop_runs_to_buffer_end() {
        let h = harness();
        let mut stream = h
            .manager
            .create_loop_stream_with("short", "short.wav", None)
            .with_transition(TransitionPolicy::WaitEnd);
        stream.wait_for_load(WAIT);
        stream.play(0.0, PlayOffset::default());
        h.clock.set(1.0);
        assert!((stream.transition_out() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn transition_out_on_beat() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::CutOnBeat);
        stream.play(0.0, PlayOffset::default());
        h.clock.set(3.2);
        assert!((stream.transition_out() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn transition_out_fade_ramps_fade_node_to_silence() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::FadeOut);
        stream.play(0.0, PlayOffset::default());
        h.clock.set(1.0);
        h.drain();

        assert_eq!(stream.transition_out(), FADE_OUT_SECS + FADE_OUT_GUARD_SECS);
        let sent = h.drain();
        let fade = stream.fade_node();
        assert!(sent.iter().any(|c| matches!(
            c,
            GraphCommand::ParamEvent { node, event: ParamEvent::LinearRamp { value, time } }
                if *node == fade && *value == 0.0 && (*time - 11.0).abs() < 1e-9
        )));
        assert!(matches!(
            stops(&sent)[0],
            GraphCommand::StopSource { when, .. } if (*when - 11.1).abs() < 1e-9
        ));
    }

    #[test]
    fn transition_out_when_not_playing_is_zero() {
        let h = harness();
        let mut stream = looping(&h, TransitionPolicy::FadeOut);
        h.drain();
        assert_eq!(stream.transition_out(), 0.0);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn deferred_play_fires_after_load() {
        let h = harness();
        let mut stream = h.manager.create_loop_stream_with("loop", "loop.wav", None);
        assert!(!stream.play(0.0, PlayOffset::default()));
        assert_eq!(stream.state(), PlayState::Stopped);

        assert_eq!(stream.wait_for_load(WAIT), AssetStatus::Ready);
        assert_eq!(stream.state(), PlayState::Playing);
    }

    #[test]
    fn stop_cancels_deferred_play() {
        let h = harness();
        let mut stream = h.manager.create_loop_stream_with("loop", "loop.wav", None);
        assert!(!stream.play(0.0, PlayOffset::default()));
        stream.stop(0.0);

        stream.wait_for_load(WAIT);
        assert_eq!(stream.state(), PlayState::Stopped);
        assert!(starts(&h.drain()).is_empty());
    }

    #[test]
    fn transition_out_cancels_deferred_play() {
        let h = harness();
        let mut stream = h
            .manager
            .create_loop_stream_with("loop", "loop.wav", None)
            .with_transition(TransitionPolicy::FadeOut);
        assert_eq!(stream.transition_policy(), TransitionPolicy::FadeOut);
        assert!(!stream.play(0.0, PlayOffset::default()));
        let parked = stream.generation();

        assert_eq!(stream.transition_out(), 0.0);
        assert!(stream.generation() > parked);

        assert_eq!(stream.wait_for_load(WAIT), AssetStatus::Ready);
        stream.update();
        assert_eq!(stream.state(), PlayState::Stopped);
        assert!(starts(&h.drain()).is_empty());
    }

    #[test]
    fn failed_asset_never_plays() {
        let h = harness();
        let mut stream = h.manager.create_loop_stream_with("gone", "gone.wav", None);
        assert!(!stream.play(0.0, PlayOffset::default()));
        assert_eq!(stream.wait_for_load(WAIT), AssetStatus::Failed);

        for _ in 0..3 {
            assert!(!stream.play(0.0, PlayOffset::default()));
            stream.update();
        }
        assert_eq!(stream.state(), PlayState::Stopped);
        assert!(starts(&h.drain()).is_empty());
    }

    #[test]
    fn non_looping_stream_stops_at_natural_end() {
        let h = harness();
        let mut stream = h.manager.create_loop_stream_with("short", "short.wav", None);
        stream.wait_for_load(WAIT);
        stream.play(0.0, PlayOffset::default());

        h.clock.set(2.9);
        stream.update();
        assert!(stream.is_playing());
        h.clock.set(3.0);
        stream.update();
        assert!(!stream.is_playing());
    }
}
