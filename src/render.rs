//! Render side of the audio graph.
//!
//! [`GraphRenderer`] owns the node graph built from [`GraphCommand`]s and produces
//! interleaved PCM one block at a time. Every block it
//! 1. drains all pending commands,
//! 2. evaluates each gain node's automation once per frame,
//! 3. mixes every active source through its chain of panners and gains,
//! 4. advances the [`FrameClock`] the control side schedules against.
//!
//! Source start and stop times are honoured to the frame.

use crate::audio_data::PcmBuffer;
use crate::clock::FrameClock;
use crate::graph::param::AudioParam;
use crate::graph::{GraphCommand, NodeId, Output};
use crate::playback::LoopWindow;
use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, HashMap};
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

/// Longest node chain walked from a source to the destination.
const MAX_CHAIN_DEPTH: usize = 32;

struct GainState {
    output: Output,
    param: AudioParam,
    /// Per-frame values for the block being rendered.
    curve: Vec<f32>,
}

struct PannerState {
    output: Output,
    pan: f32,
}

struct SourceState {
    buffer: Arc<PcmBuffer>,
    output: NodeId,
    start: f64,
    offset: f64,
    loop_window: Option<LoopWindow>,
    stop: Option<f64>,
    /// Read position in buffer frames, `None` until the source has started.
    position: Option<f64>,
    finished: bool,
}

impl SourceState {
    /// Loop bounds in buffer frames, with the end clamped to the buffer length.
    fn loop_frames(&self) -> Option<(f64, f64)> {
        let window = self.loop_window?;
        let rate = self.buffer.sample_rate() as f64;
        let total = self.buffer.total_frames() as f64;
        let end = (window.end() * rate).min(total);
        let start = window.start() * rate;
        (start < end).then_some((start, end))
    }
}

/// Resolved route from a source to the destination.
struct Chain {
    gains: Vec<NodeId>,
    pan: Option<f32>,
}

pub struct GraphRenderer {
    commands: Receiver<GraphCommand>,
    clock: Arc<FrameClock>,
    channels: u16,
    gains: HashMap<NodeId, GainState>,
    panners: HashMap<NodeId, PannerState>,
    sources: BTreeMap<NodeId, SourceState>,
    mix: Vec<(f32, f32)>,
}

impl GraphRenderer {
    pub fn new(commands: Receiver<GraphCommand>, clock: Arc<FrameClock>, channels: u16) -> Self {
        Self {
            commands,
            clock,
            channels: channels.max(1),
            gains: HashMap::new(),
            panners: HashMap::new(),
            sources: BTreeMap::new(),
            mix: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sources scheduled or playing.
    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// Renders `out.len() / channels` frames of interleaved audio and advances the
    /// clock by that many frames. Returns the frame count.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let frames = out.len() / channels;

        for command in self.commands.try_iter().collect::<Vec<_>>() {
            self.apply(command);
        }

        let sample_rate = self.clock.sample_rate() as f64;
        let block_start = self.clock.frames();
        let frame_time = |i: usize| (block_start + i as u64) as f64 / sample_rate;

        for GainState { param, curve, .. } in self.gains.values_mut() {
            curve.clear();
            curve.extend((0..frames).map(|i| param.value_at(frame_time(i))));
        }

        self.mix.clear();
        self.mix.resize(frames, (0.0, 0.0));

        let mut broken = Vec::new();
        for (&id, source) in self.sources.iter_mut() {
            let Some(chain) = resolve_chain(&self.gains, &self.panners, source.output) else {
                broken.push(id);
                continue;
            };
            let step = source.buffer.sample_rate() as f64 / sample_rate;
            let loop_frames = source.loop_frames();
            let total = source.buffer.total_frames() as f64;

            for (i, slot) in self.mix.iter_mut().enumerate() {
                let t = frame_time(i);
                if source.stop.is_some_and(|stop| t >= stop) {
                    source.finished = true;
                    break;
                }
                if t < source.start {
                    continue;
                }
                let position = source
                    .position
                    .get_or_insert(source.offset * source.buffer.sample_rate() as f64);
                if let Some((loop_start, loop_end)) = loop_frames {
                    if *position >= loop_end {
                        *position = loop_start + (*position - loop_end) % (loop_end - loop_start);
                    }
                } else if *position >= total {
                    source.finished = true;
                    break;
                }

                let (mut left, mut right) = source.buffer.stereo_frame(*position as usize);
                *position += step;

                if let Some(pan) = chain.pan {
                    (left, right) = equal_power_pan(left, right, pan);
                }
                let gain: f32 = chain
                    .gains
                    .iter()
                    .map(|node| self.gains.get(node).map_or(0.0, |g| g.curve[i]))
                    .product();
                slot.0 += left * gain;
                slot.1 += right * gain;
            }
        }

        for id in broken {
            log::trace!("Source {} has no route to the destination, dropping it", id);
            self.sources.remove(&id);
        }
        self.sources.retain(|_, source| !source.finished);

        for (frame, &(left, right)) in out.chunks_mut(channels).zip(self.mix.iter()) {
            match channels {
                1 => frame[0] = 0.5 * (left + right),
                _ => {
                    frame[0] = left;
                    frame[1] = right;
                    frame[2..].fill(0.0);
                }
            }
        }

        let block_end = frame_time(frames);
        for gain in self.gains.values_mut() {
            gain.param.prune_before(block_end);
        }
        self.clock.advance(frames as u64);
        frames
    }

    fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::CreateGain {
                node,
                output,
                value,
            } => {
                self.gains.insert(
                    node,
                    GainState {
                        output,
                        param: AudioParam::new(value),
                        curve: Vec::new(),
                    },
                );
            }
            GraphCommand::CreatePanner { node, output, pan } => {
                self.panners.insert(node, PannerState { output, pan });
            }
            GraphCommand::SetPan { node, pan } => {
                if let Some(panner) = self.panners.get_mut(&node) {
                    panner.pan = pan;
                }
            }
            GraphCommand::StartSource {
                node,
                buffer,
                output,
                when,
                offset,
                loop_window,
            } => {
                self.sources.insert(
                    node,
                    SourceState {
                        buffer,
                        output,
                        start: when,
                        offset,
                        loop_window,
                        stop: None,
                        position: None,
                        finished: false,
                    },
                );
            }
            GraphCommand::StopSource { node, when } => {
                if let Some(source) = self.sources.get_mut(&node) {
                    source.stop = Some(source.stop.map_or(when, |stop| stop.min(when)));
                }
            }
            GraphCommand::ParamEvent { node, event } => {
                if let Some(gain) = self.gains.get_mut(&node) {
                    gain.param.apply(event);
                }
            }
            GraphCommand::CancelScheduledValues { node, from } => {
                if let Some(gain) = self.gains.get_mut(&node) {
                    gain.param.cancel_scheduled_values(from);
                }
            }
            GraphCommand::SetValue { node, value } => {
                if let Some(gain) = self.gains.get_mut(&node) {
                    gain.param.set_value(value);
                }
            }
            GraphCommand::Release { node } => {
                self.gains.remove(&node);
                self.panners.remove(&node);
            }
        }
    }
}

fn resolve_chain(
    gains: &HashMap<NodeId, GainState>,
    panners: &HashMap<NodeId, PannerState>,
    first: NodeId,
) -> Option<Chain> {
    let mut chain = Chain {
        gains: Vec::new(),
        pan: None,
    };
    let mut next = Output::Node(first);
    for _ in 0..MAX_CHAIN_DEPTH {
        let Output::Node(node) = next else {
            return Some(chain);
        };
        if let Some(gain) = gains.get(&node) {
            chain.gains.push(node);
            next = gain.output;
        } else if let Some(panner) = panners.get(&node) {
            chain.pan = Some(panner.pan);
            next = panner.output;
        } else {
            return None;
        }
    }
    None
}

/// Equal-power stereo panning of a stereo frame, `pan` in -1..=1.
fn equal_power_pan(left: f32, right: f32, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}
