//! Audio graph plumbing between the control side and the renderer.
//!
//! The control side never touches samples. It owns small mirrors of the nodes it
//! creates ([`GainNode`], [`PannerNode`]) and forwards every mutation as a
//! [`GraphCommand`] to the [`GraphRenderer`](crate::render::GraphRenderer) over a
//! channel. Nodes form a small fan-in tree per stream:
//!
//! ```text
//! source -> [panner] -> gain -> [fade gain] -> bus gain -> master gain -> destination
//! ```
//!
//! Each node is owned by exactly one control-side object and released when that
//! object is dropped.

pub mod param;

use crate::audio_data::PcmBuffer;
use crate::clock::AudioClock;
use crate::playback::LoopWindow;
use crossbeam_channel::{Receiver, Sender, unbounded};
use param::{AudioParam, ParamEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle for a node living in the renderer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Where a node sends its signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Node(NodeId),
    Destination,
}

/// Commands consumed by the renderer. All times are absolute clock seconds.
#[derive(Debug, Clone)]
pub enum GraphCommand {
    CreateGain {
        node: NodeId,
        output: Output,
        value: f32,
    },
    CreatePanner {
        node: NodeId,
        output: Output,
        pan: f32,
    },
    SetPan {
        node: NodeId,
        pan: f32,
    },
    /// Start playing `buffer` at `when`, `offset` seconds into the buffer.
    StartSource {
        node: NodeId,
        buffer: Arc<PcmBuffer>,
        output: NodeId,
        when: f64,
        offset: f64,
        loop_window: Option<LoopWindow>,
    },
    /// Stop a source at `when`. An earlier pending stop time wins.
    StopSource {
        node: NodeId,
        when: f64,
    },
    ParamEvent {
        node: NodeId,
        event: ParamEvent,
    },
    CancelScheduledValues {
        node: NodeId,
        from: f64,
    },
    SetValue {
        node: NodeId,
        value: f32,
    },
    /// Disconnect and free a node.
    Release {
        node: NodeId,
    },
}

/// Cheap, cloneable handle used by control-side objects to talk to the renderer.
#[derive(Clone)]
pub struct GraphHandle {
    commands: Sender<GraphCommand>,
    clock: Arc<dyn AudioClock>,
    next_id: Arc<AtomicU64>,
    sample_rate: u32,
}

impl GraphHandle {
    /// Creates a handle plus the receiving end of its command channel.
    pub fn new(clock: Arc<dyn AudioClock>, sample_rate: u32) -> (Self, Receiver<GraphCommand>) {
        let (commands, receiver) = unbounded();
        let handle = Self {
            commands,
            clock,
            next_id: Arc::new(AtomicU64::new(1)),
            sample_rate,
        };
        (handle, receiver)
    }

    /// Current hardware clock time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn allocate(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn send(&self, command: GraphCommand) {
        if self.commands.send(command).is_err() {
            log::trace!("Graph command dropped: renderer is gone");
        }
    }

    pub fn create_gain(&self, output: Output, value: f32) -> GainNode {
        let id = self.allocate();
        self.send(GraphCommand::CreateGain {
            node: id,
            output,
            value,
        });
        GainNode {
            id,
            gain: AudioParam::new(value),
            graph: self.clone(),
        }
    }

    pub fn create_panner(&self, output: Output) -> PannerNode {
        let id = self.allocate();
        self.send(GraphCommand::CreatePanner {
            node: id,
            output,
            pan: 0.0,
        });
        PannerNode {
            id,
            pan: 0.0,
            graph: self.clone(),
        }
    }

    /// Schedules a new buffer source and returns its node id.
    pub(crate) fn start_source(
        &self,
        buffer: Arc<PcmBuffer>,
        output: NodeId,
        when: f64,
        offset: f64,
        loop_window: Option<LoopWindow>,
    ) -> NodeId {
        let id = self.allocate();
        self.send(GraphCommand::StartSource {
            node: id,
            buffer,
            output,
            when,
            offset,
            loop_window,
        });
        id
    }

    pub(crate) fn stop_source(&self, node: NodeId, when: f64) {
        self.send(GraphCommand::StopSource { node, when });
    }
}

/// Control-side mirror of a gain node.
pub struct GainNode {
    id: NodeId,
    gain: AudioParam,
    graph: GraphHandle,
}

impl GainNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn output(&self) -> Output {
        Output::Node(self.id)
    }

    pub fn param(&self) -> &AudioParam {
        &self.gain
    }

    pub fn value_at(&self, time: f64) -> f32 {
        self.gain.value_at(time)
    }

    /// Replaces any automation with a constant.
    pub fn set_value(&mut self, value: f32) {
        self.gain.set_value(value);
        self.graph.send(GraphCommand::SetValue {
            node: self.id,
            value,
        });
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.schedule(ParamEvent::SetValue { value, time });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.schedule(ParamEvent::LinearRamp { value, time });
    }

    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.gain.cancel_scheduled_values(from);
        self.graph.send(GraphCommand::CancelScheduledValues {
            node: self.id,
            from,
        });
    }

    /// Cancels pending automation and pins the current value at `now`, so the next
    /// ramp starts exactly where the audible curve is.
    pub fn hold_at(&mut self, now: f64) -> f32 {
        let current = self.gain.value_at(now);
        self.cancel_scheduled_values(0.0);
        self.set_value_at_time(current, now);
        current
    }

    fn schedule(&mut self, event: ParamEvent) {
        self.gain.prune_before(self.graph.now());
        self.gain.apply(event);
        self.graph.send(GraphCommand::ParamEvent {
            node: self.id,
            event,
        });
    }
}

impl Drop for GainNode {
    fn drop(&mut self) {
        self.graph.send(GraphCommand::Release { node: self.id });
    }
}

/// Control-side mirror of an equal-power stereo panner.
pub struct PannerNode {
    id: NodeId,
    pan: f32,
    graph: GraphHandle,
}

impl PannerNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// `pan` in -1.0 (left) ..= 1.0 (right).
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
        self.graph.send(GraphCommand::SetPan {
            node: self.id,
            pan: self.pan,
        });
    }
}

impl Drop for PannerNode {
    fn drop(&mut self) {
        self.graph.send(GraphCommand::Release { node: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn gain_mutations_are_mirrored_and_forwarded() {
        let clock = Arc::new(ManualClock::new());
        let (graph, commands) = GraphHandle::new(clock.clone(), 48000);

        let mut gain = graph.create_gain(Output::Destination, 1.0);
        gain.set_value_at_time(1.0, 0.0);
        gain.linear_ramp_to_value_at_time(0.0, 4.0);
        clock.set(1.0);
        let held = gain.hold_at(1.0);

        assert!((held - 0.75).abs() < 1e-6);
        assert!((gain.value_at(3.0) - 0.75).abs() < 1e-6);

        let sent: Vec<_> = commands.try_iter().collect();
        assert!(matches!(sent[0], GraphCommand::CreateGain { value, .. } if value == 1.0));
        assert!(matches!(
            sent.last(),
            Some(GraphCommand::ParamEvent {
                event: ParamEvent::SetValue { time, .. },
                ..
            }) if *time == 1.0
        ));
    }

    #[test]
    fn dropping_a_node_releases_it() {
        let clock = Arc::new(ManualClock::new());
        let (graph, commands) = GraphHandle::new(clock, 48000);
        let gain = graph.create_gain(Output::Destination, 1.0);
        let id = gain.id();
        drop(gain);

        let sent: Vec<_> = commands.try_iter().collect();
        assert!(matches!(sent.last(), Some(GraphCommand::Release { node }) if *node == id));
    }
}
