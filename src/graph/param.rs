//! Automation timeline for a single gain parameter.
//!
//! The same type is used on both sides of the command channel: the control side keeps
//! a mirror so it can read the instantaneous value when anchoring a new ramp, and the
//! renderer evaluates it once per output frame.

/// One scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },
    /// Ramp linearly from the previous event to `value`, arriving at `time`.
    LinearRamp { value: f32, time: f64 },
}

impl ParamEvent {
    pub fn time(&self) -> f64 {
        match self {
            Self::SetValue { time, .. } | Self::LinearRamp { time, .. } => *time,
        }
    }

    pub fn value(&self) -> f32 {
        match self {
            Self::SetValue { value, .. } | Self::LinearRamp { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioParam {
    default_value: f32,
    /// Sorted by time; events sharing a timestamp keep insertion order.
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self {
            default_value: value,
            events: Vec::new(),
        }
    }

    /// Replaces the whole timeline with a constant value.
    pub fn set_value(&mut self, value: f32) {
        self.events.clear();
        self.default_value = value;
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::SetValue { value, time });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::LinearRamp { value, time });
    }

    /// Removes every event scheduled at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    pub fn apply(&mut self, event: ParamEvent) {
        self.insert(event);
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let idx = self.events.partition_point(|e| e.time() <= t);
        let (anchor_time, anchor_value) = match idx.checked_sub(1) {
            Some(prev) => (Some(self.events[prev].time()), self.events[prev].value()),
            None => (None, self.default_value),
        };

        match (self.events.get(idx), anchor_time) {
            (Some(ParamEvent::LinearRamp { value, time }), Some(t0)) if *time > t0 => {
                let progress = ((t - t0) / (time - t0)) as f32;
                anchor_value + (value - anchor_value) * progress
            }
            _ => anchor_value,
        }
    }

    /// Drops events that can no longer influence values at or after `t`.
    ///
    /// The last event at or before `t` is kept because it anchors any ramp that follows.
    pub fn prune_before(&mut self, t: f64) {
        let idx = self.events.partition_point(|e| e.time() <= t);
        if idx >= 2 {
            self.default_value = self.events[idx - 2].value();
            self.events.drain(..idx - 1);
        }
    }

    fn insert(&mut self, event: ParamEvent) {
        let time = event.time();
        let idx = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(idx, event);
    }
}
