//! Hardware clock abstraction.
//!
//! Every "play/stop/ramp at time T" call is scheduled against an [`AudioClock`].
//! In a running engine the clock is a [`FrameClock`] advanced by the renderer after
//! each rendered block; offline hosts and tests use a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current audio time in seconds.
pub trait AudioClock: Send + Sync {
    /// Current clock time in seconds. Monotonic.
    fn now(&self) -> f64;
}

/// Clock derived from the number of frames rendered so far.
#[derive(Debug)]
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames rendered since the clock was created.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Called by the renderer once a block has been produced.
    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
