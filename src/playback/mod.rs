//! Playable streams.
//!
//! - [`Effect`]: one-shot, non-looping sound for SFX and notifications
//! - [`LoopStream`]: loop-aware music stem with pause/resume, volume ramps and
//!   transition-out policies
//!
//! Both own their [`AudioAsset`](crate::asset::AudioAsset) and their graph nodes.
//! Playback calls never fail loudly: they return `bool` and the worst case is silence.

mod effect;
mod loop_stream;

pub use effect::Effect;
pub use loop_stream::LoopStream;

use crate::error::{Result, StemflowError};
use serde::Deserialize;

/// Length of the fixed `fade-out` transition.
pub const FADE_OUT_SECS: f64 = 10.0;
/// Extra time after a fade-out ramp before the source is stopped.
pub const FADE_OUT_GUARD_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Where in the buffer playback starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayOffset {
    /// Seconds from the start of the buffer.
    Seconds(f64),
    /// Uniform random point inside the loop window (0 when there is none).
    RandomInLoop,
}

impl Default for PlayOffset {
    fn default() -> Self {
        Self::Seconds(0.0)
    }
}

impl From<f64> for PlayOffset {
    fn from(seconds: f64) -> Self {
        Self::Seconds(seconds)
    }
}

/// How a stem leaves the active set of a music state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionPolicy {
    /// Stop immediately.
    #[default]
    Cut,
    /// Play on to the loop end (or the buffer end when not looping).
    WaitEnd,
    /// Play on to the next beat boundary.
    CutOnBeat,
    /// Fade to silence over [`FADE_OUT_SECS`].
    FadeOut,
}

/// `[start, end)` range of a buffer, in seconds, that repeats once playback enters it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopWindow {
    start: f64,
    end: f64,
}

impl LoopWindow {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || start >= end {
            return Err(StemflowError::Configuration(format!(
                "invalid loop window [{}, {})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds a window from raw config points.
    ///
    /// A zero or degenerate pair means "no loop". Points that look like milliseconds
    /// (start > 1000 and end > 2000) are converted to seconds.
    pub fn from_points(start: f64, end: f64) -> Result<Option<Self>> {
        if start == 0.0 || end == 0.0 || start == end {
            return Ok(None);
        }
        let (start, end) = if start > 1000.0 && end > 2000.0 {
            (start / 1000.0, end / 1000.0)
        } else {
            (start, end)
        };
        Self::new(start, end).map(Some)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// Maps time elapsed since the logical start of playback to a buffer position.
    pub fn position(&self, elapsed: f64) -> f64 {
        if elapsed < self.end {
            elapsed
        } else {
            self.start + (elapsed - self.start).rem_euclid(self.len())
        }
    }
}

/// Common surface of everything the manager can hand out.
pub trait Playable {
    fn id(&self) -> &str;
    /// Starts playback `delay` seconds from now. Returns `false` if playback could not
    /// start yet (asset still loading) or ever (asset failed).
    fn play(&mut self, delay: f64, offset: PlayOffset) -> bool;
    fn stop(&mut self, delay: f64) -> bool;
    fn is_playing(&self) -> bool;
    /// Runs deferred work: load completions, retries and natural-end detection.
    fn update(&mut self);
}

/// A play request parked until the asset finishes loading.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingPlay {
    pub generation: u64,
    pub delay: f64,
    pub offset: PlayOffset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_degenerate_points_mean_no_loop() {
        assert_eq!(LoopWindow::from_points(0.0, 0.0).unwrap(), None);
        assert_eq!(LoopWindow::from_points(0.0, 12.0).unwrap(), None);
        assert_eq!(LoopWindow::from_points(5.0, 5.0).unwrap(), None);
    }

    #[test]
    fn millisecond_points_are_converted() {
        let window = LoopWindow::from_points(1500.0, 30000.0).unwrap().unwrap();
        assert_eq!(window.start(), 1.5);
        assert_eq!(window.end(), 30.0);
    }

    #[test]
    fn inverted_points_are_rejected() {
        assert!(LoopWindow::from_points(10.0, 4.0).is_err());
    }

    #[test]
    fn position_wraps_inside_the_window() {
        let window = LoopWindow::new(2.0, 6.0).unwrap();
        assert_eq!(window.position(1.0), 1.0);
        assert_eq!(window.position(5.0), 5.0);
        assert_eq!(window.position(6.0), 2.0);
        assert_eq!(window.position(15.0), 3.0);
    }

    #[test]
    fn policies_parse_from_kebab_case() {
        let policies: Vec<TransitionPolicy> =
            serde_json::from_str(r#"["cut","wait-end","cut-on-beat","fade-out"]"#).unwrap();
        assert_eq!(
            policies,
            [
                TransitionPolicy::Cut,
                TransitionPolicy::WaitEnd,
                TransitionPolicy::CutOnBeat,
                TransitionPolicy::FadeOut
            ]
        );
    }
}
