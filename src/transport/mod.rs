//! Playback transport and timing model.
//!
//! Track position is never accumulated. While playing it is derived from the
//! audio clock as `(now - clock_anchor) * rate`, clamped to the track; while
//! stopped it is exactly `position_at_stop`. The marker records where the
//! current run began so a "stop with return" can rewind to it.

mod clock;

pub use clock::{AudioClock, ManualClock};

use std::sync::Arc;

/// Tolerance for treating a finished source as a natural end of track
pub const END_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub playing: bool,
    /// Position reported while not playing; stale while playing
    pub position_at_stop: f64,
    /// Origin of the current run, the rewind target
    pub marker_position: f64,
    /// Clock time at which track position 0 would have played at `rate`
    pub clock_anchor: f64,
    pub rate: f64,
    /// Set when the track played out; cleared by the next start or seek
    pub finished: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            playing: false,
            position_at_stop: 0.0,
            marker_position: 0.0,
            clock_anchor: 0.0,
            rate: 1.0,
            finished: false,
        }
    }
}

pub struct TransportClock {
    clock: Arc<dyn AudioClock>,
    state: TransportState,
    duration: f64,
}

impl TransportClock {
    pub fn new(clock: Arc<dyn AudioClock>, duration: f64, rate: f64) -> Self {
        let mut state = TransportState::default();
        if is_valid_rate(rate) {
            state.rate = rate;
        }

        Self {
            clock,
            state,
            duration: duration.max(0.0),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn rate(&self) -> f64 {
        self.state.rate
    }

    pub fn marker_position(&self) -> f64 {
        self.state.marker_position
    }

    pub fn position_at_stop(&self) -> f64 {
        self.state.position_at_stop
    }

    /// Whether the transport stopped because the track played out
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    fn clamp_position(&self, position: f64) -> f64 {
        if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, self.duration)
        }
    }

    /// Begin a run at `position`. The position becomes the new marker.
    /// Returns the clamped start position.
    pub fn start(&mut self, position: f64) -> f64 {
        let position = self.clamp_position(position);
        self.state.marker_position = position;
        self.state.position_at_stop = position;
        self.state.clock_anchor = self.clock.now() - position / self.state.rate;
        self.state.playing = true;
        self.state.finished = false;
        position
    }

    /// Ordinary pause: remembers the current position, keeps the marker
    pub fn pause(&mut self) -> bool {
        if !self.state.playing {
            return false;
        }
        self.state.position_at_stop = self.current_position();
        self.state.playing = false;
        true
    }

    /// Stop and rewind to where the current run began
    pub fn stop_with_return(&mut self) -> bool {
        if !self.state.playing {
            return false;
        }
        self.state.position_at_stop = self.state.marker_position;
        self.state.playing = false;
        true
    }

    /// Explicit scrub. While playing this restarts the run at `position`;
    /// while stopped only the stop position moves.
    pub fn seek(&mut self, position: f64) -> f64 {
        let position = self.clamp_position(position);
        if self.state.playing {
            self.start(position)
        } else {
            self.state.position_at_stop = position;
            self.state.finished = false;
            position
        }
    }

    /// Change speed without moving the current position.
    /// Non-positive or non-finite rates are ignored.
    pub fn set_rate(&mut self, rate: f64) -> bool {
        if !is_valid_rate(rate) {
            log::warn!("Ignoring invalid playback rate {}", rate);
            return false;
        }
        if self.state.playing {
            let position = self.current_position();
            self.state.clock_anchor = self.clock.now() - position / rate;
        }
        self.state.rate = rate;
        true
    }

    pub fn current_position(&self) -> f64 {
        if !self.state.playing {
            return self.state.position_at_stop;
        }
        let elapsed = (self.clock.now() - self.state.clock_anchor) * self.state.rate;
        self.clamp_position(elapsed)
    }

    /// Whether a finished source counts as the end of the track. Only for
    /// judging a source that ran out; use `is_finished` for anything else.
    fn has_reached_end(&self) -> bool {
        self.current_position() + END_TOLERANCE_SECS >= self.duration
    }

    /// Handle the source running out. Returns true when this was a natural
    /// end of track, leaving the transport stopped at the end.
    pub fn on_reached_end(&mut self) -> bool {
        if !self.state.playing || !self.has_reached_end() {
            return false;
        }
        self.state.position_at_stop = self.duration;
        self.state.playing = false;
        self.state.finished = true;
        true
    }
}

fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}
