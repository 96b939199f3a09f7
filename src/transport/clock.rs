// Audio clock sources
use parking_lot::Mutex;

/// A monotonic clock driven by the audio device, in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock advanced by hand. Used where no device is rendering.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward; negative steps are ignored
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            *self.now.lock() += seconds;
        }
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
