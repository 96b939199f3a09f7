// A single playing cursor over a decoded buffer
use std::sync::Arc;

use super::buffer::SampleBuffer;

pub struct BufferSource {
    id: u64,
    buffer: Arc<SampleBuffer>,
    /// Fractional read position in buffer frames
    cursor: f64,
    rate: f64,
}

impl BufferSource {
    /// Create a source that starts reading at `offset_secs` at the given rate
    pub fn new(id: u64, buffer: Arc<SampleBuffer>, offset_secs: f64, rate: f64) -> Self {
        let cursor = (offset_secs.max(0.0) * buffer.sample_rate() as f64).min(buffer.frames() as f64);
        Self {
            id,
            buffer,
            cursor,
            rate: sanitize_rate(rate),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = sanitize_rate(rate);
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current read position in seconds
    pub fn position(&self) -> f64 {
        self.cursor / self.buffer.sample_rate() as f64
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.buffer.frames() as f64
    }

    /// Fill one output frame and advance by the playback rate.
    /// Returns false (and writes silence) once the buffer is exhausted.
    pub fn render_frame(&mut self, out: &mut [f32]) -> bool {
        if self.is_exhausted() {
            out.fill(0.0);
            return false;
        }

        let index = self.cursor.floor() as usize;
        let frac = (self.cursor - index as f64) as f32;
        let next = (index + 1).min(self.buffer.frames() - 1);
        let out_channels = out.len();

        for (ch, sample) in out.iter_mut().enumerate() {
            let (a, b) = if out_channels == 1 && self.buffer.channels() > 1 {
                (mix_down(&self.buffer, index), mix_down(&self.buffer, next))
            } else {
                (self.buffer.sample(index, ch), self.buffer.sample(next, ch))
            };
            *sample = a + (b - a) * frac;
        }

        self.cursor += self.rate;
        true
    }
}

fn mix_down(buffer: &SampleBuffer, frame: usize) -> f32 {
    let channels = buffer.channels();
    (0..channels).map(|ch| buffer.sample(frame, ch)).sum::<f32>() / channels as f32
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        1.0
    }
}
