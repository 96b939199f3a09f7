// Decoded audio held fully in memory

/// Interleaved f32 frames at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        // Drop a trailing partial frame
        samples.truncate(samples.len() - samples.len() % channels);

        Self {
            samples,
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample at `frame` for channel `channel`. Channels past the buffer's
    /// last channel read the last one, so mono feeds every output channel.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let ch = channel.min(self.channels - 1);
        self.samples
            .get(frame * self.channels + ch)
            .copied()
            .unwrap_or(0.0)
    }
}
