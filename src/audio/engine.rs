// Render engine
// Owns the single active source, the processing chain and the audio clock.
// A preview voice (the test sound) is mixed in after the chain and the
// analysis tap, so only the device volume applies to it.
// The output callback (or a test) pulls frames through `EngineHandle::render`.

use parking_lot::Mutex;
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::analyser::{analysis_tap, Analyser, TapProducer};
use super::buffer::SampleBuffer;
use super::chain::ProcessingChain;
use super::source::BufferSource;
use crate::transport::AudioClock;

/// Sent from the render thread when a source plays out its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEnded {
    pub source_id: u64,
}

/// Clock counting frames handed to the device
pub struct EngineClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock for EngineClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }
}

struct Engine {
    source: Option<BufferSource>,
    preview: Option<BufferSource>,
    preview_frame: Vec<f32>,
    chain: ProcessingChain,
    tap: TapProducer,
    channels: usize,
    clock: Arc<EngineClock>,
    ended_tx: UnboundedSender<SourceEnded>,
    next_source_id: u64,
}

impl Engine {
    fn render(&mut self, out: &mut [f32]) {
        let channels = self.channels;
        let mut frames = 0u64;
        let mut ended = None;

        for frame in out.chunks_exact_mut(channels) {
            let produced = match self.source.as_mut() {
                Some(source) => source.render_frame(frame),
                None => {
                    frame.fill(0.0);
                    false
                }
            };

            if !produced {
                if let Some(source) = self.source.take() {
                    ended = Some(source.id());
                }
            }

            self.chain.process_frame(frame);

            let mono = frame.iter().sum::<f32>() / channels as f32;
            let _ = self.tap.try_push(mono);

            if let Some(preview) = self.preview.as_mut() {
                if preview.render_frame(&mut self.preview_frame) {
                    frame
                        .iter_mut()
                        .zip(&self.preview_frame)
                        .for_each(|(out, p)| *out += p);
                } else {
                    self.preview = None;
                }
            }
            frames += 1;
        }

        self.clock.frames.fetch_add(frames, Ordering::Release);

        // Reported after the clock moves so listeners see the final position
        if let Some(source_id) = ended {
            let _ = self.ended_tx.send(SourceEnded { source_id });
        }
    }
}

/// Channels the engine hands to its single consumer
pub struct EngineOutputs {
    pub ended: UnboundedReceiver<SourceEnded>,
    pub analyser: Analyser,
}

#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<Mutex<Engine>>,
    clock: Arc<EngineClock>,
    sample_rate: u32,
}

impl EngineHandle {
    pub fn new(sample_rate: u32, channels: usize) -> (Self, EngineOutputs) {
        let sample_rate = sample_rate.max(1);
        let channels = channels.max(1);
        let clock = Arc::new(EngineClock {
            frames: AtomicU64::new(0),
            sample_rate,
        });
        let (ended_tx, ended) = mpsc::unbounded_channel();
        let (tap, analyser) = analysis_tap();

        let engine = Engine {
            source: None,
            preview: None,
            preview_frame: vec![0.0; channels],
            chain: ProcessingChain::new(sample_rate, channels),
            tap,
            channels,
            clock: clock.clone(),
            ended_tx,
            next_source_id: 1,
        };

        let handle = Self {
            engine: Arc::new(Mutex::new(engine)),
            clock,
            sample_rate,
        };

        (handle, EngineOutputs { ended, analyser })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    /// Replace the active source. The previous source is torn down before
    /// the new one exists, so at most one source is ever audible.
    pub fn start_source(&self, buffer: Arc<SampleBuffer>, offset_secs: f64, rate: f64) -> u64 {
        let mut engine = self.engine.lock();
        engine.source = None;

        let id = engine.next_source_id;
        engine.next_source_id += 1;
        engine.source = Some(BufferSource::new(id, buffer, offset_secs, rate));
        id
    }

    /// Silence the active source. Safe to call with nothing playing.
    pub fn stop_source(&self) -> bool {
        self.engine.lock().source.take().is_some()
    }

    /// Play `buffer` once outside the processing chain, replacing any
    /// preview still sounding. Does not touch the clock or end reporting.
    pub fn play_preview(&self, buffer: Arc<SampleBuffer>) {
        self.engine.lock().preview = Some(BufferSource::new(0, buffer, 0.0, 1.0));
    }

    pub fn is_previewing(&self) -> bool {
        self.engine.lock().preview.is_some()
    }

    pub fn active_source(&self) -> Option<u64> {
        self.engine.lock().source.as_ref().map(BufferSource::id)
    }

    pub fn set_source_rate(&self, rate: f64) {
        if let Some(source) = self.engine.lock().source.as_mut() {
            source.set_rate(rate);
        }
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.engine.lock().chain.set_master_gain(gain);
    }

    pub fn master_gain(&self) -> f32 {
        self.engine.lock().chain.master_gain()
    }

    pub fn set_eq_gain(&self, band: usize, gain_db: f32) -> bool {
        self.engine.lock().chain.set_band_gain(band, gain_db)
    }

    /// Clear filter state left over from the previous track
    pub fn reset_processing(&self) {
        self.engine.lock().chain.reset();
    }

    pub fn eq_gains(&self) -> Vec<f32> {
        self.engine.lock().chain.band_gains()
    }

    /// Render interleaved frames into `out` and advance the clock
    pub fn render(&self, out: &mut [f32]) {
        self.engine.lock().render(out);
    }

    /// Render `seconds` worth of audio into a scratch buffer
    #[cfg(test)]
    pub(crate) fn render_for(&self, seconds: f64) {
        let frames = (seconds * self.sample_rate as f64).round() as usize;
        let channels = self.engine.lock().channels;
        let mut scratch = vec![0.0f32; 1024 * channels];
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(1024);
            self.render(&mut scratch[..n * channels]);
            remaining -= n;
        }
    }
}
