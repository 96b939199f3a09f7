// Spectral analysis tap
// The render thread pushes post-chain mono samples into a ring buffer;
// the UI side drains it on each tick and runs a windowed FFT.

use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

pub const FFT_SIZE: usize = 512;

/// Number of magnitude bins produced per analysis
pub const FREQUENCY_BINS: usize = FFT_SIZE / 2;

const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Ring capacity between the render thread and the analyser
const TAP_CAPACITY: usize = FFT_SIZE * 16;

pub type TapProducer = ringbuf::HeapProd<f32>;
type TapConsumer = ringbuf::HeapCons<f32>;

/// Create the producer/analyser pair for one engine
pub fn analysis_tap() -> (TapProducer, Analyser) {
    let (producer, consumer) = HeapRb::<f32>::new(TAP_CAPACITY).split();
    (producer, Analyser::new(consumer))
}

pub struct Analyser {
    tap: TapConsumer,
    history: VecDeque<f32>,
    scratch: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl Analyser {
    fn new(tap: TapConsumer) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Blackman window
        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = std::f32::consts::TAU * i as f32 / n;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            tap,
            history: VecDeque::from(vec![0.0; FFT_SIZE]),
            scratch: vec![0.0; TAP_CAPACITY],
            fft,
            window,
            smoothed: vec![0.0; FREQUENCY_BINS],
        }
    }

    /// Pull everything the render thread produced since the last call
    fn drain(&mut self) {
        loop {
            let n = self.tap.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            for &sample in &self.scratch[..n] {
                if self.history.len() == FFT_SIZE {
                    self.history.pop_front();
                }
                self.history.push_back(sample);
            }
        }
    }

    /// Byte magnitudes (0..=255) for the most recent FFT_SIZE samples
    pub fn frequency_data(&mut self) -> Vec<u8> {
        self.drain();

        let mut spectrum: Vec<Complex<f32>> = self
            .history
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut spectrum);

        let scale = 1.0 / FFT_SIZE as f32;
        self.smoothed
            .iter_mut()
            .zip(&spectrum[..FREQUENCY_BINS])
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() * scale;
                *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
                let db = if *smoothed > 0.0 {
                    20.0 * smoothed.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let scaled = 255.0 * (db - MIN_DB) / (MAX_DB - MIN_DB);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Forget history and smoothing, e.g. when a new track starts
    pub fn reset(&mut self) {
        self.drain();
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}
