//! Fixed processing chain: master gain followed by a 7-band peaking EQ.
//!
//! The topology never changes after construction; only the master gain and
//! the per-band gains are mutated. Filters use RBJ cookbook peaking
//! coefficients in Direct Form II Transposed with f64 state.

use std::f64::consts::TAU;

/// Centre frequencies of the EQ bands in Hz
pub const EQ_FREQUENCIES: [f32; 7] = [60.0, 170.0, 350.0, 1000.0, 3500.0, 10000.0, 14000.0];

pub const EQ_BANDS: usize = EQ_FREQUENCIES.len();

pub const EQ_Q: f32 = 1.41;

pub const EQ_MIN_DB: f32 = -12.0;
pub const EQ_MAX_DB: f32 = 12.0;

/// Clamp a band gain into the supported range, mapping NaN to flat
pub fn clamp_eq_gain(db: f32) -> f32 {
    if db.is_nan() {
        0.0
    } else {
        db.clamp(EQ_MIN_DB, EQ_MAX_DB)
    }
}

#[derive(Debug, Clone)]
struct PeakingFilter {
    frequency: f32,
    gain_db: f32,
    sample_rate: f32,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // Per-channel DF2T state
    state: Vec<[f64; 2]>,
}

impl PeakingFilter {
    fn new(frequency: f32, sample_rate: f32, channels: usize) -> Self {
        let mut filter = Self {
            frequency,
            gain_db: 0.0,
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            state: vec![[0.0; 2]; channels],
        };
        filter.calculate_coefficients();
        filter
    }

    fn set_gain_db(&mut self, gain_db: f32) {
        let gain_db = clamp_eq_gain(gain_db);
        if (self.gain_db - gain_db).abs() < f32::EPSILON {
            return;
        }
        self.gain_db = gain_db;
        self.calculate_coefficients();
    }

    fn calculate_coefficients(&mut self) {
        let fs = self.sample_rate as f64;
        // Bands above Nyquist are pulled just below it
        let f0 = (self.frequency as f64).min(fs * 0.45);
        let q = EQ_Q as f64;

        let a = 10.0_f64.powf(self.gain_db as f64 / 40.0);
        let w0 = TAU * f0 / fs;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    fn process(&mut self, channel: usize, input: f32) -> f32 {
        let x = input as f64;
        let z = &mut self.state[channel];
        let y = self.b0 * x + z[0];
        z[0] = self.b1 * x - self.a1 * y + z[1];
        z[1] = self.b2 * x - self.a2 * y;
        y as f32
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|z| *z = [0.0; 2]);
    }
}

pub struct ProcessingChain {
    master_gain: f32,
    bands: Vec<PeakingFilter>,
    channels: usize,
}

impl ProcessingChain {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let bands = EQ_FREQUENCIES
            .iter()
            .map(|&freq| PeakingFilter::new(freq, sample_rate as f32, channels))
            .collect();

        Self {
            master_gain: 1.0,
            bands,
            channels,
        }
    }

    /// Linear master gain (1.0 = unity)
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Set a band gain in dB. Returns false for an unknown band.
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) -> bool {
        match self.bands.get_mut(band) {
            Some(filter) => {
                filter.set_gain_db(gain_db);
                true
            }
            None => false,
        }
    }

    pub fn band_gain(&self, band: usize) -> Option<f32> {
        self.bands.get(band).map(|f| f.gain_db)
    }

    pub fn band_gains(&self) -> Vec<f32> {
        self.bands.iter().map(|f| f.gain_db).collect()
    }

    /// Run one interleaved frame through gain and every band in series
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        for (ch, sample) in frame.iter_mut().enumerate().take(self.channels) {
            let mut value = *sample * self.master_gain;
            for band in self.bands.iter_mut() {
                value = band.process(ch, value);
            }
            *sample = value;
        }
    }

    /// Clear filter history, e.g. between tracks
    pub fn reset(&mut self) {
        self.bands.iter_mut().for_each(PeakingFilter::reset);
    }
}
