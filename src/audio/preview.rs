// Test sound for checking the device volume without a track loaded
use std::f32::consts::TAU;

use super::buffer::SampleBuffer;

const NOTES_HZ: [f32; 2] = [660.0, 880.0];
const NOTE_SECS: f32 = 0.25;
const AMPLITUDE: f32 = 0.3;
const FADE_SECS: f32 = 0.01;

/// A short two-note chime rendered at `sample_rate`, mono
pub fn test_tone(sample_rate: u32) -> SampleBuffer {
    let rate = sample_rate.max(1) as f32;
    let note_frames = (NOTE_SECS * rate) as usize;
    let fade_frames = ((FADE_SECS * rate) as usize).max(1);

    let samples = NOTES_HZ
        .iter()
        .flat_map(|&freq| {
            (0..note_frames).map(move |i| {
                // Ramp both edges so the notes don't click
                let edge = i.min(note_frames - 1 - i);
                let envelope = (edge as f32 / fade_frames as f32).min(1.0);
                AMPLITUDE * envelope * (TAU * freq * i as f32 / rate).sin()
            })
        })
        .collect();

    SampleBuffer::new(samples, 1, sample_rate)
}
