// Audio output using cpal
// The stream lives on its own thread (cpal streams are not Send) and pulls
// frames straight from the engine in the device callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::engine::{EngineHandle, EngineOutputs};
use crate::error::PlayerError;

/// Running output stream. Dropping it stops the device.
pub struct AudioOutput {
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    volume: Arc<AtomicU32>,
}

impl AudioOutput {
    /// Open the default output device and start rendering from a new engine.
    /// `volume` is the device-level volume in percent.
    pub fn spawn(volume: u8) -> Result<(Self, EngineHandle, EngineOutputs), PlayerError> {
        let volume = Arc::new(AtomicU32::new(volume_bits(volume)));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let stream_volume = volume.clone();
        let thread = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let stream = match open_stream(stream_volume) {
                    Ok((stream, engine, outputs)) => {
                        let _ = ready_tx.send(Ok((engine, outputs)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until the handle is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                log::info!("Audio output stopped");
            })
            .map_err(|e| PlayerError::Output(format!("Failed to spawn output thread: {}", e)))?;

        let (engine, outputs) = ready_rx
            .recv()
            .map_err(|_| PlayerError::Output("Output thread exited during startup".to_string()))?
            .map_err(PlayerError::Output)?;

        Ok((
            Self {
                shutdown_tx,
                thread: Some(thread),
                volume,
            },
            engine,
            outputs,
        ))
    }

    /// Set the device-level volume in percent
    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume_bits(volume), Ordering::Relaxed);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn volume_bits(volume: u8) -> u32 {
    (volume.min(100) as f32 / 100.0).to_bits()
}

fn open_stream(volume: Arc<AtomicU32>) -> Result<(Stream, EngineHandle, EngineOutputs), String> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or("No output device available")?;

    let config = device
        .default_output_config()
        .map_err(|e| format!("Failed to get default output config: {}", e))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    log::info!(
        "Output device: {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        config.sample_format()
    );

    let (engine, outputs) = EngineHandle::new(sample_rate, channels);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), engine.clone(), volume)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), engine.clone(), volume)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), engine.clone(), volume)?,
        format => return Err(format!("Unsupported sample format: {:?}", format)),
    };

    stream
        .play()
        .map_err(|e| format!("Failed to start stream: {}", e))?;

    Ok((stream, engine, outputs))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: EngineHandle,
    volume: Arc<AtomicU32>,
) -> Result<Stream, String> {
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let buffer = &mut scratch[..data.len()];
                engine.render(buffer);

                let vol = f32::from_bits(volume.load(Ordering::Relaxed));
                for (out, &value) in data.iter_mut().zip(buffer.iter()) {
                    *out = T::from_sample(value * vol);
                }
            },
            move |err| {
                log::error!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("Failed to build output stream: {}", e))?;

    Ok(stream)
}
