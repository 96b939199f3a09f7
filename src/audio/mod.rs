// Audio playback module
// Symphonia decodes whole files into memory; the engine renders the active
// source through the processing chain, and cpal pulls from the engine.

pub mod analyser;
pub mod buffer;
pub mod chain;
pub mod decoder;
pub mod engine;
#[cfg(feature = "device-output")]
pub mod output;
pub mod preview;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::SampleBuffer;
pub use engine::{EngineHandle, EngineOutputs, SourceEnded};
