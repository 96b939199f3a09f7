// Audio decoder using Symphonia
// Decodes an in-memory file image to interleaved PCM, resampled to the output rate

use rubato::{FftFixedIn, Resampler};
use std::io::Cursor;
use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use super::buffer::SampleBuffer;

/// Input chunk size fed to the resampler
const RESAMPLE_CHUNK: usize = 1024;

struct PacketDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl PacketDecoder {
    fn open(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, String> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Create a hint using the file extension
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("Failed to probe file format: {}", e))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| "No audio track found".to_string())?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode next packet, returns interleaved f32 samples
    /// Returns None when end of stream is reached
    fn decode_next(&mut self) -> Result<Option<Vec<f32>>, String> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(format!("Failed to read packet: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    // Pick up the real layout from the first decoded buffer
                    let spec = decoded.spec();
                    self.channels = spec.channels.count();
                    self.sample_rate = spec.rate;
                    return Ok(Some(audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(format!("Decode failed: {}", e)),
            }
        }
    }
}

/// Decode a complete file image into a buffer at `target_rate`.
///
/// `extension` is only a probe hint; the container is sniffed from the bytes.
pub fn decode_to_buffer(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_rate: u32,
) -> Result<SampleBuffer, String> {
    let mut decoder = PacketDecoder::open(bytes, extension)?;

    let mut samples = Vec::new();
    while let Some(mut chunk) = decoder.decode_next()? {
        samples.append(&mut chunk);
    }

    if samples.is_empty() {
        return Err("File contains no audio frames".to_string());
    }

    let channels = decoder.channels.max(1);
    let source_rate = decoder.sample_rate;

    if source_rate == target_rate {
        return Ok(SampleBuffer::new(samples, channels, source_rate));
    }

    let resampled = resample(&samples, channels, source_rate, target_rate)?;
    Ok(SampleBuffer::new(resampled, channels, target_rate))
}

/// Convert interleaved samples from one rate to another
fn resample(
    interleaved: &[f32],
    channels: usize,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, String> {
    let frames = interleaved.len() / channels;
    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| interleaved.iter().skip(ch).step_by(channels).copied().collect())
        .collect();

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        2,
        channels,
    )
    .map_err(|e| format!("Failed to create resampler: {}", e))?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= frames {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + needed]).collect();
        let out = resampler
            .process(chunk.as_slice(), None)
            .map_err(|e| format!("Resample failed: {}", e))?;
        append_planar(&mut output, out);
        pos += needed;
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        let out = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| format!("Resample failed: {}", e))?;
        append_planar(&mut output, out);
    }

    // Flush the filter delay
    let mut flushes = 0;
    while output[0].len() < delay + expected && flushes < 8 {
        let out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| format!("Resample failed: {}", e))?;
        append_planar(&mut output, out);
        flushes += 1;
    }

    let available = output[0].len().saturating_sub(delay).min(expected);
    let mut interleaved_out = Vec::with_capacity(available * channels);
    for frame in delay..delay + available {
        for channel in &output {
            interleaved_out.push(channel[frame]);
        }
    }

    Ok(interleaved_out)
}

fn append_planar(output: &mut [Vec<f32>], chunk: Vec<Vec<f32>>) {
    for (dst, src) in output.iter_mut().zip(chunk) {
        dst.extend_from_slice(&src);
    }
}

/// Convert any AudioBufferRef to interleaved f32 samples
fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
    match buf {
        AudioBufferRef::F32(b) => interleave_convert(b.planes(), b.frames(), |s: f32| s),
        AudioBufferRef::F64(b) => interleave_convert(b.planes(), b.frames(), |s: f64| s as f32),
        AudioBufferRef::S8(b) => {
            let scale = 1.0 / 128.0;
            interleave_convert(b.planes(), b.frames(), |s: i8| s as f32 * scale)
        }
        AudioBufferRef::S16(b) => {
            let scale = 1.0 / 32768.0;
            interleave_convert(b.planes(), b.frames(), |s: i16| s as f32 * scale)
        }
        AudioBufferRef::S24(b) => {
            let scale = 1.0 / 8388608.0;
            interleave_convert(b.planes(), b.frames(), |s| s.inner() as f32 * scale)
        }
        AudioBufferRef::S32(b) => {
            let scale = 1.0 / 2147483648.0;
            interleave_convert(b.planes(), b.frames(), |s: i32| s as f32 * scale)
        }
        AudioBufferRef::U8(b) => {
            interleave_convert(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => {
            interleave_convert(b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => interleave_convert(b.planes(), b.frames(), |s| {
            (s.inner() as f32 - 8388608.0) / 8388608.0
        }),
        AudioBufferRef::U32(b) => interleave_convert(b.planes(), b.frames(), |s: u32| {
            (s as f64 - 2147483648.0) as f32 / 2147483648.0
        }),
    }
}

fn interleave_convert<T: Sample + Copy, F: Fn(T) -> f32>(
    planes: AudioPlanes<T>,
    frames: usize,
    convert: F,
) -> Vec<f32> {
    let planes = planes.planes();
    let num_channels = planes.len();
    if num_channels == 0 || frames == 0 {
        return vec![];
    }

    let mut interleaved = Vec::with_capacity(frames * num_channels);
    for frame in 0..frames {
        for plane in planes.iter() {
            interleaved.push(convert(plane[frame]));
        }
    }

    interleaved
}
