//! PCM wire codec
//!
//! Converts between normalized f32 sample buffers and the transport's
//! base64-encoded 16-bit little-endian PCM chunks, and decodes the
//! model's mime-typed inbound chunks (raw PCM at a declared rate, or a
//! WAV container) into buffers at the output sink's rate.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::audio::PlaybackUnit;
use crate::{Error, Result};

/// One unit of encoded audio on the wire.
///
/// Serializes directly as a `mediaChunks` entry in the realtime protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    /// Self-describing mime, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

/// Encode a capture frame as base64 16-bit LE PCM.
///
/// Out-of-range samples are clamped to [-1, 1] before quantizing, so a
/// hot microphone never wraps around.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        // Vec<u8> writes cannot fail
        let _ = bytes.write_i16::<LittleEndian>(quantized);
    }

    EncodedChunk {
        mime_type: format!("audio/pcm;rate={sample_rate}"),
        data: BASE64.encode(bytes),
    }
}

/// Decode an inbound chunk into a playable unit at `target_rate`.
///
/// Recognizes raw PCM (`audio/pcm;rate=N`) and WAV containers; stereo is
/// downmixed to mono, and sources at a foreign rate are resampled.
///
/// # Errors
///
/// Returns `Error::Decode` on bad base64, an unrecognized mime type, or a
/// malformed container. Callers drop the chunk and keep the session alive.
pub fn decode_chunk(chunk: &EncodedChunk, target_rate: u32) -> Result<PlaybackUnit> {
    let bytes = BASE64
        .decode(&chunk.data)
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}")))?;

    let mime = chunk.mime_type.trim();
    let (samples, source_rate) = if let Some(rate) = pcm_rate(mime) {
        (decode_pcm16(&bytes)?, rate)
    } else if is_wav_mime(mime) {
        decode_wav(&bytes)?
    } else {
        return Err(Error::Decode(format!("unrecognized mime type: {mime}")));
    };

    let samples = if source_rate == target_rate {
        samples
    } else {
        resample(&samples, source_rate, target_rate)?
    };

    #[allow(clippy::cast_precision_loss)]
    let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(target_rate));

    Ok(PlaybackUnit {
        samples,
        sample_rate: target_rate,
        duration,
    })
}

/// Extract the declared rate from an `audio/pcm;rate=N` mime type
fn pcm_rate(mime: &str) -> Option<u32> {
    let mut parts = mime.split(';');
    if parts.next().map(str::trim) != Some("audio/pcm") {
        return None;
    }

    parts
        .find_map(|p| p.trim().strip_prefix("rate="))
        .and_then(|r| r.parse().ok())
}

fn is_wav_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    matches!(essence, "audio/wav" | "audio/wave" | "audio/x-wav")
}

/// Decode raw 16-bit LE PCM bytes to normalized f32
fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(Error::Decode("empty PCM payload".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(
            "PCM payload length must be even for 16-bit samples".to_string(),
        ));
    }

    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(f32::from(sample) / 32768.0);
    }

    Ok(samples)
}

/// Decode a WAV container to mono f32 plus its declared rate
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Decode(format!("malformed WAV header: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(format!("truncated WAV data: {e}")))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(format!("truncated WAV data: {e}")))?,
        (format, bits) => {
            return Err(Error::Decode(format!(
                "unsupported WAV sample format: {format:?}/{bits}-bit"
            )));
        }
    };

    let samples = match spec.channels {
        1 => interleaved,
        2 => interleaved
            .chunks(2)
            .map(|frame| f32::midpoint(frame[0], frame.get(1).copied().unwrap_or(frame[0])))
            .collect(),
        n => return Err(Error::Decode(format!("unsupported channel count: {n}"))),
    };

    Ok((samples, spec.sample_rate))
}

/// Resample audio using rubato
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Decode(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();

    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        // The FFT resampler only accepts full chunks; zero-pad the tail
        let frame = if chunk.len() == chunk_size {
            chunk.to_vec()
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        };

        let result = resampler
            .process(&[frame], None)
            .map_err(|e| Error::Decode(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}
