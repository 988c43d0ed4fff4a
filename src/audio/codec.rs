//! PCM wire codec — normalized `f32` samples ⇄ base64 PCM16-LE envelopes.
//!
//! The agent endpoint exchanges audio as base64 text wrapping 16-bit
//! little-endian PCM, tagged with a `audio/pcm;rate=<hz>` mime descriptor.
//! This module is the pure conversion layer:
//!
//! 1. [`encode`] — outbound: `f32` in `[-1.0, 1.0]` → [`EncodedPacket`].
//! 2. [`decode`] — inbound: envelope payload → one `f32` buffer per channel.
//!
//! Both directions are allocation-per-call and carry no state.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors produced while unwrapping an inbound audio envelope.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The payload is not decodable as PCM16 for the given channel count —
    /// either the base64 text is invalid or the byte length is not a
    /// multiple of `2 × channels`.
    #[error("malformed audio payload: {0}")]
    MalformedPayload(String),
}

// ---------------------------------------------------------------------------
// EncodedPacket
// ---------------------------------------------------------------------------

/// Wire-safe text envelope for one block of outbound or inbound audio.
///
/// `data` is base64 over interleaved PCM16-LE bytes; `mime_type` carries the
/// sample rate the bytes were captured (or synthesized) at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Mime descriptor, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// Base64 text over the raw PCM16-LE bytes.
    pub data: String,
}

impl EncodedPacket {
    /// Build the mime descriptor for a given sample rate.
    pub fn mime_for_rate(sample_rate: u32) -> String {
        format!("audio/pcm;rate={sample_rate}")
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Encode normalized `f32` samples into a wire envelope.
///
/// Each sample is multiplied by 32768 and truncated to `i16` (no dithering;
/// values outside `[-1.0, 1.0]` saturate), packed little-endian and base64'd.
///
/// # Example
///
/// ```rust
/// use voicebridge::audio::codec::encode;
///
/// let packet = encode(&[0.0_f32, 0.5, -0.5], 16_000);
/// assert_eq!(packet.mime_type, "audio/pcm;rate=16000");
/// assert!(!packet.data.is_empty());
/// ```
pub fn encode(samples: &[f32], sample_rate: u32) -> EncodedPacket {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        // `as i16` truncates toward zero and saturates at the type bounds.
        let v = (s * 32768.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    EncodedPacket {
        mime_type: EncodedPacket::mime_for_rate(sample_rate),
        data: BASE64.encode(bytes),
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// One decoded block of audio: a buffer per channel, aligned in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// De-interleaved channel buffers; all the same length.
    pub channels: Vec<Vec<f32>>,
    /// Sample rate of the buffers in Hz.
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of sample frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration of this block in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Collapse the block to one mono buffer by averaging the channels.
    ///
    /// The single-channel fast path moves the buffer out without copying.
    pub fn mixdown(self) -> Vec<f32> {
        let mut channels = self.channels;
        match channels.len() {
            0 => Vec::new(),
            1 => channels.pop().unwrap_or_default(),
            n => {
                let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
                (0..frames)
                    .map(|i| channels.iter().map(|ch| ch[i]).sum::<f32>() / n as f32)
                    .collect()
            }
        }
    }
}

/// Decode an envelope payload into per-channel normalized `f32` buffers.
///
/// `data` is the base64 payload text; `sample_rate` and `channel_count`
/// describe the format the agent synthesizes at (they are fixed per session,
/// not carried per chunk).
///
/// An empty payload decodes to empty buffers — silence gaps are not errors.
///
/// # Errors
///
/// [`CodecError::MalformedPayload`] when the base64 text is invalid or the
/// byte length is not a multiple of `2 × channel_count`.
pub fn decode(
    data: &str,
    sample_rate: u32,
    channel_count: u16,
) -> Result<DecodedAudio, CodecError> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| CodecError::MalformedPayload(format!("invalid base64: {e}")))?;

    let channels = channel_count.max(1) as usize;
    let frame_bytes = 2 * channels;

    if bytes.len() % frame_bytes != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "{} bytes is not a whole number of {channels}-channel PCM16 frames",
            bytes.len()
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut out = vec![Vec::with_capacity(frames); channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample) in frame.chunks_exact(2).enumerate() {
            let v = i16::from_le_bytes([sample[0], sample[1]]);
            out[ch].push(v as f32 / 32768.0);
        }
    }

    Ok(DecodedAudio {
        channels: out,
        sample_rate,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
