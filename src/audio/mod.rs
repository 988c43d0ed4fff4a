//! Audio pipeline — capture, format conversion, wire codec, scheduled playback.
//!
//! # Outbound
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix_to_mono
//!           → resample → codec::encode → EncodedPacket → transport
//! ```
//!
//! # Inbound
//!
//! ```text
//! transport → codec::decode → PlaybackScheduler::enqueue → PlaybackSink
//!                               │ (timeline reservation)      │
//!                               └──── on_finished ◀───────────┘
//! ```

pub mod capture;
pub mod codec;
pub mod playback;
pub mod resample;
pub mod scheduler;

pub use capture::{
    AcquiredCapture, AudioCapture, AudioChunk, CaptureError, CaptureGuard, CaptureSource,
    MicSource, StreamHandle,
};
pub use codec::{decode, encode, CodecError, DecodedAudio, EncodedPacket};
pub use playback::{BufferId, DeviceSink, PlaybackError, PlaybackSink};
pub use resample::{downmix_to_mono, resample};
pub use scheduler::{PlaybackScheduler, ScheduledBuffer};
