//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Creating
//! one acquires the input device (the permission step); calling
//! [`AudioCapture::start`] begins streaming [`AudioChunk`]s over an
//! unbounded channel.  The returned [`StreamHandle`] is a RAII guard —
//! dropping it stops the underlying cpal stream, so the session controller
//! can sever capture deterministically on every teardown path.
//!
//! The cpal callback must never block: each hardware buffer is forwarded
//! over the channel as-is (an unbounded send never waits); downmix,
//! resampling and encoding all happen on the receiving side.
//!
//! [`CaptureSource`] / [`AcquiredCapture`] are the seams the controller
//! acquires and starts capture through, so its tests can substitute mocks
//! with no audio hardware present.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
/// Use [`crate::audio::downmix_to_mono`] and [`crate::audio::resample`]
/// to convert to the session's capture format before encoding.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    /// The platform refused access to the input device.  Fatal to the
    /// attempted session; the user must grant access and retry manually.
    #[error("microphone access denied or device unavailable")]
    PermissionDenied,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// Capture seams
// ---------------------------------------------------------------------------

/// Opaque guard that keeps a capture stream alive; drop to stop capture.
pub trait CaptureGuard {}

/// An acquired input device, ready to start streaming.
///
/// Dropping an `AcquiredCapture` without starting it releases the device —
/// the handshake-failure path relies on this.
pub trait AcquiredCapture {
    /// Start delivering chunks into `tx`.
    fn start(&self, tx: UnboundedSender<AudioChunk>) -> Result<Box<dyn CaptureGuard>, CaptureError>;
}

/// Seam through which the controller acquires the microphone.
pub trait CaptureSource {
    /// Acquire the device without starting the stream (the permission step).
    fn acquire(&self) -> Result<Box<dyn AcquiredCapture>, CaptureError>;
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value calls `cpal::Stream::drop` which pauses/stops the
/// underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

impl CaptureGuard for StreamHandle {}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use voicebridge::audio::{AudioCapture, AudioChunk};
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<AudioChunk>();
/// let capture = AudioCapture::new(None).unwrap();
/// let _handle = capture.start(tx).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop capturing.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Create a new [`AudioCapture`] for `device_name`, or the system
    /// default input device when `None`.
    ///
    /// Queries the device's preferred stream configuration (sample rate,
    /// channels, buffer size) so no manual configuration is required.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// [`CaptureError::DeviceNotFound`] when a named device does not exist,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn new(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(name) => host
                .input_devices()
                .map_err(|_| CaptureError::NoDevice)?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
        };

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start capturing and send [`AudioChunk`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each time the
    /// hardware delivers a buffer the raw `f32` samples are wrapped in an
    /// [`AudioChunk`] and forwarded over the channel.  Send errors (receiver
    /// dropped during teardown) are silently ignored so the audio thread
    /// never panics.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::PermissionDenied`] when the platform refuses
    /// the device, or [`CaptureError::BuildStream`] / [`CaptureError::PlayStream`]
    /// if it rejects the stream configuration.
    pub fn start(&self, tx: UnboundedSender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let chunk = AudioChunk {
                        samples: data.to_vec(),
                        sample_rate,
                        channels,
                    };
                    // Ignore send errors; the receiver may have been dropped.
                    let _ = tx.send(chunk);
                },
                |err: cpal::StreamError| {
                    log::error!("capture: cpal stream error: {err}");
                },
                None, // no timeout
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => CaptureError::PermissionDenied,
                other => CaptureError::BuildStream(other),
            })?;

        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => CaptureError::PermissionDenied,
            other => CaptureError::PlayStream(other),
        })?;

        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the capture stream in Hz.
    ///
    /// This is the rate reported by the device (commonly 44 100 or 48 000 Hz).
    /// The controller resamples to the session capture rate before encoding.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`AudioChunk`].
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AcquiredCapture for AudioCapture {
    fn start(&self, tx: UnboundedSender<AudioChunk>) -> Result<Box<dyn CaptureGuard>, CaptureError> {
        AudioCapture::start(self, tx).map(|handle| Box::new(handle) as Box<dyn CaptureGuard>)
    }
}

// ---------------------------------------------------------------------------
// MicSource
// ---------------------------------------------------------------------------

/// Production [`CaptureSource`]: opens the configured (or default)
/// microphone through [`AudioCapture`].
#[derive(Debug, Clone, Default)]
pub struct MicSource {
    /// Input device name; `None` selects the system default.
    pub device_name: Option<String>,
}

impl MicSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl CaptureSource for MicSource {
    fn acquire(&self) -> Result<Box<dyn AcquiredCapture>, CaptureError> {
        let capture = AudioCapture::new(self.device_name.as_deref())?;
        log::info!(
            "capture: acquired input device ({} Hz, {} ch)",
            capture.sample_rate(),
            capture.channels()
        );
        Ok(Box::new(capture))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
