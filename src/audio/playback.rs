//! Device playback sink — scheduled buffer output via `cpal`.
//!
//! [`PlaybackSink`] is the boundary the scheduler talks to: it accepts a
//! decoded buffer plus an absolute start time on the sink's own clock, and
//! emits exactly one end-of-playback notification per naturally finished
//! buffer.  [`DeviceSink`] is the production implementation; the scheduler
//! tests use a mock instead.
//!
//! `DeviceSink` owns its `cpal::Stream` on a dedicated thread (the stream
//! type is not `Send` on every platform) and shares only the buffer queue
//! and the output-frame counter with callers, so the sink itself is
//! `Send + Sync` and can sit behind an `Arc<dyn PlaybackSink>`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

// ---------------------------------------------------------------------------
// BufferId / PlaybackSink
// ---------------------------------------------------------------------------

/// Identifier the scheduler assigns to each scheduled buffer.
pub type BufferId = u64;

/// Output boundary for scheduled audio.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc<dyn PlaybackSink>` by the scheduler.
///
/// # Contract
///
/// - [`clock`](Self::clock) only ever increases while the sink is alive.
/// - A buffer handed to [`play_at`](Self::play_at) either finishes (one
///   completion notification) or is cancelled by [`stop_all`](Self::stop_all)
///   (no notification).
pub trait PlaybackSink: Send + Sync {
    /// Current playback clock in seconds — output consumed since the sink
    /// started, not wall time.
    fn clock(&self) -> f64;

    /// Begin playback of `samples` (mono, normalized) at the absolute time
    /// `start_secs` on the sink clock.
    fn play_at(&self, id: BufferId, samples: Vec<f32>, start_secs: f64);

    /// Immediately stop and discard everything queued or playing.
    fn stop_all(&self);
}

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up the output device.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(String),

    #[error("failed to start output stream: {0}")]
    PlayStream(String),
}

// ---------------------------------------------------------------------------
// DeviceSink
// ---------------------------------------------------------------------------

/// One buffer sitting in the sink queue, waiting for or in playback.
struct ActiveBuffer {
    id: BufferId,
    /// Absolute start position in output frames on the sink clock.
    start_frame: u64,
    samples: Vec<f32>,
}

/// Shared between the audio callback and the `DeviceSink` handle.
type SharedQueue = Arc<Mutex<Vec<ActiveBuffer>>>;

/// cpal-backed [`PlaybackSink`].
///
/// The output callback mixes every queued buffer whose start frame has been
/// reached into the hardware buffer, mono source fanned out to all hardware
/// channels.  When a buffer's last sample is consumed its id is sent on the
/// completion channel passed to [`DeviceSink::open`].
pub struct DeviceSink {
    queue: SharedQueue,
    /// Output frames consumed since the stream started.
    position: Arc<AtomicU64>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DeviceSink {
    /// Open the default output device at `sample_rate` Hz.
    ///
    /// `done_tx` receives one [`BufferId`] per naturally completed buffer.
    /// The stream runs on a dedicated thread until the sink is dropped.
    ///
    /// # Errors
    ///
    /// [`PlaybackError`] when no output device exists or the device rejects
    /// the requested rate.
    pub fn open(
        sample_rate: u32,
        done_tx: UnboundedSender<BufferId>,
    ) -> Result<Self, PlaybackError> {
        let queue: SharedQueue = Arc::new(Mutex::new(Vec::new()));
        let position = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), PlaybackError>>();

        let cb_queue = Arc::clone(&queue);
        let cb_position = Arc::clone(&position);
        let cb_shutdown = Arc::clone(&shutdown);

        // The cpal stream lives entirely on this thread; only the queue and
        // the frame counter cross the boundary.
        let worker = thread::spawn(move || {
            let stream = match build_output_stream(sample_rate, cb_queue, cb_position, done_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !cb_shutdown.load(Ordering::Relaxed) {
                thread::park_timeout(Duration::from_millis(100));
            }

            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                queue,
                position,
                sample_rate,
                shutdown,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(PlaybackError::BuildStream(
                    "output thread exited before reporting readiness".into(),
                ))
            }
        }
    }
}

impl PlaybackSink for DeviceSink {
    fn clock(&self) -> f64 {
        self.position.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn play_at(&self, id: BufferId, samples: Vec<f32>, start_secs: f64) {
        let start_frame = (start_secs * self.sample_rate as f64).round() as u64;
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(ActiveBuffer {
                id,
                start_frame,
                samples,
            });
        }
    }

    fn stop_all(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            let _ = worker.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Output stream construction (runs on the sink thread)
// ---------------------------------------------------------------------------

fn build_output_stream(
    sample_rate: u32,
    queue: SharedQueue,
    position: Arc<AtomicU64>,
    done_tx: UnboundedSender<BufferId>,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    let default = device
        .default_output_config()
        .map_err(|e| PlaybackError::DefaultConfig(e.to_string()))?;
    let hw_channels = default.channels() as usize;

    let config = cpal::StreamConfig {
        channels: hw_channels as u16,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);

                let mut queue = match queue.lock() {
                    Ok(queue) => queue,
                    Err(_) => {
                        data.fill(0.0);
                        return;
                    }
                };

                for frame in data.chunks_mut(hw_channels) {
                    let mut acc = 0.0_f32;

                    queue.retain(|buf| {
                        if buf.start_frame > pos {
                            return true; // not due yet
                        }
                        let offset = (pos - buf.start_frame) as usize;
                        if offset >= buf.samples.len() {
                            let _ = done_tx.send(buf.id);
                            return false;
                        }
                        acc += buf.samples[offset];
                        if offset + 1 == buf.samples.len() {
                            let _ = done_tx.send(buf.id);
                            return false;
                        }
                        true
                    });

                    let value = acc.clamp(-1.0, 1.0);
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                    pos += 1;
                }

                position.store(pos, Ordering::Relaxed);
            },
            |err: cpal::StreamError| {
                log::error!("playback: cpal stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::BuildStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::PlayStream(e.to_string()))?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
