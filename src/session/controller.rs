//! Session controller — drives the full capture → agent → playback loop.
//!
//! [`SessionController`] owns every moving part of one live session and is
//! the single mutation point for the playback timeline and the per-turn
//! transcript accumulators (they are plain owned structs passed through the
//! event loop, never closure captures).
//!
//! # Lifecycle
//!
//! ```text
//! SessionCommand::Start
//!   └─▶ acquire microphone ──▶ Connector::connect (handshake) ──▶ attach
//!       capture pipeline, enter Active                 [Connecting → Active]
//!
//! while Active, one select loop over:
//!   ├─ capture frames   → downmix → resample → encode → send_audio
//!   ├─ agent events     → transcript / scheduler / barge-in / teardown
//!   ├─ playback notices → scheduler.on_finished
//!   └─ commands         → guarded start, immediate stop
//!
//! stop() | remote close | remote error
//!   └─▶ teardown(): drop capture guard, close transport, clear playback
//!       — the same routine on every exit path        [Closing → Idle]
//! ```
//!
//! `stop` is immediate and non-draining: capture is severed and playback
//! cleared without waiting for in-flight network operations; anything the
//! socket delivers afterwards lands in a dropped channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::app::{SessionCommand, SessionNotice};
use crate::audio::capture::{AudioChunk, CaptureGuard, CaptureSource};
use crate::audio::codec;
use crate::audio::playback::{BufferId, PlaybackSink};
use crate::audio::resample::{downmix_to_mono, resample};
use crate::audio::scheduler::PlaybackScheduler;
use crate::config::AppConfig;
use crate::session::state::{SessionPhase, SharedState};
use crate::session::transcript::TranscriptAggregator;
use crate::transport::protocol::AgentEvent;
use crate::transport::session::{Connector, LiveSession};

// ---------------------------------------------------------------------------
// ActiveResources
// ---------------------------------------------------------------------------

/// Everything acquired for one active session.
///
/// Dropping this is teardown: the capture guard stops the input stream and
/// the receivers detach the transport tasks.  The transport handle is still
/// closed explicitly so the writer sends a proper close frame.
struct ActiveResources {
    session: LiveSession,
    events: mpsc::UnboundedReceiver<AgentEvent>,
    frames: mpsc::UnboundedReceiver<AudioChunk>,
    _capture: Box<dyn CaptureGuard>,
}

/// What one select iteration produced.
enum LoopEvent {
    Command(Option<SessionCommand>),
    Frame(Option<AudioChunk>),
    Agent(Option<AgentEvent>),
    Done(Option<BufferId>),
}

/// Verdict of one agent event.
enum EventOutcome {
    Continue,
    /// End the session; `Some` carries a session-fatal error to report.
    End(Option<String>),
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Orchestrates lifecycle (start/stop/error) across capture, transport,
/// playback scheduling and transcript aggregation.
///
/// "At most one active session" is enforced structurally: the single
/// [`LiveSession`] value lives inside the controller's loop state, so a
/// second `start` has nowhere to put one and is a guarded no-op.
///
/// Create with [`SessionController::new`], then call [`run`](Self::run) —
/// typically via `Runtime::block_on` on the main thread, since the capture
/// guard is not `Send` on every platform.
pub struct SessionController {
    config: AppConfig,
    state: SharedState,
    connector: Arc<dyn Connector>,
    capture: Box<dyn CaptureSource>,
    sink: Arc<dyn PlaybackSink>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl SessionController {
    /// Create a new controller.
    ///
    /// # Arguments
    ///
    /// * `config`    — session configuration (rates, voice, endpoint).
    /// * `state`     — shared observable state (also read by front-ends).
    /// * `connector` — transport seam (e.g. `WsConnector`).
    /// * `capture`   — microphone seam (e.g. `MicSource`).
    /// * `sink`      — playback sink the scheduler reserves time on.
    /// * `notices`   — channel for progress events to the front-end.
    pub fn new(
        config: AppConfig,
        state: SharedState,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureSource>,
        sink: Arc<dyn PlaybackSink>,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            config,
            state,
            connector,
            capture,
            sink,
            notices,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the controller until `command_rx` is closed.
    ///
    /// `done_rx` carries end-of-playback notifications from the sink; its
    /// sender must stay alive (the sink owns it) for as long as the
    /// controller runs.
    pub async fn run(
        self,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut done_rx: mpsc::UnboundedReceiver<BufferId>,
    ) {
        let mut scheduler = PlaybackScheduler::new(Arc::clone(&self.sink));
        let mut transcript = TranscriptAggregator::new();
        let mut active: Option<ActiveResources> = None;

        loop {
            // Idle: nothing to poll but commands.
            if active.is_none() {
                match command_rx.recv().await {
                    Some(SessionCommand::Start) => {
                        active = self.start_session().await;
                        continue;
                    }
                    Some(SessionCommand::Stop) => {
                        log::debug!("session: stop ignored — already idle");
                        continue;
                    }
                    None => break,
                }
            }

            // Active: one select over commands, frames, agent events and
            // playback completions.  The borrow of `active` ends with the
            // block so the handlers below can take ownership for teardown.
            let event = {
                let resources = active.as_mut().expect("active resources");
                tokio::select! {
                    cmd = command_rx.recv() => LoopEvent::Command(cmd),
                    chunk = resources.frames.recv() => LoopEvent::Frame(chunk),
                    ev = resources.events.recv() => LoopEvent::Agent(ev),
                    id = done_rx.recv() => LoopEvent::Done(id),
                }
            };

            match event {
                LoopEvent::Command(Some(SessionCommand::Start)) => {
                    // Guarded no-op: at most one session at a time.
                    log::warn!("session: start ignored — a session is already running");
                }
                LoopEvent::Command(Some(SessionCommand::Stop)) => {
                    if let Some(resources) = active.take() {
                        self.teardown(resources, &mut scheduler, &mut transcript, None);
                    }
                }
                LoopEvent::Command(None) => {
                    if let Some(resources) = active.take() {
                        self.teardown(resources, &mut scheduler, &mut transcript, None);
                    }
                    break;
                }
                LoopEvent::Frame(Some(chunk)) => {
                    if let Some(resources) = active.as_ref() {
                        self.forward_frame(&resources.session, chunk);
                    }
                }
                LoopEvent::Frame(None) => {
                    if let Some(resources) = active.take() {
                        self.teardown(
                            resources,
                            &mut scheduler,
                            &mut transcript,
                            Some("capture stream ended unexpectedly".into()),
                        );
                    }
                }
                LoopEvent::Agent(Some(event)) => {
                    match self.handle_agent_event(event, &mut scheduler, &mut transcript) {
                        EventOutcome::Continue => {}
                        EventOutcome::End(error) => {
                            if let Some(resources) = active.take() {
                                self.teardown(resources, &mut scheduler, &mut transcript, error);
                            }
                        }
                    }
                }
                LoopEvent::Agent(None) => {
                    // Transport tasks are gone; behaves like a remote close.
                    if let Some(resources) = active.take() {
                        self.teardown(resources, &mut scheduler, &mut transcript, None);
                    }
                }
                LoopEvent::Done(Some(id)) => {
                    scheduler.on_finished(id);
                }
                LoopEvent::Done(None) => {
                    if let Some(resources) = active.take() {
                        self.teardown(
                            resources,
                            &mut scheduler,
                            &mut transcript,
                            Some("playback sink went away".into()),
                        );
                    }
                }
            }
        }

        log::info!("session: command channel closed, controller shutting down");
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// `Idle → Connecting → Active`, or back to `Idle` on any failure.
    ///
    /// Acquires the microphone first (the permission step), then connects.
    /// Capture does not start streaming until the handshake has succeeded;
    /// on handshake failure the acquired device handle is released again.
    async fn start_session(&self) -> Option<ActiveResources> {
        {
            let mut st = self.state.lock().unwrap();
            st.error_message = None;
            st.turns_completed = 0;
        }
        self.set_phase(SessionPhase::Connecting);

        let acquired = match self.capture.acquire() {
            Ok(acquired) => acquired,
            Err(e) => {
                self.report_error(e.to_string());
                self.set_phase(SessionPhase::Idle);
                return None;
            }
        };

        log::info!(
            "session: connecting to {}",
            self.config.transport.endpoint
        );
        let mut session = match self.connector.connect(&self.config).await {
            Ok(session) => session,
            Err(e) => {
                drop(acquired); // release the partially acquired device
                self.report_error(e.to_string());
                self.set_phase(SessionPhase::Idle);
                return None;
            }
        };

        let Some(events) = session.take_events() else {
            session.close();
            self.report_error("connector returned a session without an event stream".into());
            self.set_phase(SessionPhase::Idle);
            return None;
        };

        let (frame_tx, frames) = mpsc::unbounded_channel();
        let capture = match acquired.start(frame_tx) {
            Ok(guard) => guard,
            Err(e) => {
                session.close();
                self.report_error(e.to_string());
                self.set_phase(SessionPhase::Idle);
                return None;
            }
        };

        self.set_phase(SessionPhase::Active);
        log::info!("session: active");

        Some(ActiveResources {
            session,
            events,
            frames,
            _capture: capture,
        })
    }

    /// `Active → Closing → Idle` — the one cleanup routine every exit path
    /// converges on: stop capture, release the transport handle, stop and
    /// clear all scheduled playback, discard partial transcripts.
    fn teardown(
        &self,
        resources: ActiveResources,
        scheduler: &mut PlaybackScheduler,
        transcript: &mut TranscriptAggregator,
        error: Option<String>,
    ) {
        self.set_phase(SessionPhase::Closing);

        drop(resources._capture);
        resources.session.close();
        scheduler.interrupt();
        transcript.clear();

        if let Some(message) = error {
            self.report_error(message);
        }
        self.set_phase(SessionPhase::Idle);
        log::info!("session: closed");
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Dispatch one inbound protocol event.
    fn handle_agent_event(
        &self,
        event: AgentEvent,
        scheduler: &mut PlaybackScheduler,
        transcript: &mut TranscriptAggregator,
    ) -> EventOutcome {
        match event {
            AgentEvent::Transcript { role, text } => {
                transcript.append(role, &text);
                EventOutcome::Continue
            }

            AgentEvent::Audio(packet) => {
                let agent = &self.config.agent;
                match codec::decode(&packet.data, agent.playback_rate, agent.channels) {
                    Ok(decoded) if decoded.frames() == 0 => EventOutcome::Continue,
                    Ok(decoded) => {
                        let rate = decoded.sample_rate;
                        scheduler.enqueue(decoded.mixdown(), rate);
                        EventOutcome::Continue
                    }
                    Err(e) => {
                        // One bad chunk never terminates a healthy session.
                        log::warn!("session: dropping malformed audio chunk: {e}");
                        EventOutcome::Continue
                    }
                }
            }

            AgentEvent::TurnComplete => {
                let records = transcript.commit_turn();
                self.state.lock().unwrap().turns_completed += 1;
                let _ = self.notices.send(SessionNotice::TurnCommitted {
                    records: records.to_vec(),
                });
                EventOutcome::Continue
            }

            AgentEvent::Interrupted => {
                log::debug!("session: barge-in — discarding agent playback");
                scheduler.interrupt();
                EventOutcome::Continue
            }

            AgentEvent::Closed => EventOutcome::End(None),

            AgentEvent::Error(message) => EventOutcome::End(Some(message)),
        }
    }

    /// Convert one capture chunk to the session format and send it,
    /// fire-and-forget, in strict capture order.
    fn forward_frame(&self, session: &LiveSession, chunk: AudioChunk) {
        let capture_rate = self.config.agent.capture_rate;

        let mono = downmix_to_mono(&chunk.samples, chunk.channels);
        let samples = resample(&mono, chunk.sample_rate, capture_rate);
        if samples.is_empty() {
            return;
        }

        session.send_audio(codec::encode(&samples, capture_rate));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_phase(&self, phase: SessionPhase) {
        self.state.lock().unwrap().phase = phase;
        let _ = self.notices.send(SessionNotice::PhaseChanged(phase));
    }

    fn report_error(&self, message: String) {
        log::error!("session: {message}");
        self.state.lock().unwrap().error_message = Some(message.clone());
        let _ = self.notices.send(SessionNotice::Error { message });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::task::LocalSet;

    use crate::audio::capture::AcquiredCapture;
    use crate::audio::capture::CaptureError;
    use crate::audio::playback::mock::MockSink;
    use crate::session::state::new_shared_state;
    use crate::transport::protocol::Role;
    use crate::transport::session::{OutboundFrame, TransportError};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Remote endpoint per connect attempt: the writer queue we can drain
    /// and the event injector.
    type Endpoint = (
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedSender<AgentEvent>,
    );

    /// Connector stub that counts open attempts and hands out channel-backed
    /// sessions.
    struct MockConnector {
        opens: AtomicUsize,
        fail: bool,
        /// Artificial handshake latency, so tests can queue commands while
        /// the controller is still in `Connecting`.
        delay: Duration,
        endpoints: Mutex<Vec<Endpoint>>,
    }

    impl MockConnector {
        fn new() -> Arc<Self> {
            Self::with(false, Duration::ZERO)
        }

        fn with(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                fail,
                delay,
                endpoints: Mutex::new(Vec::new()),
            })
        }

        fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn take_endpoint(&self) -> Endpoint {
            self.endpoints.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _config: &AppConfig) -> Result<LiveSession, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(TransportError::Connection("connection refused".into()));
            }
            let (session, outbound_rx, events_tx) = LiveSession::test_pair();
            self.endpoints.lock().unwrap().push((outbound_rx, events_tx));
            Ok(session)
        }
    }

    /// Capture stub: `acquire` optionally fails; `start` stores the frame
    /// sender so tests can inject chunks as if a microphone delivered them.
    struct MockCapture {
        fail_acquire: bool,
        taps: Arc<Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>>,
    }

    struct MockAcquired {
        taps: Arc<Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>>,
    }

    struct MockGuard;

    impl CaptureGuard for MockGuard {}

    impl AcquiredCapture for MockAcquired {
        fn start(
            &self,
            tx: mpsc::UnboundedSender<AudioChunk>,
        ) -> Result<Box<dyn CaptureGuard>, CaptureError> {
            self.taps.lock().unwrap().push(tx);
            Ok(Box::new(MockGuard))
        }
    }

    impl CaptureSource for MockCapture {
        fn acquire(&self) -> Result<Box<dyn AcquiredCapture>, CaptureError> {
            if self.fail_acquire {
                return Err(CaptureError::PermissionDenied);
            }
            Ok(Box::new(MockAcquired {
                taps: Arc::clone(&self.taps),
            }))
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct TestBed {
        command_tx: mpsc::UnboundedSender<SessionCommand>,
        /// Held so the completion channel stays open for the controller.
        _done_tx: mpsc::UnboundedSender<BufferId>,
        notices: mpsc::UnboundedReceiver<SessionNotice>,
        state: SharedState,
        sink: Arc<MockSink>,
        taps: Arc<Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>>,
    }

    fn build(
        connector: Arc<MockConnector>,
        fail_acquire: bool,
    ) -> (
        TestBed,
        SessionController,
        mpsc::UnboundedReceiver<SessionCommand>,
        mpsc::UnboundedReceiver<BufferId>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();

        let state = new_shared_state();
        let sink = MockSink::new();
        let taps = Arc::new(Mutex::new(Vec::new()));

        let controller = SessionController::new(
            AppConfig::default(),
            Arc::clone(&state),
            connector,
            Box::new(MockCapture {
                fail_acquire,
                taps: Arc::clone(&taps),
            }),
            sink.clone(),
            notice_tx,
        );

        let bed = TestBed {
            command_tx,
            _done_tx: done_tx,
            notices,
            state,
            sink,
            taps,
        };
        (bed, controller, command_rx, done_rx)
    }

    async fn next_notice(bed: &mut TestBed) -> SessionNotice {
        tokio::time::timeout(Duration::from_secs(2), bed.notices.recv())
            .await
            .expect("timed out waiting for a notice")
            .expect("notice channel closed")
    }

    /// Drain notices until the given phase is reached.
    async fn await_phase(bed: &mut TestBed, phase: SessionPhase) {
        loop {
            if let SessionNotice::PhaseChanged(p) = next_notice(bed).await {
                if p == phase {
                    return;
                }
            }
        }
    }

    fn phase_of(bed: &TestBed) -> SessionPhase {
        bed.state.lock().unwrap().phase
    }

    /// Agent audio of the given duration, already wire-encoded at 24 kHz.
    fn agent_audio(secs: f64) -> AgentEvent {
        let samples = vec![0.1_f32; (secs * 24_000.0) as usize];
        AgentEvent::Audio(codec::encode(&samples, 24_000))
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    /// Full start → stop lifecycle walks Idle → Connecting → Active →
    /// Closing → Idle and closes the transport exactly once.
    #[tokio::test]
    async fn start_stop_walks_the_lifecycle() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Connecting).await;
                await_phase(&mut bed, SessionPhase::Active).await;
                assert_eq!(phase_of(&bed), SessionPhase::Active);

                let (mut outbound, _events_tx) = connector.take_endpoint();

                bed.command_tx.send(SessionCommand::Stop).unwrap();
                await_phase(&mut bed, SessionPhase::Closing).await;
                await_phase(&mut bed, SessionPhase::Idle).await;

                assert!(matches!(outbound.recv().await, Some(OutboundFrame::Close)));
                assert_eq!(connector.open_count(), 1);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Two consecutive starts while the first handshake is still in flight
    /// must produce exactly one transport open.
    #[tokio::test]
    async fn duplicate_start_opens_one_session() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::with(false, Duration::from_millis(50));
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                // Stop is queued behind the duplicate start; once Idle again,
                // both commands have been consumed.
                bed.command_tx.send(SessionCommand::Stop).unwrap();
                await_phase(&mut bed, SessionPhase::Idle).await;

                assert_eq!(connector.open_count(), 1);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Handshake failure releases the device, surfaces the error and lands
    /// back in Idle — no automatic retry.
    #[tokio::test]
    async fn handshake_failure_returns_to_idle() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::with(true, Duration::ZERO);
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Connecting).await;

                let notice = next_notice(&mut bed).await;
                assert!(
                    matches!(&notice, SessionNotice::Error { message } if message.contains("refused")),
                    "expected connection error notice, got {notice:?}"
                );
                await_phase(&mut bed, SessionPhase::Idle).await;

                assert_eq!(connector.open_count(), 1);
                assert!(bed.state.lock().unwrap().error_message.is_some());
                // Capture never started streaming.
                assert!(bed.taps.lock().unwrap().is_empty());

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Microphone permission denial fails the start before any transport
    /// open is attempted.
    #[tokio::test]
    async fn permission_denied_never_opens_transport() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), true);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Connecting).await;

                let notice = next_notice(&mut bed).await;
                assert!(matches!(&notice, SessionNotice::Error { message } if message.contains("denied")));
                await_phase(&mut bed, SessionPhase::Idle).await;

                assert_eq!(connector.open_count(), 0);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Capture chunks are downmixed, resampled to the capture rate and sent
    /// as encoded envelopes.
    #[tokio::test]
    async fn capture_frames_are_encoded_and_sent() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (mut outbound, _events_tx) = connector.take_endpoint();
                let tap = bed.taps.lock().unwrap()[0].clone();

                // 10 ms of 48 kHz stereo from the "microphone".
                tap.send(AudioChunk {
                    samples: vec![0.25_f32; 960],
                    sample_rate: 48_000,
                    channels: 2,
                })
                .unwrap();

                let frame = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
                    .await
                    .expect("timed out waiting for outbound audio")
                    .expect("outbound channel closed");

                match frame {
                    OutboundFrame::Audio(msg) => {
                        let chunk = &msg.realtime_input.media_chunks[0];
                        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
                        assert!(!chunk.data.is_empty());
                    }
                    OutboundFrame::Close => panic!("expected audio, got close"),
                }

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Agent audio chunks are scheduled back-to-back on the sink.
    #[tokio::test]
    async fn agent_audio_is_scheduled_gaplessly() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                events_tx.send(agent_audio(0.5)).unwrap();
                events_tx.send(agent_audio(0.25)).unwrap();
                // The turn boundary doubles as a processing barrier: once its
                // notice arrives, both audio events have been handled.
                events_tx.send(AgentEvent::TurnComplete).unwrap();

                loop {
                    if matches!(next_notice(&mut bed).await, SessionNotice::TurnCommitted { .. }) {
                        break;
                    }
                }

                let starts = bed.sink.starts();
                assert_eq!(starts.len(), 2);
                assert_eq!(starts[0], 0.0);
                assert!((starts[1] - 0.5).abs() < 1e-9);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// A barge-in event stops all scheduled playback.
    #[tokio::test]
    async fn interrupted_event_cancels_playback() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                events_tx.send(agent_audio(1.0)).unwrap();
                events_tx.send(AgentEvent::Interrupted).unwrap();
                events_tx.send(AgentEvent::TurnComplete).unwrap();

                loop {
                    if matches!(next_notice(&mut bed).await, SessionNotice::TurnCommitted { .. }) {
                        break;
                    }
                }

                assert_eq!(bed.sink.stop_count(), 1);
                assert_eq!(phase_of(&bed), SessionPhase::Active);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// A malformed inbound chunk is dropped; the session keeps running and
    /// later events are still processed.
    #[tokio::test]
    async fn malformed_chunk_never_terminates_the_session() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                // "AAAA" decodes to 3 raw bytes — an odd byte count for mono
                // PCM16, so decode fails with MalformedPayload.
                events_tx
                    .send(AgentEvent::Audio(crate::audio::EncodedPacket {
                        mime_type: "audio/pcm;rate=24000".into(),
                        data: "AAAA".into(),
                    }))
                    .unwrap();
                events_tx.send(agent_audio(0.25)).unwrap();
                events_tx.send(AgentEvent::TurnComplete).unwrap();

                loop {
                    match next_notice(&mut bed).await {
                        SessionNotice::TurnCommitted { .. } => break,
                        SessionNotice::Error { message } => {
                            panic!("bad chunk must not surface an error: {message}")
                        }
                        _ => {}
                    }
                }

                // The well-formed chunk after the bad one was still scheduled.
                assert_eq!(bed.sink.starts().len(), 1);
                assert_eq!(phase_of(&bed), SessionPhase::Active);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// Transcript fragments commit as paired records on turn completion and
    /// the next turn starts from empty accumulators.
    #[tokio::test]
    async fn transcripts_commit_per_turn() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                events_tx
                    .send(AgentEvent::Transcript {
                        role: Role::Caller,
                        text: "Hel".into(),
                    })
                    .unwrap();
                events_tx
                    .send(AgentEvent::Transcript {
                        role: Role::Caller,
                        text: "lo".into(),
                    })
                    .unwrap();
                events_tx.send(AgentEvent::TurnComplete).unwrap();
                events_tx.send(AgentEvent::TurnComplete).unwrap();

                let first = loop {
                    if let SessionNotice::TurnCommitted { records } = next_notice(&mut bed).await {
                        break records;
                    }
                };
                assert_eq!(first[0].role, Role::Caller);
                assert_eq!(first[0].text, "Hello");
                assert_eq!(first[1].role, Role::Agent);
                assert_eq!(first[1].text, "");

                let second = loop {
                    if let SessionNotice::TurnCommitted { records } = next_notice(&mut bed).await {
                        break records;
                    }
                };
                assert_eq!(second[0].text, "");
                assert_eq!(second[1].text, "");

                assert_eq!(bed.state.lock().unwrap().turns_completed, 2);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// A mid-session transport error tears everything down and reports.
    #[tokio::test]
    async fn remote_error_is_session_fatal() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                events_tx.send(AgentEvent::Error("socket reset".into())).unwrap();

                await_phase(&mut bed, SessionPhase::Closing).await;
                let notice = next_notice(&mut bed).await;
                assert!(matches!(&notice, SessionNotice::Error { message } if message.contains("socket reset")));
                await_phase(&mut bed, SessionPhase::Idle).await;

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }

    /// A remote close tears down without surfacing an error.
    #[tokio::test]
    async fn remote_close_tears_down_quietly() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let connector = MockConnector::new();
                let (mut bed, controller, command_rx, done_rx) = build(connector.clone(), false);
                let handle = tokio::task::spawn_local(controller.run(command_rx, done_rx));

                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;

                let (_outbound, events_tx) = connector.take_endpoint();
                events_tx.send(AgentEvent::Closed).unwrap();

                await_phase(&mut bed, SessionPhase::Closing).await;
                await_phase(&mut bed, SessionPhase::Idle).await;
                assert!(bed.state.lock().unwrap().error_message.is_none());

                // A fresh start after teardown opens a second session.
                bed.command_tx.send(SessionCommand::Start).unwrap();
                await_phase(&mut bed, SessionPhase::Active).await;
                assert_eq!(connector.open_count(), 2);

                drop(bed.command_tx);
                handle.await.unwrap();
            })
            .await;
    }
}
