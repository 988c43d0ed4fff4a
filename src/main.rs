//! Application entry point — voicebridge CLI.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run); an
//!    `AGENT_API_KEY` environment variable overrides the configured key.
//! 3. Open the playback sink on the default output device.
//! 4. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 5. Spawn the transcript printer and the stdin command reader.
//! 6. Run the [`SessionController`] on the main thread via `block_on` (the
//!    capture guard is not `Send` on every platform), starting one session
//!    immediately.
//!
//! Commands on stdin: `start`, `stop`, `quit`.  Ctrl-C also shuts down.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use voicebridge::{
    app::{SessionCommand, SessionNotice},
    audio::{DeviceSink, MicSource},
    config::AppConfig,
    session::{new_shared_state, SessionController, SessionPhase},
    transport::WsConnector,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ────────────────────────────────────────────────────
    let mut config = AppConfig::load().context("failed to load settings.toml")?;
    if let Ok(key) = std::env::var("AGENT_API_KEY") {
        if !key.is_empty() {
            config.transport.api_key = Some(key);
        }
    }
    log::info!(
        "voicebridge starting — {} @ {} Hz up / {} Hz down",
        config.agent.model,
        config.agent.capture_rate,
        config.agent.playback_rate
    );

    // ── Playback sink ────────────────────────────────────────────────────
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let sink = DeviceSink::open(config.agent.playback_rate, done_tx)
        .context("failed to open the output device")?;

    // ── Runtime and channels ─────────────────────────────────────────────
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let input_device = config.audio.input_device.clone();
    let controller = SessionController::new(
        config,
        new_shared_state(),
        Arc::new(WsConnector::new()),
        Box::new(MicSource::new(input_device)),
        Arc::new(sink),
        notice_tx,
    );

    // ── Front-end tasks ──────────────────────────────────────────────────
    runtime.spawn(print_notices(notice_rx));
    spawn_stdin_reader(command_tx.clone());

    // Open a session immediately; `stop` / `start` on stdin from there on.
    command_tx
        .send(SessionCommand::Start)
        .expect("controller not yet running, channel cannot be closed");
    drop(command_tx);

    // ── Main loop ────────────────────────────────────────────────────────
    runtime.block_on(async {
        tokio::select! {
            _ = controller.run(command_rx, done_rx) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received, shutting down");
            }
        }
    });

    Ok(())
}

/// Print controller notices — committed transcript turns and status — to
/// stdout until the controller shuts down.
async fn print_notices(mut notice_rx: mpsc::UnboundedReceiver<SessionNotice>) {
    while let Some(notice) = notice_rx.recv().await {
        match notice {
            SessionNotice::PhaseChanged(phase) => {
                log::info!("session phase: {}", phase.label());
                if phase == SessionPhase::Active {
                    println!("● listening — speak into the microphone ('stop', 'quit')");
                }
            }
            SessionNotice::TurnCommitted { records } => {
                for record in records {
                    if !record.text.is_empty() {
                        println!("[{}] {}", record.role.label(), record.text);
                    }
                }
            }
            SessionNotice::Error { message } => {
                eprintln!("error: {message}");
            }
        }
    }
}

/// Read `start` / `stop` / `quit` commands from stdin on a plain thread
/// (stdin reads block).  Dropping the sender on `quit` or EOF shuts the
/// controller down.
fn spawn_stdin_reader(command_tx: mpsc::UnboundedSender<SessionCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "start" => {
                    let _ = command_tx.send(SessionCommand::Start);
                }
                "stop" => {
                    let _ = command_tx.send(SessionCommand::Stop);
                }
                "quit" | "exit" => break,
                "" => {}
                other => eprintln!("unknown command {other:?} — try start, stop or quit"),
            }
        }
    });
}
