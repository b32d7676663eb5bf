//! voice-reveal: speaks assistant replies and reveals their text in step
//! with the audio.
//!
//! Runs a WebSocket server when `wsListen` is configured, otherwise talks
//! JSON lines on stdin/stdout. `--terminal` reads plain text lines from
//! stdin and types each reply out as it is spoken; `--terminal --quiet`
//! only speaks.

use std::sync::Arc;

use futures_util::{stream, Stream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use voice_reveal::audio::list_output_devices;
use voice_reveal::config::paths::get_log_dir;
use voice_reveal::config::read_speech_config;
use voice_reveal::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader, IpcSink};
use voice_reveal::ipc::{VoiceCommand, VoiceEvent};
use voice_reveal::reveal::{NullSink, TerminalSink};
use voice_reveal::terminal::run_terminal;
use voice_reveal::ws::run_ws_server;
use voice_reveal::{logging, Narrator, SpeechError};

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init(&get_log_dir()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--terminal") {
        let quiet = args.iter().any(|a| a == "--quiet");
        if let Err(e) = run_terminal_mode(quiet).await {
            error!("Terminal mode failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Emit starting event immediately so the parent knows we're alive.
    emit_event(&VoiceEvent::Starting {});

    let config = read_speech_config();
    info!(?config, "Configuration loaded");

    let narrator = match Narrator::from_config(&config) {
        Ok(n) => Arc::new(n),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            emit_error(&e.to_string());
            std::process::exit(1);
        }
    };

    emit_event(&VoiceEvent::Ready {
        synthesizer: narrator.synthesizer_name(),
        output: narrator.output_name(),
    });

    if let Some(addr) = config.ws_listen.as_deref() {
        if let Err(e) = run_ws_server(addr, narrator).await {
            error!("WebSocket server failed: {}", e);
            emit_error(&e.to_string());
            std::process::exit(1);
        }
        return;
    }

    run_ipc_loop(narrator).await;
    info!("voice-reveal shutting down");
}

/// Speak plain text lines from stdin until it closes.
async fn run_terminal_mode(quiet: bool) -> anyhow::Result<()> {
    let config = read_speech_config();
    info!(?config, quiet, "Configuration loaded");
    let narrator = Narrator::from_config(&config)?;
    let input = tokio::io::BufReader::new(tokio::io::stdin());

    if quiet {
        run_terminal(&narrator, input, &mut NullSink).await?;
    } else {
        let mut sink = TerminalSink::new(std::io::stdout());
        run_terminal(&narrator, input, &mut sink).await?;
    }
    Ok(())
}

/// Process stdin commands until `stop` or until stdin closes.
async fn run_ipc_loop(narrator: Arc<Narrator>) {
    let mut cmd_rx = spawn_stdin_reader();
    let turn = Arc::new(Mutex::new(()));
    let mut replies: Vec<JoinHandle<()>> = Vec::new();
    let mut delta_tx: Option<mpsc::UnboundedSender<String>> = None;

    while let Some(command) = cmd_rx.recv().await {
        replies.retain(|r| !r.is_finished());
        match command {
            VoiceCommand::Ping {} => emit_event(&VoiceEvent::Pong {}),

            VoiceCommand::Speak { text } => {
                info!(chars = text.chars().count(), "Speak requested");
                let reply = stream::iter(vec![text]);
                replies.push(spawn_reply(&narrator, &turn, reply));
            }

            VoiceCommand::Delta { text } => {
                let tx = delta_tx.get_or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    replies.push(spawn_reply(&narrator, &turn, receiver_stream(rx)));
                    tx
                });
                if tx.send(text).is_err() {
                    warn!("Streamed reply already ended, dropping delta");
                    delta_tx = None;
                }
            }

            VoiceCommand::EndOfStream {} => {
                if delta_tx.take().is_none() {
                    warn!("end_of_stream without a streamed reply");
                }
            }

            VoiceCommand::Cancel {} => {
                info!(pending = replies.len(), "Cancel requested");
                delta_tx = None;
                narrator.interrupt();
                for reply in replies.drain(..) {
                    reply.abort();
                }
                emit_event(&VoiceEvent::SpeakingEnd {});
            }

            VoiceCommand::ListAudioDevices {} => {
                let output = tokio::task::spawn_blocking(list_output_devices)
                    .await
                    .unwrap_or_default();
                emit_event(&VoiceEvent::AudioDevices { output });
            }

            VoiceCommand::Stop {} => {
                emit_event(&VoiceEvent::Stopping {});
                narrator.interrupt();
                return;
            }
        }
    }

    // stdin closed, parent process gone
    info!("stdin closed, shutting down");
    narrator.interrupt();
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<String>) -> impl Stream<Item = String> + Send {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|text| (text, rx)) })
}

/// Speak one reply once earlier replies are done, reporting over stdout.
fn spawn_reply<D>(narrator: &Arc<Narrator>, turn: &Arc<Mutex<()>>, deltas: D) -> JoinHandle<()>
where
    D: Stream<Item = String> + Send + 'static,
{
    let narrator = Arc::clone(narrator);
    let turn = Arc::clone(turn);
    tokio::spawn(async move {
        let _turn = turn.lock().await;
        emit_event(&VoiceEvent::SpeakingStart {});
        let mut sink = IpcSink::stdout();
        match narrator.speak_stream(deltas, &mut sink).await {
            Ok(spoken) => {
                info!(chars = spoken.chars().count(), "Reply spoken");
                emit_event(&VoiceEvent::SpeakingEnd {});
            }
            Err(SpeechError::Cancelled) => info!("Reply cancelled"),
            Err(e) => {
                error!("Reply failed: {}", e);
                emit_error(&e.to_string());
                emit_event(&VoiceEvent::SpeakingEnd {});
            }
        }
    })
}
