//! WebSocket front end.
//!
//! Each text frame from a client is one reply: it is split into sentences,
//! spoken one after another, and revealed with `partial` frames followed by
//! `{"type":"complete"}`. A failed reply sends `{"type":"error",...}` and
//! the connection stays open. Replies from all connections share one
//! speaker, so they are taken in turn.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::error::SpeechError;
use crate::pipeline::Narrator;
use crate::reveal::SocketSink;

/// Bind `addr` and serve clients until the listener fails.
pub async fn run_ws_server(addr: &str, narrator: Arc<Narrator>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, narrator).await;
    Ok(())
}

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, narrator: Arc<Narrator>) {
    let turn = Arc::new(Mutex::new(()));
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New WebSocket connection from {}", peer_addr);
                let narrator = Arc::clone(&narrator);
                let turn = Arc::clone(&turn);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, narrator, turn).await {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    narrator: Arc<Narrator>,
    turn: Arc<Mutex<()>>,
) -> Result<(), SpeechError> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| SpeechError::Sink(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let mut sink = SocketSink::new(ws_sender);

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if text.trim().is_empty() {
                    continue;
                }
                let _turn = turn.lock().await;
                let reply = stream::iter(vec![text]);
                match narrator.speak_stream(reply, &mut sink).await {
                    Ok(spoken) => info!(chars = spoken.chars().count(), "Reply delivered"),
                    Err(SpeechError::Sink(e)) => return Err(SpeechError::Sink(e)),
                    Err(e) => {
                        warn!("Reply failed: {}", e);
                        sink.send_error(&e.to_string()).await?;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket connection closed by client");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    Ok(())
}
