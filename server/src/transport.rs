//! WebSocket transport
//!
//! One task per socket. A connection must open with an `identify` frame;
//! after that every text frame is a [`ClientCommand`] and every
//! [`ServerEvent`] for the connection is written by a dedicated writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_protocol::{ClientCommand, ConnectionId, ServerEvent, UserId, parse_client_command};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::service::Arena;

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Accept sockets until the listener fails
pub async fn serve(arena: Arc<Arena>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;

        let arena = Arc::clone(&arena);
        tokio::spawn(async move {
            if let Err(e) = handle_socket(arena, stream, peer).await {
                debug!(peer = %peer, error = %e, "Socket closed with error");
            }
        });
    }
}

async fn handle_socket(arena: Arc<Arena>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let ws = accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    debug!(peer = %peer, "WebSocket opened");

    let (mut sink, mut source) = ws.split();

    let Some((user_id, username)) = await_identify(&mut sink, &mut source).await? else {
        debug!(peer = %peer, "Closed before identifying");
        return Ok(());
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = arena.connect(user_id, username, tx);
    let writer = spawn_writer(sink, rx, connection_id);

    // Disconnect still runs if a command panics
    let reader = tokio::spawn(read_commands(Arc::clone(&arena), connection_id, source));
    let result = match reader.await {
        Ok(result) => result,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Command loop aborted");
            Ok(())
        }
    };

    arena.disconnect(connection_id).await;
    writer.abort();
    result
}

/// Read frames until a valid `identify` arrives. Anything else is answered
/// with an error frame. `None` if the socket closes first.
async fn await_identify(sink: &mut WsSink, source: &mut WsSource) -> Result<Option<(UserId, String)>> {
    while let Some(message) = source.next().await {
        let text = match message.context("WebSocket error")? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(None),
            _ => continue,
        };

        let reply = match parse_client_command(&text) {
            Ok(ClientCommand::Identify { user_id, username }) => {
                return Ok(Some((user_id, username)));
            }
            Ok(_) => ServerEvent::error("Identify before sending commands"),
            Err(e) => ServerEvent::error(e.to_string()),
        };
        send_event(sink, &reply).await?;
    }
    Ok(None)
}

async fn read_commands(arena: Arc<Arena>, connection_id: ConnectionId, mut source: WsSource) -> Result<()> {
    while let Some(message) = source.next().await {
        let text = match message.context("WebSocket error")? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match parse_client_command(&text) {
            // Failures are already reported to the client
            Ok(command) => {
                let _ = arena.handle_command(connection_id, command).await;
            }
            Err(e) => {
                debug!(connection = %connection_id, error = %e, "Unparseable frame");
                arena
                    .directory()
                    .notify(connection_id, ServerEvent::error(e.to_string()));
            }
        }
    }
    Ok(())
}

fn spawn_writer(
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    connection_id: ConnectionId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = send_event(&mut sink, &event).await {
                info!(connection = %connection_id, error = %e, "Stopped writing to connection");
                break;
            }
        }
        let _ = sink.close().await;
    })
}

async fn send_event(sink: &mut WsSink, event: &ServerEvent) -> Result<()> {
    let wire_format = match event.to_wire_format() {
        Ok(wire_format) => wire_format,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to serialize event");
            return Ok(());
        }
    };

    sink.send(Message::Text(wire_format))
        .await
        .context("Failed to send event")
}
