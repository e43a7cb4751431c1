// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles client connections, frame routing, and broadcast fanout of
//! unsolicited pushes.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use donky_core::{ClientFrame, ServerFrame};

use crate::state::ServerState;

/// Request id used when answering a frame that could not be parsed.
pub const UNPARSEABLE_REQUEST_ID: u64 = 0;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accept connections on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut broadcast_rx = state.subscribe();

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = handle_client_frame(&text, &state).await {
                            let json = response.to_json()?;
                            ws_sink.send(Message::Text(json.into())).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }

            broadcast = broadcast_rx.recv() => {
                match broadcast {
                    Ok(frame) => {
                        let json = frame.to_json()?;
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            warn!("Failed to send push to {}: {}", peer_addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} frames", peer_addr, n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Process a client frame and return the answer, if any.
pub(crate) async fn handle_client_frame(text: &str, state: &ServerState) -> Option<ServerFrame> {
    let frame = match ClientFrame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Malformed client frame: {}", e);
            return Some(ServerFrame::failure(
                UNPARSEABLE_REQUEST_ID,
                400,
                format!("malformed frame: {e}"),
            ));
        }
    };

    match frame {
        ClientFrame::Synchronise {
            request_id,
            request,
        } => {
            debug!(
                request_id,
                notifications = request.client_notifications.len(),
                background = request.is_background,
                "synchronise received"
            );
            Some(match state.synchronise(request).await {
                Ok(response) => ServerFrame::result(request_id, response),
                Err(failure) => ServerFrame::failure(request_id, failure.status, failure.message),
            })
        }

        ClientFrame::Ping { id } => {
            debug!("Ping received: {}", id);
            Some(ServerFrame::pong(id))
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
