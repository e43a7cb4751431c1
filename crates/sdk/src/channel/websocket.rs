// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connector using tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use donky_core::ServerFrame;

use super::{ChannelConnector, ChannelLink, ConnectFuture};
use crate::transport::TransportError;

const FRAME_BUFFER: usize = 64;

/// Opens links over WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl ChannelConnector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str, token: Option<&'a str>) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut request = url
                .into_client_request()
                .map_err(|e| TransportError::Network(e.to_string()))?;
            if let Some(token) = token {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                request.headers_mut().insert("Authorization", value);
            }

            let (ws_stream, _) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let (mut sink, mut stream) = ws_stream.split();

            let (out_tx, mut out_rx) = mpsc::channel(FRAME_BUFFER);
            let (in_tx, in_rx) = mpsc::channel(FRAME_BUFFER);

            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    let json = match donky_core::ClientFrame::to_json(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to encode client frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        debug!(error = %e, "websocket send failed");
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => match ServerFrame::decode(&text) {
                            Ok(frame) => {
                                if in_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping malformed server frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!(error = %e, "websocket receive failed");
                            break;
                        }
                    }
                }
            });

            Ok(ChannelLink {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}
