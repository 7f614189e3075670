//! Reconnecting sync client.
//!
//! A [`SyncProvider`] keeps one replica's document exchanging updates with a
//! relay. The connection task runs until [`disconnect`](SyncProvider::disconnect);
//! network loss triggers retry with exponential backoff while the document
//! remains fully usable locally. Nothing needs to be queued for replay by this
//! layer: the state vector handshake performed on every (re)connect carries
//! whatever either side missed.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use core_doc::ReplicaDocument;

use crate::protocol::SyncMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Reconnect pacing.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Delay before the first reconnect attempt.
    pub reconnect_initial: Duration,
    /// Upper bound for the backoff between attempts.
    pub reconnect_max: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(10),
        }
    }
}

/// Observable connection state, for an "offline" indicator. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Offline,
}

/// Handle to the connection task.
pub struct SyncProvider {
    status: watch::Receiver<ConnectionStatus>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncProvider {
    /// Start syncing `document` with the relay at `endpoint` (e.g.
    /// `ws://192.168.0.10:9528`) under the given document id.
    pub fn connect(
        endpoint: impl Into<String>,
        document_id: impl Into<String>,
        document: ReplicaDocument,
    ) -> Self {
        Self::connect_with(endpoint, document_id, document, ProviderConfig::default())
    }

    pub fn connect_with(
        endpoint: impl Into<String>,
        document_id: impl Into<String>,
        document: ReplicaDocument,
        config: ProviderConfig,
    ) -> Self {
        let endpoint = endpoint.into();
        let url = format!(
            "{}/sync/{}",
            endpoint.trim_end_matches('/'),
            document_id.into()
        );
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            run_loop(url, document, config, status_tx, token).await;
        });
        Self {
            status,
            shutdown,
            task,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch channel mirroring [`status`](Self::status), for UIs that want to
    /// render connectivity changes.
    pub fn status_stream(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop the connection task and close the socket.
    pub async fn disconnect(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync provider task panicked during shutdown");
        }
    }
}

async fn run_loop(
    url: String,
    document: ReplicaDocument,
    config: ProviderConfig,
    status: watch::Sender<ConnectionStatus>,
    token: CancellationToken,
) {
    let mut backoff = config.reconnect_initial;
    loop {
        let _ = status.send(ConnectionStatus::Connecting);
        let connected = tokio::select! {
            _ = token.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };
        match connected {
            Ok((stream, _)) => {
                info!(url = %url, "connected to relay");
                let _ = status.send(ConnectionStatus::Connected);
                backoff = config.reconnect_initial;
                let cancelled = run_session(stream, &document, &token).await;
                let _ = status.send(ConnectionStatus::Offline);
                if cancelled {
                    break;
                }
                debug!(url = %url, "relay connection lost, will reconnect");
            }
            Err(e) => {
                let _ = status.send(ConnectionStatus::Offline);
                debug!(url = %url, error = %e, "relay unreachable, will retry");
            }
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }
    let _ = status.send(ConnectionStatus::Offline);
}

/// Pump one live connection until it drops or the provider is cancelled.
/// Returns true when the exit was a cancellation.
async fn run_session(stream: WsStream, document: &ReplicaDocument, token: &CancellationToken) -> bool {
    let (mut sink, mut source) = stream.split();
    // Subscribe before the handshake so no local update can slip between the
    // state vector we announce and the stream we forward from.
    let mut local_updates = document.subscribe_updates();

    let state_vector = document.encode_state_vector().await;
    if !send_frame(&mut sink, SyncMessage::StateVector(state_vector)).await {
        return false;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return true;
            }
            local = local_updates.recv() => match local {
                Ok(update) => {
                    if !send_frame(&mut sink, SyncMessage::Update(update)).await {
                        return false;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "local update stream lagged, sending full state");
                    let full = document.encode_full_state().await;
                    if !send_frame(&mut sink, SyncMessage::Update(full)).await {
                        return false;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Binary(frame))) => {
                    handle_frame(&frame, document, &mut sink).await;
                }
                Some(Ok(Message::Close(_))) | None => return false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "relay socket error");
                    return false;
                }
            },
        }
    }
}

async fn handle_frame(frame: &[u8], document: &ReplicaDocument, sink: &mut WsSink) {
    match SyncMessage::decode(frame) {
        Ok(SyncMessage::StateVector(sv)) => match document.encode_diff(&sv).await {
            Ok(diff) => {
                let _ = send_frame(sink, SyncMessage::Diff(diff)).await;
            }
            Err(e) => warn!(error = %e, "ignoring malformed relay state vector"),
        },
        Ok(SyncMessage::Diff(update)) | Ok(SyncMessage::Update(update)) => {
            if let Err(e) = document.apply_update(&update).await {
                warn!(error = %e, "ignoring malformed relay update");
            }
        }
        Err(e) => warn!(error = %e, "ignoring undecodable relay frame"),
    }
}

async fn send_frame(sink: &mut WsSink, frame: SyncMessage) -> bool {
    sink.send(Message::Binary(frame.encode())).await.is_ok()
}
