//! WebSocket relay server.
//!
//! The rendezvous point every replica connects to. Each document id gets a
//! room with its own [`ReplicaDocument`]; the room document absorbs every
//! update that passes through, so a late joiner is brought current from the
//! relay alone even when the replica that originally wrote the data has left.
//!
//! The relay never inspects sequence contents. It answers state vectors with
//! diffs, applies updates, and fans them out to every other peer in the room.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warp::ws::{Message, WebSocket};
use warp::Filter;

use core_doc::ReplicaDocument;

use crate::error::{Result, SyncError};
use crate::protocol::SyncMessage;

type Rooms = Arc<Mutex<HashMap<String, Arc<Room>>>>;

struct Room {
    document: ReplicaDocument,
    peers: Mutex<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_peer_id: AtomicU64,
}

impl Room {
    fn new() -> Self {
        Self {
            document: ReplicaDocument::new(),
            peers: Mutex::new(HashMap::new()),
            next_peer_id: AtomicU64::new(0),
        }
    }
}

/// A running relay. Dropping the handle leaves the server running; call
/// [`shutdown`](Self::shutdown) for a clean stop.
pub struct RelayServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Bind the relay on `addr` and start serving. Port 0 picks an ephemeral
    /// port; the chosen address is available via
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let rooms: Rooms = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let rooms_filter = warp::any().map(move || rooms.clone());
        let route = warp::path("sync")
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::ws())
            .and(rooms_filter)
            .map(|document_id: String, ws: warp::ws::Ws, rooms: Rooms| {
                ws.on_upgrade(move |socket| peer_connected(socket, document_id, rooms))
            });

        let signal = shutdown.clone();
        let (bound, server) = warp::serve(route)
            .try_bind_with_graceful_shutdown(addr, async move {
                signal.cancelled().await;
            })
            .map_err(|e| SyncError::Bind(e.to_string()))?;

        info!(addr = %bound, "relay listening");
        let task = tokio::spawn(server);

        Ok(Self {
            addr: bound,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Endpoint string replicas pass to
    /// [`SyncProvider::connect`](crate::SyncProvider::connect).
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Stop accepting connections and wait for the server to wind down.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "relay server task panicked during shutdown");
        }
    }
}

async fn peer_connected(socket: WebSocket, document_id: String, rooms: Rooms) {
    let room = {
        let mut rooms = rooms.lock().await;
        rooms
            .entry(document_id.clone())
            .or_insert_with(|| Arc::new(Room::new()))
            .clone()
    };
    let peer_id = room.next_peer_id.fetch_add(1, Ordering::Relaxed);
    debug!(document_id = %document_id, peer_id, "peer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let forward = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });
    room.peers.lock().await.insert(peer_id, tx.clone());

    // Announce what the room already has; the peer answers with a diff.
    let state_vector = room.document.encode_state_vector().await;
    let _ = tx.send(Message::binary(
        SyncMessage::StateVector(state_vector).encode(),
    ));

    while let Some(incoming) = ws_rx.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                debug!(peer_id, error = %e, "peer socket error");
                break;
            }
        };
        if message.is_close() {
            break;
        }
        if !message.is_binary() {
            continue;
        }
        match SyncMessage::decode(message.as_bytes()) {
            Ok(SyncMessage::StateVector(sv)) => match room.document.encode_diff(&sv).await {
                Ok(diff) => {
                    let _ = tx.send(Message::binary(SyncMessage::Diff(diff).encode()));
                }
                Err(e) => warn!(peer_id, error = %e, "ignoring malformed state vector"),
            },
            Ok(SyncMessage::Diff(update)) | Ok(SyncMessage::Update(update)) => {
                if let Err(e) = room.document.apply_update(&update).await {
                    warn!(peer_id, error = %e, "ignoring malformed update");
                    continue;
                }
                let peers = room.peers.lock().await;
                for (other_id, other) in peers.iter() {
                    if *other_id != peer_id {
                        let _ = other.send(Message::binary(
                            SyncMessage::Update(update.clone()).encode(),
                        ));
                    }
                }
            }
            Err(e) => warn!(peer_id, error = %e, "ignoring undecodable frame"),
        }
    }

    room.peers.lock().await.remove(&peer_id);
    drop(tx);
    let _ = forward.await;
    debug!(document_id = %document_id, peer_id, "peer disconnected");
}
