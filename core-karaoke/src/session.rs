//! Per-replica session wiring.
//!
//! The session object replaces any notion of process-wide document/provider
//! singletons: everything a replica holds lives here and is torn down here.
//! Whether a replica is allowed to download is decided once, at construction,
//! by the [`SessionRole`] it is given - the host role carries the bridge
//! implementations it needs, so a viewer cannot even express the capability.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use bridge_traits::{MediaFetcher, SongLibrary};
use core_doc::{ReplicaDocument, SongRecord};
use core_sync::{ConnectionStatus, ProviderConfig, RelayServer, SyncProvider};

use crate::controller::QueueController;
use crate::error::Result;
use crate::orchestrator::{DownloadOrchestrator, OrchestratorHandle};
use crate::watcher::{CompletionWatcher, WatcherConfig};

/// What this replica is allowed to do.
pub enum SessionRole {
    /// The single replica that downloads on everyone's behalf. Owns the
    /// bridge implementations the orchestrator and catalog population need.
    Host {
        fetcher: Arc<dyn MediaFetcher>,
        library: Arc<dyn SongLibrary>,
    },
    /// A viewer: full queue access, no side-effect capability.
    Viewer,
}

impl SessionRole {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host { .. })
    }
}

impl std::fmt::Debug for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Host { .. } => "Host",
            Self::Viewer => "Viewer",
        })
    }
}

/// Session construction parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Document id shared by all replicas of one party.
    pub document_id: String,
    /// Relay to connect to. `None` together with `relay_listen: None` runs
    /// the replica local-only.
    pub relay_endpoint: Option<String>,
    /// When set, this replica also runs the relay (the usual host setup:
    /// viewers on the local network connect to the host). The session then
    /// connects to its own relay unless `relay_endpoint` overrides it.
    pub relay_listen: Option<SocketAddr>,
    pub watcher: WatcherConfig,
    pub provider: ProviderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            document_id: "karaoke".to_string(),
            relay_endpoint: None,
            relay_listen: None,
            watcher: WatcherConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = document_id.into();
        self
    }

    pub fn with_relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.relay_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_relay_listen(mut self, addr: SocketAddr) -> Self {
        self.relay_listen = Some(addr);
        self
    }

    pub fn with_watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }
}

/// One running replica.
pub struct KaraokeSession {
    document: ReplicaDocument,
    controller: Arc<QueueController>,
    watcher: CompletionWatcher,
    relay: Option<RelayServer>,
    provider: Option<SyncProvider>,
    orchestrator: Option<OrchestratorHandle>,
    shutdown: CancellationToken,
}

impl KaraokeSession {
    /// Create the document, connect the transport, and (on the host) populate
    /// the catalog and start the orchestrator.
    pub async fn start(config: SessionConfig, role: SessionRole) -> Result<Self> {
        info!(role = ?role, document_id = %config.document_id, "starting session");
        let document = ReplicaDocument::new();
        let shutdown = CancellationToken::new();

        let relay = match config.relay_listen {
            Some(addr) => Some(RelayServer::bind(addr).await?),
            None => None,
        };
        let endpoint = config
            .relay_endpoint
            .clone()
            .or_else(|| relay.as_ref().map(|r| r.endpoint()));
        let provider = endpoint.map(|endpoint| {
            SyncProvider::connect_with(
                endpoint,
                config.document_id.clone(),
                document.clone(),
                config.provider.clone(),
            )
        });

        let controller = Arc::new(QueueController::new(document.clone()));
        let watcher = CompletionWatcher::with_config(
            document.clone(),
            config.watcher.clone(),
            shutdown.child_token(),
        );

        let orchestrator = match role {
            SessionRole::Host { fetcher, library } => {
                let songs = library.list_available().await?;
                info!(count = songs.len(), "populating catalog from library");
                controller
                    .replace_catalog(songs.into_iter().map(SongRecord::from).collect())
                    .await;
                Some(DownloadOrchestrator::new(document.clone(), fetcher).spawn())
            }
            SessionRole::Viewer => None,
        };

        Ok(Self {
            document,
            controller,
            watcher,
            relay,
            provider,
            orchestrator,
            shutdown,
        })
    }

    pub fn controller(&self) -> Arc<QueueController> {
        self.controller.clone()
    }

    pub fn document(&self) -> &ReplicaDocument {
        &self.document
    }

    /// Connectivity of the transport, or `None` when running local-only.
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        self.provider.as_ref().map(|p| p.status())
    }

    /// Endpoint of the in-process relay, when this session runs one.
    pub fn relay_endpoint(&self) -> Option<String> {
        self.relay.as_ref().map(|r| r.endpoint())
    }

    /// Submit a download request without waiting for it.
    pub async fn submit_download(&self, song: SongRecord) -> Result<()> {
        self.controller.submit_download(song).await
    }

    /// Wait for a previously submitted download to finish.
    pub async fn await_download(&self, key: &str) -> Result<()> {
        self.watcher.await_download(key).await
    }

    /// Submit and wait: the one-call path viewers use.
    pub async fn download_song(&self, song: SongRecord) -> Result<()> {
        let key = song.key.clone();
        self.controller.submit_download(song).await?;
        self.watcher.await_download(&key).await
    }

    /// Tear the replica down: watcher waits are cancelled, the orchestrator
    /// and transport stop, and observers go away with the document.
    pub async fn shutdown(self) {
        info!("shutting down session");
        self.shutdown.cancel();
        if let Some(orchestrator) = self.orchestrator {
            orchestrator.shutdown().await;
        }
        if let Some(provider) = self.provider {
            provider.disconnect().await;
        }
        if let Some(relay) = self.relay {
            relay.shutdown().await;
        }
    }
}
