//! Control socket client.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, automatic reconnect, shutdown)
//! - Request send with acknowledgment via the shared snapshot
//! - Lifecycle events for the application
//!
//! The snapshot store is injected, so several components can share one
//! document and tests can inspect it directly.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use crate::activity::{ActivityTracker, Confirmation, Dispatcher};
use crate::config::ClientConfig;
use crate::protocol::{ClientError, Envelope};
use crate::session::{CookieJar, RandomIds, RequestIdGenerator, SessionSource};
use crate::snapshot::SnapshotStore;
use crate::transport::{Link, TransportManager};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A connection attempt started
    Connecting { address: String, attempt: u32 },
    /// Transport open, handshake queued
    Connected { address: String },
    /// An inbound frame was merged into the snapshot
    FrameMerged(Value),
    /// Transport closed or failed to open
    Disconnected,
    /// Next attempt will start after `delay`
    ReconnectScheduled { delay: Duration },
    /// Attempt cap reached; the client stopped
    GaveUp { attempts: u32 },
    /// Explicit shutdown completed
    Shutdown,
}

/// The control socket client.
///
/// One persistent connection to `config.address`, reconnected after every
/// close until [`SocketClient::shutdown`] is called.
pub struct SocketClient {
    config: ClientConfig,

    /// Shared snapshot document
    store: SnapshotStore,

    /// Requests awaiting acknowledgment
    tracker: ActivityTracker,

    /// Outbound queue of the live connection
    link: Link,

    state: Arc<RwLock<ConnectionState>>,

    session: Arc<dyn SessionSource>,
    ids: Arc<dyn RequestIdGenerator>,

    event_tx: mpsc::Sender<SocketEvent>,
    event_rx: Option<mpsc::Receiver<SocketEvent>>,

    shutdown_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl SocketClient {
    /// Create a client over an existing snapshot store.
    pub fn new(config: ClientConfig, store: SnapshotStore) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            store,
            tracker: ActivityTracker::new(),
            link: Link::default(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            session: Arc::new(CookieJar),
            ids: Arc::new(RandomIds),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx,
            supervisor: None,
        }
    }

    /// Replace the session-id lookup.
    pub fn with_session_source(mut self, source: impl SessionSource + 'static) -> Self {
        self.session = Arc::new(source);
        self
    }

    /// Replace the request-id generator.
    pub fn with_id_generator(mut self, ids: impl RequestIdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SocketEvent>> {
        self.event_rx.take()
    }

    /// Start the connection loop.
    ///
    /// Returns immediately; connection progress is visible through the
    /// snapshot metadata and lifecycle events.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.is_running() {
            return Err(ClientError::AlreadyRunning);
        }

        self.shutdown_tx.send_replace(false);
        let manager = TransportManager {
            config: self.config.clone(),
            store: self.store.clone(),
            tracker: self.tracker.clone(),
            dispatcher: self.dispatcher(),
            link: self.link.clone(),
            state: self.state.clone(),
            events: self.event_tx.clone(),
        };
        self.supervisor = Some(tokio::spawn(manager.run(self.shutdown_tx.subscribe())));
        Ok(())
    }

    /// Close the live connection, if any.
    ///
    /// The close runs the normal close path, so a reconnect follows after
    /// the configured delay. Use [`SocketClient::shutdown`] to stop for good.
    pub async fn disconnect(&self) {
        if !self.link.close().await {
            log::debug!("disconnect: no live connection");
        }
    }

    /// Stop the connection loop, close the transport and fail every
    /// outstanding confirmation. The client can be connected again later.
    pub async fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);
        self.link.close().await;

        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                log::error!("Transport task failed: {e}");
            }
        }

        let abandoned = self.tracker.fail_all().await;
        if abandoned > 0 {
            log::info!("Abandoned {abandoned} unconfirmed request(s)");
        }
        self.store.set_connected(false);
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Send a request and wait for its acknowledgment.
    ///
    /// Returns `false` straight away when not connected. Otherwise resolves
    /// `true` once an inbound frame carries the request id under `activity`.
    pub async fn send(&self, envelope: Envelope) -> bool {
        match self.dispatch(envelope).await {
            Ok(confirmation) => confirmation.wait().await,
            Err(ClientError::NotConnected) => false,
            Err(e) => {
                log::error!("Send failed: {e}");
                false
            }
        }
    }

    /// Send a request and return its pending acknowledgment.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<Confirmation, ClientError> {
        if !self.store.is_connected() {
            log::error!("Not connected to websocket");
            return Err(ClientError::NotConnected);
        }
        self.dispatcher().dispatch(envelope).await
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            link: self.link.clone(),
            tracker: self.tracker.clone(),
            session: self.session.clone(),
            ids: self.ids.clone(),
            cookie: self.config.session_cookie.clone(),
            session_key: self.config.session_key.clone(),
            id_len: self.config.request_id_len,
            ack_timeout: self.config.ack_timeout,
        }
    }

    /// Whether the connection loop is running.
    pub fn is_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Shared snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Requests still waiting for acknowledgment.
    pub async fn pending_requests(&self) -> usize {
        self.tracker.pending_count().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
