//! Transport supervisor: owns the WebSocket lifecycle.
//!
//! ```text
//!        ┌────────────────────────────────────────────────┐
//!        ▼                                                │
//!  Connecting ──open──► Connected ──close/error──► Reconnecting
//!        │                                   (fixed delay) │
//!        └──failed open──────────────────────────────────►─┘
//! ```
//!
//! One supervisor task runs the loop. Each live connection is split into a
//! reader and a writer; the writer drains the connection's outbound queue,
//! which is replaced on every reconnect. The loop only ends on shutdown or
//! when the optional attempt cap is reached.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::activity::{ActivityTracker, Dispatcher};
use crate::client::{ConnectionState, SocketEvent};
use crate::config::ClientConfig;
use crate::protocol::{parse_frame, ClientError, Envelope};
use crate::snapshot::SnapshotStore;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Unit of work for a connection's writer.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Close,
}

/// Outbound queue of the current connection, if any.
#[derive(Clone, Default)]
pub(crate) struct Link {
    current: Arc<RwLock<Option<mpsc::UnboundedSender<Outbound>>>>,
}

impl Link {
    pub(crate) async fn install(&self, tx: mpsc::UnboundedSender<Outbound>) {
        *self.current.write().await = Some(tx);
    }

    pub(crate) async fn clear(&self) {
        self.current.write().await.take();
    }

    pub(crate) async fn push(&self, outbound: Outbound) -> Result<(), ClientError> {
        match self.current.read().await.as_ref() {
            Some(tx) => tx.send(outbound).map_err(|_| ClientError::ConnectionClosed),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Ask the current connection to close. No-op without one.
    pub(crate) async fn close(&self) -> bool {
        self.push(Outbound::Close).await.is_ok()
    }
}

/// How a served connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Served {
    Closed,
    Shutdown,
}

pub(crate) struct TransportManager {
    pub(crate) config: ClientConfig,
    pub(crate) store: SnapshotStore,
    pub(crate) tracker: ActivityTracker,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) link: Link,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) events: mpsc::Sender<SocketEvent>,
}

impl TransportManager {
    /// Run the connect / serve / reconnect loop until shutdown.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let address = self.config.address.clone();
        let mut attempt: u32 = 0;
        let mut retries: u32 = 0;

        while !*shutdown.borrow() {
            attempt += 1;
            self.set_state(ConnectionState::Connecting).await;
            self.store.set_address(&address);
            self.emit(SocketEvent::Connecting {
                address: address.clone(),
                attempt,
            });
            log::info!("Connecting to {address} (attempt {attempt})");

            let opened = tokio::select! {
                result = tokio_tungstenite::connect_async(address.as_str()) => result,
                _ = shutdown.changed() => break,
            };

            match opened {
                Ok((socket, _)) => {
                    retries = 0;
                    if self.serve(socket, &mut shutdown).await == Served::Shutdown {
                        break;
                    }
                    log::info!("Websocket closed");
                }
                Err(e) => log::warn!("Websocket failed to connect to {address}: {e}"),
            }

            self.close_link().await;
            self.emit(SocketEvent::Disconnected);

            if *shutdown.borrow() {
                break;
            }
            if let Some(max) = self.config.max_reconnect_attempts {
                if retries >= max {
                    log::error!("Giving up on {address} after {retries} reconnect attempts");
                    self.abandon_pending().await;
                    self.emit(SocketEvent::GaveUp { attempts: retries });
                    return;
                }
            }
            retries += 1;

            let delay = self.config.reconnect_delay;
            self.set_state(ConnectionState::Reconnecting).await;
            self.emit(SocketEvent::ReconnectScheduled { delay });
            log::info!("Attempting to reconnect in {delay:?}");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.close_link().await;
        self.abandon_pending().await;
        self.emit(SocketEvent::Shutdown);
        log::info!("Transport for {address} shut down");
    }

    /// Drive one open connection until it closes or shutdown is requested.
    async fn serve(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) -> Served {
        let (mut writer, mut reader) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        self.link.install(tx).await;

        // Queued before the connection is visible as connected, so the
        // handshake precedes every caller-issued request.
        match self.dispatcher.dispatch(Envelope::ping()).await {
            // A bounded wait retires the registration if the peer never echoes it.
            Ok(handshake) if self.config.ack_timeout.is_some() => {
                tokio::spawn(handshake.wait());
            }
            Ok(_) => {}
            Err(e) => log::warn!("Handshake not sent: {e}"),
        }
        self.store.set_connected(true);
        self.set_state(ConnectionState::Connected).await;
        self.emit(SocketEvent::Connected {
            address: self.config.address.clone(),
        });

        let write_loop = async {
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Frame(text) => {
                        if let Err(e) = writer.send(Message::Text(text.into())).await {
                            log::warn!("Websocket write failed: {e}");
                            break;
                        }
                    }
                    Outbound::Close => {
                        log::info!("Closing websocket");
                        if let Err(e) = writer.close().await {
                            log::debug!("Close handshake failed: {e}");
                        }
                        break;
                    }
                }
            }
        };

        let read_loop = async {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => self.handle_frame(text.as_str()).await,
                    Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                        Ok(text) => self.handle_frame(text).await,
                        Err(_) => {
                            log::warn!("Dropping non UTF-8 binary frame ({} bytes)", data.len())
                        }
                    },
                    Ok(Message::Close(reason)) => {
                        log::debug!("Close frame from peer: {reason:?}");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Websocket error: {e}");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = read_loop => Served::Closed,
            _ = write_loop => Served::Closed,
            _ = shutdown.changed() => Served::Shutdown,
        }
    }

    /// Merge one inbound frame and resolve any acknowledgments it carries.
    async fn handle_frame(&self, text: &str) {
        let update = match parse_frame(text) {
            Ok(update) => update,
            Err(e) => {
                log::warn!("Dropping inbound frame: {e}");
                return;
            }
        };

        self.store.merge(&update);
        let confirmed = self.tracker.settle(&self.store).await;
        if confirmed > 0 {
            log::debug!("Frame acknowledged {confirmed} request(s)");
        }
        self.emit(SocketEvent::FrameMerged(update));
    }

    async fn close_link(&self) {
        self.link.clear().await;
        self.store.set_connected(false);
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// No transport remains to carry acknowledgments; resolve every
    /// outstanding confirmation as unconfirmed.
    async fn abandon_pending(&self) {
        let abandoned = self.tracker.fail_all().await;
        if abandoned > 0 {
            log::info!("Abandoned {abandoned} unconfirmed request(s)");
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    fn emit(&self, event: SocketEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::debug!("Lifecycle event dropped: {e}");
        }
    }
}
