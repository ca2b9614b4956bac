//! Outbound send path and acknowledgment tracking.
//!
//! A request is acknowledged when any inbound frame places its id under the
//! snapshot's `activity` map:
//!
//! ```text
//! dispatch()                          inbound frame
//!   │ register(id) ──► pending          │ merge into snapshot
//!   │ write frame                       │ settle(): id in activity?
//!   ▼                                   │   ├─ remove activity[id]
//! Confirmation::wait() ◄── oneshot ─────┘   └─ fire completion
//! ```
//!
//! Registration happens before the frame is written, so an acknowledgment
//! can never arrive ahead of its registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::protocol::{ClientError, Envelope};
use crate::session::{RequestIdGenerator, SessionSource};
use crate::snapshot::SnapshotStore;
use crate::transport::{Link, Outbound};

struct PendingRequest {
    prefix: String,
    done: oneshot::Sender<bool>,
}

/// Requests waiting for their id to show up in `activity`.
#[derive(Clone, Default)]
pub struct ActivityTracker {
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stamped request. The receiver yields `true` once the
    /// request is acknowledged, or `false` if the tracker gives up on it.
    pub async fn register(&self, envelope: &Envelope) -> oneshot::Receiver<bool> {
        let (done, rx) = oneshot::channel();
        let pending = PendingRequest {
            prefix: envelope.log_prefix(),
            done,
        };
        if let Some(replaced) = self.pending.lock().await.insert(envelope.id.clone(), pending) {
            log::warn!("{} request id reused before acknowledgment", replaced.prefix);
            let _ = replaced.done.send(false);
        }
        rx
    }

    /// Resolve every pending request whose id is present in the snapshot's
    /// `activity` map, removing those entries. Returns how many resolved.
    pub async fn settle(&self, store: &SnapshotStore) -> usize {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return 0;
        }

        let confirmed = store.take_activity(pending.keys());
        for id in &confirmed {
            if let Some(request) = pending.remove(id) {
                log::info!("{} send confirmed", request.prefix);
                // Receiver may be gone (handshake pings are fire-and-forget).
                let _ = request.done.send(true);
            }
        }
        confirmed.len()
    }

    /// Stop tracking `id` without resolving it.
    pub async fn forget(&self, id: &str) -> bool {
        self.pending.lock().await.remove(id).is_some()
    }

    /// Resolve every pending request as unconfirmed.
    pub async fn fail_all(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for (_, request) in pending.drain() {
            log::debug!("{} abandoned", request.prefix);
            let _ = request.done.send(false);
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().await.contains_key(id)
    }
}

/// Handle to a dispatched request's acknowledgment.
pub struct Confirmation {
    id: String,
    rx: oneshot::Receiver<bool>,
    timeout: Option<Duration>,
    tracker: ActivityTracker,
}

impl Confirmation {
    /// Request id stamped on the outbound frame.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the acknowledgment.
    ///
    /// Without a timeout this waits until the peer echoes the id, or the
    /// client shuts down (`false`).
    pub async fn wait(self) -> bool {
        let Confirmation {
            id,
            rx,
            timeout,
            tracker,
        } = self;

        let outcome = match timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::warn!("{id} not acknowledged within {limit:?}");
                    tracker.forget(&id).await;
                    return false;
                }
            },
        };
        outcome.unwrap_or(false)
    }
}

/// Stamps, writes and registers outbound requests.
///
/// Does not check `metadata.connected`; callers that need the precondition
/// check it first.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub(crate) link: Link,
    pub(crate) tracker: ActivityTracker,
    pub(crate) session: Arc<dyn SessionSource>,
    pub(crate) ids: Arc<dyn RequestIdGenerator>,
    pub(crate) cookie: String,
    pub(crate) session_key: String,
    pub(crate) id_len: usize,
    pub(crate) ack_timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) async fn dispatch(
        &self,
        mut envelope: Envelope,
    ) -> Result<Confirmation, ClientError> {
        let id = self.ids.generate(self.id_len);
        log::debug!("{id} attempting to send message..");

        let sessionid = self
            .session
            .session_id(&self.cookie, &self.session_key)
            .unwrap_or_else(|| {
                log::warn!("No '{}' in session cookie", self.session_key);
                String::new()
            });
        envelope.stamp(id.clone(), sessionid);
        let frame = envelope.encode()?;

        let rx = self.tracker.register(&envelope).await;
        if let Err(e) = self.link.push(Outbound::Frame(frame)).await {
            self.tracker.forget(&id).await;
            return Err(e);
        }
        log::debug!("{} checking broadcast..", envelope.log_prefix());

        Ok(Confirmation {
            id,
            rx,
            timeout: self.ack_timeout,
            tracker: self.tracker.clone(),
        })
    }
}
