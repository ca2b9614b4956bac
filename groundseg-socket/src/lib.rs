//! # groundseg-socket — Control socket client
//!
//! Keeps one persistent WebSocket connection to the control service and
//! exposes its live state as a deep-merged JSON snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   send()    ┌─────────────────┐   JSON text   ┌──────────┐
//! │ SocketClient │ ──────────► │ TransportManager│ ◄───────────► │  Server  │
//! └──────┬───────┘             └────────┬────────┘               └──────────┘
//!        │ Confirmation                 │ inbound frame
//!        ▼                              ▼
//! ┌──────────────┐   settle()  ┌─────────────────┐
//! │ActivityTracker│ ◄───────── │ SnapshotStore   │ ◄── deep_merge
//! └──────────────┘             └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`merge`] — structural merge of partial updates
//! - [`snapshot`] — shared, observable snapshot document
//! - [`protocol`] — request envelope, frame parsing, errors
//! - [`session`] — session-id lookup and request-id generation
//! - [`activity`] — acknowledgment tracking for sent requests
//! - [`client`] — connection lifecycle and send path
//! - [`config`] — reconnect policy and request settings

pub mod activity;
pub mod client;
pub mod config;
pub mod merge;
pub mod protocol;
pub mod session;
pub mod snapshot;
mod transport;

// Re-exports for convenience
pub use activity::{ActivityTracker, Confirmation};
pub use client::{ConnectionState, SocketClient, SocketEvent};
pub use config::ClientConfig;
pub use merge::deep_merge;
pub use protocol::{parse_frame, ClientError, Envelope, PING_CATEGORY};
pub use session::{CookieJar, RandomIds, RequestIdGenerator, SessionSource};
pub use snapshot::{initial_document, Metadata, SnapshotStore};
