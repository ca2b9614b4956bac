//! socket-watch — connect to a control socket and log snapshot changes.
//!
//! Set `RUST_LOG=debug` to see individual frames and acknowledgments.

use clap::Parser;
use groundseg_socket::{ClientConfig, SnapshotStore, SocketClient, SocketEvent};
use log::{error, info};

/// Connect to a control socket and log snapshot changes.
#[derive(Debug, Parser)]
#[command(name = "socket-watch", version)]
struct Args {
    /// WebSocket address, e.g. ws://127.0.0.1:3000/ws
    address: String,
    /// Cookie string holding the session id (`sessionid=...`)
    cookie: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cookie = args.cookie.unwrap_or_default();

    let store = SnapshotStore::new();
    let mut snapshots = store.subscribe();
    let mut client = SocketClient::new(ClientConfig::new(args.address).with_cookie(cookie), store);
    let Some(mut events) = client.take_event_rx() else {
        error!("event receiver already taken");
        return;
    };

    if let Err(e) = client.connect() {
        error!("Failed to start client: {e}");
        return;
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let metadata = client.store().metadata();
                info!(
                    "snapshot updated (address={}, connected={})",
                    metadata.address, metadata.connected
                );
            }
            Some(event) = events.recv() => match event {
                SocketEvent::FrameMerged(frame) => log::debug!("frame: {frame}"),
                SocketEvent::GaveUp { attempts } => {
                    error!("gave up after {attempts} reconnect attempts");
                    break;
                }
                other => info!("{other:?}"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    match serde_json::to_string_pretty(&client.store().snapshot()) {
        Ok(doc) => println!("{doc}"),
        Err(e) => error!("Failed to render final snapshot: {e}"),
    }
}
