//! Connection sharing example
//!
//! Several request handlers share one expensive connection. The first handler
//! to ask opens it, handlers arriving during the open queue behind it, and
//! the connection is closed when the last handler is done. A second wave of
//! requests then opens a fresh connection.
//!
//! Run with `RUST_LOG=lazyshare=debug cargo run --example connection_sharing`
//! to see every state transition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazyshare::{ResourceFactory, ResourceName, SharedResource, SharedResourceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pretend network session.
#[derive(Debug)]
struct Session {
    id: u64,
    peer: String,
}

impl Session {
    async fn query(&self, request: u32) -> String {
        tokio::time::sleep(Duration::from_millis(5)).await;
        format!("session {} at {} answered request {request}", self.id, self.peer)
    }
}

struct SessionFactory {
    peer: String,
    next_id: AtomicU64,
}

#[async_trait]
impl ResourceFactory for SessionFactory {
    type Resource = Session;
    type Error = std::io::Error;

    async fn open(&self) -> Result<Session, std::io::Error> {
        // Handshake.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(session = id, peer = %self.peer, "session established");
        Ok(Session {
            id,
            peer: self.peer.clone(),
        })
    }

    async fn close(&self, session: Arc<Session>) -> Result<(), std::io::Error> {
        info!(session = session.id, "session closed");
        Ok(())
    }
}

async fn handle_request(shared: SharedResource<SessionFactory>, request: u32) {
    match shared.open().await {
        Ok(mut handle) => {
            if let Ok(session) = handle.value() {
                info!("{}", session.query(request).await);
            }
            if let Err(error) = handle.close().await {
                tracing::warn!(%error, request, "closing the session failed");
            }
        }
        Err(error) => tracing::warn!(%error, request, "no session available"),
    }
}

async fn wave(shared: &SharedResource<SessionFactory>, requests: std::ops::Range<u32>) {
    let tasks: Vec<_> = requests
        .map(|request| tokio::spawn(handle_request(shared.clone(), request)))
        .collect();
    for task in tasks {
        if let Err(error) = task.await {
            tracing::error!(%error, "request task failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SharedResourceConfig::new().with_name(ResourceName::try_new("upstream-session")?);
    let shared = SharedResource::with_config(
        SessionFactory {
            peer: "10.0.0.7:5432".to_string(),
            next_id: AtomicU64::new(0),
        },
        config,
    );

    info!("first wave");
    wave(&shared, 0..5).await;
    info!(status = ?shared.status(), "first wave done");

    info!("second wave");
    wave(&shared, 5..8).await;

    let stats = shared.stats();
    info!(
        generations = stats.generations_started,
        handles = stats.handles_issued,
        teardowns = stats.teardowns,
        "done"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
