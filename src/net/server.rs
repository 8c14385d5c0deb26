//! Accept loop: binds the configured port, spawns one task per accepted
//! connection, and watches a shutdown flag polled every 2 s (§4.K).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::net::connection::PeerConnection;
use crate::net::dispatcher::{dispatch, DispatchContext};
use crate::peer::PeerId;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Server {
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self {
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Runs the accept loop until `shutdown` is set. Each accepted socket
    /// is dispatched inline on its own spawned task — the server itself
    /// does not interpret messages beyond the codec validation already
    /// done by [`crate::net::dispatcher`].
    pub async fn run<F>(&self, make_context: F)
    where
        F: Fn() -> DispatchContextOwned + Send + Sync + 'static,
    {
        let make_context = Arc::new(make_context);
        while !self.shutdown.load(Ordering::Relaxed) {
            let accepted = tokio::time::timeout(ACCEPT_TIMEOUT, self.listener.accept()).await;
            let Ok(Ok((stream, addr))) = accepted else {
                continue;
            };
            let make_context = Arc::clone(&make_context);
            tokio::spawn(async move {
                let mut conn =
                    PeerConnection::from_accepted(stream, addr.ip().to_string(), addr.port());
                let requester = PeerId::new(addr.ip().to_string(), addr.port().to_string());
                while let Some(message) = conn.receive_data().await {
                    let owned = make_context();
                    let ctx = owned.as_context();
                    match dispatch(&ctx, &requester, &message).await {
                        Ok(Some(reply)) => {
                            if let Err(e) = conn
                                .send_data(reply.message_type, reply.flag, reply.data)
                                .await
                            {
                                warn!(error = %e, "failed to send dispatcher reply, closing connection");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "dispatcher error, closing connection");
                            break;
                        }
                    }
                }
            });
        }
        info!("server accept loop exiting on shutdown signal");
    }
}

/// Owned snapshot of what [`DispatchContext`] needs, so a spawned
/// per-connection task can rebuild borrowed context on each message
/// without holding the Node across an await point. Cheap to clone —
/// every field is an `Arc` or a small `String` — which lets callers
/// (e.g. [`crate::net::bootstrap`]) hand one to each per-peer task.
#[derive(Clone)]
pub struct DispatchContextOwned {
    pub chain: Arc<crate::chain::Chain>,
    pub mempool: Arc<crate::mempool::Mempool>,
    pub leader_schedule: Arc<crate::leader_schedule::LeaderSchedule>,
    pub snowball: Arc<crate::snowball::Snowball>,
    pub peers: Arc<crate::net::peer::PeerSet>,
    pub freezer: Arc<crate::freezer::Freezer>,
    pub bootstrapping: Arc<AtomicBool>,
    pub self_version: String,
    pub self_address: String,
    pub self_port: String,
}

impl DispatchContextOwned {
    pub fn as_context(&self) -> DispatchContext<'_> {
        DispatchContext {
            chain: &self.chain,
            mempool: &self.mempool,
            leader_schedule: &self.leader_schedule,
            snowball: &self.snowball,
            peers: &self.peers,
            freezer: &self.freezer,
            is_bootstrapping: self.bootstrapping.load(Ordering::Relaxed),
            self_version: &self.self_version,
            self_address: &self.self_address,
            self_port: &self.self_port,
        }
    }
}
