//! UDP heartbeat channel (§6): liveness pings travel over a datagram
//! socket, separate from the TCP request/response transport the rest of
//! `net` uses.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::net::UdpSocket;
use tracing::warn;

use crate::error::NetError;
use crate::net::message::{Message, MessageFlag, MessageType};
use crate::net::types::MESSAGE_SIZE_LIMIT;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const RECV_POLL: Duration = Duration::from_secs(2);

/// Answers inbound PING datagrams with PONG, polled against a shutdown
/// flag the same way [`crate::net::server::Server`] polls its own.
pub struct HeartbeatService {
    socket: UdpSocket,
}

impl HeartbeatService {
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    pub async fn serve(&self, shutdown: Arc<AtomicBool>) {
        let mut buf = vec![0u8; MESSAGE_SIZE_LIMIT];
        while !shutdown.load(Ordering::Relaxed) {
            let received = tokio::time::timeout(RECV_POLL, self.socket.recv_from(&mut buf)).await;
            let Ok(Ok((n, addr))) = received else {
                continue;
            };
            let Ok(message) = Message::decode(&buf[..n]) else {
                continue;
            };
            if message.message_type != MessageType::Request || message.flag != MessageFlag::Heartbeat {
                continue;
            }
            let pong = Message::new(MessageType::Response, MessageFlag::Heartbeat, json!("PONG"));
            let Ok(bytes) = pong.encode() else { continue };
            if let Err(e) = self.socket.send_to(&bytes, addr).await {
                warn!(error = %e, "failed to answer heartbeat");
            }
        }
    }
}

/// Dials `host:port` over UDP, sends a PING, and returns the PONG round
/// trip in milliseconds. The caller ([`crate::node::Node`]) is
/// responsible for recording the measurement against the peer record.
pub async fn ping(host: &str, port: u16) -> Result<u64, NetError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|_| NetError::Closed)?;
    socket.connect(addr).await?;

    let request = Message::new(MessageType::Request, MessageFlag::Heartbeat, json!("PING"));
    let bytes = request.encode()?;
    let started = Instant::now();
    socket.send(&bytes).await?;

    let mut buf = vec![0u8; MESSAGE_SIZE_LIMIT];
    let n = tokio::time::timeout(PING_TIMEOUT, socket.recv(&mut buf))
        .await
        .map_err(|_| NetError::Closed)??;
    Message::decode(&buf[..n])?;
    Ok(started.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_round_trips_over_udp() {
        let service = HeartbeatService::bind(0).await.unwrap();
        let port = service.local_port().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_server = Arc::clone(&shutdown);
        let server = tokio::spawn(async move { service.serve(shutdown_for_server).await });

        let round_trip_ms = ping("127.0.0.1", port).await.unwrap();
        assert!(round_trip_ms < PING_TIMEOUT.as_millis() as u64);

        shutdown.store(true, Ordering::Relaxed);
        let _ = tokio::time::timeout(Duration::from_secs(3), server).await;
    }

    #[tokio::test]
    async fn ping_against_nothing_listening_times_out() {
        let result = ping("127.0.0.1", 1).await;
        assert!(result.is_err());
    }
}
