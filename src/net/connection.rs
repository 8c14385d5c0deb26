//! Per-socket framed send/receive (§4.I): one [`PeerConnection`] per
//! outbound send or inbound accept, dropped when the exchange is done.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::NetError;
use crate::net::message::{Message, MessageFlag, MessageType};
use crate::net::types::MESSAGE_SIZE_LIMIT;

/// Wraps one TCP stream. Construction dials (or accepts) the socket;
/// `send_data`/`receive_data` never retry internally — the caller (the
/// Node's `send`) owns the retry-once policy (§4.L).
pub struct PeerConnection {
    host: String,
    port: u16,
    stream: TcpStream,
}

impl PeerConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self, NetError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            host: host.to_string(),
            port,
            stream,
        })
    }

    pub fn from_accepted(stream: TcpStream, host: String, port: u16) -> Self {
        Self { host, port, stream }
    }

    pub fn peer_addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Builds a message via the codec and writes the encoded bytes.
    pub async fn send_data(
        &mut self,
        message_type: MessageType,
        flag: MessageFlag,
        data: Value,
    ) -> Result<(), NetError> {
        let message = Message::new(message_type, flag, data);
        let encoded = message.encode()?;
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads up to [`MESSAGE_SIZE_LIMIT`] bytes and decodes one message.
    /// Returns `None` on a closed connection or a malformed envelope —
    /// the caller decides whether and how to retry.
    pub async fn receive_data(&mut self) -> Option<Message> {
        let mut buf = vec![0u8; MESSAGE_SIZE_LIMIT];
        let n = self.stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        Message::decode(&buf[..n]).ok()
    }

    /// Best-effort liveness probe: a zero-length write fails fast on a
    /// dead socket without disturbing the framing of the next real
    /// message.
    pub async fn is_open(&mut self) -> bool {
        self.stream.write_all(&[]).await.is_ok()
    }

    /// Redials the same (host, port), replacing the underlying stream.
    pub async fn reconnect(&mut self) -> Result<(), NetError> {
        self.stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_then_receive_round_trips_a_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = PeerConnection::from_accepted(stream, addr.ip().to_string(), addr.port());
            conn.receive_data().await.unwrap()
        });

        let mut client = PeerConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        client
            .send_data(
                MessageType::Request,
                MessageFlag::Heartbeat,
                json!("PING"),
            )
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.flag, MessageFlag::Heartbeat);
        assert_eq!(received.data, json!("PING"));
    }

    #[tokio::test]
    async fn receive_on_closed_socket_returns_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = PeerConnection::from_accepted(stream, addr.ip().to_string(), addr.port());
            conn.receive_data().await
        });

        let client = PeerConnection::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        drop(client);

        assert!(server.await.unwrap().is_none());
    }
}
