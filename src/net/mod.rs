//! P2P networking layer (§4.I–§4.M): framed messages, a dispatcher that
//! routes each flag to a handler, an accept loop, and bootstrap.

pub mod bootstrap;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod message;
pub mod peer;
pub mod server;
pub mod types;

pub use bootstrap::{bootstrap, PeerSource};
pub use connection::PeerConnection;
pub use dispatcher::dispatch;
pub use message::{Message, MessageFlag, MessageType};
pub use peer::{PeerSet, LOOPBACK_ADDRESS};
pub use server::Server;
pub use types::{DEFAULT_PORT, MAX_PEERS, MESSAGE_SIZE_LIMIT};
