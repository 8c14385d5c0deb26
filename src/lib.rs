pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod freezer;
pub mod generator;
pub mod header;
pub mod leader_schedule;
pub mod mempool;
pub mod net;
pub mod node;
pub mod peer;
pub mod snowball;
pub mod transaction;
pub mod types;
pub mod vdf;
pub mod vm;
pub mod vrf;

pub use block::{Block, Receipt};
pub use chain::{Chain, EpochContext, GenesisParams};
pub use config::{Args, NodeConfig};
pub use freezer::Freezer;
pub use generator::{Generator, GeneratorState};
pub use header::Header;
pub use leader_schedule::{Leader, LeaderSchedule};
pub use mempool::Mempool;
pub use node::Node;
pub use snowball::{Decision, Snowball, SnowballParams};
pub use transaction::SignedTransaction;
pub use vm::{MemoryVm, Vm};
