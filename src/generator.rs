//! Time-based state machine alternating election and block-collection
//! windows, aligned to the epoch (§4.N).
//!
//! Decoupled from [`crate::chain::Chain`]: callers hand in the current
//! head and epoch context rather than the generator owning either, so
//! the state decision stays a pure function of its inputs.

use crate::chain::EpochContext;
use crate::header::Header;
use crate::vdf;

/// Which window the node is currently in, and how long it must wait
/// before the window ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    /// The last quarter of the epoch: awaits inbound CAMPAIGN messages
    /// and may broadcast its own for each block number in the upcoming
    /// epoch.
    Election { epoch_start: u64, delay: u64 },
    /// Awaits inbound BLOCK messages for the current epoch.
    BlockCollection { epoch_start: u64, delay: u64 },
}

impl GeneratorState {
    pub fn delay(&self) -> u64 {
        match self {
            GeneratorState::Election { delay, .. } => *delay,
            GeneratorState::BlockCollection { delay, .. } => *delay,
        }
    }
}

/// `(epoch.size * 3 / 4) + epoch.start`: the last quarter of the epoch
/// is set aside for electing the next epoch's leaders.
pub fn leader_threshold(epoch: &EpochContext) -> u64 {
    (epoch.epoch_size * 3 / 4) + epoch.start
}

pub struct Generator {
    vdf_full: bool,
}

impl Generator {
    pub fn new(vdf_full: bool) -> Self {
        Self { vdf_full }
    }

    /// Reads `head`/`epoch` and decides which window the node should be
    /// in, along with the VDF-derived wait before the window ends.
    pub fn determine_state(&self, head: &Header, epoch: &EpochContext) -> GeneratorState {
        let t = vdf::effective_exponent(&head.hash(), self.vdf_full);
        let delay = t;

        if head.is_genesis() || head.block_number == leader_threshold(epoch) {
            GeneratorState::Election {
                epoch_start: epoch.start,
                delay,
            }
        } else {
            GeneratorState::BlockCollection {
                epoch_start: epoch.start,
                delay,
            }
        }
    }

    /// Runs the VDF evaluation for the current state's delay on a
    /// blocking thread, so the sequential squaring loop never stalls the
    /// async executor.
    pub async fn wait_out(&self, state: GeneratorState) -> num_bigint::BigUint {
        let t = state.delay();
        tokio::task::spawn_blocking(move || vdf::evaluate(t))
            .await
            .expect("vdf evaluation task panicked")
    }
}
