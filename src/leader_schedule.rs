//! Block-number → elected leader mapping (§4.F).
//!
//! Monotonic in campaign value: a new entry is only accepted if its
//! campaign strictly exceeds the currently stored one for that block
//! number (ties keep the first arrival).

use std::collections::HashMap;

use num_bigint::BigUint;
use tokio::sync::Mutex;

use crate::types::Address;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leader {
    pub address: Address,
    pub stake: u64,
    pub campaign: BigUint,
}

impl Leader {
    pub fn new(address: Address, stake: u64, campaign: BigUint) -> Self {
        Self {
            address,
            stake,
            campaign,
        }
    }
}

pub struct LeaderSchedule {
    schedule: Mutex<HashMap<u64, Leader>>,
}

impl LeaderSchedule {
    pub fn new() -> Self {
        Self {
            schedule: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `leader` at `block_number` only if it beats the current holder.
    /// Returns `true` if the schedule changed.
    pub async fn add_leader(&self, block_number: u64, leader: Leader) -> bool {
        let mut schedule = self.schedule.lock().await;
        match schedule.get(&block_number) {
            Some(current) if leader.campaign <= current.campaign => false,
            _ => {
                schedule.insert(block_number, leader);
                true
            }
        }
    }

    /// Like [`LeaderSchedule::add_leader`], but weighs the campaign by
    /// stake before comparing, so higher-stake leaders need a smaller raw
    /// VRF output to win. The dispatcher's CAMPAIGN handler uses the
    /// unweighted path by default; this variant is exposed for callers
    /// that opt into stake weighting.
    pub async fn add_leader_weighted(&self, block_number: u64, leader: Leader) -> bool {
        let weighted_campaign = &leader.campaign * BigUint::from(leader.stake.max(1));
        let mut schedule = self.schedule.lock().await;
        match schedule.get(&block_number) {
            Some(current) => {
                let current_weighted = &current.campaign * BigUint::from(current.stake.max(1));
                if weighted_campaign <= current_weighted {
                    return false;
                }
                schedule.insert(block_number, leader);
                true
            }
            None => {
                schedule.insert(block_number, leader);
                true
            }
        }
    }

    pub async fn get(&self, block_number: u64) -> Option<Leader> {
        self.schedule.lock().await.get(&block_number).cloned()
    }
}

impl Default for LeaderSchedule {
    fn default() -> Self {
        Self::new()
    }
}
