//! Snowball decision store (§4.G): per-block decision record plus an
//! index of undecided block hashes competing at each height.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::header::Header;
use crate::types::Hash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub header: Header,
    pub chit: bool,
    pub confidence: i64,
    pub consecutive_successes: i64,
}

impl Decision {
    fn new(header: Header) -> Self {
        Self {
            header,
            chit: false,
            confidence: 0,
            consecutive_successes: 0,
        }
    }
}

struct Inner {
    undecided_blocks: HashMap<u64, Vec<Hash>>,
    decisions: HashMap<Hash, Decision>,
}

/// Sampling parameters for the repeated-query decision process (§4.G).
/// `beta` is the consecutive-success threshold a block needs before the
/// caller may treat it as final; `sample_size` is how many peers are
/// queried per round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnowballParams {
    pub beta: u32,
    pub sample_size: usize,
}

impl Default for SnowballParams {
    fn default() -> Self {
        Self {
            beta: 15,
            sample_size: 20,
        }
    }
}

pub struct Snowball {
    inner: Mutex<Inner>,
    params: SnowballParams,
}

impl Snowball {
    pub fn new() -> Self {
        Self::with_params(SnowballParams::default())
    }

    pub fn with_params(params: SnowballParams) -> Self {
        Self {
            inner: Mutex::new(Inner {
                undecided_blocks: HashMap::new(),
                decisions: HashMap::new(),
            }),
            params,
        }
    }

    pub fn params(&self) -> SnowballParams {
        self.params
    }

    /// A block is final once its `consecutive_successes` reaches `beta`;
    /// the caller then moves the header into the chain and calls
    /// [`Snowball::remove_block`].
    pub async fn is_finalized(&self, block_hash: &Hash) -> bool {
        let inner = self.inner.lock().await;
        inner
            .decisions
            .get(block_hash)
            .is_some_and(|d| d.consecutive_successes >= self.params.beta as i64)
    }

    /// First undecided hash at `block_number`'s decision, if any.
    pub async fn get_decision_by_block_number(&self, block_number: u64) -> Option<Decision> {
        let inner = self.inner.lock().await;
        let hash = inner.undecided_blocks.get(&block_number)?.first()?;
        inner.decisions.get(hash).cloned()
    }

    pub async fn get_decision(&self, block_hash: &Hash) -> Option<Decision> {
        self.inner.lock().await.decisions.get(block_hash).cloned()
    }

    /// Stages `header` for querying. Returns `false` if already present.
    pub async fn add_block(&self, header: Header) -> bool {
        let mut inner = self.inner.lock().await;
        let hash = header.hash();
        if inner.decisions.contains_key(&hash) {
            return false;
        }
        let block_number = header.block_number;
        inner.decisions.insert(hash, Decision::new(header));
        inner
            .undecided_blocks
            .entry(block_number)
            .or_default()
            .push(hash);
        true
    }

    /// Removes a block that the network decided against.
    pub async fn remove_block(&self, block_hash: &Hash) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(decision) = inner.decisions.remove(block_hash) else {
            return false;
        };
        let block_number = decision.header.block_number;
        if let Some(siblings) = inner.undecided_blocks.get_mut(&block_number) {
            siblings.retain(|h| h != block_hash);
        }
        true
    }

    pub async fn update_chit(&self, block_hash: &Hash, chit: bool) -> bool {
        self.with_decision(block_hash, |d| d.chit = chit).await
    }

    pub async fn increment_confidence(&self, block_hash: &Hash) -> bool {
        self.with_decision(block_hash, |d| d.confidence += 1).await
    }

    pub async fn decrement_confidence(&self, block_hash: &Hash) -> bool {
        self.with_decision(block_hash, |d| d.confidence -= 1).await
    }

    pub async fn increment_consecutive_successes(&self, block_hash: &Hash) -> bool {
        self.with_decision(block_hash, |d| d.consecutive_successes += 1)
            .await
    }

    pub async fn decrement_consecutive_successes(&self, block_hash: &Hash) -> bool {
        self.with_decision(block_hash, |d| d.consecutive_successes -= 1)
            .await
    }

    async fn with_decision(&self, block_hash: &Hash, f: impl FnOnce(&mut Decision)) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.decisions.get_mut(block_hash) {
            Some(decision) => {
                f(decision);
                true
            }
            None => false,
        }
    }
}

impl Default for Snowball {
    fn default() -> Self {
        Self::new()
    }
}
