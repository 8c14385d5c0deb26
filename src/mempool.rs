//! Bounded, time-expiring collection of signed transactions (§4.E).

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::transaction::SignedTransaction;
use crate::types::{now, Hash};

/// Transactions older than this are swept by the expiry listener.
pub const DEFAULT_TX_EXPIRE_TIME_SECS: u64 = 300;

/// How often the expiry sweep runs.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 5;

struct Entry {
    index: usize,
    timestamp: u64,
}

struct Inner {
    transactions: Vec<SignedTransaction>,
    index: HashMap<Hash, Entry>,
}

pub struct Mempool {
    inner: Mutex<Inner>,
    tx_expire_time: u64,
}

impl Mempool {
    pub fn new(tx_expire_time: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transactions: Vec::new(),
                index: HashMap::new(),
            }),
            tx_expire_time,
        }
    }

    /// O(1): appends the transaction and records `(index, timestamp)`.
    pub async fn add(&self, transaction: SignedTransaction) {
        let mut inner = self.inner.lock().await;
        let hash = transaction.hash();
        let index = inner.transactions.len();
        inner.transactions.push(transaction);
        inner.index.insert(
            hash,
            Entry {
                index,
                timestamp: now(),
            },
        );
    }

    /// O(1) swap-with-last removal. No-op if `tx_hash` is unknown.
    pub async fn remove(&self, tx_hash: &Hash) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.index.remove(tx_hash) else {
            return false;
        };

        let last = inner.transactions.pop().expect("index entry implies a transaction exists");
        if last.hash() != *tx_hash {
            let timestamp = inner
                .index
                .get(&last.hash())
                .map(|e| e.timestamp)
                .unwrap_or(entry.timestamp);
            inner.index.insert(
                last.hash(),
                Entry {
                    index: entry.index,
                    timestamp,
                },
            );
            inner.transactions[entry.index] = last;
        }
        true
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.transactions.len()
    }

    pub async fn contains(&self, tx_hash: &Hash) -> bool {
        self.inner.lock().await.index.contains_key(tx_hash)
    }

    pub async fn transactions(&self) -> Vec<SignedTransaction> {
        self.inner.lock().await.transactions.clone()
    }

    /// Removes every transaction older than `tx_expire_time`.
    pub async fn sweep_expired(&self) {
        let expired: Vec<Hash> = {
            let inner = self.inner.lock().await;
            let current = now();
            inner
                .transactions
                .iter()
                .filter(|tx| {
                    let timestamp = inner
                        .index
                        .get(&tx.hash())
                        .map(|e| e.timestamp)
                        .unwrap_or(current);
                    current.saturating_sub(timestamp) > self.tx_expire_time
                })
                .map(|tx| tx.hash())
                .collect()
        };
        for hash in expired {
            self.remove(&hash).await;
        }
    }

    /// Runs [`Self::sweep_expired`] every [`EXPIRY_SWEEP_INTERVAL_SECS`] until cancelled.
    pub async fn run_expiry_loop(&self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            EXPIRY_SWEEP_INTERVAL_SECS,
        ));
        loop {
            interval.tick().await;
            self.sweep_expired().await;
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(DEFAULT_TX_EXPIRE_TIME_SECS)
    }
}
