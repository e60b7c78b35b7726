//! Pending-set reconciler
//!
//! Polls every observer for the outstanding transaction and decides what
//! happened to it. The reconciler only reports; the lifecycle loop applies
//! the outcome.

use crate::fees::FeeState;
use crate::rpc::{with_timeout, Endpoint, HeadEvent, HeadHistory};
use crate::tx::SignedTransaction;
use ethers::types::{Address, H256};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The one outstanding transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub hash: H256,
    pub nonce: u64,
    pub origin_block: u64,
    /// Bids sent for this transaction so far
    pub attempts: u32,
    pub fees: FeeState,
    /// Block the last bid was sent in
    pub last_bid_block: u64,
    pub tx: SignedTransaction,
}

impl PendingEntry {
    pub fn new(tx: SignedTransaction, origin_block: u64) -> Self {
        Self {
            hash: tx.hash,
            nonce: tx.nonce,
            origin_block,
            attempts: 1,
            fees: tx.fees,
            last_bid_block: origin_block,
            tx,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Still outstanding. `resend` is set once per new block.
    Pending { resend: bool, observed: usize },
    Confirmed {
        block_number: u64,
        block_hash: H256,
        success: bool,
        observer: String,
    },
    /// The account nonce moved past the entry and no observer holds its receipt
    Superseded { account_nonce: u64, observer: String },
    Exhausted { attempts: u32 },
}

enum Sighting {
    Included {
        block_number: u64,
        block_hash: H256,
        success: bool,
    },
    /// Our receipt exists, but in a block the stream has not delivered yet
    Unseen,
    /// No receipt for the hash; the account nonce as of latest state
    Nonce(u64),
    Failed,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    max_attempts: u32,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(max_attempts: u32, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            call_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn inspect(
        &self,
        observer: &Endpoint,
        entry: &PendingEntry,
        history: &HeadHistory,
        account: Address,
    ) -> Sighting {
        match with_timeout(
            &observer.address,
            self.call_timeout,
            observer.client.receipt(entry.hash),
        )
        .await
        {
            Ok(Some(receipt)) if history.contains(&receipt.block_hash) => {
                return Sighting::Included {
                    block_number: receipt.block_number,
                    block_hash: receipt.block_hash,
                    success: receipt.success,
                };
            }
            Ok(Some(receipt)) => {
                debug!(
                    observer = %observer.address,
                    block = receipt.block_number,
                    block_hash = ?receipt.block_hash,
                    "Receipt in a block not seen yet"
                );
                return Sighting::Unseen;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(observer = %observer.address, tx_hash = ?entry.hash, error = %e, "Receipt lookup failed");
                return Sighting::Failed;
            }
        }

        // Only a confirmed absence of our receipt may vouch for a moved nonce
        match with_timeout(&observer.address, self.call_timeout, observer.client.nonce_at(account)).await {
            Ok(nonce) => Sighting::Nonce(nonce),
            Err(e) => {
                warn!(observer = %observer.address, error = %e, "Nonce lookup failed");
                Sighting::Failed
            }
        }
    }

    /// Classify `entry` against all observers for the round of `head`.
    /// Calling it again for the same head yields no second resend.
    pub async fn reconcile(
        &self,
        entry: &PendingEntry,
        head: &HeadEvent,
        history: &HeadHistory,
        observers: &[Arc<Endpoint>],
        account: Address,
    ) -> Outcome {
        let mut sightings: FuturesUnordered<_> = observers
            .iter()
            .map(|observer| async move {
                (
                    observer.address.clone(),
                    self.inspect(observer, entry, history, account).await,
                )
            })
            .collect();

        let mut observed = 0usize;
        let mut superseded: Option<(u64, String)> = None;
        let mut unseen = false;

        while let Some((observer, sighting)) = sightings.next().await {
            match sighting {
                Sighting::Included {
                    block_number,
                    block_hash,
                    success,
                } => {
                    return Outcome::Confirmed {
                        block_number,
                        block_hash,
                        success,
                        observer,
                    };
                }
                Sighting::Nonce(nonce) => {
                    observed += 1;
                    if nonce > entry.nonce && superseded.as_ref().map_or(true, |(n, _)| nonce > *n) {
                        superseded = Some((nonce, observer));
                    }
                }
                Sighting::Unseen => {
                    observed += 1;
                    unseen = true;
                }
                Sighting::Failed => {}
            }
        }

        if unseen {
            return Outcome::Pending {
                resend: false,
                observed,
            };
        }

        if let Some((account_nonce, observer)) = superseded {
            return Outcome::Superseded {
                account_nonce,
                observer,
            };
        }

        let new_block = head.number > entry.last_bid_block;
        if new_block && entry.attempts >= self.max_attempts {
            return Outcome::Exhausted {
                attempts: entry.attempts,
            };
        }

        Outcome::Pending {
            resend: new_block,
            observed,
        }
    }
}
