//! Bid escalator and bidder-node transports
//!
//! Every bid draws a fresh random amount from the configured range and opens
//! a new decay window starting now. Failures go back to the caller, which
//! treats them as non-fatal.

pub mod errors;
pub mod grpc;
pub mod http;
pub mod proto;
pub mod types;
pub mod window;

use crate::audit::{AuditLog, AuditRecord, BidRecord};
use async_trait::async_trait;
use ethers::types::U256;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use errors::BidError;
pub use grpc::GrpcBidTransport;
pub use http::HttpBidTransport;
pub use types::{BidAck, BidRequest, BidTarget};
pub use window::{BiddingWindow, Deposit};

/// One binding of the bid API
#[async_trait]
pub trait BidTransport: Send + Sync {
    fn address(&self) -> &str;

    /// Send one bid and collect the acknowledgements that come back
    async fn send_bid(&self, request: &BidRequest) -> Result<Vec<BidAck>, BidError>;
}

/// Amount range and decay window for every bid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidPolicy {
    pub min_wei: U256,
    pub max_wei: U256,
    pub decay_window: Duration,
}

impl BidPolicy {
    pub fn new(min_wei: U256, max_wei: U256, decay_window: Duration) -> Result<Self, BidError> {
        if min_wei > max_wei {
            return Err(BidError::InvalidRange {
                min: min_wei.to_string(),
                max: max_wei.to_string(),
            });
        }
        Ok(Self {
            min_wei,
            max_wei,
            decay_window,
        })
    }

    /// Uniform draw in `[min_wei, max_wei]`
    pub fn draw_amount<R: Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let span = self.max_wei - self.min_wei;
        if span.is_zero() {
            return self.min_wei;
        }
        let span = if span.bits() > 128 {
            u128::MAX
        } else {
            span.as_u128()
        };
        self.min_wei + U256::from(rng.gen_range(0..=span))
    }
}

/// A bid that reached the node
#[derive(Debug, Clone)]
pub struct BidSent {
    pub request: BidRequest,
    pub acks: Vec<BidAck>,
}

pub struct BidEscalator {
    policy: BidPolicy,
    transport: Arc<dyn BidTransport>,
    audit: AuditLog,
    last_decay_start: AtomicI64,
}

impl BidEscalator {
    pub fn new(policy: BidPolicy, transport: Arc<dyn BidTransport>, audit: AuditLog) -> Self {
        Self {
            policy,
            transport,
            audit,
            last_decay_start: AtomicI64::new(0),
        }
    }

    pub fn policy(&self) -> &BidPolicy {
        &self.policy
    }

    /// Wall-clock now in ms, never earlier than the previous decay start
    fn next_decay_start(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.last_decay_start.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    /// Bid for inclusion of `target` in `valid_block`
    pub async fn bid(&self, target: &BidTarget, valid_block: u64) -> Result<BidSent, BidError> {
        let amount = self.policy.draw_amount(&mut rand::thread_rng());
        let decay_start = self.next_decay_start();
        let decay_end = decay_start + self.policy.decay_window.as_millis() as i64;

        let request = BidRequest::new(target, amount, valid_block, decay_start, decay_end)?;
        debug!(
            target = target.kind(),
            amount = %request.amount,
            block = valid_block,
            decay_start,
            decay_end,
            "Sending bid"
        );

        let result = self.transport.send_bid(&request).await;

        self.audit.record(AuditRecord::Bid(BidRecord::new(
            &request,
            result.as_ref().ok().map(Vec::as_slice),
            result.as_ref().err(),
        )));

        let acks = result?;
        info!(
            block = valid_block,
            amount = %request.amount,
            commitments = acks.len(),
            bidder = %self.transport.address(),
            "Bid accepted"
        );
        Ok(BidSent { request, acks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_inverted_range_rejected() {
        let result = BidPolicy::new(U256::from(10u64), U256::from(5u64), Duration::from_secs(36));
        assert!(matches!(result, Err(BidError::InvalidRange { .. })));
    }

    #[test]
    fn test_draw_stays_in_range() {
        let policy =
            BidPolicy::new(U256::from(1_000u64), U256::from(1_010u64), Duration::from_secs(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let amount = policy.draw_amount(&mut rng);
            assert!(amount >= U256::from(1_000u64) && amount <= U256::from(1_010u64));
        }
    }

    #[test]
    fn test_degenerate_range() {
        let policy = BidPolicy::new(U256::from(42u64), U256::from(42u64), Duration::from_secs(1)).unwrap();
        assert_eq!(policy.draw_amount(&mut rand::thread_rng()), U256::from(42u64));
    }
}
