use super::test_helpers::*;
use crate::audit::{AuditLog, AuditRecord};
use crate::bidder::{BidError, BidEscalator, BidTarget};
use ethers::types::{Bytes, H256, U256};
use std::sync::Arc;
use tokio::sync::mpsc;

fn escalator() -> (Arc<MockBidTransport>, mpsc::UnboundedReceiver<AuditRecord>, BidEscalator) {
    let transport = Arc::new(MockBidTransport::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let escalator = BidEscalator::new(bid_policy(), transport.clone(), AuditLog::from_sender(tx));
    (transport, rx, escalator)
}

#[tokio::test]
async fn test_bid_targets_requested_block_with_decay_window() {
    let (transport, _audit, escalator) = escalator();
    let target = BidTarget::by_hash(vec![H256::repeat_byte(0x42)]).unwrap();

    let sent = escalator.bid(&target, 101).await.unwrap();

    assert_eq!(sent.request.block_number, 101);
    assert_eq!(sent.request.tx_hashes, vec!["42".repeat(32)]);
    assert_eq!(
        sent.request.decay_end_timestamp - sent.request.decay_start_timestamp,
        36_000
    );
    assert_eq!(sent.acks.len(), 1);
    assert_eq!(transport.requests().len(), 1);

    let amount = U256::from_dec_str(&sent.request.amount).unwrap();
    assert!(amount >= bid_policy().min_wei && amount <= bid_policy().max_wei);
}

#[tokio::test]
async fn test_decay_start_never_goes_backwards() {
    let (transport, _audit, escalator) = escalator();
    let target = BidTarget::by_payload(vec![Bytes::from(vec![0x02, 0xf8, 0x6b])]).unwrap();

    for block in 100..110 {
        escalator.bid(&target, block).await.unwrap();
    }

    let starts: Vec<i64> = transport
        .requests()
        .iter()
        .map(|r| r.decay_start_timestamp)
        .collect();
    assert!(starts.windows(2).all(|w| w[1] >= w[0]));
    assert!(transport.requests().iter().all(|r| r.tx_hashes.is_empty()));
}

#[tokio::test]
async fn test_failed_bid_is_audited_and_returned() {
    let (transport, mut audit, escalator) = escalator();
    transport.set_fail(true);
    let target = BidTarget::by_hash(vec![H256::repeat_byte(0x01)]).unwrap();

    let result = escalator.bid(&target, 7).await;
    assert!(matches!(result, Err(BidError::Transport { .. })));

    match audit.try_recv() {
        Ok(AuditRecord::Bid(record)) => {
            assert_eq!(record.request.block_number, 7);
            assert!(record.responses.is_empty());
            assert!(record.error.unwrap().contains("connection refused"));
        }
        other => panic!("expected bid record, got {:?}", other),
    }
}
