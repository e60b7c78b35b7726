use super::test_helpers::*;
use crate::fees::FeeState;
use crate::reconciler::{Outcome, PendingEntry, Reconciler};
use crate::rpc::{Endpoint, EndpointRole, HeadHistory};
use crate::tx::SignedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;
use std::time::Duration;

fn entry(nonce: u64, origin_block: u64) -> PendingEntry {
    let tx = SignedTransaction {
        hash: H256::repeat_byte(0xab),
        raw: Bytes::from(vec![0x02, 0x01]),
        nonce,
        fees: FeeState {
            gas_tip_cap: U256::from(GWEI),
            gas_fee_cap: U256::from(21 * GWEI),
            blob_fee_cap: U256::from(2u64),
        },
        gas_limit: 21_000,
        to: Address::repeat_byte(0x01),
        value: U256::zero(),
    };
    PendingEntry::new(tx, origin_block)
}

fn observer(name: &str) -> (Arc<MockChainClient>, Arc<Endpoint>) {
    let client = Arc::new(MockChainClient::new(name));
    let endpoint = Arc::new(Endpoint::new(name, EndpointRole::Observer, client.clone()));
    (client, endpoint)
}

fn history(heads: &[u64]) -> HeadHistory {
    let mut history = HeadHistory::new(64);
    for n in heads {
        history.record(&head(*n));
    }
    history
}

#[tokio::test]
async fn test_receipt_on_any_observer_confirms() {
    let (broken, a) = observer("mock://a");
    let (good, b) = observer("mock://b");
    broken.set_fail_lookups(true);
    let pending = entry(0, 100);
    good.add_receipt(pending.hash, &head(101));

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&pending, &head(101), &history(&[100, 101]), &[a, b], Address::zero())
        .await;

    match outcome {
        Outcome::Confirmed { block_number, block_hash, observer, success } => {
            assert_eq!(block_number, 101);
            assert_eq!(block_hash, head(101).hash);
            assert_eq!(observer, "mock://b");
            assert!(success);
        }
        other => panic!("expected confirmation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_receipt_in_unseen_block_is_not_inclusion() {
    let (client, a) = observer("mock://a");
    let pending = entry(3, 100);
    // Mined one block ahead of the stream; the account nonce already moved
    client.add_receipt(pending.hash, &head(102));
    client.set_nonce(4);

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&pending, &head(101), &history(&[100, 101]), &[a], Address::zero())
        .await;

    assert_eq!(outcome, Outcome::Pending { resend: false, observed: 1 });
}

#[tokio::test]
async fn test_unseen_receipt_outweighs_advanced_nonce_elsewhere() {
    let (ahead, a) = observer("mock://a");
    let (other, b) = observer("mock://b");
    let pending = entry(3, 100);
    ahead.add_receipt(pending.hash, &head(102));
    ahead.set_nonce(4);
    other.set_nonce(4);

    let outcome = Reconciler::new(1, Duration::from_secs(1))
        .reconcile(&pending, &head(101), &history(&[100, 101]), &[a, b], Address::zero())
        .await;

    assert_eq!(outcome, Outcome::Pending { resend: false, observed: 2 });
}

#[tokio::test]
async fn test_receipt_lookup_error_does_not_supersede() {
    let (client, a) = observer("mock://a");
    client.set_fail_receipts(true);
    client.set_nonce(4);

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&entry(3, 100), &head(101), &history(&[100, 101]), &[a], Address::zero())
        .await;

    assert_eq!(outcome, Outcome::Pending { resend: true, observed: 0 });
}

#[tokio::test]
async fn test_nonce_lookup_error_leaves_entry_pending() {
    let (client, a) = observer("mock://a");
    client.set_fail_nonce(true);

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&entry(3, 100), &head(101), &history(&[100, 101]), &[a], Address::zero())
        .await;

    assert_eq!(outcome, Outcome::Pending { resend: true, observed: 0 });
}

#[tokio::test]
async fn test_higher_nonce_means_superseded() {
    let (low, a) = observer("mock://a");
    let (high, b) = observer("mock://b");
    low.set_nonce(3);
    high.set_nonce(5);

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&entry(3, 100), &head(101), &history(&[100, 101]), &[a, b], Address::zero())
        .await;

    assert_eq!(
        outcome,
        Outcome::Superseded {
            account_nonce: 5,
            observer: "mock://b".to_string()
        }
    );
}

#[tokio::test]
async fn test_failed_lookups_leave_entry_pending() {
    let (client, a) = observer("mock://a");
    client.set_fail_lookups(true);

    let outcome = Reconciler::new(5, Duration::from_secs(1))
        .reconcile(&entry(0, 100), &head(101), &history(&[100, 101]), &[a], Address::zero())
        .await;

    assert_eq!(outcome, Outcome::Pending { resend: true, observed: 0 });
}

#[tokio::test]
async fn test_same_head_never_resends_twice() {
    let (_client, a) = observer("mock://a");
    let mut pending = entry(0, 100);
    pending.attempts = 2;
    pending.last_bid_block = 101;
    let reconciler = Reconciler::new(5, Duration::from_secs(1));
    let seen = history(&[100, 101]);

    for _ in 0..3 {
        let outcome = reconciler
            .reconcile(&pending, &head(101), &seen, &[a.clone()], Address::zero())
            .await;
        assert_eq!(outcome, Outcome::Pending { resend: false, observed: 1 });
    }
}

#[tokio::test]
async fn test_exhaustion_waits_for_a_new_block() {
    let (_client, a) = observer("mock://a");
    let reconciler = Reconciler::new(2, Duration::from_secs(1));
    let mut pending = entry(0, 100);
    pending.attempts = 2;
    pending.last_bid_block = 101;
    let seen = history(&[100, 101, 102]);

    let same_block = reconciler
        .reconcile(&pending, &head(101), &seen, &[a.clone()], Address::zero())
        .await;
    assert!(matches!(same_block, Outcome::Pending { resend: false, .. }));

    let next_block = reconciler
        .reconcile(&pending, &head(102), &seen, &[a], Address::zero())
        .await;
    assert_eq!(next_block, Outcome::Exhausted { attempts: 2 });
}

#[tokio::test]
async fn test_confirmation_beats_exhaustion() {
    let (client, a) = observer("mock://a");
    let mut pending = entry(0, 100);
    pending.attempts = 9;
    client.add_receipt(pending.hash, &head(102));
    client.set_nonce(1);

    let outcome = Reconciler::new(2, Duration::from_secs(1))
        .reconcile(&pending, &head(102), &history(&[100, 101, 102]), &[a], Address::zero())
        .await;

    assert!(matches!(outcome, Outcome::Confirmed { block_number: 102, .. }));
}
