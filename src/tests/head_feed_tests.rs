use super::test_helpers::*;
use crate::rpc::{BackoffConfig, Connector, FeedEvent, HeadFeed, HeadFeedConfig, HeadMode, RpcError};
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    chain: Arc<MockChainClient>,
    heads: Arc<MockHeadSource>,
    dialer: Arc<MockDialer>,
    feed: HeadFeed<Arc<MockDialer>>,
}

async fn rig(mode: HeadMode, stall: Option<Duration>) -> Rig {
    let chain = Arc::new(MockChainClient::new("mock://stream"));
    let heads = Arc::new(MockHeadSource::default());
    let dialer = Arc::new(MockDialer::new(chain.clone(), Some(heads.clone())));
    let backoff = BackoffConfig {
        base_backoff_ms: 10,
        max_backoff_ms: 100,
        jitter_factor: 0.0,
        reconnect_delay_ms: 50,
    };
    let config = HeadFeedConfig {
        mode,
        call_timeout: Duration::from_secs(1),
        stall_timeout: stall,
        poll_interval: Duration::from_millis(500),
    };
    let connector = Arc::new(Connector::new(dialer.clone(), backoff));
    let feed = HeadFeed::open(connector, "ws://stream", config).await.unwrap();
    Rig {
        chain,
        heads,
        dialer,
        feed,
    }
}

#[tokio::test(start_paused = true)]
async fn test_heads_arrive_in_order() {
    let mut rig = rig(HeadMode::Subscribe, None).await;
    assert!(rig.heads.send(0, head(100)).await);
    assert!(rig.heads.send(0, head(101)).await);

    assert_eq!(rig.feed.next().await.unwrap(), FeedEvent::Head(head(100)));
    assert_eq!(rig.feed.next().await.unwrap(), FeedEvent::Head(head(101)));
}

#[tokio::test(start_paused = true)]
async fn test_error_signal_wins_and_stale_heads_are_dropped() {
    let mut rig = rig(HeadMode::Subscribe, None).await;
    let before = rig.feed.endpoint();

    assert!(rig.heads.send(0, head(100)).await);
    rig.heads.fail(0, "socket closed");

    match rig.feed.next().await.unwrap() {
        FeedEvent::Reconnected { reason, .. } => assert!(reason.contains("socket closed")),
        other => panic!("expected reconnect, got {:?}", other),
    }

    assert_eq!(rig.heads.subscriptions(), 2);
    assert_eq!(rig.dialer.dials(), 2);
    assert!(!Arc::ptr_eq(&before, &rig.feed.endpoint()));
    // The old pair is gone; nothing queued on it is delivered
    assert!(!rig.heads.send(0, head(101)).await);

    assert!(rig.heads.send(1, head(102)).await);
    assert_eq!(rig.feed.next().await.unwrap(), FeedEvent::Head(head(102)));
}

#[tokio::test(start_paused = true)]
async fn test_shared_handle_follows_reconnect() {
    let mut rig = rig(HeadMode::Subscribe, None).await;
    let handle = rig.feed.handle();
    let before = handle.load_full();

    rig.heads.fail(0, "reset");
    rig.feed.next().await.unwrap();

    assert!(Arc::ptr_eq(&handle.load_full(), &rig.feed.endpoint()));
    assert!(!Arc::ptr_eq(&before, &handle.load_full()));
}

#[tokio::test(start_paused = true)]
async fn test_stall_triggers_reconnect() {
    let mut rig = rig(HeadMode::Subscribe, Some(Duration::from_secs(5))).await;
    let started = tokio::time::Instant::now();

    match rig.feed.next().await.unwrap() {
        FeedEvent::Reconnected { reason, .. } => assert!(reason.contains("no head")),
        other => panic!("expected reconnect, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(rig.heads.subscriptions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_keeps_dialing_until_subscribed() {
    let mut rig = rig(HeadMode::Subscribe, None).await;
    rig.dialer.set_failures(3);
    rig.heads.fail_next_subscribes(1);

    rig.heads.fail(0, "reset");
    assert!(matches!(rig.feed.next().await.unwrap(), FeedEvent::Reconnected { .. }));

    // open + 3 refused dials + 1 dial with a refused subscribe + 1 good dial
    assert_eq!(rig.dialer.dials(), 6);
    assert_eq!(rig.heads.subscriptions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_open_rejects_endpoint_without_stream_support() {
    let chain = Arc::new(MockChainClient::new("mock://http"));
    let dialer = MockDialer::new(chain, None);
    let connector = Arc::new(Connector::new(dialer, BackoffConfig::default()));

    let result = HeadFeed::open(connector, "http://node", HeadFeedConfig::default()).await;
    assert!(matches!(result, Err(RpcError::Unsupported { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_polling_yields_only_new_blocks() {
    let mut rig = rig(HeadMode::Poll, None).await;
    rig.chain.set_latest(Some(head(5)));

    assert_eq!(rig.feed.next().await.unwrap(), FeedEvent::Head(head(5)));

    // Same head again: nothing to report
    let repeat = tokio::time::timeout(Duration::from_secs(3), rig.feed.next()).await;
    assert!(repeat.is_err());

    rig.chain.set_latest(Some(head(6)));
    assert_eq!(rig.feed.next().await.unwrap(), FeedEvent::Head(head(6)));
}

#[tokio::test(start_paused = true)]
async fn test_polling_failure_reconnects() {
    let mut rig = rig(HeadMode::Poll, None).await;
    rig.chain.set_latest(None);

    assert!(matches!(rig.feed.next().await.unwrap(), FeedEvent::Reconnected { .. }));
    assert_eq!(rig.dialer.dials(), 2);
    assert_eq!(rig.heads.subscriptions(), 0);
}
