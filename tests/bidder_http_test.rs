//! HTTP bid API against a local mock bidder node

use ethers::types::{H256, U256};
use mockito::Matcher;
use preconf_bidder::bidder::{BidError, BidRequest, BidTarget, BidTransport, HttpBidTransport};
use serde_json::json;
use std::time::Duration;

fn request() -> BidRequest {
    let target = BidTarget::by_hash(vec![H256::repeat_byte(0x5a)]).unwrap();
    BidRequest::new(&target, U256::from(250_000u64), 101, 1_000, 37_000).unwrap()
}

#[tokio::test]
async fn test_bid_posts_json_and_reads_every_commitment() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        r#"{"result":{"txHashes":["5a"],"bidAmount":"250000","blockNumber":"101","providerAddress":"0xp1","commitmentDigest":"aa"}}"#,
        "\n",
        r#"{"result":{"txHashes":["5a"],"bidAmount":"250000","blockNumber":101,"providerAddress":"0xp2","commitmentDigest":"bb"}}"#,
        "\n"
    );
    let mock = server
        .mock("POST", "/v1/bidder/bid")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "txHashes": ["5a".repeat(32)],
            "amount": "250000",
            "blockNumber": 101,
            "decayStartTimestamp": 1000,
            "decayEndTimestamp": 37000
        })))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let transport = HttpBidTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let acks = transport.send_bid(&request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].provider_address, "0xp1");
    assert_eq!(acks[1].block_number, 101);
    assert_eq!(acks[1].commitment_digest, "bb");
}

#[tokio::test]
async fn test_non_success_status_is_reported_with_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/bidder/bid")
        .with_status(503)
        .with_body("no providers")
        .create_async()
        .await;

    let transport = HttpBidTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let err = transport.send_bid(&request()).await.unwrap_err();

    match &err {
        BidError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "no providers");
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_garbled_stream_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/bidder/bid")
        .with_status(200)
        .with_body("{\"result\":{}}\n<html>oops</html>\n")
        .create_async()
        .await;

    let transport = HttpBidTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let err = transport.send_bid(&request()).await.unwrap_err();

    assert!(matches!(err, BidError::Malformed(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_bidder_is_transport_error() {
    let transport = HttpBidTransport::new("127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let err = transport.send_bid(&request()).await.unwrap_err();
    assert!(matches!(err, BidError::Transport { .. } | BidError::Timeout { .. }));
}
