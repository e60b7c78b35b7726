//! Bid request and acknowledgement records

use super::BidError;
use ethers::types::{Bytes, H256, U256};
use serde::{Deserialize, Deserializer, Serialize};

/// What a bid refers to. The two forms are never mixed in one bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidTarget {
    /// Transactions already broadcast to the public network
    ByHash(Vec<H256>),
    /// Signed transactions handed to the auction for inclusion
    ByPayload(Vec<Bytes>),
}

impl BidTarget {
    pub fn by_hash(hashes: Vec<H256>) -> Result<Self, BidError> {
        if hashes.is_empty() {
            return Err(BidError::EmptyTarget);
        }
        Ok(BidTarget::ByHash(hashes))
    }

    pub fn by_payload(raw: Vec<Bytes>) -> Result<Self, BidError> {
        if raw.is_empty() {
            return Err(BidError::EmptyTarget);
        }
        Ok(BidTarget::ByPayload(raw))
    }

    pub fn len(&self) -> usize {
        match self {
            BidTarget::ByHash(h) => h.len(),
            BidTarget::ByPayload(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BidTarget::ByHash(_) => "hash",
            BidTarget::ByPayload(_) => "payload",
        }
    }
}

/// Wire form of a bid; hashes and payloads are hex without `0x`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tx_hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_transactions: Vec<String>,
    /// Wei, decimal
    pub amount: String,
    pub block_number: i64,
    pub decay_start_timestamp: i64,
    pub decay_end_timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reverting_tx_hashes: Vec<String>,
}

impl BidRequest {
    pub fn new(
        target: &BidTarget,
        amount: U256,
        block_number: u64,
        decay_start_ms: i64,
        decay_end_ms: i64,
    ) -> Result<Self, BidError> {
        if target.is_empty() {
            return Err(BidError::EmptyTarget);
        }

        let (tx_hashes, raw_transactions) = match target {
            BidTarget::ByHash(hashes) => (
                hashes.iter().map(|h| hex::encode(h.as_bytes())).collect(),
                Vec::new(),
            ),
            BidTarget::ByPayload(raw) => (Vec::new(), raw.iter().map(hex::encode).collect()),
        };

        Ok(Self {
            tx_hashes,
            raw_transactions,
            amount: amount.to_string(),
            block_number: i64::try_from(block_number).unwrap_or(i64::MAX),
            decay_start_timestamp: decay_start_ms,
            decay_end_timestamp: decay_end_ms,
            reverting_tx_hashes: Vec::new(),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flexible {
    Int(i64),
    Str(String),
}

// int64 fields arrive as JSON strings from the HTTP gateway
fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Flexible::deserialize(d)? {
        Flexible::Int(v) => Ok(v),
        Flexible::Str(s) if s.is_empty() => Ok(0),
        Flexible::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn de_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Flexible::deserialize(d)? {
        Flexible::Int(v) => Ok(v.to_string()),
        Flexible::Str(s) => Ok(s),
    }
}

/// A provider's commitment to a bid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BidAck {
    pub tx_hashes: Vec<String>,
    #[serde(deserialize_with = "de_string")]
    pub bid_amount: String,
    #[serde(deserialize_with = "de_i64")]
    pub block_number: i64,
    pub received_bid_digest: String,
    pub received_bid_signature: String,
    pub commitment_digest: String,
    pub commitment_signature: String,
    pub provider_address: String,
    #[serde(deserialize_with = "de_i64")]
    pub decay_start_timestamp: i64,
    #[serde(deserialize_with = "de_i64")]
    pub decay_end_timestamp: i64,
    #[serde(deserialize_with = "de_i64")]
    pub dispatch_timestamp: i64,
    pub reverting_tx_hashes: Vec<String>,
}

/// One NDJSON line of the HTTP bid response
#[derive(Debug, Clone, Deserialize)]
pub struct BidResponseLine {
    pub result: BidAck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_targets_rejected() {
        assert!(matches!(BidTarget::by_hash(vec![]), Err(BidError::EmptyTarget)));
        assert!(matches!(BidTarget::by_payload(vec![]), Err(BidError::EmptyTarget)));
    }

    #[test]
    fn test_request_by_hash_strips_prefix() {
        let target = BidTarget::by_hash(vec![H256::repeat_byte(0x11)]).unwrap();
        let req = BidRequest::new(&target, U256::from(250u64), 101, 1_000, 13_000).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["txHashes"][0], "11".repeat(32));
        assert_eq!(json["amount"], "250");
        assert_eq!(json["blockNumber"], 101);
        assert_eq!(json["decayStartTimestamp"], 1_000);
        assert_eq!(json["decayEndTimestamp"], 13_000);
        assert!(json.get("rawTransactions").is_none());
        assert!(json.get("revertingTxHashes").is_none());
    }

    #[test]
    fn test_request_by_payload() {
        let target = BidTarget::by_payload(vec![Bytes::from(vec![0x02, 0xf8])]).unwrap();
        let req = BidRequest::new(&target, U256::one(), 5, 0, 1).unwrap();
        assert_eq!(req.raw_transactions, vec!["02f8".to_string()]);
        assert!(req.tx_hashes.is_empty());
    }

    #[test]
    fn test_ack_accepts_string_integers() {
        let line = r#"{"result":{"txHashes":["ab"],"bidAmount":"250","blockNumber":"101",
            "providerAddress":"0xprov","commitmentDigest":"cd","dispatchTimestamp":"1700000000123",
            "decayStartTimestamp":1000,"decayEndTimestamp":"13000"}}"#;
        let parsed: BidResponseLine = serde_json::from_str(line).unwrap();

        assert_eq!(parsed.result.block_number, 101);
        assert_eq!(parsed.result.dispatch_timestamp, 1_700_000_000_123);
        assert_eq!(parsed.result.decay_start_timestamp, 1_000);
        assert_eq!(parsed.result.provider_address, "0xprov");
        assert!(parsed.result.received_bid_signature.is_empty());
    }
}
