//! Wire messages of the `bidderapi.v1.Bidder` service.
//!
//! Declared by hand so the crate needs no protoc step; tags follow the
//! published service definition.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bid {
    #[prost(string, repeated, tag = "1")]
    pub tx_hashes: Vec<String>,
    #[prost(string, tag = "2")]
    pub amount: String,
    #[prost(int64, tag = "3")]
    pub block_number: i64,
    #[prost(int64, tag = "4")]
    pub decay_start_timestamp: i64,
    #[prost(int64, tag = "5")]
    pub decay_end_timestamp: i64,
    #[prost(string, repeated, tag = "6")]
    pub reverting_tx_hashes: Vec<String>,
    #[prost(string, repeated, tag = "7")]
    pub raw_transactions: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Commitment {
    #[prost(string, repeated, tag = "1")]
    pub tx_hashes: Vec<String>,
    #[prost(string, tag = "2")]
    pub bid_amount: String,
    #[prost(int64, tag = "3")]
    pub block_number: i64,
    #[prost(string, tag = "4")]
    pub received_bid_digest: String,
    #[prost(string, tag = "5")]
    pub received_bid_signature: String,
    #[prost(string, tag = "6")]
    pub commitment_digest: String,
    #[prost(string, tag = "7")]
    pub commitment_signature: String,
    #[prost(string, tag = "8")]
    pub provider_address: String,
    #[prost(int64, tag = "9")]
    pub decay_start_timestamp: i64,
    #[prost(int64, tag = "10")]
    pub decay_end_timestamp: i64,
    #[prost(int64, tag = "11")]
    pub dispatch_timestamp: i64,
    #[prost(string, repeated, tag = "12")]
    pub reverting_tx_hashes: Vec<String>,
}

/// `google.protobuf.UInt64Value`
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UInt64Value {
    #[prost(uint64, tag = "1")]
    pub value: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct EmptyMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DepositRequest {
    #[prost(string, tag = "1")]
    pub amount: String,
    #[prost(message, optional, tag = "2")]
    pub window_number: Option<UInt64Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DepositResponse {
    #[prost(string, tag = "1")]
    pub amount: String,
    #[prost(message, optional, tag = "2")]
    pub window_number: Option<UInt64Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WithdrawRequest {
    #[prost(message, optional, tag = "1")]
    pub window_number: Option<UInt64Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WithdrawResponse {
    #[prost(string, tag = "1")]
    pub amount: String,
    #[prost(message, optional, tag = "2")]
    pub window_number: Option<UInt64Value>,
}

pub const SEND_BID: &str = "/bidderapi.v1.Bidder/SendBid";
pub const GET_MIN_DEPOSIT: &str = "/bidderapi.v1.Bidder/GetMinDeposit";
pub const DEPOSIT: &str = "/bidderapi.v1.Bidder/Deposit";
pub const WITHDRAW: &str = "/bidderapi.v1.Bidder/Withdraw";
