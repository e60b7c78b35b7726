//! gRPC binding of the bid API: server-streaming `SendBid`

use super::proto::{self, Bid, Commitment};
use super::types::{BidAck, BidRequest};
use super::{BidError, BidTransport};
use async_trait::async_trait;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint as GrpcEndpoint};

/// Lazily connected channel to the bidder node
pub fn bidder_channel(address: &str, timeout: Duration) -> Result<Channel, BidError> {
    let url = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let endpoint = GrpcEndpoint::from_shared(url).map_err(|e| BidError::Transport {
        address: address.to_string(),
        message: e.to_string(),
    })?;

    Ok(endpoint
        .connect_timeout(timeout)
        .timeout(timeout)
        .connect_lazy())
}

pub(crate) async fn ready(
    grpc: &mut tonic::client::Grpc<Channel>,
    address: &str,
) -> Result<(), BidError> {
    grpc.ready().await.map_err(|e| BidError::Transport {
        address: address.to_string(),
        message: e.to_string(),
    })
}

impl From<&BidRequest> for Bid {
    fn from(req: &BidRequest) -> Self {
        Bid {
            tx_hashes: req.tx_hashes.clone(),
            amount: req.amount.clone(),
            block_number: req.block_number,
            decay_start_timestamp: req.decay_start_timestamp,
            decay_end_timestamp: req.decay_end_timestamp,
            reverting_tx_hashes: req.reverting_tx_hashes.clone(),
            raw_transactions: req.raw_transactions.clone(),
        }
    }
}

impl From<Commitment> for BidAck {
    fn from(c: Commitment) -> Self {
        BidAck {
            tx_hashes: c.tx_hashes,
            bid_amount: c.bid_amount,
            block_number: c.block_number,
            received_bid_digest: c.received_bid_digest,
            received_bid_signature: c.received_bid_signature,
            commitment_digest: c.commitment_digest,
            commitment_signature: c.commitment_signature,
            provider_address: c.provider_address,
            decay_start_timestamp: c.decay_start_timestamp,
            decay_end_timestamp: c.decay_end_timestamp,
            dispatch_timestamp: c.dispatch_timestamp,
            reverting_tx_hashes: c.reverting_tx_hashes,
        }
    }
}

pub struct GrpcBidTransport {
    address: String,
    channel: Channel,
}

impl GrpcBidTransport {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, BidError> {
        Ok(Self {
            address: address.to_string(),
            channel: bidder_channel(address, timeout)?,
        })
    }
}

#[async_trait]
impl BidTransport for GrpcBidTransport {
    fn address(&self) -> &str {
        &self.address
    }

    /// Collects every commitment the node streams back before returning
    async fn send_bid(&self, request: &BidRequest) -> Result<Vec<BidAck>, BidError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        ready(&mut grpc, &self.address).await?;

        let codec: ProstCodec<Bid, Commitment> = ProstCodec::default();
        let response = grpc
            .server_streaming(
                tonic::Request::new(Bid::from(request)),
                PathAndQuery::from_static(proto::SEND_BID),
                codec,
            )
            .await
            .map_err(BidError::from_status)?;

        let mut stream = response.into_inner();
        let mut acks = Vec::new();
        while let Some(commitment) = stream.message().await.map_err(BidError::from_status)? {
            acks.push(BidAck::from(commitment));
        }
        Ok(acks)
    }
}
