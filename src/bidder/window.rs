//! Bidding-window deposit and withdrawal on the bidder node

use super::grpc::{bidder_channel, ready};
use super::proto::{
    self, DepositRequest, DepositResponse, EmptyMessage, UInt64Value, WithdrawRequest,
    WithdrawResponse,
};
use super::BidError;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tracing::info;

/// Funds deposited into one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub amount: String,
    pub window_number: u64,
}

pub struct BiddingWindow {
    address: String,
    channel: Channel,
}

impl BiddingWindow {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, BidError> {
        Ok(Self {
            address: address.to_string(),
            channel: bidder_channel(address, timeout)?,
        })
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, BidError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        ready(&mut grpc, &self.address).await?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map_err(BidError::from_status)?;
        Ok(response.into_inner())
    }

    /// Minimum deposit in wei, as reported by the node
    pub async fn min_deposit(&self) -> Result<String, BidError> {
        let response: DepositResponse = self.unary(proto::GET_MIN_DEPOSIT, EmptyMessage {}).await?;
        Ok(response.amount)
    }

    pub async fn deposit(&self, amount: String) -> Result<Deposit, BidError> {
        let response: DepositResponse = self
            .unary(
                proto::DEPOSIT,
                DepositRequest {
                    amount,
                    window_number: None,
                },
            )
            .await?;

        let window_number = response
            .window_number
            .map(|w| w.value)
            .ok_or_else(|| BidError::Malformed("deposit response without window number".to_string()))?;

        Ok(Deposit {
            amount: response.amount,
            window_number,
        })
    }

    /// Deposit the node's minimum into the current window
    pub async fn deposit_min(&self) -> Result<Deposit, BidError> {
        let amount = self.min_deposit().await?;
        let deposit = self.deposit(amount).await?;
        info!(
            amount = %deposit.amount,
            window = deposit.window_number,
            "Deposited minimum bid amount"
        );
        Ok(deposit)
    }

    pub async fn withdraw(&self, window_number: u64) -> Result<String, BidError> {
        let response: WithdrawResponse = self
            .unary(
                proto::WITHDRAW,
                WithdrawRequest {
                    window_number: Some(UInt64Value {
                        value: window_number,
                    }),
                },
            )
            .await?;
        info!(amount = %response.amount, window = window_number, "Withdrawal complete");
        Ok(response.amount)
    }

    /// Deposit, wait until the window settles, withdraw
    pub async fn cycle(&self, withdraw_delay: Duration) -> Result<(Deposit, String), BidError> {
        let deposit = self.deposit_min().await?;
        info!(
            window = deposit.window_number,
            wait_secs = withdraw_delay.as_secs(),
            "Waiting before withdrawal"
        );
        tokio::time::sleep(withdraw_delay).await;
        let withdrawn = self.withdraw(deposit.window_number).await?;
        Ok((deposit, withdrawn))
    }
}
