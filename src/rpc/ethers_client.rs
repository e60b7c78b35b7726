//! `ethers` backed chain client and dialer

use super::{
    ChainClient, Dialer, Endpoint, EndpointRole, HeadEvent, HeadSource, HeadSubscription,
    ReceiptInfo, RpcError, RpcResult,
};
use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider, Ws};
use ethers::types::{
    Address, Block, BlockId, BlockNumber, Bytes, Eip1559TransactionRequest, H256, U256,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Buffered heads between the socket task and the loop
const HEAD_BUFFER: usize = 64;

/// Chain client over any `ethers` JSON-RPC transport
#[derive(Debug)]
pub struct EthersChainClient<P> {
    address: String,
    provider: Arc<Provider<P>>,
}

impl<P: JsonRpcClient> EthersChainClient<P> {
    pub fn new(address: impl Into<String>, provider: Provider<P>) -> Self {
        Self {
            address: address.into(),
            provider: Arc::new(provider),
        }
    }

    fn err(&self, e: ethers::providers::ProviderError) -> RpcError {
        RpcError::from_provider_error(e, &self.address)
    }
}

impl EthersChainClient<Ws> {
    pub async fn connect_ws(address: &str) -> RpcResult<Self> {
        let provider = Provider::<Ws>::connect(address)
            .await
            .map_err(|e| RpcError::from_provider_error(e, address))?;
        Ok(Self::new(address, provider))
    }
}

impl EthersChainClient<Http> {
    pub fn http(address: &str) -> RpcResult<Self> {
        let provider = Provider::<Http>::try_from(address).map_err(|e| RpcError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(address, provider))
    }
}

fn saturating_u64(value: U256) -> u64 {
    if value.bits() > 64 {
        u64::MAX
    } else {
        value.as_u64()
    }
}

/// Map a block header into a head snapshot; pre-Cancun fields default to zero
pub fn head_from_block<T>(block: &Block<T>, endpoint: &str) -> RpcResult<HeadEvent> {
    let number = block.number.ok_or_else(|| RpcError::Decode {
        endpoint: endpoint.to_string(),
        message: "block without number".to_string(),
    })?;
    let hash = block.hash.ok_or_else(|| RpcError::Decode {
        endpoint: endpoint.to_string(),
        message: "block without hash".to_string(),
    })?;

    Ok(HeadEvent {
        number: number.as_u64(),
        hash,
        timestamp: saturating_u64(block.timestamp),
        base_fee: block.base_fee_per_gas.unwrap_or_default(),
        excess_blob_gas: block.excess_blob_gas.map(saturating_u64).unwrap_or(0),
        blob_gas_used: block.blob_gas_used.map(saturating_u64).unwrap_or(0),
    })
}

#[async_trait]
impl<P> ChainClient for EthersChainClient<P>
where
    P: JsonRpcClient + 'static,
{
    fn address(&self) -> &str {
        &self.address
    }

    async fn chain_id(&self) -> RpcResult<u64> {
        let id = self.provider.get_chainid().await.map_err(|e| self.err(e))?;
        Ok(saturating_u64(id))
    }

    async fn latest_head(&self) -> RpcResult<HeadEvent> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| self.err(e))?
            .ok_or_else(|| RpcError::Decode {
                endpoint: self.address.clone(),
                message: "latest block missing".to_string(),
            })?;
        head_from_block(&block, &self.address)
    }

    async fn nonce_at(&self, account: Address) -> RpcResult<u64> {
        let nonce = self
            .provider
            .get_transaction_count(account, Some(BlockId::Number(BlockNumber::Latest)))
            .await
            .map_err(|e| self.err(e))?;
        Ok(saturating_u64(nonce))
    }

    async fn suggest_tip(&self) -> RpcResult<U256> {
        self.provider
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| self.err(e))
    }

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> RpcResult<u64> {
        let tx = Eip1559TransactionRequest::new().from(from).to(to).value(value);
        let gas = self
            .provider
            .estimate_gas(&tx.into(), None)
            .await
            .map_err(|e| self.err(e))?;
        Ok(saturating_u64(gas))
    }

    async fn receipt(&self, hash: H256) -> RpcResult<Option<ReceiptInfo>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.err(e))?;

        // A receipt without a block is still pending on that node
        Ok(receipt.and_then(|r| {
            let block_hash = r.block_hash?;
            let block_number = r.block_number?;
            Some(ReceiptInfo {
                block_hash,
                block_number: block_number.as_u64(),
                success: r.status.map_or(true, |s| s.as_u64() == 1),
            })
        }))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.err(e))?;
        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl HeadSource for EthersChainClient<Ws> {
    async fn subscribe_heads(&self) -> RpcResult<HeadSubscription> {
        let (event_tx, events) = mpsc::channel(HEAD_BUFFER);
        let (error_tx, errors) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel::<RpcResult<()>>();

        let provider = Arc::clone(&self.provider);
        let address = self.address.clone();

        tokio::spawn(async move {
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(RpcError::from_provider_error(e, &address)));
                    return;
                }
            };

            let failure = loop {
                tokio::select! {
                    _ = event_tx.closed() => {
                        debug!(endpoint = %address, "Head consumer gone, dropping subscription");
                        return;
                    }
                    block = stream.next() => match block {
                        Some(block) => match head_from_block(&block, &address) {
                            Ok(head) => {
                                if event_tx.send(head).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => break e,
                        },
                        None => break RpcError::StreamClosed {
                            endpoint: address.clone(),
                            reason: "subscription stream ended".to_string(),
                        },
                    }
                }
            };

            let _ = error_tx.send(failure);
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(HeadSubscription { events, errors }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::StreamClosed {
                endpoint: self.address.clone(),
                reason: "subscription task ended before ready".to_string(),
            }),
        }
    }
}

/// Dials `ws://`/`wss://` endpoints as streaming clients and `http(s)://`
/// endpoints as read-only clients
#[derive(Debug, Clone, Default)]
pub struct EthersDialer;

#[async_trait]
impl Dialer for EthersDialer {
    async fn dial(&self, address: &str, role: EndpointRole) -> RpcResult<Endpoint> {
        if address.starts_with("ws://") || address.starts_with("wss://") {
            let client = Arc::new(EthersChainClient::connect_ws(address).await?);
            let heads: Arc<dyn HeadSource> = client.clone();
            Ok(Endpoint::new(address, role, client).with_heads(heads))
        } else if address.starts_with("http://") || address.starts_with("https://") {
            let client = EthersChainClient::http(address)?;
            // HTTP has no session; query once so a dead node fails the dial
            client.chain_id().await?;
            Ok(Endpoint::new(address, role, Arc::new(client)))
        } else {
            Err(RpcError::InvalidAddress {
                address: address.to_string(),
                reason: "expected ws://, wss://, http:// or https://".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U64;

    #[test]
    fn test_head_from_block_reads_blob_fields() {
        let block: Block<H256> = Block {
            number: Some(U64::from(100)),
            hash: Some(H256::repeat_byte(0xab)),
            timestamp: U256::from(1_700_000_000u64),
            base_fee_per_gas: Some(U256::from(7u64)),
            excess_blob_gas: Some(U256::from(393_216u64)),
            blob_gas_used: Some(U256::from(131_072u64)),
            ..Default::default()
        };

        let head = head_from_block(&block, "ws://node").unwrap();
        assert_eq!(head.number, 100);
        assert_eq!(head.base_fee, U256::from(7u64));
        assert_eq!(head.excess_blob_gas, 393_216);
        assert_eq!(head.blob_gas_used, 131_072);
    }

    #[test]
    fn test_head_from_block_requires_number() {
        let block: Block<H256> = Block {
            hash: Some(H256::zero()),
            ..Default::default()
        };
        assert!(matches!(
            head_from_block(&block, "ws://node"),
            Err(RpcError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_dialer_rejects_unknown_scheme() {
        let result = EthersDialer.dial("ftp://node:21", EndpointRole::Observer).await;
        match result {
            Err(err) => assert!(!err.is_retryable()),
            Ok(_) => panic!("ftp address should not dial"),
        }
    }
}
