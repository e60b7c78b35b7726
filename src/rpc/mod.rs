//! Chain endpoint layer
//!
//! Connection handles to execution-layer nodes, the bounded and unbounded
//! connect paths, and the head feed the lifecycle loop selects over.
//!
//! Components talk to nodes only through [`ChainClient`] and [`HeadSource`],
//! so tests drive the loop with in-memory endpoints.

pub mod connector;
pub mod ethers_client;
pub mod rpc_errors;
pub mod subscription;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub use connector::{BackoffConfig, Connector, Dialer};
pub use ethers_client::{EthersChainClient, EthersDialer};
pub use rpc_errors::{RpcError, RpcResult};
pub use subscription::{FeedEvent, HeadFeed, HeadFeedConfig, HeadMode};

/// Immutable snapshot of a new chain head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadEvent {
    pub number: u64,
    pub hash: H256,
    /// Block timestamp in seconds
    pub timestamp: u64,
    pub base_fee: U256,
    pub excess_blob_gas: u64,
    pub blob_gas_used: u64,
}

/// The subset of a receipt the reconciler needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub block_hash: H256,
    pub block_number: u64,
    pub success: bool,
}

/// Read and broadcast capabilities of a connected node
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address this client was dialed with
    fn address(&self) -> &str;

    async fn chain_id(&self) -> RpcResult<u64>;

    async fn latest_head(&self) -> RpcResult<HeadEvent>;

    /// Nonce of the latest confirmed state
    async fn nonce_at(&self, account: Address) -> RpcResult<u64>;

    /// `eth_maxPriorityFeePerGas`
    async fn suggest_tip(&self) -> RpcResult<U256>;

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> RpcResult<u64>;

    /// `Ok(None)` when the node has no receipt for the hash
    async fn receipt(&self, hash: H256) -> RpcResult<Option<ReceiptInfo>>;

    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult<H256>;
}

/// Live head notifications plus the one-shot failure signal of the stream
#[derive(Debug)]
pub struct HeadSubscription {
    pub events: mpsc::Receiver<HeadEvent>,
    pub errors: oneshot::Receiver<RpcError>,
}

/// Endpoints able to push new heads over a persistent connection
#[async_trait]
pub trait HeadSource: Send + Sync {
    async fn subscribe_heads(&self) -> RpcResult<HeadSubscription>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Head stream and transaction submission
    Stream,
    /// Reads only (nonce, receipts)
    Observer,
}

/// A dialed node. Replaced as a whole on reconnect, never mutated in place.
#[derive(Clone)]
pub struct Endpoint {
    pub address: String,
    pub role: EndpointRole,
    pub client: Arc<dyn ChainClient>,
    pub heads: Option<Arc<dyn HeadSource>>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, role: EndpointRole, client: Arc<dyn ChainClient>) -> Self {
        Self {
            address: address.into(),
            role,
            client,
            heads: None,
        }
    }

    pub fn with_heads(mut self, heads: Arc<dyn HeadSource>) -> Self {
        self.heads = Some(heads);
        self
    }

    pub fn can_stream(&self) -> bool {
        self.heads.is_some()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("role", &self.role)
            .field("streaming", &self.can_stream())
            .finish()
    }
}

/// Bounded record of head hashes the loop has processed
#[derive(Debug, Clone)]
pub struct HeadHistory {
    capacity: usize,
    order: VecDeque<H256>,
    seen: HashSet<H256>,
}

impl HeadHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, head: &HeadEvent) {
        if !self.seen.insert(head.hash) {
            return;
        }
        self.order.push_back(head.hash);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for HeadHistory {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Run a chain call under a hard deadline, mapping expiry to [`RpcError::Timeout`]
pub async fn with_timeout<T, F>(endpoint: &str, limit: Duration, fut: F) -> RpcResult<T>
where
    F: Future<Output = RpcResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
