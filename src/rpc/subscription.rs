//! Head feed: subscription state machine with reconnect, stall detection
//! and a polling fallback

use super::{
    with_timeout, Connector, Dialer, Endpoint, EndpointRole, HeadEvent, HeadSubscription,
    RpcError, RpcResult,
};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the feed learns about new heads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeadMode {
    #[default]
    Subscribe,
    Poll,
}

#[derive(Debug, Clone)]
pub struct HeadFeedConfig {
    pub mode: HeadMode,
    /// Per-dial and per-poll deadline
    pub call_timeout: Duration,
    /// No head for this long counts as a failed stream (`None` disables)
    pub stall_timeout: Option<Duration>,
    /// Fixed post-round sleep in polling mode
    pub poll_interval: Duration,
}

impl Default for HeadFeedConfig {
    fn default() -> Self {
        Self {
            mode: HeadMode::Subscribe,
            call_timeout: Duration::from_secs(10),
            stall_timeout: Some(Duration::from_secs(60)),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// What the loop gets from [`HeadFeed::next`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Head(HeadEvent),
    /// The stream failed and a fresh one is in place; nothing from the old
    /// one will be delivered
    Reconnected { endpoint: String, reason: String },
}

enum Wake {
    Head(HeadEvent),
    Failed(RpcError),
}

/// Owns the current subscription and the stream endpoint handle.
///
/// States: Subscribed -> (error signal, closed channel or stall) ->
/// Reconnecting -> Subscribed. The handle in [`HeadFeed::handle`] is swapped
/// atomically on every reconnect.
pub struct HeadFeed<D> {
    connector: Arc<Connector<D>>,
    address: String,
    config: HeadFeedConfig,
    current: Arc<ArcSwap<Endpoint>>,
    subscription: Option<HeadSubscription>,
    last_polled: Option<u64>,
}

impl<D: Dialer> HeadFeed<D> {
    /// Dial the stream endpoint (blocking until it answers) and subscribe
    pub async fn open(
        connector: Arc<Connector<D>>,
        address: &str,
        config: HeadFeedConfig,
    ) -> RpcResult<Self> {
        let endpoint = connector
            .connect_until_success(address, EndpointRole::Stream, config.call_timeout)
            .await?;

        let mut feed = Self {
            connector,
            address: address.to_string(),
            config,
            current: Arc::new(ArcSwap::from_pointee(endpoint)),
            subscription: None,
            last_polled: None,
        };

        if feed.config.mode == HeadMode::Subscribe {
            let endpoint = feed.current.load_full();
            feed.subscribe_on(endpoint).await?;
        }

        info!(endpoint = %feed.address, mode = ?feed.config.mode, "Head feed open");
        Ok(feed)
    }

    /// Current stream endpoint
    pub fn endpoint(&self) -> Arc<Endpoint> {
        self.current.load_full()
    }

    /// Shared handle that always points at the live stream endpoint
    pub fn handle(&self) -> Arc<ArcSwap<Endpoint>> {
        Arc::clone(&self.current)
    }

    pub fn mode(&self) -> HeadMode {
        self.config.mode
    }

    /// Next head from the current subscription, or notice of a reconnect
    pub async fn next(&mut self) -> RpcResult<FeedEvent> {
        match self.config.mode {
            HeadMode::Subscribe => self.next_subscribed().await,
            HeadMode::Poll => self.next_polled().await,
        }
    }

    async fn next_subscribed(&mut self) -> RpcResult<FeedEvent> {
        let wake = match self.subscription.as_mut() {
            Some(sub) => {
                let stall = self.config.stall_timeout;
                tokio::select! {
                    biased;
                    signal = &mut sub.errors => Wake::Failed(signal.unwrap_or_else(|_| {
                        RpcError::StreamClosed {
                            endpoint: self.address.clone(),
                            reason: "error signal dropped".to_string(),
                        }
                    })),
                    event = sub.events.recv() => match event {
                        Some(head) => Wake::Head(head),
                        None => Wake::Failed(RpcError::StreamClosed {
                            endpoint: self.address.clone(),
                            reason: "head channel closed".to_string(),
                        }),
                    },
                    _ = stall_timer(stall) => Wake::Failed(RpcError::StreamClosed {
                        endpoint: self.address.clone(),
                        reason: format!("no head within {:?}", stall.unwrap_or_default()),
                    }),
                }
            }
            None => Wake::Failed(RpcError::StreamClosed {
                endpoint: self.address.clone(),
                reason: "no active subscription".to_string(),
            }),
        };

        match wake {
            Wake::Head(head) => {
                debug!(block = head.number, "Head received");
                Ok(FeedEvent::Head(head))
            }
            Wake::Failed(err) => {
                warn!(endpoint = %self.address, error = %err, "Head stream failed, reconnecting");
                // Drop the stale pair before anything else can read from it
                self.subscription = None;
                self.reconnect().await?;
                Ok(FeedEvent::Reconnected {
                    endpoint: self.address.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Re-dial the same address and subscribe again until both succeed
    async fn reconnect(&mut self) -> RpcResult<()> {
        loop {
            let endpoint = self
                .connector
                .connect_until_success(&self.address, EndpointRole::Stream, self.config.call_timeout)
                .await?;

            match self.subscribe_on(Arc::new(endpoint)).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = Duration::from_millis(self.connector.backoff().reconnect_delay_ms);
                    warn!(endpoint = %self.address, error = %e, "Resubscribe failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn subscribe_on(&mut self, endpoint: Arc<Endpoint>) -> RpcResult<()> {
        let heads = endpoint.heads.clone().ok_or_else(|| RpcError::Unsupported {
            endpoint: endpoint.address.clone(),
            operation: "subscribe_heads",
        })?;

        let subscription = heads.subscribe_heads().await?;
        self.current.store(endpoint);
        self.subscription = Some(subscription);
        Ok(())
    }

    async fn next_polled(&mut self) -> RpcResult<FeedEvent> {
        if self.last_polled.is_some() {
            tokio::time::sleep(self.config.poll_interval).await;
        }

        loop {
            let endpoint = self.current.load_full();
            match with_timeout(
                &self.address,
                self.config.call_timeout,
                endpoint.client.latest_head(),
            )
            .await
            {
                Ok(head) => {
                    if self.last_polled.map_or(true, |last| head.number > last) {
                        self.last_polled = Some(head.number);
                        return Ok(FeedEvent::Head(head));
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    warn!(endpoint = %self.address, error = %e, "Head poll failed, reconnecting");
                    let fresh = self
                        .connector
                        .connect_until_success(
                            &self.address,
                            EndpointRole::Stream,
                            self.config.call_timeout,
                        )
                        .await?;
                    self.current.store(Arc::new(fresh));
                    return Ok(FeedEvent::Reconnected {
                        endpoint: self.address.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

async fn stall_timer(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
