//! Endpoint connector with bounded and unbounded retry paths

use super::{Endpoint, EndpointRole, RpcError, RpcResult};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns an address into a live [`Endpoint`]
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str, role: EndpointRole) -> RpcResult<Endpoint>;
}

#[async_trait]
impl<T: Dialer + ?Sized> Dialer for Arc<T> {
    async fn dial(&self, address: &str, role: EndpointRole) -> RpcResult<Endpoint> {
        (**self).dial(address, role).await
    }
}

/// Retry timing for the connector
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay for the bounded path (`base * 2^attempt`)
    pub base_backoff_ms: u64,
    /// Cap for a single bounded-path delay
    pub max_backoff_ms: u64,
    /// Jitter fraction applied to bounded-path delays (0.0 disables)
    pub jitter_factor: f64,
    /// Delay between attempts on the unbounded path
    pub reconnect_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter_factor: 0.1,
            reconnect_delay_ms: 2_000,
        }
    }
}

impl BackoffConfig {
    /// Exponential backoff: base * 2^attempt, capped, with optional jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exp_backoff = (self.base_backoff_ms as f64) * 2_f64.powi(attempt.min(31) as i32);
        let capped_backoff = exp_backoff.min(self.max_backoff_ms as f64);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(capped_backoff as u64);
        }

        let mut rng = rand::thread_rng();
        let jitter_range = capped_backoff * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        let final_backoff = (capped_backoff + jitter).max(0.0);

        Duration::from_millis(final_backoff as u64)
    }
}

/// Dials endpoints; shares no state with the handles it returns
pub struct Connector<D> {
    dialer: D,
    backoff: BackoffConfig,
}

impl<D: Dialer> Connector<D> {
    pub fn new(dialer: D, backoff: BackoffConfig) -> Self {
        Self { dialer, backoff }
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// One dial under a hard deadline
    async fn dial_once(
        &self,
        address: &str,
        role: EndpointRole,
        per_attempt_timeout: Duration,
    ) -> RpcResult<Endpoint> {
        match tokio::time::timeout(per_attempt_timeout, self.dialer.dial(address, role)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                endpoint: address.to_string(),
                timeout_ms: per_attempt_timeout.as_millis() as u64,
            }),
        }
    }

    /// Bounded connect. Gives up with [`RpcError::ConnectionExhausted`] after
    /// `max_retries` failed attempts; a non-retryable failure ends it at once.
    pub async fn connect(
        &self,
        address: &str,
        role: EndpointRole,
        max_retries: u32,
        per_attempt_timeout: Duration,
    ) -> RpcResult<Endpoint> {
        let attempts = max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.dial_once(address, role, per_attempt_timeout).await {
                Ok(endpoint) => {
                    debug!(endpoint = %address, attempt, "Connected");
                    return Ok(endpoint);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        endpoint = %address,
                        attempt = attempt + 1,
                        max_retries = attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff.calculate_backoff(attempt)).await;
                    }
                }
            }
        }

        Err(RpcError::ConnectionExhausted {
            endpoint: address.to_string(),
            attempts,
            last_error,
        })
    }

    /// Unbounded connect for the primary stream. Retries with a fixed delay
    /// until it succeeds; only an address that can never be dialed is returned
    /// as an error.
    pub async fn connect_until_success(
        &self,
        address: &str,
        role: EndpointRole,
        per_attempt_timeout: Duration,
    ) -> RpcResult<Endpoint> {
        let delay = Duration::from_millis(self.backoff.reconnect_delay_ms);
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.dial_once(address, role, per_attempt_timeout).await {
                Ok(endpoint) => {
                    if attempt > 1 {
                        info!(endpoint = %address, attempts = attempt, "Reconnected");
                    }
                    return Ok(endpoint);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        endpoint = %address,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Dial failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
