//! Configuration module for the preconfirmation bidder
//!
//! Configuration comes from an optional TOML file, then `.env`, then the
//! process environment. `Config::validate` turns it into the typed settings
//! the runtime is built from and rejects anything that would make the loop
//! unusable before it starts.

use crate::bidder::{BidError, BidPolicy};
use crate::fees::FeeConfig;
use crate::lifecycle::{BidMode, LifecycleConfig};
use crate::rpc::{BackoffConfig, HeadFeedConfig, HeadMode};
use crate::tx::SubmissionMode;
use ethers::types::U256;
use ethers::utils::parse_ether;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No stream endpoint configured (set endpoints.stream or WS_ENDPOINT)")]
    MissingStreamEndpoint,

    #[error("No signing key configured (set PRIVATE_KEY)")]
    MissingSigningKey,

    #[error("Invalid {field} address {value}: {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: &'static str, reason: String },

    #[error(transparent)]
    Bid(#[from] BidError),

    #[error("Private bundle mode requires endpoints.bundle_relay_url or BUNDLE_RELAY_URL")]
    MissingBundleRelay,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub bidding: BiddingConfig,

    #[serde(default, rename = "loop")]
    pub lifecycle: LoopConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Head stream and submission endpoint (`ws://` for subscriptions)
    #[serde(default)]
    pub stream: String,

    /// Read-only observer endpoints
    #[serde(default)]
    pub observers: Vec<String>,

    /// Private bundle relay (`eth_sendBundle`)
    #[serde(default)]
    pub bundle_relay_url: Option<String>,

    #[serde(default)]
    pub head_source: HeadMode,

    /// Bounded connect attempts for observers
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for every chain call, submission and receipt lookup
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Fixed delay of the unbounded reconnect path
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// 0 disables stall detection
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Hex private key; normally supplied through `PRIVATE_KEY`
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    /// Value of the self transfer, in ETH
    #[serde(default = "default_transfer_value")]
    pub transfer_value_eth: f64,

    /// Fixed gas limit; estimated when absent
    #[serde(default = "default_gas_limit")]
    pub gas_limit: Option<u64>,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("transfer_value_eth", &self.transfer_value_eth)
            .field("gas_limit", &self.gas_limit)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BidTransportKind {
    #[default]
    Http,
    Grpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiddingConfig {
    /// Bidder node, `host:port` or URL
    #[serde(default = "default_bidder_address")]
    pub bidder_address: String,

    #[serde(default)]
    pub transport: BidTransportKind,

    #[serde(default = "default_min_bid")]
    pub min_amount_eth: f64,

    #[serde(default = "default_max_bid")]
    pub max_amount_eth: f64,

    #[serde(default = "default_decay_window")]
    pub decay_window_ms: u64,

    #[serde(default = "default_bid_timeout")]
    pub timeout_secs: u64,

    /// Bid with raw payloads instead of hashes
    #[serde(default)]
    pub use_payload: bool,

    /// Wait between deposit and withdrawal in the bidding-window command
    #[serde(default = "default_withdraw_delay")]
    pub withdraw_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Target block = head + offset
    #[serde(default = "default_offset")]
    pub offset: u64,

    /// Submit through the bundle relay instead of public broadcast
    #[serde(default)]
    pub private: bool,

    /// Bids per transaction before it is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_head_history")]
    pub head_history: usize,

    /// Overall process lifetime
    #[serde(default = "default_max_runtime")]
    pub max_runtime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory for transactions.json and bids.json; audit is off when unset
    #[serde(default = "default_audit_dir")]
    pub audit_dir: Option<String>,
}

// Default value functions
fn default_connect_retries() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 30 }
fn default_call_timeout() -> u64 { 10 }
fn default_backoff_base() -> u64 { 500 }
fn default_backoff_max() -> u64 { 30_000 }
fn default_reconnect_delay() -> u64 { 10_000 }
fn default_stall_timeout() -> u64 { 60 }
fn default_poll_interval() -> u64 { 2_000 }
fn default_transfer_value() -> f64 { 0.001 }
fn default_gas_limit() -> Option<u64> { Some(21_000) }
fn default_bidder_address() -> String { "127.0.0.1:13523".to_string() }
fn default_min_bid() -> f64 { 0.00005 }
fn default_max_bid() -> f64 { 0.009 }
fn default_decay_window() -> u64 { 36_000 }
fn default_bid_timeout() -> u64 { 15 }
fn default_withdraw_delay() -> u64 { 11 * 60 }
fn default_offset() -> u64 { 1 }
fn default_max_attempts() -> u32 { 5 }
fn default_head_history() -> usize { 64 }
fn default_max_runtime() -> u64 { 14 * 24 * 60 * 60 }
fn default_metrics_port() -> u16 { 9090 }
fn default_log_format() -> String { "text".to_string() }
fn default_audit_dir() -> Option<String> { Some("data".to_string()) }
fn default_true() -> bool { true }

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            stream: String::new(),
            observers: Vec::new(),
            bundle_relay_url: None,
            head_source: HeadMode::default(),
            connect_retries: default_connect_retries(),
            connect_timeout_secs: default_connect_timeout(),
            call_timeout_secs: default_call_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            reconnect_delay_ms: default_reconnect_delay(),
            stall_timeout_secs: default_stall_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            transfer_value_eth: default_transfer_value(),
            gas_limit: default_gas_limit(),
        }
    }
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            bidder_address: default_bidder_address(),
            transport: BidTransportKind::default(),
            min_amount_eth: default_min_bid(),
            max_amount_eth: default_max_bid(),
            decay_window_ms: default_decay_window(),
            timeout_secs: default_bid_timeout(),
            use_payload: false,
            withdraw_delay_secs: default_withdraw_delay(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            offset: default_offset(),
            private: false,
            max_attempts: default_max_attempts(),
            head_history: default_head_history(),
            max_runtime_secs: default_max_runtime(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
            log_format: default_log_format(),
            audit_dir: default_audit_dir(),
        }
    }
}

/// Settings after validation; the only form the runtime consumes
pub struct ValidatedConfig {
    pub stream_endpoint: String,
    pub observers: Vec<String>,
    pub signing_key: Zeroizing<String>,
    pub bundle_relay_url: Option<String>,
    pub connect_retries: u32,
    pub connect_timeout: Duration,
    pub backoff: BackoffConfig,
    pub head_feed: HeadFeedConfig,
    pub lifecycle: LifecycleConfig,
    pub fees: FeeConfig,
    pub bid_policy: BidPolicy,
    pub bidder_address: String,
    pub bid_transport: BidTransportKind,
    pub bid_timeout: Duration,
    pub withdraw_delay: Duration,
    pub max_attempts: u32,
    pub max_runtime: Duration,
    pub audit_dir: Option<PathBuf>,
    pub monitoring: MonitoringConfig,
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
            reason: format!("scheme must be one of {:?}", schemes),
        });
    }
    Ok(())
}

fn eth_to_wei(field: &'static str, eth: f64) -> Result<U256, ConfigError> {
    if !eth.is_finite() || eth < 0.0 {
        return Err(ConfigError::InvalidAmount {
            field,
            reason: format!("{} is not a non-negative amount", eth),
        });
    }
    parse_ether(eth).map_err(|e| ConfigError::InvalidAmount {
        field,
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// File (when present), then `.env`, then process environment
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ws) = lookup("WS_ENDPOINT") {
            self.endpoints.stream = ws.trim().to_string();
        }
        if let Some(rpc) = lookup("RPC_ENDPOINT") {
            self.endpoints.observers = rpc
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = lookup("PRIVATE_KEY") {
            self.signer.private_key = Some(key);
        }
        if let Some(addr) = lookup("BIDDER_ADDRESS") {
            self.bidding.bidder_address = addr.trim().to_string();
        }
        if let Some(offset) = lookup("OFFSET") {
            self.lifecycle.offset = offset.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "OFFSET",
                value: offset.clone(),
            })?;
        }
        if let Some(v) = lookup("USE_PAYLOAD") {
            self.bidding.use_payload = parse_bool("USE_PAYLOAD", &v)?;
        }
        if let Some(v) = lookup("PRIVATE") {
            self.lifecycle.private = parse_bool("PRIVATE", &v)?;
        }
        if let Some(url) = lookup("BUNDLE_RELAY_URL") {
            let url = url.trim().to_string();
            self.endpoints.bundle_relay_url = (!url.is_empty()).then_some(url);
        }
        Ok(())
    }

    /// Check everything the loop depends on and build typed settings
    pub fn validate(mut self) -> Result<ValidatedConfig, ConfigError> {
        let ep = &self.endpoints;
        if ep.stream.trim().is_empty() {
            return Err(ConfigError::MissingStreamEndpoint);
        }
        let stream_schemes: &[&str] = match ep.head_source {
            HeadMode::Subscribe => &["ws", "wss"],
            HeadMode::Poll => &["ws", "wss", "http", "https"],
        };
        check_url("stream", &ep.stream, stream_schemes)?;
        for observer in &ep.observers {
            check_url("observer", observer, &["ws", "wss", "http", "https"])?;
        }
        if let Some(relay) = &ep.bundle_relay_url {
            check_url("bundle relay", relay, &["http", "https"])?;
        }
        if self.lifecycle.private && ep.bundle_relay_url.is_none() {
            return Err(ConfigError::MissingBundleRelay);
        }

        let signing_key = match self.signer.private_key.take() {
            Some(key) if !key.trim().is_empty() => Zeroizing::new(key),
            _ => return Err(ConfigError::MissingSigningKey),
        };

        let bid_policy = BidPolicy::new(
            eth_to_wei("bidding.min_amount_eth", self.bidding.min_amount_eth)?,
            eth_to_wei("bidding.max_amount_eth", self.bidding.max_amount_eth)?,
            Duration::from_millis(self.bidding.decay_window_ms),
        )?;
        let value = eth_to_wei("signer.transfer_value_eth", self.signer.transfer_value_eth)?;

        let ep = &self.endpoints;
        let call_timeout = Duration::from_secs(ep.call_timeout_secs.max(1));
        let submission_mode = if self.lifecycle.private {
            SubmissionMode::PrivateBundle
        } else {
            SubmissionMode::Broadcast
        };
        let bid_mode = if self.bidding.use_payload {
            BidMode::Payload
        } else {
            BidMode::Hash
        };

        Ok(ValidatedConfig {
            stream_endpoint: ep.stream.clone(),
            observers: ep.observers.clone(),
            signing_key,
            bundle_relay_url: ep.bundle_relay_url.clone(),
            connect_retries: ep.connect_retries,
            connect_timeout: Duration::from_secs(ep.connect_timeout_secs.max(1)),
            backoff: BackoffConfig {
                base_backoff_ms: ep.backoff_base_ms,
                max_backoff_ms: ep.backoff_max_ms,
                jitter_factor: 0.1,
                reconnect_delay_ms: ep.reconnect_delay_ms,
            },
            head_feed: HeadFeedConfig {
                mode: ep.head_source,
                call_timeout: Duration::from_secs(ep.connect_timeout_secs.max(1)),
                stall_timeout: (ep.stall_timeout_secs > 0)
                    .then(|| Duration::from_secs(ep.stall_timeout_secs)),
                poll_interval: Duration::from_millis(ep.poll_interval_ms),
            },
            lifecycle: LifecycleConfig {
                offset: self.lifecycle.offset,
                submission_mode,
                bid_mode,
                gas_limit: self.signer.gas_limit,
                value,
                call_timeout,
                head_history: self.lifecycle.head_history,
            },
            fees: self.fees.clone(),
            bid_policy,
            bidder_address: self.bidding.bidder_address.clone(),
            bid_transport: self.bidding.transport,
            bid_timeout: Duration::from_secs(self.bidding.timeout_secs.max(1)),
            withdraw_delay: Duration::from_secs(self.bidding.withdraw_delay_secs),
            max_attempts: self.lifecycle.max_attempts.max(1),
            max_runtime: Duration::from_secs(self.lifecycle.max_runtime_secs),
            audit_dir: self.monitoring.audit_dir.as_ref().map(PathBuf::from),
            monitoring: self.monitoring.clone(),
        })
    }
}
