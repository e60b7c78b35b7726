//! Preconfirmation bidder
//!
//! Keeps one time-sensitive transaction in flight per chain head and bids
//! for its inclusion at a target block until it lands, is replaced, or runs
//! out of attempts.

pub mod audit;
pub mod bidder;
pub mod config;
pub mod endpoints;
pub mod fees;
pub mod lifecycle;
pub mod metrics;
pub mod observability;
pub mod reconciler;
pub mod rpc;
pub mod structured_logging;
pub mod tx;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError, ValidatedConfig};
pub use lifecycle::{LifecycleConfig, LifecycleDeps, LifecycleLoop, RoundReport};
