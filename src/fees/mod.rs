//! Fee escalation policy
//!
//! Computes the tip, fee and blob fee caps for each attempt at the same
//! logical transaction. Every field is non-decreasing across attempts and the
//! fee cap strictly increases, so each attempt is a valid replacement of the
//! previous one.

pub mod blob;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

pub use blob::{blob_base_fee, calc_excess_blob_gas, fake_exponential};

/// Fee caps used for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeState {
    pub gas_tip_cap: U256,
    pub gas_fee_cap: U256,
    pub blob_fee_cap: U256,
}

/// Policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Margin over the chain blob base fee, percent
    #[serde(default = "default_blob_fee_margin_pct")]
    pub blob_fee_margin_pct: u64,

    #[serde(default = "default_tip_floor_wei")]
    pub tip_floor_wei: u64,

    #[serde(default = "default_tip_ceiling_wei")]
    pub tip_ceiling_wei: u64,

    /// Added to the tip for every attempt after the first
    #[serde(default = "default_tip_increment_wei")]
    pub tip_increment_wei: u64,

    /// Minimum raise over the previous attempt, percent
    #[serde(default = "default_replacement_bump_pct")]
    pub replacement_bump_pct: u64,

    /// Fee cap raise after a "replacement underpriced" rejection, percent
    #[serde(default = "default_underpriced_bump_pct")]
    pub underpriced_bump_pct: u64,

    /// Submissions allowed within one round, the first one included
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: u32,
}

fn default_blob_fee_margin_pct() -> u64 { 10 }
fn default_tip_floor_wei() -> u64 { 1_000_000_000 }
fn default_tip_ceiling_wei() -> u64 { 1_000_000_000_000 }
fn default_tip_increment_wei() -> u64 { 1_000_000_000 }
fn default_replacement_bump_pct() -> u64 { 10 }
fn default_underpriced_bump_pct() -> u64 { 5 }
fn default_max_submit_attempts() -> u32 { 5 }

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            blob_fee_margin_pct: default_blob_fee_margin_pct(),
            tip_floor_wei: default_tip_floor_wei(),
            tip_ceiling_wei: default_tip_ceiling_wei(),
            tip_increment_wei: default_tip_increment_wei(),
            replacement_bump_pct: default_replacement_bump_pct(),
            underpriced_bump_pct: default_underpriced_bump_pct(),
            max_submit_attempts: default_max_submit_attempts(),
        }
    }
}

/// Chain signals for one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeInputs {
    pub parent_base_fee: U256,
    pub parent_excess_blob_gas: u64,
    pub parent_blob_gas_used: u64,
    /// Node's tip suggestion; the floor applies when it is lower
    pub suggested_tip: U256,
}

#[derive(Debug, Clone, Default)]
pub struct FeePolicy {
    config: FeeConfig,
}

fn bump(value: U256, pct: u64) -> U256 {
    value.saturating_mul(U256::from(100 + pct)) / U256::from(100u64)
}

/// `bump` that always moves by at least one wei
fn bump_strict(value: U256, pct: u64) -> U256 {
    bump(value, pct).max(value.saturating_add(U256::one()))
}

impl FeePolicy {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Fees for `attempt` (1-based). With `previous` set, each field is at
    /// least the previous one and the fee cap is strictly above it.
    pub fn next_fees(
        &self,
        inputs: &FeeInputs,
        attempt: u32,
        previous: Option<&FeeState>,
    ) -> FeeState {
        let cfg = &self.config;
        let floor = U256::from(cfg.tip_floor_wei);
        let ceiling = U256::from(cfg.tip_ceiling_wei.max(cfg.tip_floor_wei));

        let escalation =
            U256::from(cfg.tip_increment_wei).saturating_mul(U256::from(attempt.saturating_sub(1)));
        let mut tip = inputs
            .suggested_tip
            .max(floor)
            .saturating_add(escalation)
            .min(ceiling);

        let next_excess =
            calc_excess_blob_gas(inputs.parent_excess_blob_gas, inputs.parent_blob_gas_used);
        let chain_blob_fee = blob_base_fee(next_excess);
        let mut blob_fee_cap = bump_strict(chain_blob_fee, cfg.blob_fee_margin_pct);

        let two = U256::from(2u64);
        let mut fee_cap = tip
            .saturating_mul(two)
            .max(inputs.parent_base_fee.saturating_mul(two).saturating_add(tip))
            .saturating_add(U256::one());

        if let Some(prev) = previous {
            let bumped_tip = bump(prev.gas_tip_cap, cfg.replacement_bump_pct).min(ceiling);
            tip = tip.max(bumped_tip).max(prev.gas_tip_cap);
            fee_cap = fee_cap
                .max(bump_strict(prev.gas_fee_cap, cfg.replacement_bump_pct))
                .max(tip.saturating_mul(two).saturating_add(U256::one()));
            blob_fee_cap = blob_fee_cap.max(bump(prev.blob_fee_cap, cfg.replacement_bump_pct));
        }

        FeeState {
            gas_tip_cap: tip,
            gas_fee_cap: fee_cap,
            blob_fee_cap,
        }
    }

    /// Raise only the fee cap after a "replacement underpriced" rejection
    pub fn escalate_underpriced(&self, previous: &FeeState) -> FeeState {
        FeeState {
            gas_fee_cap: bump_strict(previous.gas_fee_cap, self.config.underpriced_bump_pct),
            ..*previous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GWEI: u64 = 1_000_000_000;

    fn inputs(base_fee_gwei: u64, tip_gwei: u64) -> FeeInputs {
        FeeInputs {
            parent_base_fee: U256::from(base_fee_gwei * GWEI),
            parent_excess_blob_gas: 0,
            parent_blob_gas_used: 0,
            suggested_tip: U256::from(tip_gwei * GWEI),
        }
    }

    #[test]
    fn test_first_attempt_applies_floor() {
        let policy = FeePolicy::default();
        let fees = policy.next_fees(&inputs(0, 0), 1, None);

        assert_eq!(fees.gas_tip_cap, U256::from(GWEI));
        assert_eq!(fees.gas_fee_cap, U256::from(2 * GWEI + 1));
        assert!(fees.gas_fee_cap > fees.gas_tip_cap);
    }

    #[test]
    fn test_fee_cap_covers_base_fee() {
        let policy = FeePolicy::default();
        let fees = policy.next_fees(&inputs(30, 2), 1, None);

        assert_eq!(fees.gas_tip_cap, U256::from(2 * GWEI));
        assert_eq!(fees.gas_fee_cap, U256::from(62 * GWEI + 1));
    }

    #[test]
    fn test_blob_fee_cap_exceeds_chain_minimum() {
        let policy = FeePolicy::default();
        let fees = policy.next_fees(&inputs(1, 1), 1, None);
        // blob base fee at zero excess is 1 wei; margin rounds down so the +1 applies
        assert_eq!(fees.blob_fee_cap, U256::from(2u64));

        let busy = FeeInputs {
            parent_excess_blob_gas: 10 * 1024 * 1024,
            parent_blob_gas_used: blob::TARGET_BLOB_GAS_PER_BLOCK,
            ..inputs(1, 1)
        };
        let fees = policy.next_fees(&busy, 1, None);
        assert_eq!(fees.blob_fee_cap, U256::from(25u64));
    }

    #[test]
    fn test_tip_respects_ceiling() {
        let policy = FeePolicy::new(FeeConfig {
            tip_ceiling_wei: 3 * GWEI,
            ..FeeConfig::default()
        });
        let fees = policy.next_fees(&inputs(1, 50), 1, None);
        assert_eq!(fees.gas_tip_cap, U256::from(3 * GWEI));
    }

    #[test]
    fn test_replacement_never_decreases() {
        let policy = FeePolicy::default();
        let first = policy.next_fees(&inputs(50, 5), 1, None);
        // Base fee collapsed between attempts
        let second = policy.next_fees(&inputs(1, 1), 2, Some(&first));

        assert!(second.gas_fee_cap > first.gas_fee_cap);
        assert!(second.gas_tip_cap >= first.gas_tip_cap);
        assert!(second.blob_fee_cap >= first.blob_fee_cap);
    }

    #[test]
    fn test_underpriced_escalation_raises_fee_cap_only() {
        let policy = FeePolicy::default();
        let first = policy.next_fees(&inputs(10, 2), 1, None);
        let escalated = policy.escalate_underpriced(&first);

        assert_eq!(escalated.gas_fee_cap, first.gas_fee_cap * 105 / 100);
        assert_eq!(escalated.gas_tip_cap, first.gas_tip_cap);
        assert_eq!(escalated.blob_fee_cap, first.blob_fee_cap);
    }

    #[test]
    fn test_underpriced_escalation_moves_tiny_caps() {
        let policy = FeePolicy::default();
        let tiny = FeeState {
            gas_tip_cap: U256::one(),
            gas_fee_cap: U256::from(3u64),
            blob_fee_cap: U256::one(),
        };
        assert_eq!(policy.escalate_underpriced(&tiny).gas_fee_cap, U256::from(4u64));
    }
}
