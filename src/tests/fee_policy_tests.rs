use crate::fees::{FeeConfig, FeeInputs, FeePolicy, FeeState};
use ethers::types::U256;
use proptest::prelude::*;

fn inputs(base_fee: u64, excess: u64, used: u64, tip: u64) -> FeeInputs {
    FeeInputs {
        parent_base_fee: U256::from(base_fee),
        parent_excess_blob_gas: excess,
        parent_blob_gas_used: used,
        suggested_tip: U256::from(tip),
    }
}

proptest! {
    #[test]
    fn prop_attempts_are_valid_replacements(
        base_fee in 0u64..500_000_000_000,
        excess in 0u64..20_000_000,
        used in 0u64..1_000_000,
        tip in 0u64..200_000_000_000,
        later_base_fee in 0u64..500_000_000_000,
        later_tip in 0u64..200_000_000_000,
        attempts in 2u32..8,
    ) {
        let policy = FeePolicy::default();
        let mut previous = policy.next_fees(&inputs(base_fee, excess, used, tip), 1, None);

        for attempt in 2..=attempts {
            // chain signals may fall between attempts, caps must not
            let next = policy.next_fees(
                &inputs(later_base_fee, 0, 0, later_tip),
                attempt,
                Some(&previous),
            );
            prop_assert!(next.gas_tip_cap >= previous.gas_tip_cap);
            prop_assert!(next.gas_fee_cap > previous.gas_fee_cap);
            prop_assert!(next.blob_fee_cap >= previous.blob_fee_cap);
            prop_assert!(next.gas_fee_cap >= next.gas_tip_cap);
            previous = next;
        }
    }

    #[test]
    fn prop_fee_cap_covers_doubled_base_fee(
        base_fee in 0u64..1_000_000_000_000,
        tip in 0u64..100_000_000_000,
    ) {
        let fees = FeePolicy::default().next_fees(&inputs(base_fee, 0, 0, tip), 1, None);
        let floor = U256::from(base_fee) * U256::from(2u64) + fees.gas_tip_cap;
        prop_assert!(fees.gas_fee_cap > floor);
        prop_assert!(fees.gas_tip_cap >= U256::from(FeeConfig::default().tip_floor_wei));
    }

    #[test]
    fn prop_underpriced_raises_only_fee_cap(
        tip in 1u64..1_000_000_000_000,
        cap in 1u64..1_000_000_000_000,
        blob in 1u64..1_000_000,
    ) {
        let policy = FeePolicy::default();
        let fees = FeeState {
            gas_tip_cap: U256::from(tip),
            gas_fee_cap: U256::from(cap),
            blob_fee_cap: U256::from(blob),
        };
        let raised = policy.escalate_underpriced(&fees);
        prop_assert!(raised.gas_fee_cap > fees.gas_fee_cap);
        prop_assert_eq!(raised.gas_tip_cap, fees.gas_tip_cap);
        prop_assert_eq!(raised.blob_fee_cap, fees.blob_fee_cap);
    }
}

#[test]
fn test_tip_ceiling_holds_across_many_attempts() {
    let config = FeeConfig {
        tip_ceiling_wei: 5_000_000_000,
        ..FeeConfig::default()
    };
    let policy = FeePolicy::new(config);
    let mut previous: Option<FeeState> = None;

    for attempt in 1..=20 {
        let fees = policy.next_fees(&inputs(1_000_000_000, 0, 0, 2_000_000_000), attempt, previous.as_ref());
        assert!(fees.gas_tip_cap <= U256::from(5_000_000_000u64));
        if let Some(prev) = previous {
            assert!(fees.gas_fee_cap > prev.gas_fee_cap);
        }
        previous = Some(fees);
    }
}
