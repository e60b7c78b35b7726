//! EIP-4844 blob gas pricing (Cancun parameters)

use ethers::types::U256;

pub const MIN_BLOB_BASE_FEE: u64 = 1;
pub const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 3_338_477;
pub const GAS_PER_BLOB: u64 = 131_072;
pub const TARGET_BLOB_GAS_PER_BLOCK: u64 = 393_216;

/// Excess blob gas of the child of a block with the given parent values
pub fn calc_excess_blob_gas(parent_excess_blob_gas: u64, parent_blob_gas_used: u64) -> u64 {
    (parent_excess_blob_gas + parent_blob_gas_used).saturating_sub(TARGET_BLOB_GAS_PER_BLOCK)
}

/// Integer approximation of `factor * e ** (numerator / denominator)`
pub fn fake_exponential(factor: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return factor;
    }

    let mut i = U256::one();
    let mut output = U256::zero();
    let mut accum = factor.saturating_mul(denominator);

    while !accum.is_zero() {
        output = output.saturating_add(accum);
        accum = accum.saturating_mul(numerator) / denominator.saturating_mul(i);
        i += U256::one();
    }

    output / denominator
}

/// Per-blob-gas price implied by `excess_blob_gas`
pub fn blob_base_fee(excess_blob_gas: u64) -> U256 {
    fake_exponential(
        U256::from(MIN_BLOB_BASE_FEE),
        U256::from(excess_blob_gas),
        U256::from(BLOB_BASE_FEE_UPDATE_FRACTION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excess_blob_gas() {
        assert_eq!(calc_excess_blob_gas(0, 0), 0);
        assert_eq!(calc_excess_blob_gas(0, TARGET_BLOB_GAS_PER_BLOCK), 0);
        assert_eq!(calc_excess_blob_gas(0, 6 * GAS_PER_BLOB), 3 * GAS_PER_BLOB);
        assert_eq!(calc_excess_blob_gas(GAS_PER_BLOB, 0), 0);
        assert_eq!(
            calc_excess_blob_gas(10 * GAS_PER_BLOB, 2 * GAS_PER_BLOB),
            9 * GAS_PER_BLOB
        );
    }

    #[test]
    fn test_blob_base_fee_reference_points() {
        assert_eq!(blob_base_fee(0), U256::from(1u64));
        assert_eq!(blob_base_fee(2_314_057), U256::from(1u64));
        assert_eq!(blob_base_fee(2_314_058), U256::from(2u64));
        assert_eq!(blob_base_fee(10 * 1024 * 1024), U256::from(23u64));
    }

    #[test]
    fn test_fake_exponential_table() {
        let cases: [(u64, u64, u64, u64); 7] = [
            (1, 0, 1, 1),
            (38_493, 0, 1_000, 38_493),
            (0, 1_234, 2_345, 0),
            (1, 2, 1, 6),
            (1, 4, 2, 6),
            (1, 3, 1, 16),
            (1, 6, 2, 18),
        ];
        for (factor, num, denom, want) in cases {
            assert_eq!(
                fake_exponential(U256::from(factor), U256::from(num), U256::from(denom)),
                U256::from(want),
                "fake_exponential({}, {}, {})",
                factor,
                num,
                denom
            );
        }
    }
}
