//! Signed transaction construction

use super::SubmissionError;
use crate::fees::FeeState;
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::str::FromStr;

/// Everything that changes between two builds of the same logical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRequest {
    pub nonce: u64,
    pub fees: FeeState,
    pub gas_limit: u64,
    /// Block the transaction is aimed at (informational for plain transfers)
    pub target_block: u64,
}

/// An encoded, signed transaction ready for broadcast or bundling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: H256,
    /// EIP-2718 envelope
    pub raw: Bytes,
    pub nonce: u64,
    pub fees: FeeState,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
}

/// Produces signed transactions for the account that pays for them.
/// Blob-carrying payloads plug in here.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    fn sender(&self) -> Address;

    async fn build(&self, request: &BuildRequest) -> Result<SignedTransaction, SubmissionError>;
}

/// EIP-1559 transfer from the signer to itself
pub struct EthTransferBuilder {
    wallet: LocalWallet,
    chain_id: u64,
    value: U256,
}

impl EthTransferBuilder {
    pub fn new(wallet: LocalWallet, chain_id: u64, value: U256) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
            chain_id,
            value,
        }
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str, chain_id: u64, value: U256) -> Result<Self, SubmissionError> {
        let wallet = LocalWallet::from_str(key.trim().trim_start_matches("0x"))
            .map_err(|e| SubmissionError::Build(format!("invalid signing key: {}", e)))?;
        Ok(Self::new(wallet, chain_id, value))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl TransactionBuilder for EthTransferBuilder {
    fn sender(&self) -> Address {
        self.wallet.address()
    }

    async fn build(&self, request: &BuildRequest) -> Result<SignedTransaction, SubmissionError> {
        let to = self.wallet.address();
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(to)
            .to(to)
            .value(self.value)
            .nonce(request.nonce)
            .gas(request.gas_limit)
            .max_fee_per_gas(request.fees.gas_fee_cap)
            .max_priority_fee_per_gas(request.fees.gas_tip_cap)
            .chain_id(self.chain_id)
            .into();

        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| SubmissionError::Build(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        Ok(SignedTransaction {
            hash,
            raw,
            nonce: request.nonce,
            fees: request.fees,
            gas_limit: request.gas_limit,
            to,
            value: self.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key, never funded on a real network
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn request(nonce: u64) -> BuildRequest {
        BuildRequest {
            nonce,
            fees: FeeState {
                gas_tip_cap: U256::from(1_000_000_000u64),
                gas_fee_cap: U256::from(2_000_000_001u64),
                blob_fee_cap: U256::from(2u64),
            },
            gas_limit: 21_000,
            target_block: 101,
        }
    }

    #[tokio::test]
    async fn test_builds_typed_self_transfer() {
        let builder = EthTransferBuilder::from_private_key(DEV_KEY, 17_000, U256::zero()).unwrap();
        let tx = builder.build(&request(7)).await.unwrap();

        assert_eq!(tx.to, builder.sender());
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.raw.as_ref()[0], 0x02);
        assert_eq!(tx.hash, H256::from(keccak256(&tx.raw)));
    }

    #[tokio::test]
    async fn test_signing_is_deterministic_per_nonce() {
        let builder = EthTransferBuilder::from_private_key(DEV_KEY, 1, U256::zero()).unwrap();
        let a = builder.build(&request(1)).await.unwrap();
        let b = builder.build(&request(1)).await.unwrap();
        let c = builder.build(&request(2)).await.unwrap();

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(matches!(
            EthTransferBuilder::from_private_key("0xnot-hex", 1, U256::zero()),
            Err(SubmissionError::Build(_))
        ));
    }
}
