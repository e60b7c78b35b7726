//! Transaction submitter
//!
//! Dispatches an already-signed transaction either to the stream endpoint's
//! public submission API or to a private bundle relay. No retries happen
//! here; the lifecycle loop owns the retry policy.

pub mod builder;
pub mod bundle;
pub mod errors;

use crate::rpc::{with_timeout, Endpoint};
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub use builder::{BuildRequest, EthTransferBuilder, SignedTransaction, TransactionBuilder};
pub use bundle::BundleRelay;
pub use errors::SubmissionError;

/// Where a signed transaction goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    Broadcast,
    PrivateBundle,
}

pub struct TxSubmitter {
    relay: Option<BundleRelay>,
    call_timeout: Duration,
}

impl TxSubmitter {
    pub fn new(relay: Option<BundleRelay>, call_timeout: Duration) -> Self {
        Self {
            relay,
            call_timeout,
        }
    }

    /// Send `tx` through `mode`. `target_block` scopes private bundles and is
    /// ignored for broadcasts.
    pub async fn submit(
        &self,
        tx: &SignedTransaction,
        endpoint: &Endpoint,
        mode: SubmissionMode,
        target_block: u64,
    ) -> Result<H256, SubmissionError> {
        match mode {
            SubmissionMode::Broadcast => {
                let sent = with_timeout(
                    &endpoint.address,
                    self.call_timeout,
                    endpoint.client.send_raw_transaction(tx.raw.clone()),
                )
                .await;

                match sent {
                    Ok(hash) => {
                        info!(tx_hash = ?hash, nonce = tx.nonce, endpoint = %endpoint.address, "Transaction broadcast");
                        Ok(hash)
                    }
                    Err(e) => {
                        let err = SubmissionError::from_broadcast(e);
                        // Rebroadcast of an identical transaction
                        if matches!(&err, SubmissionError::Rejected { message, .. } if message.contains("already known"))
                        {
                            debug!(tx_hash = ?tx.hash, "Transaction already in pool");
                            return Ok(tx.hash);
                        }
                        Err(err)
                    }
                }
            }
            SubmissionMode::PrivateBundle => {
                let relay = self.relay.as_ref().ok_or_else(|| {
                    SubmissionError::Build("private bundle mode without a relay".to_string())
                })?;
                let result = relay.send_bundle(tx, target_block).await?;
                info!(
                    tx_hash = ?tx.hash,
                    nonce = tx.nonce,
                    target_block,
                    relay = %relay.url(),
                    result = %result,
                    "Bundle submitted"
                );
                Ok(tx.hash)
            }
        }
    }
}
