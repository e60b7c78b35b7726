//! Structured logging for loop rounds

use crate::bidder::BidError;
use crate::fees::FeeState;
use crate::observability::CorrelationId;
use crate::reconciler::Outcome;
use crate::rpc::HeadEvent;
use crate::tx::{SignedTransaction, SubmissionError, SubmissionMode};
use ethers::types::H256;

/// Structured logger for one round of the lifecycle loop
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: CorrelationId,
}

impl StructuredLogger {
    pub fn new(context_id: CorrelationId) -> Self {
        Self { context_id }
    }

    pub fn context_id(&self) -> &CorrelationId {
        &self.context_id
    }

    pub fn log_head_received(&self, head: &HeadEvent, pending: Option<H256>) {
        tracing::info!(
            context_id = %self.context_id,
            block = head.number,
            base_fee = %head.base_fee,
            excess_blob_gas = head.excess_blob_gas,
            pending = ?pending,
            "New head"
        );
    }

    pub fn log_tx_submitted(&self, tx: &SignedTransaction, target_block: u64, mode: SubmissionMode) {
        tracing::info!(
            context_id = %self.context_id,
            tx_hash = ?tx.hash,
            nonce = tx.nonce,
            gas_tip_cap = %tx.fees.gas_tip_cap,
            gas_fee_cap = %tx.fees.gas_fee_cap,
            blob_fee_cap = %tx.fees.blob_fee_cap,
            gas_limit = tx.gas_limit,
            target_block,
            mode = ?mode,
            "Transaction submitted"
        );
    }

    pub fn log_underpriced_retry(&self, nonce: u64, retry: u32, fees: &FeeState) {
        tracing::warn!(
            context_id = %self.context_id,
            nonce,
            retry,
            gas_fee_cap = %fees.gas_fee_cap,
            "Replacement underpriced, raising fee cap"
        );
    }

    pub fn log_origination_failed(&self, block: u64, error: &SubmissionError) {
        tracing::warn!(
            context_id = %self.context_id,
            block,
            category = error.category(),
            error = %error,
            "No transaction this round"
        );
    }

    pub fn log_bid_sent(&self, tx_hash: H256, block: u64, amount: &str, commitments: usize) {
        tracing::info!(
            context_id = %self.context_id,
            tx_hash = ?tx_hash,
            block,
            amount = %amount,
            commitments,
            "Bid sent"
        );
    }

    pub fn log_bid_failed(&self, tx_hash: H256, block: u64, error: &BidError) {
        tracing::warn!(
            context_id = %self.context_id,
            tx_hash = ?tx_hash,
            block,
            category = error.category(),
            error = %error,
            "Bid failed"
        );
    }

    pub fn log_reconcile_outcome(&self, tx_hash: H256, outcome: &Outcome) {
        match outcome {
            Outcome::Pending { resend, observed } => tracing::debug!(
                context_id = %self.context_id,
                tx_hash = ?tx_hash,
                resend = *resend,
                observers_answered = *observed,
                "Still pending"
            ),
            Outcome::Confirmed {
                block_number,
                success,
                observer,
                ..
            } => tracing::info!(
                context_id = %self.context_id,
                tx_hash = ?tx_hash,
                block = *block_number,
                success = *success,
                observer = %observer,
                "Transaction confirmed"
            ),
            Outcome::Superseded {
                account_nonce,
                observer,
            } => tracing::warn!(
                context_id = %self.context_id,
                tx_hash = ?tx_hash,
                account_nonce = *account_nonce,
                observer = %observer,
                "Transaction superseded"
            ),
            Outcome::Exhausted { attempts } => tracing::warn!(
                context_id = %self.context_id,
                tx_hash = ?tx_hash,
                attempts = *attempts,
                "Attempt budget exhausted"
            ),
        }
    }
}
