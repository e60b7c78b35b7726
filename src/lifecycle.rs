//! Lifecycle loop
//!
//! Single owner of the pending entry. On every head it either originates a
//! transaction plus its first bid, or reconciles the outstanding one and
//! applies the outcome. All mutation happens here; the reconciler, fee
//! policy and escalator only return values.

use crate::audit::{AuditLog, AuditRecord, TransactionRecord};
use crate::bidder::{BidError, BidEscalator, BidTarget};
use crate::fees::{FeeInputs, FeePolicy, FeeState};
use crate::metrics::Metrics;
use crate::observability::CorrelationId;
use crate::reconciler::{Outcome, PendingEntry, Reconciler};
use crate::rpc::{with_timeout, Dialer, Endpoint, FeedEvent, HeadEvent, HeadFeed, HeadHistory, RpcResult};
use crate::structured_logging::StructuredLogger;
use crate::tx::{BuildRequest, SignedTransaction, SubmissionError, SubmissionMode, TransactionBuilder, TxSubmitter};
use arc_swap::ArcSwap;
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Resolves on `interrupt` or once `max_runtime` elapses. An interrupt
/// listener that fails to install leaves only the runtime timer.
pub async fn shutdown_signal<I>(interrupt: I, max_runtime: Duration)
where
    I: Future<Output = std::io::Result<()>>,
{
    let interrupt = async {
        match interrupt.await {
            Ok(()) => info!("Interrupt received"),
            Err(e) => {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = tokio::time::sleep(max_runtime) => {
            info!(secs = max_runtime.as_secs(), "Maximum runtime reached");
        }
    }
}

/// How a bid names its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BidMode {
    /// Transaction hash; the transaction itself goes out through the submitter
    #[default]
    Hash,
    /// Raw signed payload; the auction performs inclusion, nothing is submitted
    Payload,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Blocks ahead of the current head a bid targets
    pub offset: u64,
    pub submission_mode: SubmissionMode,
    pub bid_mode: BidMode,
    /// Fixed gas limit; estimated per transaction when `None`
    pub gas_limit: Option<u64>,
    /// Value of the transfer, used for gas estimation
    pub value: U256,
    pub call_timeout: Duration,
    pub head_history: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            offset: 1,
            submission_mode: SubmissionMode::Broadcast,
            bid_mode: BidMode::Hash,
            gas_limit: Some(21_000),
            value: U256::zero(),
            call_timeout: Duration::from_secs(10),
            head_history: 64,
        }
    }
}

/// Collaborators the loop drives
pub struct LifecycleDeps {
    pub stream: Arc<ArcSwap<Endpoint>>,
    /// Read-only endpoints; the stream endpoint is used when empty
    pub observers: Vec<Arc<Endpoint>>,
    pub fee_policy: FeePolicy,
    pub builder: Arc<dyn TransactionBuilder>,
    pub submitter: TxSubmitter,
    pub escalator: BidEscalator,
    pub reconciler: Reconciler,
    pub audit: AuditLog,
    pub metrics: Arc<Metrics>,
}

/// What one round did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundReport {
    Originated { hash: H256, nonce: u64, bid_sent: bool },
    OriginationFailed { reason: String },
    Resent { hash: H256, attempts: u32, bid_sent: bool },
    StillPending { hash: H256 },
    Confirmed { hash: H256, block_number: u64 },
    Superseded { hash: H256, account_nonce: u64 },
    Exhausted { hash: H256, attempts: u32 },
}

/// Fees last used for a nonce, kept across exhausted entries so the next
/// transaction for the same nonce is a valid replacement
#[derive(Debug, Clone, Copy)]
struct FeeMemo {
    nonce: u64,
    attempt: u32,
    fees: FeeState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub heads: u64,
    pub reconnects: u64,
}

pub struct LifecycleLoop {
    config: LifecycleConfig,
    deps: LifecycleDeps,
    history: HeadHistory,
    pending: Option<PendingEntry>,
    last_fees: Option<FeeMemo>,
}

impl LifecycleLoop {
    pub fn new(config: LifecycleConfig, deps: LifecycleDeps) -> Self {
        let history = HeadHistory::new(config.head_history);
        Self {
            config,
            deps,
            history,
            pending: None,
            last_fees: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingEntry> {
        self.pending.as_ref()
    }

    pub fn history(&self) -> &HeadHistory {
        &self.history
    }

    fn observers(&self) -> Vec<Arc<Endpoint>> {
        if self.deps.observers.is_empty() {
            vec![self.deps.stream.load_full()]
        } else {
            self.deps.observers.clone()
        }
    }

    /// Drive rounds until `shutdown` resolves. Shutdown is only noticed
    /// between rounds; a round in progress always finishes.
    pub async fn run<D, S>(&mut self, feed: &mut HeadFeed<D>, shutdown: S) -> RpcResult<RunSummary>
    where
        D: Dialer,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(heads = summary.heads, "Shutdown requested, leaving loop");
                    break;
                }
                event = feed.next() => event?,
            };

            match event {
                FeedEvent::Head(head) => {
                    summary.heads += 1;
                    let report = self.handle_head(head).await;
                    debug!(block = head.number, report = ?report, "Round complete");
                }
                FeedEvent::Reconnected { endpoint, reason } => {
                    summary.reconnects += 1;
                    self.deps.metrics.reconnects.inc();
                    info!(endpoint = %endpoint, reason = %reason, "Head stream replaced");
                }
            }
        }

        Ok(summary)
    }

    /// One round for `head`
    pub async fn handle_head(&mut self, head: HeadEvent) -> RoundReport {
        self.deps.metrics.heads_received.inc();
        self.history.record(&head);

        let logger = StructuredLogger::new(CorrelationId::new());
        logger.log_head_received(&head, self.pending.as_ref().map(|e| e.hash));

        let report = match self.pending.take() {
            None => self.originate(&head, &logger).await,
            Some(entry) => self.advance(entry, &head, &logger).await,
        };

        self.deps
            .metrics
            .pending_attempts
            .set(self.pending.as_ref().map_or(0, |e| e.attempts as i64));
        report
    }

    fn bid_target(&self, tx: &SignedTransaction) -> Result<BidTarget, BidError> {
        match self.config.bid_mode {
            BidMode::Hash => BidTarget::by_hash(vec![tx.hash]),
            BidMode::Payload => BidTarget::by_payload(vec![tx.raw.clone()]),
        }
    }

    /// Bid for `tx` at `valid_block`; failures are logged and reported as false
    async fn send_bid(&self, tx: &SignedTransaction, valid_block: u64, logger: &StructuredLogger) -> bool {
        let started = Instant::now();
        let result = match self.bid_target(tx) {
            Ok(target) => self.deps.escalator.bid(&target, valid_block).await,
            Err(e) => Err(e),
        };
        self.deps
            .metrics
            .bid_latency
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(sent) => {
                self.deps.metrics.bids_sent.inc();
                logger.log_bid_sent(tx.hash, valid_block, &sent.request.amount, sent.acks.len());
                true
            }
            Err(e) => {
                self.deps.metrics.bids_failed.inc();
                logger.log_bid_failed(tx.hash, valid_block, &e);
                false
            }
        }
    }

    async fn originate(&mut self, head: &HeadEvent, logger: &StructuredLogger) -> RoundReport {
        match self.try_originate(head, logger).await {
            Ok((tx, bid_sent)) => RoundReport::Originated {
                hash: tx.hash,
                nonce: tx.nonce,
                bid_sent,
            },
            Err(e) => {
                self.deps.metrics.submission_failures.inc();
                logger.log_origination_failed(head.number, &e);
                RoundReport::OriginationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_originate(
        &mut self,
        head: &HeadEvent,
        logger: &StructuredLogger,
    ) -> Result<(SignedTransaction, bool), SubmissionError> {
        let stream = self.deps.stream.load_full();
        let sender = self.deps.builder.sender();
        let limit = self.config.call_timeout;

        // Confirmed nonce: a stuck transaction gets replaced, not queued behind
        let (nonce, suggested_tip) = tokio::try_join!(
            with_timeout(&stream.address, limit, stream.client.nonce_at(sender)),
            with_timeout(&stream.address, limit, stream.client.suggest_tip()),
        )?;

        let gas_limit = match self.config.gas_limit {
            Some(gas) => gas,
            None => {
                with_timeout(
                    &stream.address,
                    limit,
                    stream.client.estimate_gas(sender, sender, self.config.value),
                )
                .await?
            }
        };

        let previous = self.last_fees.filter(|memo| memo.nonce == nonce);
        let attempt = previous.map_or(1, |memo| memo.attempt + 1);
        let inputs = FeeInputs {
            parent_base_fee: head.base_fee,
            parent_excess_blob_gas: head.excess_blob_gas,
            parent_blob_gas_used: head.blob_gas_used,
            suggested_tip,
        };
        let mut fees = self
            .deps
            .fee_policy
            .next_fees(&inputs, attempt, previous.as_ref().map(|memo| &memo.fees));

        let target_block = head.number + self.config.offset;
        let max_sends = self.deps.fee_policy.config().max_submit_attempts.max(1);
        let mut sends = 0u32;

        let tx = loop {
            let request = BuildRequest {
                nonce,
                fees,
                gas_limit,
                target_block,
            };
            let tx = self.deps.builder.build(&request).await?;

            if self.config.bid_mode == BidMode::Payload {
                break tx;
            }

            sends += 1;
            let started = Instant::now();
            let submitted = self
                .deps
                .submitter
                .submit(&tx, &stream, self.config.submission_mode, target_block)
                .await;
            self.deps
                .metrics
                .submit_latency
                .observe(started.elapsed().as_secs_f64());

            match submitted {
                Ok(_) => break tx,
                Err(e) if e.is_replacement_underpriced() && sends < max_sends => {
                    self.deps.metrics.underpriced_retries.inc();
                    fees = self.deps.fee_policy.escalate_underpriced(&fees);
                    logger.log_underpriced_retry(nonce, sends, &fees);
                    // Fees the node has seen; the next nonce-matching round starts above them
                    self.last_fees = Some(FeeMemo { nonce, attempt, fees });
                }
                Err(e) => return Err(e),
            }
        };

        self.last_fees = Some(FeeMemo { nonce, attempt, fees });
        self.deps.metrics.tx_submitted.inc();
        self.deps.audit.record(AuditRecord::Transaction(TransactionRecord::new(
            &tx,
            target_block,
            self.config.submission_mode,
            attempt,
        )));
        logger.log_tx_submitted(&tx, target_block, self.config.submission_mode);

        let bid_sent = self.send_bid(&tx, target_block, logger).await;
        self.pending = Some(PendingEntry::new(tx.clone(), head.number));
        Ok((tx, bid_sent))
    }

    async fn advance(
        &mut self,
        mut entry: PendingEntry,
        head: &HeadEvent,
        logger: &StructuredLogger,
    ) -> RoundReport {
        let account = self.deps.builder.sender();
        let observers = self.observers();
        let outcome = self
            .deps
            .reconciler
            .reconcile(&entry, head, &self.history, &observers, account)
            .await;
        logger.log_reconcile_outcome(entry.hash, &outcome);

        match outcome {
            Outcome::Confirmed { block_number, .. } => {
                self.deps.metrics.confirmations.inc();
                self.deps
                    .metrics
                    .inclusion_delay_blocks
                    .observe(block_number.saturating_sub(entry.origin_block) as f64);
                self.last_fees = None;
                RoundReport::Confirmed {
                    hash: entry.hash,
                    block_number,
                }
            }
            Outcome::Superseded { account_nonce, .. } => {
                self.deps.metrics.superseded.inc();
                self.last_fees = None;
                RoundReport::Superseded {
                    hash: entry.hash,
                    account_nonce,
                }
            }
            Outcome::Exhausted { attempts } => {
                self.deps.metrics.exhausted.inc();
                RoundReport::Exhausted {
                    hash: entry.hash,
                    attempts,
                }
            }
            Outcome::Pending { resend: false, .. } => {
                let hash = entry.hash;
                self.pending = Some(entry);
                RoundReport::StillPending { hash }
            }
            Outcome::Pending { resend: true, .. } => {
                let target_block = head.number + self.config.offset;

                // Bundles are scoped to one block
                if self.config.submission_mode == SubmissionMode::PrivateBundle
                    && self.config.bid_mode == BidMode::Hash
                {
                    let stream = self.deps.stream.load_full();
                    if let Err(e) = self
                        .deps
                        .submitter
                        .submit(&entry.tx, &stream, SubmissionMode::PrivateBundle, target_block)
                        .await
                    {
                        warn!(tx_hash = ?entry.hash, target_block, error = %e, "Bundle re-post failed");
                    }
                }

                let bid_sent = self.send_bid(&entry.tx, target_block, logger).await;
                entry.attempts += 1;
                entry.last_bid_block = head.number;

                let report = RoundReport::Resent {
                    hash: entry.hash,
                    attempts: entry.attempts,
                    bid_sent,
                };
                self.pending = Some(entry);
                report
            }
        }
    }
}
