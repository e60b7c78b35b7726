//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Loop metrics, owned by the runtime context
pub struct Metrics {
    registry: Registry,

    // Counters
    pub heads_received: IntCounter,
    pub reconnects: IntCounter,
    pub tx_submitted: IntCounter,
    pub underpriced_retries: IntCounter,
    pub submission_failures: IntCounter,
    pub bids_sent: IntCounter,
    pub bids_failed: IntCounter,
    pub confirmations: IntCounter,
    pub superseded: IntCounter,
    pub exhausted: IntCounter,

    // Gauges
    pub pending_attempts: IntGauge,

    // Histograms
    pub inclusion_delay_blocks: Histogram,
    pub submit_latency: Histogram,
    pub bid_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let heads_received =
            IntCounter::with_opts(Opts::new("heads_received_total", "Chain heads processed"))?;

        let reconnects = IntCounter::with_opts(Opts::new(
            "head_stream_reconnects_total",
            "Head stream failures followed by a reconnect",
        ))?;

        let tx_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted_total",
            "Transactions originated and accepted by the submitter",
        ))?;

        let underpriced_retries = IntCounter::with_opts(Opts::new(
            "underpriced_retries_total",
            "Resubmissions after replacement underpriced rejections",
        ))?;

        let submission_failures = IntCounter::with_opts(Opts::new(
            "submission_failures_total",
            "Rounds that ended without a submitted transaction",
        ))?;

        let bids_sent = IntCounter::with_opts(Opts::new("bids_sent_total", "Bids accepted by the bidder node"))?;

        let bids_failed = IntCounter::with_opts(Opts::new("bids_failed_total", "Bids that failed"))?;

        let confirmations = IntCounter::with_opts(Opts::new(
            "transactions_confirmed_total",
            "Pending transactions confirmed on chain",
        ))?;

        let superseded = IntCounter::with_opts(Opts::new(
            "transactions_superseded_total",
            "Pending transactions replaced by another transaction with the same nonce",
        ))?;

        let exhausted = IntCounter::with_opts(Opts::new(
            "transactions_exhausted_total",
            "Pending transactions dropped after the attempt budget",
        ))?;

        let pending_attempts = IntGauge::with_opts(Opts::new(
            "pending_attempts",
            "Bid attempts of the active pending transaction (0 when idle)",
        ))?;

        let inclusion_delay_blocks = Histogram::with_opts(
            HistogramOpts::new("inclusion_delay_blocks", "Blocks from origination to inclusion")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("submit_latency_seconds", "Transaction submission latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let bid_latency = Histogram::with_opts(
            HistogramOpts::new("bid_latency_seconds", "Bid round-trip latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]),
        )?;

        registry.register(Box::new(heads_received.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(tx_submitted.clone()))?;
        registry.register(Box::new(underpriced_retries.clone()))?;
        registry.register(Box::new(submission_failures.clone()))?;
        registry.register(Box::new(bids_sent.clone()))?;
        registry.register(Box::new(bids_failed.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(superseded.clone()))?;
        registry.register(Box::new(exhausted.clone()))?;
        registry.register(Box::new(pending_attempts.clone()))?;
        registry.register(Box::new(inclusion_delay_blocks.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;
        registry.register(Box::new(bid_latency.clone()))?;

        Ok(Self {
            registry,
            heads_received,
            reconnects,
            tx_submitted,
            underpriced_retries,
            submission_failures,
            bids_sent,
            bids_failed,
            confirmations,
            superseded,
            exhausted,
            pending_attempts,
            inclusion_delay_blocks,
            submit_latency,
            bid_latency,
        })
    }

    /// Get the prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
