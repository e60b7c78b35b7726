//! Preconfirmation bidder
//!
//! Entry point: loads configuration, connects the head stream and observer
//! endpoints, and runs the lifecycle loop until interrupted or until the
//! configured runtime elapses.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use preconf_bidder::audit::AuditLog;
use preconf_bidder::bidder::{BidEscalator, BidTransport, BiddingWindow, GrpcBidTransport, HttpBidTransport};
use preconf_bidder::config::{BidTransportKind, Config, ValidatedConfig};
use preconf_bidder::endpoints;
use preconf_bidder::fees::FeePolicy;
use preconf_bidder::lifecycle::{shutdown_signal, LifecycleDeps, LifecycleLoop};
use preconf_bidder::metrics::Metrics;
use preconf_bidder::reconciler::Reconciler;
use preconf_bidder::rpc::{with_timeout, Connector, EndpointRole, EthersDialer, HeadFeed};
use preconf_bidder::tx::{BundleRelay, EthTransferBuilder, TransactionBuilder, TxSubmitter};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "PRECONF_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Metrics port (overrides monitoring.metrics_port)
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the transaction and bid loop (default)
    Run,
    /// Deposit the minimum into the next bidding window, wait, then withdraw
    BiddingWindow,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load_with_env(Path::new(&args.config));
    let log_format = loaded
        .as_ref()
        .map(|c| c.monitoring.log_format.clone())
        .unwrap_or_else(|_| "text".to_string());
    init_logging(args.verbose, &log_format)?;

    info!("Starting preconf-bidder {}", env!("CARGO_PKG_VERSION"));
    if !Path::new(&args.config).exists() {
        warn!("Config file '{}' not found, using defaults and environment", args.config);
    }

    let config = loaded.with_context(|| format!("Failed to load config from {}", args.config))?;
    let mut settings = config.validate().context("Invalid configuration")?;
    if let Some(port) = args.metrics_port {
        settings.monitoring.metrics_port = port;
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(settings).await,
        Command::BiddingWindow => bidding_window(&settings).await,
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, format: &str) -> Result<()> {
    let env_filter = if verbose {
        "preconf_bidder=debug,info"
    } else {
        "preconf_bidder=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

async fn run(settings: ValidatedConfig) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    if settings.monitoring.enable_metrics {
        let port = settings.monitoring.metrics_port;
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port, metrics).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let call_timeout = settings.lifecycle.call_timeout;
    let connector = Arc::new(Connector::new(EthersDialer, settings.backoff.clone()));

    info!(endpoint = %settings.stream_endpoint, "Connecting head stream");
    let mut feed = HeadFeed::open(
        Arc::clone(&connector),
        &settings.stream_endpoint,
        settings.head_feed.clone(),
    )
    .await
    .context("Failed to open head feed")?;

    let stream = feed.endpoint();
    let chain_id = with_timeout(&stream.address, call_timeout, stream.client.chain_id())
        .await
        .context("Failed to resolve chain id")?;

    let builder = EthTransferBuilder::from_private_key(
        &settings.signing_key,
        chain_id,
        settings.lifecycle.value,
    )?;
    info!(sender = ?builder.sender(), chain_id, "Signer ready");

    let mut observers = Vec::with_capacity(settings.observers.len());
    for address in &settings.observers {
        match connector
            .connect(
                address,
                EndpointRole::Observer,
                settings.connect_retries,
                settings.connect_timeout,
            )
            .await
        {
            Ok(endpoint) => observers.push(Arc::new(endpoint)),
            Err(e) if !e.is_retryable() => {
                return Err(e).with_context(|| format!("Observer {} cannot be used", address));
            }
            Err(e) => warn!(endpoint = %address, error = %e, "Skipping unreachable observer"),
        }
    }
    if observers.is_empty() {
        info!("No observers connected, reconciling against the stream endpoint");
    }

    let transport: Arc<dyn BidTransport> = match settings.bid_transport {
        BidTransportKind::Http => Arc::new(HttpBidTransport::new(
            &settings.bidder_address,
            settings.bid_timeout,
        )?),
        BidTransportKind::Grpc => Arc::new(GrpcBidTransport::new(
            &settings.bidder_address,
            settings.bid_timeout,
        )?),
    };

    let audit = match &settings.audit_dir {
        Some(dir) => {
            let (log, _writer) = AuditLog::spawn(dir.clone());
            info!(dir = %dir.display(), "Audit trail enabled");
            log
        }
        None => AuditLog::disabled(),
    };

    let relay = settings
        .bundle_relay_url
        .as_ref()
        .map(|url| BundleRelay::new(url.clone(), call_timeout))
        .transpose()?;

    let deps = LifecycleDeps {
        stream: feed.handle(),
        observers,
        fee_policy: FeePolicy::new(settings.fees.clone()),
        builder: Arc::new(builder),
        submitter: TxSubmitter::new(relay, call_timeout),
        escalator: BidEscalator::new(settings.bid_policy.clone(), transport, audit.clone()),
        reconciler: Reconciler::new(settings.max_attempts, call_timeout),
        audit,
        metrics,
    };
    let mut lifecycle = LifecycleLoop::new(settings.lifecycle.clone(), deps);

    let shutdown = shutdown_signal(tokio::signal::ctrl_c(), settings.max_runtime);

    info!(
        offset = settings.lifecycle.offset,
        mode = ?settings.lifecycle.submission_mode,
        bid_mode = ?settings.lifecycle.bid_mode,
        "Starting lifecycle loop"
    );
    let summary = lifecycle.run(&mut feed, shutdown).await?;
    info!(heads = summary.heads, reconnects = summary.reconnects, "Lifecycle loop stopped");

    Ok(())
}

async fn bidding_window(settings: &ValidatedConfig) -> Result<()> {
    let window = BiddingWindow::new(&settings.bidder_address, settings.bid_timeout)?;
    let (deposit, withdrawn) = window.cycle(settings.withdraw_delay).await?;
    info!(
        window = deposit.window_number,
        deposited = %deposit.amount,
        withdrawn = %withdrawn,
        "Bidding window cycle complete"
    );
    Ok(())
}
