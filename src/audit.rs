//! Fire-and-forget audit trail of submitted transactions and bids
//!
//! Records go over an unbounded channel to a detached task that appends them
//! to the `transactions.json` and `bids.json` arrays in place. The control
//! loop never waits on this task and never sees its failures.

use crate::bidder::{BidAck, BidError, BidRequest};
use crate::tx::{SignedTransaction, SubmissionMode};
use serde::{de::IgnoredAny, Deserialize, Serialize};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const TRANSACTIONS_FILE: &str = "transactions.json";
pub const BIDS_FILE: &str = "bids.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub timestamp_ms: i64,
    pub tx_hash: String,
    pub nonce: u64,
    pub gas_tip_cap: String,
    pub gas_fee_cap: String,
    pub blob_fee_cap: String,
    pub gas_limit: u64,
    pub to: String,
    pub value: String,
    pub target_block: u64,
    pub mode: SubmissionMode,
    pub attempt: u32,
}

impl TransactionRecord {
    pub fn new(tx: &SignedTransaction, target_block: u64, mode: SubmissionMode, attempt: u32) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            tx_hash: format!("{:?}", tx.hash),
            nonce: tx.nonce,
            gas_tip_cap: tx.fees.gas_tip_cap.to_string(),
            gas_fee_cap: tx.fees.gas_fee_cap.to_string(),
            blob_fee_cap: tx.fees.blob_fee_cap.to_string(),
            gas_limit: tx.gas_limit,
            to: format!("{:?}", tx.to),
            value: tx.value.to_string(),
            target_block,
            mode,
            attempt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    pub timestamp_ms: i64,
    pub request: BidRequest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<BidAck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BidRecord {
    pub fn new(request: &BidRequest, acks: Option<&[BidAck]>, error: Option<&BidError>) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            request: request.clone(),
            responses: acks.map(<[BidAck]>::to_vec).unwrap_or_default(),
            error: error.map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuditRecord {
    Transaction(TransactionRecord),
    Bid(BidRecord),
}

/// Sending half of the audit trail; cheap to clone
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
}

impl AuditLog {
    /// Start the writer task for `dir`
    pub fn spawn(dir: impl Into<PathBuf>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer(dir.into(), rx));
        (Self { tx: Some(tx) }, handle)
    }

    /// An audit log that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Build a log from an existing channel (the receiver decides what happens)
    pub fn from_sender(tx: mpsc::UnboundedSender<AuditRecord>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn record(&self, record: AuditRecord) {
        if let Some(tx) = &self.tx {
            if tx.send(record).is_err() {
                debug!("Audit writer gone, record dropped");
            }
        }
    }
}

/// A JSON array on disk, grown by overwriting its closing bracket
struct ArrayFile {
    path: PathBuf,
    /// Offset just past the last element, or past `[` when empty
    tail: u64,
    len: usize,
}

impl ArrayFile {
    /// Open `path`, moving an unparseable file aside instead of overwriting it
    async fn open(path: PathBuf) -> std::io::Result<Self> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        if !bytes.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice::<Vec<IgnoredAny>>(&bytes) {
                Ok(items) => {
                    if let Some(tail) = closing_tail(&bytes) {
                        return Ok(Self {
                            path,
                            tail,
                            len: items.len(),
                        });
                    }
                }
                Err(e) => {
                    let aside = set_aside(&path).await?;
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Existing audit file unreadable, moved aside"
                    );
                }
            }
        }

        tokio::fs::write(&path, b"[]").await?;
        Ok(Self { path, tail: 1, len: 0 })
    }

    async fn append<T: Serialize>(&mut self, item: &T) -> std::io::Result<()> {
        let encoded = serde_json::to_vec(item)?;
        let separator: &[u8] = if self.len == 0 { b"\n" } else { b",\n" };

        let mut chunk = Vec::with_capacity(separator.len() + encoded.len() + 2);
        chunk.extend_from_slice(separator);
        chunk.extend_from_slice(&encoded);
        chunk.extend_from_slice(b"\n]");

        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.seek(SeekFrom::Start(self.tail)).await?;
        file.write_all(&chunk).await?;
        file.set_len(self.tail + chunk.len() as u64).await?;
        file.flush().await?;

        self.tail += (chunk.len() - 2) as u64;
        self.len += 1;
        Ok(())
    }
}

/// Offset just past the last non-whitespace byte before the closing `]`
fn closing_tail(bytes: &[u8]) -> Option<u64> {
    let close = bytes.iter().rposition(|b| *b == b']')?;
    let last = bytes[..close].iter().rposition(|b| !b.is_ascii_whitespace())?;
    Some(last as u64 + 1)
}

async fn set_aside(path: &Path) -> std::io::Result<PathBuf> {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp_millis()));
    let aside = PathBuf::from(name);
    tokio::fs::rename(path, &aside).await?;
    Ok(aside)
}

async fn open_logged(path: PathBuf) -> Option<ArrayFile> {
    match ArrayFile::open(path.clone()).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot open audit file, records will be dropped");
            None
        }
    }
}

async fn append_logged<T: Serialize>(file: &mut Option<ArrayFile>, item: &T) {
    let Some(file) = file else {
        return;
    };
    if let Err(e) = file.append(item).await {
        warn!(path = %file.path.display(), error = %e, "Failed to append audit record");
    }
}

async fn writer(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<AuditRecord>) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(dir = %dir.display(), error = %e, "Cannot create audit directory");
    }

    let mut transactions = open_logged(dir.join(TRANSACTIONS_FILE)).await;
    let mut bids = open_logged(dir.join(BIDS_FILE)).await;

    while let Some(record) = rx.recv().await {
        match record {
            AuditRecord::Transaction(r) => append_logged(&mut transactions, &r).await,
            AuditRecord::Bid(r) => append_logged(&mut bids, &r).await,
        }
    }

    debug!("Audit writer stopped");
}
