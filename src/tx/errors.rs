use crate::rpc::rpc_errors::is_underpriced_message;
use crate::rpc::RpcError;
use thiserror::Error;

/// Failures while building or dispatching a signed transaction
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    /// A same-nonce transaction with higher fees is already pooled
    #[error("Replacement transaction underpriced (endpoint: {endpoint}): {message}")]
    ReplacementUnderpriced { endpoint: String, message: String },

    /// The node or relay refused the transaction for another reason
    #[error("Transaction rejected by {endpoint}: {message}")]
    Rejected { endpoint: String, message: String },

    #[error(transparent)]
    Transport(#[from] RpcError),

    /// Bundle relay answered with a non-success HTTP status
    #[error("Bundle relay returned HTTP {status}: {body}")]
    Relay { status: u16, body: String },

    #[error("Failed to build transaction: {0}")]
    Build(String),

    #[error("Submission timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl SubmissionError {
    /// Classify a chain-client error returned from a broadcast. Any answer
    /// from the node is a rejection; only transport failures stay transport.
    pub fn from_broadcast(err: RpcError) -> Self {
        match err {
            RpcError::RpcResponse {
                endpoint, message, ..
            } => {
                if is_underpriced_message(&message) {
                    SubmissionError::ReplacementUnderpriced { endpoint, message }
                } else {
                    SubmissionError::Rejected { endpoint, message }
                }
            }
            RpcError::Timeout { timeout_ms, .. } => SubmissionError::Timeout { timeout_ms },
            other => SubmissionError::Transport(other),
        }
    }

    pub fn is_replacement_underpriced(&self) -> bool {
        matches!(self, SubmissionError::ReplacementUnderpriced { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SubmissionError::ReplacementUnderpriced { .. } => true,
            SubmissionError::Transport(e) => e.is_retryable(),
            SubmissionError::Relay { status, .. } => *status >= 500,
            SubmissionError::Timeout { .. } => true,
            SubmissionError::Rejected { .. } | SubmissionError::Build(_) => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            SubmissionError::ReplacementUnderpriced { .. } => "underpriced",
            SubmissionError::Rejected { .. } => "rejected",
            SubmissionError::Transport(e) => e.category(),
            SubmissionError::Relay { .. } => "relay",
            SubmissionError::Build(_) => "build",
            SubmissionError::Timeout { .. } => "timeout",
        }
    }
}
