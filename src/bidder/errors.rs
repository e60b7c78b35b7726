use thiserror::Error;

/// Failures talking to the bidder node
#[derive(Debug, Clone, Error)]
pub enum BidError {
    /// Bid target held no hashes or payloads
    #[error("Bid target is empty")]
    EmptyTarget,

    #[error("Invalid bid amount range: min {min} > max {max}")]
    InvalidRange { min: String, max: String },

    #[error("Bidder transport error ({address}): {message}")]
    Transport { address: String, message: String },

    #[error("Bidder request timed out ({address})")]
    Timeout { address: String },

    /// Non-2xx HTTP answer
    #[error("Bidder returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// gRPC call failed with a status
    #[error("Bidder RPC failed: {code}: {message}")]
    Rpc { code: String, message: String },

    /// Response body or record could not be decoded
    #[error("Malformed bidder response: {0}")]
    Malformed(String),
}

impl BidError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BidError::Transport { .. } | BidError::Timeout { .. } => true,
            BidError::Status { status, .. } => *status >= 500,
            BidError::Rpc { code, .. } => matches!(code.as_str(), "Unavailable" | "DeadlineExceeded" | "Internal"),
            BidError::EmptyTarget | BidError::InvalidRange { .. } | BidError::Malformed(_) => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            BidError::EmptyTarget | BidError::InvalidRange { .. } => "invalid",
            BidError::Transport { .. } => "transport",
            BidError::Timeout { .. } => "timeout",
            BidError::Status { .. } => "status",
            BidError::Rpc { .. } => "rpc",
            BidError::Malformed(_) => "malformed",
        }
    }

    pub(crate) fn from_reqwest(address: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BidError::Timeout {
                address: address.to_string(),
            }
        } else {
            BidError::Transport {
                address: address.to_string(),
                message: e.to_string(),
            }
        }
    }

    pub(crate) fn from_status(status: tonic::Status) -> Self {
        BidError::Rpc {
            code: format!("{:?}", status.code()),
            message: status.message().to_string(),
        }
    }
}
