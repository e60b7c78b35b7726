use ethers::providers::{ProviderError, RpcError as _};
use thiserror::Error;

/// Errors raised while dialing, subscribing to, or reading from a chain endpoint
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The address can never be dialed (bad scheme, unparsable URL)
    #[error("Invalid endpoint address {address}: {reason}")]
    InvalidAddress {
        address: String,
        reason: String,
    },

    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport {
        endpoint: String,
        message: String,
    },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
    },

    /// RPC response errors (from the node)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Bounded connect gave up
    #[error("Connection exhausted after {attempts} attempts (endpoint: {endpoint}): {last_error}")]
    ConnectionExhausted {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    /// The head stream ended or stalled
    #[error("Head stream closed (endpoint: {endpoint}): {reason}")]
    StreamClosed {
        endpoint: String,
        reason: String,
    },

    /// The endpoint cannot perform this operation (e.g. subscribe over HTTP)
    #[error("Operation {operation} unsupported by endpoint {endpoint}")]
    Unsupported {
        endpoint: String,
        operation: &'static str,
    },

    /// A response was missing fields we rely on
    #[error("Malformed response from {endpoint}: {message}")]
    Decode {
        endpoint: String,
        message: String,
    },
}

pub type RpcResult<T> = Result<T, RpcError>;

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::StreamClosed { .. } => true,
            RpcError::ConnectionExhausted { .. } => true,
            RpcError::Decode { .. } => true,

            RpcError::InvalidAddress { .. } => false,
            RpcError::Unsupported { .. } => false,

            // Retry on server errors, not on request rejections
            RpcError::RpcResponse { code, .. } => match code {
                Some(c) => (-32099..=-32000).contains(c) || (500..600).contains(c),
                None => false,
            },
        }
    }

    /// Get the endpoint associated with this error
    pub fn endpoint(&self) -> &str {
        match self {
            RpcError::InvalidAddress { address, .. } => address,
            RpcError::Transport { endpoint, .. }
            | RpcError::Timeout { endpoint, .. }
            | RpcError::RpcResponse { endpoint, .. }
            | RpcError::ConnectionExhausted { endpoint, .. }
            | RpcError::StreamClosed { endpoint, .. }
            | RpcError::Unsupported { endpoint, .. }
            | RpcError::Decode { endpoint, .. } => endpoint,
        }
    }

    /// Error category for metrics labels and logs
    pub fn category(&self) -> &'static str {
        match self {
            RpcError::InvalidAddress { .. } => "config",
            RpcError::Transport { .. } => "transport",
            RpcError::Timeout { .. } => "timeout",
            RpcError::RpcResponse { .. } => "rpc",
            RpcError::ConnectionExhausted { .. } => "exhausted",
            RpcError::StreamClosed { .. } => "stream",
            RpcError::Unsupported { .. } => "unsupported",
            RpcError::Decode { .. } => "decode",
        }
    }

    /// The node refused a same-nonce transaction because the pooled one pays more
    pub fn is_replacement_underpriced(&self) -> bool {
        match self {
            RpcError::RpcResponse { message, .. } => is_underpriced_message(message),
            _ => false,
        }
    }

    /// Create from an ethers provider error with endpoint context
    pub fn from_provider_error(err: ProviderError, endpoint: &str) -> Self {
        if let Some(rpc_err) = err.as_error_response() {
            return RpcError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: rpc_err.message.clone(),
                code: Some(rpc_err.code),
            };
        }

        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("timed out") || lowered.contains("timeout") {
            RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if lowered.contains("deserialization") || lowered.contains("invalid type") {
            RpcError::Decode {
                endpoint: endpoint.to_string(),
                message,
            }
        } else {
            RpcError::Transport {
                endpoint: endpoint.to_string(),
                message,
            }
        }
    }
}

/// Node and relay wording for a rejected same-nonce replacement
pub fn is_underpriced_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("replacement transaction underpriced")
        || lowered.contains("replacement underpriced")
}
