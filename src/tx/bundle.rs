//! Private bundle relay (`eth_sendBundle`)

use super::{SignedTransaction, SubmissionError};
use crate::rpc::rpc_errors::is_underpriced_message;
use crate::rpc::RpcError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct BundleParams {
    txs: Vec<String>,
    #[serde(rename = "blockNumber")]
    block_number: String,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: Vec<BundleParams>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

/// Builder-specific submission endpoint for single-transaction bundles
#[derive(Debug, Clone)]
pub struct BundleRelay {
    client: reqwest::Client,
    url: String,
}

impl BundleRelay {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Build(format!("bundle relay client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post `tx` as a bundle valid only for `block_number`; returns the
    /// relay's `result` field
    pub async fn send_bundle(
        &self,
        tx: &SignedTransaction,
        block_number: u64,
    ) -> Result<serde_json::Value, SubmissionError> {
        let payload = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_sendBundle",
            params: vec![BundleParams {
                txs: vec![format!("0x{}", hex::encode(&tx.raw))],
                block_number: format!("{:#x}", block_number),
            }],
            id: 1,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(SubmissionError::Relay {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            SubmissionError::Transport(RpcError::Decode {
                endpoint: self.url.clone(),
                message: e.to_string(),
            })
        })?;

        if let Some(err) = parsed.error {
            debug!(relay = %self.url, code = err.code, message = %err.message, "Bundle refused");
            return Err(if is_underpriced_message(&err.message) {
                SubmissionError::ReplacementUnderpriced {
                    endpoint: self.url.clone(),
                    message: err.message,
                }
            } else {
                SubmissionError::Rejected {
                    endpoint: self.url.clone(),
                    message: err.message,
                }
            });
        }

        Ok(parsed.result.unwrap_or(serde_json::Value::Null))
    }

    fn transport_error(&self, e: reqwest::Error) -> SubmissionError {
        if e.is_timeout() {
            SubmissionError::Transport(RpcError::Timeout {
                endpoint: self.url.clone(),
                timeout_ms: 0,
            })
        } else {
            SubmissionError::Transport(RpcError::Transport {
                endpoint: self.url.clone(),
                message: e.to_string(),
            })
        }
    }
}
