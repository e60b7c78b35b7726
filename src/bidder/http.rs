//! HTTP binding of the bid API: JSON POST, newline-delimited JSON answer

use super::types::{BidAck, BidRequest, BidResponseLine};
use super::{BidError, BidTransport};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const BID_PATH: &str = "/v1/bidder/bid";

pub struct HttpBidTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpBidTransport {
    /// `address` is `host:port` or a full base URL
    pub fn new(address: &str, timeout: Duration) -> Result<Self, BidError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BidError::from_reqwest(address, e))?;

        let base = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        Ok(Self {
            client,
            url: format!("{}{}", base, BID_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse every non-blank line as one `{"result": ...}` record
pub fn parse_ndjson(body: &str) -> Result<Vec<BidAck>, BidError> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<BidResponseLine>(line)
                .map(|record| record.result)
                .map_err(|e| BidError::Malformed(format!("{}: {}", e, line)))
        })
        .collect()
}

#[async_trait]
impl BidTransport for HttpBidTransport {
    fn address(&self) -> &str {
        &self.url
    }

    async fn send_bid(&self, request: &BidRequest) -> Result<Vec<BidAck>, BidError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| BidError::from_reqwest(&self.url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BidError::from_reqwest(&self.url, e))?;

        if !status.is_success() {
            return Err(BidError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let acks = parse_ndjson(&body)?;
        debug!(url = %self.url, acks = acks.len(), "Bid response parsed");
        Ok(acks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_host_port() {
        let t = HttpBidTransport::new("127.0.0.1:13523", Duration::from_secs(1)).unwrap();
        assert_eq!(t.url(), "http://127.0.0.1:13523/v1/bidder/bid");

        let t = HttpBidTransport::new("https://bidder.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(t.url(), "https://bidder.local/v1/bidder/bid");
    }

    #[test]
    fn test_parse_ndjson_multiple_records() {
        let body = "{\"result\":{\"providerAddress\":\"a\"}}\n\n{\"result\":{\"providerAddress\":\"b\"}}\n";
        let acks = parse_ndjson(body).unwrap();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[1].provider_address, "b");
    }

    #[test]
    fn test_parse_ndjson_rejects_garbage() {
        assert!(matches!(parse_ndjson("not json"), Err(BidError::Malformed(_))));
    }
}
