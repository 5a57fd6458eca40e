//! Outbound delivery of single transactions
//!
//! Each transaction becomes one GET request:
//!
//! ```text
//! <endpoint>?ip=1&verbose=1&data=<urlencoded base64 JSON>&_=<millis>
//! ```
//!
//! Events go to the tracking endpoint, profile updates to the engage
//! endpoint. The `_id` bookkeeping field is not part of the wire payload.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;

use crate::config::{DEFAULT_ENGAGE_URL, DEFAULT_TRACKING_URL};
use crate::error::{Error, Result};
use crate::types::{Payload, Transaction, TransactionKind};

/// Endpoint pair transactions are routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub tracking: String,
    pub engage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            tracking: DEFAULT_TRACKING_URL.to_string(),
            engage: DEFAULT_ENGAGE_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn for_kind(&self, kind: TransactionKind) -> &str {
        match kind {
            TransactionKind::Event => &self.tracking,
            TransactionKind::ProfileUpdate => &self.engage,
        }
    }
}

/// A fully encoded request for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub url: String,
}

impl OutboundRequest {
    /// Encode `transaction` against `endpoints`.
    pub fn new(transaction: &Transaction, endpoints: &Endpoints) -> Result<Self> {
        let data = encode_payload(&transaction.payload)?;
        let url = request_url(endpoints.for_kind(transaction.kind()), &data);
        Ok(Self {
            transaction_id: transaction.id.clone(),
            kind: transaction.kind(),
            url,
        })
    }

    /// Decode the `data` parameter back into the payload it carries.
    pub fn payload(&self) -> Result<Payload> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| Error::Encoding(format!("invalid request url: {}", e)))?;
        let data = parsed
            .query_pairs()
            .find(|(key, _)| key == "data")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| Error::Encoding("request has no data parameter".to_string()))?;
        let bytes = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::Encoding(format!("invalid base64: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Base64 of the payload's JSON.
pub fn encode_payload(payload: &Payload) -> Result<String> {
    let json = serde_json::to_vec(payload)?;
    Ok(STANDARD.encode(json))
}

/// Full request URL for an already encoded payload.
pub fn request_url(endpoint: &str, encoded: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}ip=1&verbose=1&data={}&_={}",
        endpoint,
        separator,
        urlencoding::encode(encoded),
        Utc::now().timestamp_millis()
    )
}

/// Sends one request and reports whether the endpoint accepted it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<()>;
}

/// Verbose-mode reply body.
#[derive(Debug, Deserialize)]
struct VerboseReply {
    status: i64,
    #[serde(default)]
    error: Option<String>,
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mixlite/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// True when `url` answers at all, whatever the status.
    pub async fn probe(&self, url: &str) -> bool {
        self.http_client.head(url).send().await.is_ok()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<()> {
        let response = self.http_client.get(&request.url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        check_verbose_reply(status.as_u16(), &body)
    }
}

/// A JSON reply must carry `status: 1`; anything else on a 2xx is accepted.
fn check_verbose_reply(status: u16, body: &str) -> Result<()> {
    match serde_json::from_str::<VerboseReply>(body) {
        Ok(reply) if reply.status != 1 => Err(Error::Rejected {
            status,
            message: reply
                .error
                .unwrap_or_else(|| format!("status {}", reply.status)),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_transaction() -> Transaction {
        Transaction::new(
            "1700000000000-3".to_string(),
            Payload::Event {
                event: "signup".to_string(),
                properties: json!({"plan": "pro+", "note": "a&b=c"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            },
        )
    }

    #[test]
    fn test_request_routes_by_kind() {
        let endpoints = Endpoints {
            tracking: "http://localhost/track".to_string(),
            engage: "http://localhost/engage".to_string(),
        };

        let request = OutboundRequest::new(&event_transaction(), &endpoints).unwrap();
        assert!(request.url.starts_with("http://localhost/track?ip=1&verbose=1&data="));
        assert!(request.url.contains("&_="));
        assert_eq!(request.transaction_id, "1700000000000-3");

        let profile = Transaction::new(
            "1-1".to_string(),
            Payload::ProfileUpdate {
                token: "tok".to_string(),
                distinct_id: "u".to_string(),
                set: Default::default(),
            },
        );
        let request = OutboundRequest::new(&profile, &endpoints).unwrap();
        assert_eq!(request.kind, TransactionKind::ProfileUpdate);
        assert!(request.url.starts_with("http://localhost/engage?"));
    }

    #[test]
    fn test_payload_round_trips_without_id() {
        let tx = event_transaction();
        let request = OutboundRequest::new(&tx, &Endpoints::default()).unwrap();

        assert_eq!(request.payload().unwrap(), tx.payload);

        let encoded = encode_payload(&tx.payload).unwrap();
        let raw = STANDARD.decode(encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.get("_id").is_none());
    }

    #[test]
    fn test_endpoint_with_existing_query() {
        let url = request_url("https://example.com/track?project=1", "abc");
        assert!(url.starts_with("https://example.com/track?project=1&ip=1&"));
    }

    #[test]
    fn test_verbose_reply() {
        assert!(check_verbose_reply(200, r#"{"status": 1, "error": null}"#).is_ok());
        assert!(check_verbose_reply(200, "1").is_ok());
        assert!(check_verbose_reply(200, "").is_ok());

        let err = check_verbose_reply(200, r#"{"status": 0, "error": "token missing"}"#)
            .unwrap_err();
        match err {
            Error::Rejected { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "token missing");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// Answers one connection with `response` and returns the endpoint URL.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/track", addr)
    }

    fn request_to(endpoint: &str) -> OutboundRequest {
        let endpoints = Endpoints {
            tracking: endpoint.to_string(),
            engage: endpoint.to_string(),
        };
        OutboundRequest::new(&event_transaction(), &endpoints).unwrap()
    }

    #[tokio::test]
    async fn test_send_accepts_verbose_success() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 28\r\nConnection: close\r\n\r\n{\"status\": 1, \"error\": null}",
        )
        .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        transport.send(&request_to(&endpoint)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_maps_non_success_status_to_rejected() {
        let endpoint = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        match transport.send(&request_to(&endpoint)).await {
            Err(Error::Rejected { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_surfaces_connection_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let result = transport
            .send(&request_to(&format!("http://{}/track", addr)))
            .await;
        assert!(matches!(result, Err(Error::Http(_))), "got {:?}", result);
    }
}
