//! JSON-RPC 2.0 transport for the downloader control channel.
//!
//! One call, one attempt: the transport serializes the request, issues a POST,
//! and decodes the envelope. Network/HTTP/decoding failures are
//! [`TransportError`]s; an envelope whose `error` field is set is *not* an
//! error at this layer — it is returned as data and callers must check
//! [`RpcResponse::error`] before trusting `result`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from the wire itself, as opposed to remote-reported RPC errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The POST could not be completed.
    #[error("rpc request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-2xx status.
    #[error("rpc endpoint '{url}' answered HTTP {status}")]
    Status { url: String, status: u16 },
    /// The body was not a JSON-RPC envelope.
    #[error("rpc response from '{url}' was not a JSON-RPC envelope: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A single JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Creates a request with no parameters and a fresh id.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_request_id(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Creates a request carrying the given positional parameters.
    #[must_use]
    pub fn with_params(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            params,
            ..Self::new(method)
        }
    }
}

/// Request ids only need to be unique enough to match a response to its call
/// on a sequential connection; a nanosecond timestamp covers that.
fn next_request_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .to_string()
}

/// A JSON-RPC 2.0 response envelope.
///
/// Exactly one of `error`/`result` is meaningful; both absent is treated as an
/// empty success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl RpcResponse {
    /// Renders the remote error payload as a display string, when present.
    ///
    /// aria2 errors are `{code, message}` objects; anything else is rendered
    /// verbatim so the caller still sees what the remote said.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        })
    }
}

/// Marshals a call, posts it, and unmarshals the response envelope.
#[derive(Debug, Clone, Default)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    /// Creates a transport with reqwest's default connection settings. No
    /// explicit timeout is configured; callers inherit the client default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues one blocking-to-completion call against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for network failures, non-2xx statuses, and
    /// undecodable bodies. A decodable envelope is always `Ok`, even when it
    /// carries a remote error payload.
    pub async fn call(
        &self,
        url: &str,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|source| TransportError::Decode {
                url: url.to_string(),
                source,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_ids_are_numeric_and_distinct_enough() {
        let a = RpcRequest::new("aria2.getVersion");
        let b = RpcRequest::new("aria2.getVersion");
        assert!(a.id.chars().all(|c| c.is_ascii_digit()));
        assert!(b.id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn request_serializes_protocol_version() {
        let req = RpcRequest::with_params("aria2.pause", vec![json!("gid1")]);
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["method"], "aria2.pause");
        assert_eq!(wire["params"], json!(["gid1"]));
    }

    #[test]
    fn error_message_prefers_message_field() {
        let res = RpcResponse {
            error: Some(json!({"code": 1, "message": "Unauthorized"})),
            ..RpcResponse::default()
        };
        assert_eq!(res.error_message().unwrap(), "Unauthorized");

        let res = RpcResponse {
            error: Some(json!("raw failure")),
            ..RpcResponse::default()
        };
        assert_eq!(res.error_message().unwrap(), "\"raw failure\"");
    }

    #[tokio::test]
    async fn call_round_trips_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .and(body_partial_json(json!({"method": "aria2.getVersion"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1",
                "jsonrpc": "2.0",
                "result": {"version": "1.36.0"}
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new();
        let res = client
            .call(
                &format!("{}/jsonrpc", server.uri()),
                &RpcRequest::new("aria2.getVersion"),
            )
            .await
            .unwrap();
        assert!(res.error.is_none());
        assert_eq!(res.result.unwrap()["version"], "1.36.0");
    }

    #[tokio::test]
    async fn call_surfaces_remote_error_as_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1",
                "error": {"code": 1, "message": "GID not found"}
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new();
        let res = client
            .call(&server.uri(), &RpcRequest::new("aria2.pause"))
            .await
            .unwrap();
        assert_eq!(res.error_message().unwrap(), "GID not found");
    }

    #[tokio::test]
    async fn call_maps_http_failure_to_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = RpcClient::new();
        let err = client
            .call(&server.uri(), &RpcRequest::new("aria2.getVersion"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn call_maps_malformed_body_to_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = RpcClient::new();
        let err = client
            .call(&server.uri(), &RpcRequest::new("aria2.getVersion"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
    }
}
