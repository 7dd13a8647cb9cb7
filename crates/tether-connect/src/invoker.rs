//! HttpInvoker: Invoker implementation that posts invocations to a remote endpoint

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tether_core_interface::{Invoker, RemoteError, Result};
use tracing::{debug, warn};

use crate::error::ConnectError;

/// A remote implementation of `Invoker` speaking JSON over HTTP.
///
/// This struct is cheaply cloneable (reqwest's `Client` is an `Arc` internally).
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tether_connect::HttpInvoker;
///
/// # fn example() -> Result<(), tether_connect::ConnectError> {
/// let invoker = HttpInvoker::with_timeout("http://10.0.0.5:3000/api", Duration::from_secs(10))?;
/// assert_eq!(invoker.url_for("User.find"), "http://10.0.0.5:3000/api/User/find");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpInvoker {
    /// HTTP client (cheap to clone)
    client: reqwest::Client,

    /// Base address every path identifier is appended to, without a trailing slash
    endpoint: String,
}

/// Error envelope returned by the remote endpoint
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

impl HttpInvoker {
    /// Create an invoker bound to `endpoint` with no request timeout
    pub fn new(endpoint: impl Into<String>) -> std::result::Result<Self, ConnectError> {
        Self::build(endpoint.into(), None)
    }

    /// Create an invoker bound to `endpoint` whose requests give up after `timeout`
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, ConnectError> {
        Self::build(endpoint.into(), Some(timeout))
    }

    fn build(endpoint: String, timeout: Option<Duration>) -> std::result::Result<Self, ConnectError> {
        let url = reqwest::Url::parse(&endpoint).map_err(|e| ConnectError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConnectError::InvalidEndpoint {
                endpoint,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// The endpoint this invoker is bound to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL a path identifier is posted to
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.replace('.', "/"))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = self.url_for(path);

        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ConnectError::from)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(ConnectError::from)?;

        if !status.is_success() {
            let err = decode_error(status.as_u16(), &bytes);
            warn!(
                "Remote call {} failed: {} (code={:?})",
                path, err.message, err.code
            );
            return Err(err);
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        let value = serde_json::from_slice(&bytes).map_err(ConnectError::from)?;

        debug!("Remote call {} returned {} bytes", path, bytes.len());

        Ok(value)
    }
}

/// Turn a non-2xx response body into a `RemoteError`
///
/// The endpoint's own status code wins over the HTTP status when both exist.
pub(crate) fn decode_error(status: u16, body: &[u8]) -> RemoteError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let mut err = envelope.error;
            if err.status.is_none() {
                err.status = Some(status);
            }
            err
        }
        Err(_) => RemoteError::new(format!("HTTP {}", status)).with_status(status),
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke_static(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.post(path, json!({ "args": args })).await
    }

    async fn invoke_instance(&self, path: &str, id: Value, args: Vec<Value>) -> Result<Value> {
        self.post(path, json!({ "id": id, "args": args })).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_invoker_is_send_sync() {
        // Compile-time check that HttpInvoker satisfies trait bounds
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpInvoker>();
    }

    #[test]
    fn test_url_for_static_and_prototype_paths() {
        let invoker = HttpInvoker::new("http://localhost:3000/api/").unwrap();
        assert_eq!(invoker.endpoint(), "http://localhost:3000/api");
        assert_eq!(
            invoker.url_for("User.findById"),
            "http://localhost:3000/api/User/findById"
        );
        assert_eq!(
            invoker.url_for("User.prototype.__get__posts"),
            "http://localhost:3000/api/User/prototype/__get__posts"
        );
    }

    #[test]
    fn test_rejects_invalid_endpoints() {
        assert!(matches!(
            HttpInvoker::new("not a url"),
            Err(ConnectError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            HttpInvoker::new("ftp://localhost:21"),
            Err(ConnectError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_decode_error_envelope() {
        let body = br#"{"error":{"name":"Error","message":"Unknown \"User\" id \"9\".","code":"MODEL_NOT_FOUND","statusCode":404}}"#;
        let err = decode_error(404, body);
        assert!(err.is_not_found());
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn test_decode_error_without_status_uses_http_status() {
        let body = br#"{"error":{"message":"invalid","code":"VALIDATION_ERROR"}}"#;
        let err = decode_error(422, body);
        assert_eq!(err.code.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(err.status, Some(422));
    }

    #[test]
    fn test_decode_error_garbage_body() {
        let err = decode_error(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.status, Some(502));
        assert!(err.code.is_none());
    }
}
