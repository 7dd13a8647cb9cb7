//! Error types for the tether-connect crate

use tether_core_interface::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl From<ConnectError> for RemoteError {
    fn from(err: ConnectError) -> Self {
        match &err {
            ConnectError::Http(e) if e.is_timeout() => {
                RemoteError::new(err.to_string()).with_code("ETIMEDOUT")
            }
            ConnectError::Http(e) if e.is_connect() => {
                RemoteError::new(err.to_string()).with_code("ECONNREFUSED")
            }
            ConnectError::Http(e) => {
                let remote = RemoteError::new(err.to_string());
                match e.status() {
                    Some(status) => remote.with_status(status.as_u16()),
                    None => remote,
                }
            }
            _ => RemoteError::new(err.to_string()),
        }
    }
}
