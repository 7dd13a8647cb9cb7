//! Tether Core Interface: the remote invocation boundary
//!
//! This crate defines the `Invoker` trait, the single capability the Tether
//! proxy engine needs from a transport. Everything else (connection setup,
//! wire format, retries, timeouts) belongs to the implementation.
//!
//! # Architecture
//!
//! An invoker exposes two operations:
//!
//! 1. **Static invocation**: `Model.method(args...)`
//! 2. **Instance invocation**: `Model.prototype.method(args...)` addressed by
//!    the instance identity
//!
//! Both resolve to a raw JSON payload or a [`RemoteError`] carrying a
//! machine-readable classification code.
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_core_interface::{Invoker, Result};
//! use serde_json::json;
//!
//! async fn lookup<I: Invoker>(invoker: &I) -> Result<()> {
//!     let user = invoker.invoke_static("User.findById", vec![json!(1)]).await?;
//!     println!("user: {}", user);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod mock;

/// Classification code used by remote endpoints when a record lookup misses
pub const NOT_FOUND_CODE: &str = "MODEL_NOT_FOUND";

/// An error reported by the remote side (or by the transport on its behalf)
///
/// Only `code` is interpreted by the proxy engine; the rest is carried
/// through to callers untouched.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable description
    pub message: String,

    /// Machine-readable classification (e.g. `MODEL_NOT_FOUND`, `ETIMEDOUT`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Status reported by the endpoint, if any
    #[serde(
        default,
        rename = "statusCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<u16>,

    /// Free-form error details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RemoteError {
    /// Create an unclassified error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            details: None,
        }
    }

    /// The canonical "record not found" error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_code(NOT_FOUND_CODE).with_status(404)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this error carries the "record not found" classification
    pub fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(NOT_FOUND_CODE)
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// The remote procedure capability consumed by the proxy engine
///
/// Implementations:
/// - **HttpInvoker** (`tether-connect`): JSON over HTTP
/// - **MockInvoker** ([`mock`]): scripted, in-memory, records every call
///
/// Each call is independent: implementations must not coalesce concurrent
/// identical calls, and completion order is theirs to decide.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + 'static`; invocations are spawned
/// onto the runtime and outlive the caller's stack frame.
#[async_trait]
pub trait Invoker: Send + Sync + 'static {
    /// Invoke a static method such as `User.find`
    async fn invoke_static(&self, path: &str, args: Vec<Value>) -> Result<Value>;

    /// Invoke an instance method such as `User.prototype.updateAttributes`
    /// on the instance identified by `id`
    async fn invoke_instance(&self, path: &str, id: Value, args: Vec<Value>) -> Result<Value>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "remote"
    }
}
