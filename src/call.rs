//! Call handles: the single completion channel of every proxied operation
//!
//! A proxied call spawns exactly one remote invocation and hands back a
//! [`CallHandle`]. The handle is a cloneable future; a completion callback is
//! just one more listener on the same handle, so awaiting and callbacks always
//! observe the same outcome.
//!
//! Handles must be created inside a Tokio runtime.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::CallError;
use crate::instance::Instance;

/// Outcome of a proxied call
pub type CallResult = std::result::Result<CallValue, CallError>;

/// Value a proxied call resolves to
#[derive(Debug, Clone)]
pub enum CallValue {
    /// No result (JSON null, or a not-found lookup)
    Null,

    /// Raw payload for methods without a model result type
    Value(Value),

    /// One materialized instance
    Instance(Instance),

    /// Materialized instances in payload order
    Instances(Vec<Instance>),
}

impl CallValue {
    /// Wrap a raw payload, mapping JSON null to `Null`
    pub fn from_json(value: Value) -> Self {
        if value.is_null() {
            CallValue::Null
        } else {
            CallValue::Value(value)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CallValue::Null)
    }

    /// The raw payload, for untyped results
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CallValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            CallValue::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn into_instance(self) -> Option<Instance> {
        match self {
            CallValue::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn into_instances(self) -> Option<Vec<Instance>> {
        match self {
            CallValue::Instances(instances) => Some(instances),
            _ => None,
        }
    }

    /// JSON view of the value; instances render as their data
    pub fn to_json(&self) -> Value {
        match self {
            CallValue::Null => Value::Null,
            CallValue::Value(value) => value.clone(),
            CallValue::Instance(instance) => instance.to_json(),
            CallValue::Instances(instances) => {
                Value::Array(instances.iter().map(Instance::to_json).collect())
            }
        }
    }
}

/// Awaitable handle on one pending call
///
/// Clones share the same underlying invocation.
#[derive(Clone)]
pub struct CallHandle {
    inner: Shared<BoxFuture<'static, CallResult>>,
}

impl CallHandle {
    /// Spawn `invocation` onto the runtime and return its handle
    ///
    /// The invocation runs to completion whether or not the handle is polled
    /// or dropped.
    pub(crate) fn spawn<F>(invocation: F) -> Self
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        let task = tokio::spawn(invocation);

        let inner = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CallError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        Self { inner }
    }

    /// A handle that is already settled
    pub fn ready(result: CallResult) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Register a completion listener
    ///
    /// The callback runs exactly once, on the runtime, with the same outcome
    /// the handle resolves to.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let handle = self.inner.clone();
        tokio::spawn(async move {
            callback(handle.await);
        });
    }

    /// The outcome, if the call has already settled and been observed
    pub fn peek(&self) -> Option<CallResult> {
        self.inner.peek().cloned()
    }
}

impl Future for CallHandle {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("settled", &self.inner.peek().is_some())
            .finish()
    }
}
