//! Scripted invoker for testing
//!
//! `MockInvoker` answers every invocation from an in-memory table of
//! per-path handlers and records what it was asked, so tests can assert on
//! the exact remote traffic a proxy produced.

use crate::{Invoker, RemoteError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One invocation as seen by the invoker
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Path identifier, e.g. `User.findById`
    pub path: String,

    /// Instance identity for instance invocations
    pub id: Option<Value>,

    /// Positional arguments
    pub args: Vec<Value>,
}

type Handler = Arc<dyn Fn(&RecordedCall) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct Script {
    handlers: HashMap<String, Handler>,
    delays: HashMap<String, Duration>,
}

/// In-memory `Invoker` implementation
///
/// Unscripted paths answer `null`. Clones share the same script and log.
///
/// # Example
///
/// ```rust
/// use tether_core_interface::mock::MockInvoker;
/// use tether_core_interface::Invoker;
/// use serde_json::json;
///
/// # async fn example() {
/// let invoker = MockInvoker::new();
/// invoker.respond("User.count", json!(3));
///
/// let count = invoker.invoke_static("User.count", vec![]).await.unwrap();
/// assert_eq!(count, json!(3));
/// assert_eq!(invoker.calls().len(), 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockInvoker {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with a fixed payload
    pub fn respond(&self, path: impl Into<String>, value: Value) {
        self.handle(path, move |_| Ok(value.clone()));
    }

    /// Answer `path` with a fixed error
    pub fn fail(&self, path: impl Into<String>, error: RemoteError) {
        self.handle(path, move |_| Err(error.clone()));
    }

    /// Answer `path` by computing a result from the call
    pub fn handle<F>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(&RecordedCall) -> Result<Value> + Send + Sync + 'static,
    {
        let mut script = self.script.lock().unwrap();
        script.handlers.insert(path.into(), Arc::new(handler));
    }

    /// Hold every answer for `path` back by `delay`
    pub fn delay(&self, path: impl Into<String>, delay: Duration) {
        let mut script = self.script.lock().unwrap();
        script.delays.insert(path.into(), delay);
    }

    /// All invocations in issue order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations addressed to `path`
    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn dispatch(&self, call: RecordedCall) -> Result<Value> {
        self.calls.lock().unwrap().push(call.clone());

        let (handler, delay) = {
            let script = self.script.lock().unwrap();
            (
                script.handlers.get(&call.path).cloned(),
                script.delays.get(&call.path).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match handler {
            Some(handler) => handler(&call),
            None => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke_static(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.dispatch(RecordedCall {
            path: path.to_string(),
            id: None,
            args,
        })
        .await
    }

    async fn invoke_instance(&self, path: &str, id: Value, args: Vec<Value>) -> Result<Value> {
        self.dispatch(RecordedCall {
            path: path.to_string(),
            id: Some(id),
            args,
        })
        .await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
