/*!
 * Tether - model-to-remote-procedure bridge
 *
 * Locally declared models get proxy methods that forward every data
 * operation and relation traversal to a remote endpoint through an
 * `Invoker`, keeping the local model calling conventions:
 * - One awaitable `CallHandle` per call, with optional completion callbacks
 * - "Not found" from single-record finders reported as a null result
 * - Eager-loaded relations served from a per-instance cache
 * - Typed results materialized into model instances
 *
 * ```no_run
 * use tether::{Connector, ConnectorConfig, ModelDescriptor, RelationDeclaration};
 * use serde_json::json;
 *
 * # async fn example() -> Result<(), Box<dyn std::error::Error>> {
 * let mut connector = Connector::new(ConnectorConfig::with_url("http://localhost:3000/api"))?;
 * connector
 *     .define(ModelDescriptor::persisted("User")
 *         .with_relation(RelationDeclaration::new("posts", "hasMany", "Post")))?
 *     .define(ModelDescriptor::persisted("Post"))?;
 *
 * let registry = connector.initialize()?;
 * registry.ready().await;
 *
 * let user = registry.model("User")?.call("findById", vec![json!(1)])?.await?;
 * # Ok(())
 * # }
 * ```
 */

pub mod call;
pub mod config;
pub mod connector;
pub mod descriptor;
pub mod error;
pub mod instance;
pub mod logging;
pub mod materializer;
pub mod proxy;
pub mod registry;
pub mod relation;

// Re-export commonly used types
pub use call::{CallHandle, CallResult, CallValue};
pub use config::{ConnectorConfig, LogLevel};
pub use connector::{load_models, Connector};
pub use descriptor::{
    LocalMethod, MethodDescriptor, ModelDescriptor, RelationDeclaration, RelationKind, Returns,
};
pub use error::{CallError, Result, TetherError};
pub use instance::{CachedRelation, Instance};
pub use proxy::{RemoteMethod, ResultPolicy};
pub use registry::{Model, Registry};
pub use relation::RelationScope;
pub use tether_core_interface::{Invoker, RemoteError, NOT_FOUND_CODE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
