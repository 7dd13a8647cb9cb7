//! Tether Connect: JSON-over-HTTP connectivity for Tether model proxies
//!
//! This crate provides the transport side of the Tether bridge: an
//! [`Invoker`](tether_core_interface::Invoker) that forwards every proxied
//! model operation to a remote endpoint.
//!
//! # Wire format
//!
//! - `POST {endpoint}/{path}` with the dots of the path identifier turned into
//!   slashes (`User.prototype.updateAttributes` becomes
//!   `/User/prototype/updateAttributes`)
//! - static body: `{"args": [...]}`; instance body: `{"id": ..., "args": [...]}`
//! - success: the JSON body is the result (an empty body is `null`)
//! - failure: `{"error": {"message", "code", "statusCode", "details"}}`
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_connect::HttpInvoker;
//! use tether_core_interface::Invoker;
//! use serde_json::json;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let invoker = HttpInvoker::new("http://localhost:3000/api")?;
//!
//!     // Now use it like any Invoker
//!     let user = invoker.invoke_static("User.findById", vec![json!(1)]).await?;
//!     println!("{}", user);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod invoker;

pub use error::ConnectError;
pub use invoker::HttpInvoker;
