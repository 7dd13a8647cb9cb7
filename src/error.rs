/*!
 * Error types for Tether
 */

use std::io;
use tether_core_interface::RemoteError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TetherError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_REMOTE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Errors raised while defining models or issuing a call
///
/// Definition-time variants are fatal: a model that fails to define never
/// reaches the registry.
#[derive(Error, Debug)]
pub enum TetherError {
    /// Model has no remoting metadata to proxy
    #[error("Model {model} has no remote method surface")]
    MissingMethodSurface { model: String },

    /// Instance-scoped operation on a model that cannot address instances
    #[error("Model {model} has no identity property; cannot install instance method {method}")]
    NoInstanceScope { model: String, method: String },

    /// Two descriptors claim the same name on the same scope
    #[error("Method name {name} is claimed twice on {model}")]
    DuplicateMethod { model: String, name: String },

    /// Descriptor is malformed
    #[error("Invalid method descriptor on {model}: {reason}")]
    InvalidDescriptor { model: String, reason: String },

    /// Relation kind without a builder strategy
    #[error("Unsupported relation kind {kind} for {model}.{relation}")]
    UnsupportedRelation {
        model: String,
        relation: String,
        kind: String,
    },

    /// Reference to a model that was never defined
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Call to a name with no installed method
    #[error("{model} has no method {method}")]
    UnknownMethod { model: String, method: String },

    /// Access to an undeclared relation
    #[error("{model} has no relation {relation}")]
    UnknownRelation { model: String, relation: String },

    /// Excluded method without a local implementation
    #[error("{model}.{method} is local-only and has no local implementation")]
    LocalOnly { model: String, method: String },

    /// Instance call on an instance whose identity field is unset
    #[error("{model} instance has no value for identity property {property}")]
    MissingIdentity { model: String, property: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Model definition or payload parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport could not be bound to the endpoint
    #[error("Connection error: {0}")]
    Connect(String),
}

impl TetherError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }

    /// Whether this error was raised while building the model registry
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            TetherError::MissingMethodSurface { .. }
                | TetherError::NoInstanceScope { .. }
                | TetherError::DuplicateMethod { .. }
                | TetherError::InvalidDescriptor { .. }
                | TetherError::UnsupportedRelation { .. }
                | TetherError::UnknownModel(_)
        )
    }
}

/// Outcome error of a proxied call
///
/// `Clone` so one call handle can settle any number of listeners.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// Error reported by the invoker, passed through verbatim
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Payload could not be turned into a model instance
    #[error("Cannot materialize {model}: {reason}")]
    Materialize { model: String, reason: String },

    /// The spawned invocation did not run to completion
    #[error("Remote invocation aborted: {0}")]
    Aborted(String),
}

impl CallError {
    /// The remote error, if this outcome came from the invoker
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            CallError::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Classification code of the remote error, if any
    pub fn code(&self) -> Option<&str> {
        self.remote().and_then(|err| err.code.as_deref())
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CallError::Remote(_) => EXIT_REMOTE,
            CallError::Materialize { .. } | CallError::Aborted(_) => EXIT_FATAL,
        }
    }
}
