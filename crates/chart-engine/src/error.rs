//! Error types for the chart engine

use thiserror::Error;

use crate::types::{Direction, NodeId};

/// Result type alias using ChartError
pub type Result<T> = std::result::Result<T, ChartError>;

/// Errors that can occur in the chart engine
///
/// Graph errors (`NodeNotFound`, `ConnectorNotFound`, `InvalidWiring`,
/// `TypeMismatch`) are raised synchronously by the offending operation and
/// leave the chart unmodified. Backend and job failures are not raised
/// across the async boundary: they surface as `RunState::Failure` on the
/// node plus an event, and only appear here when a caller asks the backend
/// directly.
#[derive(Debug, Error)]
pub enum ChartError {
    /// Lookup by node id failed
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Lookup by connector index failed
    #[error("node {node} has no {direction} connector at index {index}")]
    ConnectorNotFound {
        node: NodeId,
        direction: Direction,
        index: usize,
    },

    /// Attempted connection violates direction or self-loop rules
    #[error("invalid wiring: {0}")]
    InvalidWiring(String),

    /// Attempted connection violates the type compatibility matrix
    #[error("source type '{source_type}' cannot feed an input of type '{dest_type}'")]
    TypeMismatch {
        source_type: String,
        dest_type: String,
    },

    /// Operator name not present in the registry or catalog
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// Parameter name not declared by the operator
    #[error("operator has no parameter '{0}'")]
    ParameterNotFound(String),

    /// A backend request failed (network error, 4xx/5xx, bad payload)
    #[error("backend request failed: {0}")]
    Backend(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed saved workflow
    #[error("invalid workflow document: {0}")]
    InvalidWorkflow(String),
}

impl ChartError {
    /// Create a backend failure with a message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an invalid wiring error with a message
    pub fn wiring(msg: impl Into<String>) -> Self {
        Self::InvalidWiring(msg.into())
    }
}
