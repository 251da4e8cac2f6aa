//! Chart Engine - dataflow graph and operator execution
//!
//! This crate implements the view-model and execution core of a visual
//! analysis workbench: users chain operators over time-series datasets by
//! wiring typed connectors, then run nodes whose work happens locally or
//! as polled backend jobs. It supports:
//!
//! - A typed node/connector/connection graph with selection editing
//! - Type-compatibility checking against a backend-provided matrix
//! - A per-node run/poll state machine (idle → running → success/failure)
//! - Success propagation to downstream nodes through connection hooks
//! - Structured cancellation of every in-flight poll loop
//! - Workflow save/load in the historical JSON document layout
//!
//! # Architecture
//!
//! - `Chart`: the synchronous graph model enforcing the wiring invariants
//! - `Engine`: the async driver; snapshots state, never calls out under
//!   its lock, applies outcomes atomically
//! - `OperatorBehavior`: closed interface implemented by each local
//!   operator; remote operators go through the generic job submit/poll path
//! - `Backend`: the service the engine and operators call; `HttpBackend`
//!   in production, a scripted `MockBackend` in tests
//!
//! # Example
//!
//! ```ignore
//! use chart_engine::{Engine, EngineConfig, HttpBackend, NullEventSink, OperatorRegistry};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(HttpBackend::new("http://localhost:8080/api"));
//! let engine = Engine::initialize(
//!     backend,
//!     Arc::new(OperatorRegistry::new()),
//!     Arc::new(NullEventSink),
//!     EngineConfig::default(),
//! )
//! .await?;
//! let node = engine.add_node("kmeans", 40.0, 40.0).await?;
//! engine.run_node(node).await?;
//! ```

pub mod backend;
pub mod behavior;
pub mod chart;
pub mod compat;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod events;
pub mod pending;
pub mod registry;
pub mod types;
pub mod workflow;

// Re-export key types
pub use backend::http::HttpBackend;
pub use backend::Backend;
pub use behavior::{
    InputValues, OperatorArgs, OperatorBehavior, OperatorUpdate, OutputBinding, PollOutcome,
    RunOutcome,
};
pub use chart::{Chart, Rect};
pub use compat::TypeCompatibility;
pub use descriptor::OperatorMetadata;
pub use engine::{Engine, EngineConfig};
pub use error::{ChartError, Result};
pub use events::{ChartEvent, EventSink, NullEventSink, VecEventSink};
pub use pending::{CancelToken, PendingWork};
pub use registry::OperatorRegistry;
pub use types::{
    Connection, Connector, ConnectorRef, Direction, Endpoint, Node, NodeId, Operator,
    OperatorKind, OutputSlot, Parameter, ProcessId, RunState, TypeName,
};
pub use workflow::SavedWorkflow;

#[cfg(any(test, feature = "test-support"))]
pub use backend::mock::MockBackend;
