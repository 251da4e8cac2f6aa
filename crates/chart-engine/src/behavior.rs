//! Local operator behavior
//!
//! The original system kept core operators as a table of plain objects
//! with optional `run`/`poll`/`init` overrides bound at read time. Here
//! that table is a closed interface: each local operator is one type
//! implementing [`OperatorBehavior`], selected at node construction time
//! through the registry.
//!
//! Behaviors never touch the chart. The engine snapshots the operator and
//! resolves the input values before calling in, and applies the returned
//! outcome under its own lock, so state-machine invariants (output
//! clearing, propagation order) stay in one place.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::backend::Backend;
use crate::descriptor::OperatorMetadata;
use crate::types::{NodeId, Operator, ProcessId, RunState};

/// Input values resolved by the engine before a behavior call
///
/// Absent entries mean the input is unconnected or its upstream result is
/// unavailable — the same sentinel for both, as a behavior cannot react
/// differently anyway.
#[derive(Debug, Clone, Default)]
pub struct InputValues {
    values: HashMap<String, serde_json::Value>,
}

impl InputValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.values.insert(name.into(), value);
    }

    /// Resolved value of the named input, if available
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all resolved inputs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }
}

/// Result reference to bind onto an output connector
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBinding {
    /// Direct in-memory value
    Value(serde_json::Value),
    /// Backend resource id, resolved lazily on read
    Resource(String),
}

/// Result of a behavior's `run`
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Work finished; bind these outputs and transition to success
    Success {
        outputs: HashMap<String, OutputBinding>,
    },
    /// Nothing to do (e.g. empty input); return to idle
    Idle,
    /// Work was delegated to the backend; drive `poll` until terminal
    Pending { pid: ProcessId },
    /// Work failed; transition to failure
    Failure { error: String },
}

/// Result of one behavior `poll` round
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Still in progress; keep the timer running
    Running { progress: u8 },
    /// Terminal success; bind outputs, stop the timer
    Success {
        progress: u8,
        outputs: HashMap<String, OutputBinding>,
    },
    /// Terminal failure; stop the timer, keep the reported progress
    Failure { progress: u8, error: String },
}

/// State changes requested by `init` or `on_connection_update`
///
/// The engine applies these to the node after the call returns.
#[derive(Debug, Clone, Default)]
pub struct OperatorUpdate {
    pub progress: Option<u8>,
    pub state: Option<RunState>,
    /// Domain-of-values refreshes, keyed by parameter name
    pub param_domains: HashMap<String, serde_json::Value>,
    /// Parameter value changes (None clears the value)
    pub param_values: HashMap<String, Option<serde_json::Value>>,
    /// Output bindings to set
    pub outputs: HashMap<String, OutputBinding>,
    /// Reset every output first
    pub clear_outputs: bool,
}

impl OperatorUpdate {
    /// No change
    pub fn none() -> Self {
        Self::default()
    }

    /// Return the node to idle at full progress bar
    pub fn idle() -> Self {
        Self {
            progress: Some(100),
            state: Some(RunState::Idle),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, progress: u8, state: RunState) -> Self {
        self.progress = Some(progress);
        self.state = Some(state);
        self
    }

    pub fn with_domain(mut self, param: impl Into<String>, domain: serde_json::Value) -> Self {
        self.param_domains.insert(param.into(), domain);
        self
    }
}

/// Call context handed to a behavior
///
/// Everything is a snapshot or a shared service: the behavior cannot reach
/// the chart, only describe what should happen to its own node.
pub struct OperatorArgs<'a> {
    pub node_id: NodeId,
    /// Snapshot of the operator (parameters, pid, timing) at call time
    pub operator: &'a Operator,
    /// Input values resolved from upstream outputs
    pub inputs: &'a InputValues,
    pub backend: &'a dyn Backend,
}

impl OperatorArgs<'_> {
    /// Current value of the named parameter
    pub fn parameter_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.operator.parameter(name).and_then(|p| p.value.as_ref())
    }

    /// Current domain of values of the named parameter
    pub fn parameter_domain(&self, name: &str) -> Option<&serde_json::Value> {
        self.operator
            .parameter(name)
            .and_then(|p| p.domain.as_ref())
    }
}

/// Behavior of a local (core) operator
#[async_trait]
pub trait OperatorBehavior: Send + Sync {
    /// Static metadata (identity, connectors, parameter templates)
    fn metadata(&self) -> OperatorMetadata;

    /// Called once when the operator is attached to a node
    ///
    /// Typical use: fetch a parameter's domain of values.
    async fn init(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        let _ = args;
        OperatorUpdate::none()
    }

    /// Called when a connection feeding this node is created or when an
    /// upstream node completes successfully
    async fn on_connection_update(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        let _ = args;
        OperatorUpdate::none()
    }

    /// Execute the operator
    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome;

    /// One polling round while a `Pending` run is in flight
    ///
    /// The default mirrors the original contract: entering the polling
    /// phase without a poll implementation is a programming error and
    /// terminates the run as a failure.
    async fn poll(&self, args: OperatorArgs<'_>) -> PollOutcome {
        log::error!(
            "operator '{}' entered polling without a poll() implementation",
            args.operator.name
        );
        PollOutcome::Failure {
            progress: 100,
            error: format!("operator '{}' does not support polling", args.operator.name),
        }
    }
}
