//! Core types for analysis charts
//!
//! These types define the structure of a chart: nodes, connectors,
//! connections and the per-node operator state that drives execution.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node, assigned monotonically by the chart
pub type NodeId = u32;

/// Semantic type tag carried by a connector (e.g. "ts_list", "table")
///
/// Type names are open-ended: the compatibility matrix is fetched from the
/// backend, so the set of tags is not known at compile time.
pub type TypeName = String;

/// Backend process identifier for a submitted job or ingestion session
pub type ProcessId = String;

/// Default node width, used when a node has few connectors
pub const DEFAULT_NODE_WIDTH: f64 = 110.0;
/// Node height
pub const DEFAULT_NODE_HEIGHT: f64 = 80.0;
/// Horizontal space reserved per connector
pub const CONNECTOR_WIDTH: f64 = 30.0;

/// Run status of an operator
///
/// No state is terminal: a completed node can always be re-run, which
/// takes it back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// Waiting for user action
    #[serde(rename = "idle")]
    Idle,
    /// Work in progress (locally or on the backend)
    #[serde(rename = "run")]
    Running,
    /// Completed, results available
    #[serde(rename = "ok")]
    Success,
    /// Completed with an error
    #[serde(rename = "ko")]
    Failure,
}

impl RunState {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failure)
    }
}

/// Direction of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// A named, typed slot on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    /// Functional name, unique among siblings of the same direction
    pub name: String,
    /// Human-readable label
    pub label: String,
    /// Description shown in the UI
    pub description: String,
    /// Semantic type tag
    pub data_type: TypeName,
}

impl Connector {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        data_type: impl Into<TypeName>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: String::new(),
            data_type: data_type.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An output connector together with its result reference
///
/// The result is either a direct in-memory value or a backend resource id,
/// never both. Both are cleared whenever the owning node enters `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSlot {
    pub connector: Connector,
    /// Backend resource id, bound by remote job completion
    pub rid: Option<String>,
    /// Direct value, set by local operators
    pub value: Option<serde_json::Value>,
}

impl OutputSlot {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            rid: None,
            value: None,
        }
    }

    /// Reset both result references to empty
    pub fn clear(&mut self) {
        self.rid = None;
        self.value = None;
    }

    /// True if either a value or a resource id is bound
    pub fn has_result(&self) -> bool {
        self.rid.is_some() || self.value.is_some()
    }
}

/// A configurable operator parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub label: String,
    pub description: String,
    /// Parameter kind ("text", "date", "md_filter", "ds_list", ...)
    pub data_type: TypeName,
    /// Current value
    pub value: Option<serde_json::Value>,
    /// Value restored by "reset to default"
    pub default_value: Option<serde_json::Value>,
    /// Domain of values (enumerable choices), refreshed by the operator
    pub domain: Option<serde_json::Value>,
    /// Re-run the node automatically when this parameter changes
    pub auto_run: bool,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        data_type: impl Into<TypeName>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: String::new(),
            data_type: data_type.into(),
            value: None,
            default_value: None,
            domain: None,
            auto_run: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value.clone());
        self.default_value = Some(value);
        self
    }

    /// Mark this parameter as triggering a run on change
    pub fn auto_run(mut self) -> Self {
        self.auto_run = true;
        self
    }
}

/// Origin of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    /// Backend algorithm, executed through job submit + status polling
    Remote,
    /// Core operator with behavior implemented in this workspace
    Local,
}

/// Per-node operator descriptor and run status
///
/// One `Operator` per node (composition). The connectors it declares live
/// on the owning [`Node`]; this struct keeps the identity, parameters and
/// the state machine fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    /// Catalog identifier
    pub op_id: i64,
    /// Functional name (registry/catalog key)
    pub name: String,
    /// Display name
    pub label: String,
    pub description: String,
    /// Category path for the palette
    pub family: String,
    pub kind: OperatorKind,
    pub parameters: Vec<Parameter>,
    /// Progress percentage in [0, 100]
    pub progress: u8,
    pub state: RunState,
    /// Backend process id while a job or session is attached
    pub pid: Option<ProcessId>,
    /// Start time reported by the backend (epoch seconds)
    pub last_start: Option<i64>,
    /// Local submit time, used for a provisional duration while running
    pub last_start_local: Option<i64>,
    /// Run duration in seconds (provisional while running)
    pub duration: Option<i64>,
}

impl Operator {
    pub fn is_idle(&self) -> bool {
        self.state == RunState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Success
    }

    pub fn is_failure(&self) -> bool {
        self.state == RunState::Failure
    }

    /// Get a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Get a parameter by name (mutable)
    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }
}

/// A node instance in a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Chart-wide unique id
    pub id: NodeId,
    /// Display name (the operator's label)
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Input connectors, in declaration order
    pub inputs: Vec<Connector>,
    /// Output connectors with their result references
    pub outputs: Vec<OutputSlot>,
    pub operator: Operator,
    pub selected: bool,
}

impl Node {
    /// Node width, widened to fit its connectors
    pub fn width(&self) -> f64 {
        let connectors = self.inputs.len().max(self.outputs.len());
        (CONNECTOR_WIDTH * (1 + connectors) as f64).max(DEFAULT_NODE_WIDTH)
    }

    pub fn height(&self) -> f64 {
        DEFAULT_NODE_HEIGHT
    }

    /// Get an input connector by name
    pub fn input(&self, name: &str) -> Option<&Connector> {
        self.inputs.iter().find(|c| c.name == name)
    }

    /// Get an output slot by name
    pub fn output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|o| o.connector.name == name)
    }

    /// Get an output slot by name (mutable)
    pub fn output_mut(&mut self, name: &str) -> Option<&mut OutputSlot> {
        self.outputs.iter_mut().find(|o| o.connector.name == name)
    }

    /// Reset every output's value and resource id
    pub fn clear_outputs(&mut self) {
        for output in &mut self.outputs {
            output.clear();
        }
    }

    /// True if any output carries a result (a visualization can open)
    pub fn has_viewable_result(&self) -> bool {
        self.outputs.iter().any(|o| o.has_result())
    }
}

/// One side of a connection: a node and a connector index
///
/// The direction is implied by the position in [`Connection`]: `source`
/// always indexes the node's outputs, `dest` its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub connector: usize,
}

impl Endpoint {
    pub fn new(node: NodeId, connector: usize) -> Self {
        Self { node, connector }
    }
}

/// A connector reference as handed in by the wiring UI
///
/// Unlike [`Endpoint`], the direction is explicit because the caller knows
/// which connector list was hit; `Chart::create_connection` normalizes a
/// pair of these into source/dest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorRef {
    pub node: NodeId,
    pub direction: Direction,
    pub index: usize,
}

impl ConnectorRef {
    pub fn input(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: Direction::Input,
            index,
        }
    }

    pub fn output(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: Direction::Output,
            index,
        }
    }
}

/// A directed edge from an output connector to an input connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source: Endpoint,
    pub dest: Endpoint,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

impl Connection {
    pub fn new(source: Endpoint, dest: Endpoint) -> Self {
        Self {
            source,
            dest,
            selected: false,
        }
    }

    /// True if either end touches the given node
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.dest.node == node
    }
}
