//! Event types for streaming chart state changes
//!
//! Events are sent from the engine to the frontend (or any consumer) to
//! report run transitions, progress ticks, wiring changes and errors.

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, RunState};

/// Trait for sending chart events
///
/// This abstracts over the transport mechanism (UI channel, mpsc, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: ChartEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted as the chart and its nodes change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChartEvent {
    /// A node was added to the chart
    #[serde(rename_all = "camelCase")]
    NodeAdded { node_id: NodeId, operator: String },

    /// Nodes and their connections were deleted
    #[serde(rename_all = "camelCase")]
    NodesDeleted { node_ids: Vec<NodeId> },

    /// A connection was created
    #[serde(rename_all = "camelCase")]
    ConnectionCreated {
        source_node: NodeId,
        dest_node: NodeId,
    },

    /// A node's run state changed
    #[serde(rename_all = "camelCase")]
    StateChanged {
        node_id: NodeId,
        state: RunState,
        progress: u8,
    },

    /// Progress tick without a state change
    #[serde(rename_all = "camelCase")]
    Progress { node_id: NodeId, progress: u8 },

    /// A run reached terminal failure
    #[serde(rename_all = "camelCase")]
    RunFailed { node_id: NodeId, error: String },

    /// A parameter value changed
    #[serde(rename_all = "camelCase")]
    ParameterChanged {
        node_id: NodeId,
        parameter: String,
    },
}

impl ChartEvent {
    /// Create a state change event
    pub fn state_changed(node_id: NodeId, state: RunState, progress: u8) -> Self {
        Self::StateChanged {
            node_id,
            state,
            progress,
        }
    }

    /// Create a run failure event
    pub fn run_failed(node_id: NodeId, error: impl Into<String>) -> Self {
        Self::RunFailed {
            node_id,
            error: error.into(),
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: ChartEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<ChartEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ChartEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: ChartEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
