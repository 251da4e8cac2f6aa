//! Workflow save and load
//!
//! The on-disk document keeps the historical field names (`isAlgo`,
//! `_progress`, `_state`, `lastStartLocal`, ...) so existing saved
//! workflows keep loading. Loading rebuilds each node from its operator's
//! metadata, restores parameter values, domains and output references, and
//! re-attaches any saved backend process id, which resumes polling
//! immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::OperatorMetadata;
use crate::engine::Engine;
use crate::error::{ChartError, Result};
use crate::types::{ConnectorRef, Node, NodeId, OperatorKind, ProcessId, RunState};

/// A complete saved workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedWorkflow {
    /// Document identifier (uuid)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<SavedNode>,
    pub connections: Vec<SavedConnection>,
}

/// One saved node with its position and operator state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedNode {
    pub id: NodeId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub op_info: SavedOperator,
}

/// Saved operator state, in the historical field layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedOperator {
    pub op_id: i64,
    pub name: String,
    #[serde(rename = "isAlgo")]
    pub is_algo: bool,
    #[serde(rename = "_progress")]
    pub progress: u8,
    #[serde(rename = "_state")]
    pub state: RunState,
    #[serde(rename = "lastStartLocal", default)]
    pub last_start_local: Option<i64>,
    #[serde(rename = "lastStart", default)]
    pub last_start: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub pid: Option<ProcessId>,
    /// Parameter state keyed by name: domain of values + current value
    #[serde(default)]
    pub parameters: BTreeMap<String, SavedParameter>,
    /// Output state keyed by connector name
    #[serde(default)]
    pub outputs: BTreeMap<String, SavedOutput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedParameter {
    /// Domain of values at save time
    #[serde(default)]
    pub dov: Option<serde_json::Value>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedOutput {
    #[serde(default)]
    pub rid: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// One endpoint of a saved connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEndpoint {
    #[serde(rename = "nodeID")]
    pub node_id: NodeId,
    #[serde(rename = "connectorIndex")]
    pub connector_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConnection {
    pub source: SavedEndpoint,
    pub dest: SavedEndpoint,
}

impl SavedWorkflow {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn save_node(node: &Node) -> SavedNode {
    let op = &node.operator;
    SavedNode {
        id: node.id,
        name: node.name.clone(),
        x: node.x,
        y: node.y,
        op_info: SavedOperator {
            op_id: op.op_id,
            name: op.name.clone(),
            is_algo: op.kind == OperatorKind::Remote,
            progress: op.progress,
            state: op.state,
            last_start_local: op.last_start_local,
            last_start: op.last_start,
            duration: op.duration,
            pid: op.pid.clone(),
            parameters: op
                .parameters
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        SavedParameter {
                            dov: p.domain.clone(),
                            value: p.value.clone(),
                        },
                    )
                })
                .collect(),
            outputs: node
                .outputs
                .iter()
                .map(|o| {
                    (
                        o.connector.name.clone(),
                        SavedOutput {
                            rid: o.rid.clone(),
                            value: o.value.clone(),
                        },
                    )
                })
                .collect(),
        },
    }
}

/// Restore a saved operator's state onto a freshly instantiated node
fn restore_node(node: &mut Node, saved: &SavedOperator) {
    node.operator.progress = saved.progress.min(100);
    node.operator.state = saved.state;
    node.operator.last_start_local = saved.last_start_local;
    node.operator.last_start = saved.last_start;
    node.operator.duration = saved.duration;
    for (name, param) in &saved.parameters {
        if let Some(target) = node.operator.parameter_mut(name) {
            target.domain = param.dov.clone();
            target.value = param.value.clone();
        } else {
            log::warn!(
                "saved parameter '{name}' unknown to operator '{}', dropped",
                node.operator.name
            );
        }
    }
    for (name, output) in &saved.outputs {
        if let Some(slot) = node.output_mut(name) {
            slot.rid = output.rid.clone();
            slot.value = output.value.clone();
        } else {
            log::warn!(
                "saved output '{name}' unknown to operator '{}', dropped",
                node.operator.name
            );
        }
    }
}

impl Engine {
    /// Serialize the current chart into a workflow document
    pub async fn save_workflow(&self, name: &str, description: &str) -> SavedWorkflow {
        self.with_chart(|chart| SavedWorkflow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            nodes: chart.nodes().iter().map(save_node).collect(),
            connections: chart
                .connections()
                .iter()
                .map(|c| SavedConnection {
                    source: SavedEndpoint {
                        node_id: c.source.node,
                        connector_index: c.source.connector,
                    },
                    dest: SavedEndpoint {
                        node_id: c.dest.node,
                        connector_index: c.dest.connector,
                    },
                })
                .collect(),
        })
        .await
    }

    /// Replace the chart with a saved workflow
    ///
    /// Cancels all in-flight work first. Nodes saved with a backend
    /// process id go straight back to `running` and resume polling.
    pub async fn load_workflow(self: &Arc<Self>, doc: &SavedWorkflow) -> Result<()> {
        self.cancel_all();
        self.with_chart(|chart| *chart = crate::chart::Chart::new())
            .await;
        let attached = self.append_nodes(doc, false).await?;
        for (id, pid) in attached {
            self.attach_pid(id, pid).await?;
        }
        Ok(())
    }

    /// Append a saved workflow to the current chart
    ///
    /// Node ids are remapped to fresh ones so they cannot collide with
    /// existing nodes. Running nodes resume polling, as in `load_workflow`.
    pub async fn append_workflow(self: &Arc<Self>, doc: &SavedWorkflow) -> Result<()> {
        let attached = self.append_nodes(doc, true).await?;
        for (id, pid) in attached {
            self.attach_pid(id, pid).await?;
        }
        Ok(())
    }

    /// Instantiate and wire the document's nodes, returning pids to attach
    async fn append_nodes(
        self: &Arc<Self>,
        doc: &SavedWorkflow,
        remap_ids: bool,
    ) -> Result<Vec<(NodeId, ProcessId)>> {
        // Resolve all metadata before touching the chart, so a bad
        // document leaves it unmodified
        if !remap_ids {
            let mut seen = std::collections::BTreeSet::new();
            for saved in &doc.nodes {
                if !seen.insert(saved.id) {
                    return Err(ChartError::InvalidWorkflow(format!(
                        "duplicate node id {}",
                        saved.id
                    )));
                }
            }
        }
        let mut metadata: Vec<OperatorMetadata> = Vec::with_capacity(doc.nodes.len());
        for saved in &doc.nodes {
            let found = match self.registry().get_metadata(&saved.op_info.name) {
                Some(found) => found.clone(),
                None => OperatorMetadata::from_catalog(
                    self.backend().read_operator(&saved.op_info.name).await?,
                ),
            };
            metadata.push(found);
        }

        let mut attached = Vec::new();
        let connections = self
            .with_chart(|chart| -> Result<Vec<(ConnectorRef, ConnectorRef)>> {
                let mut id_map: BTreeMap<NodeId, NodeId> = BTreeMap::new();
                for (saved, metadata) in doc.nodes.iter().zip(&metadata) {
                    let id = if remap_ids {
                        chart.next_node_id()
                    } else {
                        saved.id
                    };
                    id_map.insert(saved.id, id);
                    let mut node = metadata.instantiate(id, saved.x, saved.y);
                    restore_node(&mut node, &saved.op_info);
                    if let Some(pid) = &saved.op_info.pid {
                        attached.push((id, pid.clone()));
                    }
                    chart.add_node(node);
                }
                doc.connections
                    .iter()
                    .map(|c| {
                        let source = *id_map.get(&c.source.node_id).ok_or_else(|| {
                            ChartError::InvalidWorkflow(format!(
                                "connection references unknown node {}",
                                c.source.node_id
                            ))
                        })?;
                        let dest = *id_map.get(&c.dest.node_id).ok_or_else(|| {
                            ChartError::InvalidWorkflow(format!(
                                "connection references unknown node {}",
                                c.dest.node_id
                            ))
                        })?;
                        Ok((
                            ConnectorRef::output(source, c.source.connector_index),
                            ConnectorRef::input(dest, c.dest.connector_index),
                        ))
                    })
                    .collect()
            })
            .await?;

        // Wire through the validating path so a malformed document cannot
        // introduce edges the UI could never create
        for (source, dest) in connections {
            self.connect(source, dest).await?;
        }
        Ok(attached)
    }
}
