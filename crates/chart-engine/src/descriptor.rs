//! Operator descriptor metadata
//!
//! `OperatorMetadata` is the static description of an operator: identity,
//! connectors and parameter templates. Local operators provide it through
//! their [`crate::behavior::OperatorBehavior`] implementation; remote
//! operators get it from the backend catalog. Instantiating the metadata
//! yields a fresh [`Node`] with idle run state.

use serde::{Deserialize, Serialize};

use crate::backend::CatalogOperator;
use crate::types::{
    Connector, Node, NodeId, Operator, OperatorKind, OutputSlot, Parameter, RunState,
};

/// Complete static metadata for an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorMetadata {
    /// Catalog identifier
    pub op_id: i64,
    /// Functional name (registry/catalog key)
    pub name: String,
    /// Display name
    pub label: String,
    pub description: String,
    /// Category path for the palette (e.g. "Dataset Preparation/Data Selection")
    pub family: String,
    pub kind: OperatorKind,
    pub inputs: Vec<Connector>,
    pub outputs: Vec<Connector>,
    /// Parameter templates; `value` holds the default
    pub parameters: Vec<Parameter>,
}

impl OperatorMetadata {
    /// Build metadata from a backend catalog entry (remote operator)
    pub fn from_catalog(entry: CatalogOperator) -> Self {
        Self {
            op_id: entry.id,
            name: entry.name,
            label: entry.label,
            description: entry.description,
            family: entry.family,
            kind: OperatorKind::Remote,
            inputs: entry
                .inputs
                .into_iter()
                .map(|c| {
                    Connector::new(c.name, c.label, c.data_type).with_description(c.description)
                })
                .collect(),
            outputs: entry
                .outputs
                .into_iter()
                .map(|c| {
                    Connector::new(c.name, c.label, c.data_type).with_description(c.description)
                })
                .collect(),
            parameters: entry
                .parameters
                .into_iter()
                .map(|p| {
                    let mut param = Parameter::new(p.name, p.label, p.data_type)
                        .with_description(p.description);
                    if let Some(default) = p.default_value {
                        param = param.with_default(default);
                    }
                    param.domain = p.domain;
                    param
                })
                .collect(),
        }
    }

    /// Instantiate a node from this metadata
    ///
    /// Parameters start at their default value, outputs empty, state idle.
    pub fn instantiate(&self, id: NodeId, x: f64, y: f64) -> Node {
        Node {
            id,
            name: self.label.clone(),
            x,
            y,
            inputs: self.inputs.clone(),
            outputs: self
                .outputs
                .iter()
                .cloned()
                .map(OutputSlot::new)
                .collect(),
            operator: Operator {
                op_id: self.op_id,
                name: self.name.clone(),
                label: self.label.clone(),
                description: self.description.clone(),
                family: self.family.clone(),
                kind: self.kind,
                parameters: self.parameters.clone(),
                progress: 0,
                state: RunState::Idle,
                pid: None,
                last_start: None,
                last_start_local: None,
                duration: None,
            },
            selected: false,
        }
    }
}
