//! Chart graph model
//!
//! Owns the node and connection collections and enforces the wiring
//! invariants: connections always go from an output connector to an input
//! connector of a different node, types must be compatible, and an input
//! accepts at most one incoming connection (wiring over an occupied input
//! detaches the previous connection).
//!
//! All mutation here is synchronous and atomic: an operation either
//! completes or leaves the chart untouched. Asynchronous concerns (running
//! operators, propagation hooks) live in [`crate::engine`].

use crate::compat::TypeCompatibility;
use crate::error::{ChartError, Result};
use crate::types::{
    Connection, Connector, ConnectorRef, Direction, Endpoint, Node, NodeId, OutputSlot,
};

/// Axis-aligned selection rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True if the node's bounding box lies fully inside this rectangle
    fn contains_node(&self, node: &Node) -> bool {
        node.x >= self.x
            && node.y >= self.y
            && node.x + node.width() <= self.x + self.width
            && node.y + node.height() <= self.y + self.height
    }
}

/// The dataflow chart: nodes, connections and the selection set
#[derive(Debug, Clone, Default)]
pub struct Chart {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    next_id: NodeId,
}

impl Chart {
    /// Create a new empty chart
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Allocate the next node id (monotonic, chart-wide unique)
    pub fn next_node_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Append a node
    ///
    /// Keeps the id counter ahead of loaded ids so appended workflows
    /// cannot collide with fresh nodes.
    pub fn add_node(&mut self, node: Node) {
        self.next_id = self.next_id.max(node.id + 1);
        self.nodes.push(node);
    }

    /// Find a node by id
    pub fn find_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or(ChartError::NodeNotFound(id))
    }

    /// Find a node by id (mutable)
    pub fn find_node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(ChartError::NodeNotFound(id))
    }

    /// Find an input connector by node id and index
    pub fn find_input_connector(&self, node: NodeId, index: usize) -> Result<&Connector> {
        self.find_node(node)?
            .inputs
            .get(index)
            .ok_or(ChartError::ConnectorNotFound {
                node,
                direction: Direction::Input,
                index,
            })
    }

    /// Find an output slot by node id and index
    pub fn find_output_connector(&self, node: NodeId, index: usize) -> Result<&OutputSlot> {
        self.find_node(node)?
            .outputs
            .get(index)
            .ok_or(ChartError::ConnectorNotFound {
                node,
                direction: Direction::Output,
                index,
            })
    }

    /// The connection feeding a given input connector, if any
    pub fn source_connection(&self, dest_node: NodeId, dest_index: usize) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.dest.node == dest_node && c.dest.connector == dest_index)
    }

    /// The upstream output endpoint feeding a given input, if connected
    pub fn source_endpoint(&self, dest_node: NodeId, dest_index: usize) -> Option<Endpoint> {
        self.source_connection(dest_node, dest_index)
            .map(|c| c.source)
    }

    /// The upstream output slot feeding a given input
    ///
    /// `None` is the "unconnected" sentinel; a dangling connection (stale
    /// endpoint) is an error.
    pub fn get_source_connector(
        &self,
        dest_node: NodeId,
        dest_index: usize,
    ) -> Result<Option<&OutputSlot>> {
        match self.source_endpoint(dest_node, dest_index) {
            Some(endpoint) => Ok(Some(
                self.find_output_connector(endpoint.node, endpoint.connector)?,
            )),
            None => Ok(None),
        }
    }

    /// Destination nodes of every connection leaving the given node
    ///
    /// One entry per connection, in connection order. This is the target
    /// list for success propagation.
    pub fn propagation_targets(&self, source_node: NodeId) -> Vec<NodeId> {
        self.connections
            .iter()
            .filter(|c| c.source.node == source_node)
            .map(|c| c.dest.node)
            .collect()
    }

    /// Create a connection between two connectors
    ///
    /// The endpoints may arrive in either order; the output-typed one is
    /// taken as the semantic source. Fails with `InvalidWiring` when both
    /// endpoints share a direction or a node, and with `TypeMismatch` when
    /// the compatibility matrix rejects the pair (which also clears the
    /// selection, as a visible error signal).
    ///
    /// Wiring into an already-connected input detaches the previous
    /// connection.
    ///
    /// Returns the destination node id so the caller can invoke its
    /// connection-update hook.
    pub fn create_connection(
        &mut self,
        a: ConnectorRef,
        b: ConnectorRef,
        compat: &TypeCompatibility,
    ) -> Result<NodeId> {
        if a.direction == b.direction {
            return Err(ChartError::wiring(
                "only output to input connections are allowed",
            ));
        }
        if a.node == b.node {
            return Err(ChartError::wiring("cannot link a node with itself"));
        }

        // Normalize to semantic source (output) and destination (input)
        let (source, dest) = if a.direction == Direction::Output {
            (a, b)
        } else {
            (b, a)
        };

        let source_type = self
            .find_output_connector(source.node, source.index)?
            .connector
            .data_type
            .clone();
        let dest_type = self
            .find_input_connector(dest.node, dest.index)?
            .data_type
            .clone();

        if !compat.is_allowed(&source_type, &dest_type) {
            self.deselect_all();
            return Err(ChartError::TypeMismatch {
                source_type,
                dest_type,
            });
        }

        // At most one connection per input: detach any previous one
        self.disconnect_input(dest.node, dest.index);

        self.connections.push(Connection::new(
            Endpoint::new(source.node, source.index),
            Endpoint::new(dest.node, dest.index),
        ));

        Ok(dest.node)
    }

    /// Remove the connection feeding the given input, if any
    ///
    /// Returns true if a connection was removed.
    pub fn disconnect_input(&mut self, dest_node: NodeId, dest_index: usize) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !(c.dest.node == dest_node && c.dest.connector == dest_index));
        self.connections.len() != before
    }

    /// Delete every selected node and connection
    ///
    /// Connections are removed when they are selected themselves or touch
    /// a deleted node. Returns the ids of the deleted nodes so the caller
    /// can cancel their pending work.
    pub fn delete_selected(&mut self) -> Vec<NodeId> {
        let deleted: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id)
            .collect();

        self.nodes.retain(|n| !n.selected);
        self.connections
            .retain(|c| !c.selected && !deleted.iter().any(|&id| c.touches(id)));

        deleted
    }

    /// Select every node and connection
    pub fn select_all(&mut self) {
        for node in &mut self.nodes {
            node.selected = true;
        }
        for connection in &mut self.connections {
            connection.selected = true;
        }
    }

    /// Deselect every node and connection
    pub fn deselect_all(&mut self) {
        for node in &mut self.nodes {
            node.selected = false;
        }
        for connection in &mut self.connections {
            connection.selected = false;
        }
    }

    /// Toggle one node's selection flag
    pub fn toggle_node_selected(&mut self, id: NodeId) -> Result<()> {
        let node = self.find_node_mut(id)?;
        node.selected = !node.selected;
        Ok(())
    }

    /// Recompute connection selection from node selection
    ///
    /// A connection is selected iff both its endpoints' nodes are. This is
    /// derived state, recomputed after any change to the node selection.
    pub fn select_induced_connections(&mut self) {
        let selected: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id)
            .collect();
        for connection in &mut self.connections {
            connection.selected = selected.contains(&connection.source.node)
                && selected.contains(&connection.dest.node);
        }
    }

    /// Select nodes fully inside the rectangle, then induced connections
    ///
    /// With `additive` false the previous selection is cleared first.
    pub fn apply_selection_rect(&mut self, rect: Rect, additive: bool) {
        if !additive {
            self.deselect_all();
        }
        for node in &mut self.nodes {
            if rect.contains_node(node) {
                node.selected = true;
            }
        }
        self.select_induced_connections();
    }

    /// Ids of the currently selected nodes
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id)
            .collect()
    }

    /// Move every selected node by the given delta
    pub fn move_selected(&mut self, dx: f64, dy: f64) {
        for node in self.nodes.iter_mut().filter(|n| n.selected) {
            node.x += dx;
            node.y += dy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Operator, OperatorKind, RunState};
    use std::collections::HashMap;

    fn test_operator(name: &str) -> Operator {
        Operator {
            op_id: 0,
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            family: String::new(),
            kind: OperatorKind::Local,
            parameters: vec![],
            progress: 0,
            state: RunState::Idle,
            pid: None,
            last_start: None,
            last_start_local: None,
            duration: None,
        }
    }

    fn add_test_node(
        chart: &mut Chart,
        inputs: &[&str],
        outputs: &[&str],
        pos: (f64, f64),
    ) -> NodeId {
        let id = chart.next_node_id();
        chart.add_node(Node {
            id,
            name: format!("node-{id}"),
            x: pos.0,
            y: pos.1,
            inputs: inputs
                .iter()
                .map(|t| Connector::new(format!("in_{t}"), "In", *t))
                .collect(),
            outputs: outputs
                .iter()
                .map(|t| OutputSlot::new(Connector::new(format!("out_{t}"), "Out", *t)))
                .collect(),
            operator: test_operator("test"),
            selected: false,
        });
        id
    }

    fn compat() -> TypeCompatibility {
        TypeCompatibility::from_map(HashMap::from([(
            "ts_list".to_string(),
            vec!["list".to_string(), "number".to_string()],
        )]))
    }

    #[test]
    fn test_find_node_not_found() {
        let chart = Chart::new();
        assert!(matches!(
            chart.find_node(99),
            Err(ChartError::NodeNotFound(99))
        ));
    }

    #[test]
    fn test_connector_index_out_of_range() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &["ts_list"], &["ts_list"], (0.0, 0.0));
        assert!(chart.find_input_connector(a, 0).is_ok());
        assert!(matches!(
            chart.find_input_connector(a, 5),
            Err(ChartError::ConnectorNotFound { .. })
        ));
    }

    #[test]
    fn test_connection_any_argument_order() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 200.0));

        // Input endpoint first: still normalized to a -> b
        let dest = chart
            .create_connection(
                ConnectorRef::input(b, 0),
                ConnectorRef::output(a, 0),
                &compat(),
            )
            .unwrap();
        assert_eq!(dest, b);

        let conn = &chart.connections()[0];
        assert_eq!(conn.source, Endpoint::new(a, 0));
        assert_eq!(conn.dest, Endpoint::new(b, 0));
    }

    #[test]
    fn test_same_direction_rejected() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 200.0));

        let result = chart.create_connection(
            ConnectorRef::output(a, 0),
            ConnectorRef::output(b, 0),
            &compat(),
        );
        assert!(matches!(result, Err(ChartError::InvalidWiring(_))));
        assert!(chart.connections().is_empty());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &["ts_list"], &["ts_list"], (0.0, 0.0));

        let result = chart.create_connection(
            ConnectorRef::output(a, 0),
            ConnectorRef::input(a, 0),
            &compat(),
        );
        assert!(matches!(result, Err(ChartError::InvalidWiring(_))));
    }

    #[test]
    fn test_type_mismatch_clears_selection() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["number"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 200.0));
        chart.find_node_mut(a).unwrap().selected = true;

        let result = chart.create_connection(
            ConnectorRef::output(a, 0),
            ConnectorRef::input(b, 0),
            &compat(),
        );
        assert!(matches!(result, Err(ChartError::TypeMismatch { .. })));
        assert!(chart.connections().is_empty());
        // Error side effect: selection cleared
        assert!(chart.selected_nodes().is_empty());
    }

    #[test]
    fn test_compatible_via_matrix() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["list"], &[], (0.0, 200.0));

        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(b, 0),
                &compat(),
            )
            .unwrap();
        assert_eq!(chart.connections().len(), 1);
    }

    #[test]
    fn test_rewire_detaches_previous() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &[], &["ts_list"], (200.0, 0.0));
        let c = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 200.0));

        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(c, 0),
                &compat(),
            )
            .unwrap();
        chart
            .create_connection(
                ConnectorRef::output(b, 0),
                ConnectorRef::input(c, 0),
                &compat(),
            )
            .unwrap();

        // The second wiring replaced the first
        assert_eq!(chart.connections().len(), 1);
        assert_eq!(chart.source_endpoint(c, 0), Some(Endpoint::new(b, 0)));
    }

    #[test]
    fn test_delete_cascades_connections() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["ts_list"], &["ts_list"], (0.0, 200.0));
        let c = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 400.0));

        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(b, 0),
                &compat(),
            )
            .unwrap();
        chart
            .create_connection(
                ConnectorRef::output(b, 0),
                ConnectorRef::input(c, 0),
                &compat(),
            )
            .unwrap();

        chart.find_node_mut(a).unwrap().selected = true;
        let deleted = chart.delete_selected();

        assert_eq!(deleted, vec![a]);
        assert_eq!(chart.nodes().len(), 2);
        // Only the a -> b connection went away; b -> c survives
        assert_eq!(chart.connections().len(), 1);
        assert_eq!(chart.connections()[0].source.node, b);
    }

    #[test]
    fn test_select_all_then_delete_empties_chart() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 200.0));
        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(b, 0),
                &compat(),
            )
            .unwrap();

        chart.select_all();
        chart.delete_selected();
        assert!(chart.nodes().is_empty());
        assert!(chart.connections().is_empty());
    }

    #[test]
    fn test_induced_connections_follow_node_selection() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (0.0, 0.0));
        let b = add_test_node(&mut chart, &["ts_list"], &["ts_list"], (0.0, 200.0));
        let c = add_test_node(&mut chart, &["ts_list"], &[], (0.0, 400.0));
        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(b, 0),
                &compat(),
            )
            .unwrap();
        chart
            .create_connection(
                ConnectorRef::output(b, 0),
                ConnectorRef::input(c, 0),
                &compat(),
            )
            .unwrap();

        chart.find_node_mut(a).unwrap().selected = true;
        chart.find_node_mut(b).unwrap().selected = true;
        chart.select_induced_connections();

        assert!(chart.connections()[0].selected);
        assert!(!chart.connections()[1].selected);

        // Deselecting one endpoint deselects the induced connection
        chart.find_node_mut(a).unwrap().selected = false;
        chart.select_induced_connections();
        assert!(!chart.connections()[0].selected);
    }

    #[test]
    fn test_selection_rect() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &["ts_list"], (10.0, 10.0));
        let b = add_test_node(&mut chart, &["ts_list"], &[], (10.0, 150.0));
        let c = add_test_node(&mut chart, &[], &[], (1000.0, 1000.0));
        chart
            .create_connection(
                ConnectorRef::output(a, 0),
                ConnectorRef::input(b, 0),
                &compat(),
            )
            .unwrap();

        chart.apply_selection_rect(Rect::new(0.0, 0.0, 400.0, 400.0), false);

        assert_eq!(chart.selected_nodes(), vec![a, b]);
        assert!(chart.connections()[0].selected);
        assert!(!chart.find_node(c).unwrap().selected);

        // Non-additive application replaces the selection
        chart.apply_selection_rect(Rect::new(900.0, 900.0, 400.0, 400.0), false);
        assert_eq!(chart.selected_nodes(), vec![c]);
        assert!(!chart.connections()[0].selected);
    }

    #[test]
    fn test_partially_covered_node_not_selected() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &[], (10.0, 10.0));
        // Rect cuts through the node
        chart.apply_selection_rect(Rect::new(0.0, 0.0, 50.0, 50.0), false);
        assert!(!chart.find_node(a).unwrap().selected);
    }

    #[test]
    fn test_monotonic_ids_after_load() {
        let mut chart = Chart::new();
        let a = add_test_node(&mut chart, &[], &[], (0.0, 0.0));
        assert_eq!(a, 0);

        // Appending a loaded node with a high id keeps fresh ids ahead
        chart.add_node(Node {
            id: 41,
            name: "loaded".to_string(),
            x: 0.0,
            y: 0.0,
            inputs: vec![],
            outputs: vec![],
            operator: test_operator("loaded"),
            selected: false,
        });
        assert_eq!(chart.next_node_id(), 42);
    }
}
