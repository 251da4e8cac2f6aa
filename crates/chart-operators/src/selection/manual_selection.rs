//! Manual Selection operator
//!
//! Lets the user hand-pick series out of the upstream list. The Selection
//! parameter's domain of values mirrors the connected input; when the
//! upstream list changes, the current selection is pruned to the entries
//! still present.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome, RunState,
};

pub struct ManualSelection;

impl ManualSelection {
    pub const IN_TS: &'static str = "TS";
    pub const OUT_TS_LIST: &'static str = "ts_list";
    pub const PARAM_SELECTION: &'static str = "Selection";
}

/// Identity of one series entry, used for membership checks
fn identity(entry: &serde_json::Value) -> (Option<&str>, Option<&str>) {
    (
        entry.get("tsuid").and_then(|v| v.as_str()),
        entry.get("funcId").and_then(|v| v.as_str()),
    )
}

/// Keep only selection entries still present in the domain
fn prune_selection(
    selection: &serde_json::Value,
    domain: Option<&serde_json::Value>,
) -> Vec<serde_json::Value> {
    let Some(selected) = selection.as_array() else {
        return Vec::new();
    };
    let Some(available) = domain.and_then(|d| d.as_array()) else {
        return Vec::new();
    };
    selected
        .iter()
        .filter(|entry| available.iter().any(|a| identity(a) == identity(entry)))
        .cloned()
        .collect()
}

#[async_trait]
impl OperatorBehavior for ManualSelection {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 3,
            name: "Manual Selection".to_string(),
            label: "Manual Selection".to_string(),
            description: "Manually filter a TS list".to_string(),
            family: "Dataset Preparation/Data Selection".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![Connector::new(Self::IN_TS, "TS list", "ts_list")],
            outputs: vec![Connector::new(Self::OUT_TS_LIST, "TS list", "ts_list")],
            parameters: vec![Parameter::new(Self::PARAM_SELECTION, "Selection", "ts_selection")
                .with_description("List of Time series")
                .auto_run()],
        }
    }

    async fn init(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        let domain = args
            .inputs
            .get(Self::IN_TS)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        OperatorUpdate::none()
            .with_domain(Self::PARAM_SELECTION, domain)
            .with_state(100, RunState::Idle)
    }

    async fn on_connection_update(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        let domain = args.inputs.get(Self::IN_TS);
        let old = args.parameter_value(Self::PARAM_SELECTION);
        let old_len = old.and_then(|v| v.as_array()).map_or(0, Vec::len);
        let pruned = old.map_or_else(Vec::new, |value| prune_selection(value, domain));

        let mut update = OperatorUpdate::none().with_domain(
            Self::PARAM_SELECTION,
            domain.cloned().unwrap_or(serde_json::Value::Null),
        );
        if pruned.len() != old_len {
            // The selection lost entries: stale outputs must not survive
            update.clear_outputs = true;
            update = update.with_state(100, RunState::Idle);
        }
        update
            .param_values
            .insert(Self::PARAM_SELECTION.to_string(), Some(serde_json::json!(pruned)));
        update
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        match args.parameter_value(Self::PARAM_SELECTION) {
            Some(selection) if selection.as_array().is_some_and(|s| !s.is_empty()) => {
                RunOutcome::Success {
                    outputs: HashMap::from([(
                        Self::OUT_TS_LIST.to_string(),
                        OutputBinding::Value(selection.clone()),
                    )]),
                }
            }
            _ => RunOutcome::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_engine::{InputValues, MockBackend};

    fn entry(n: u32) -> serde_json::Value {
        serde_json::json!({"tsuid": format!("t{n}"), "funcId": format!("f{n}")})
    }

    #[tokio::test]
    async fn test_init_mirrors_input_into_domain() {
        let backend = MockBackend::new();
        let operator = ManualSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        let mut inputs = InputValues::new();
        inputs.insert(ManualSelection::IN_TS, serde_json::json!([entry(1), entry(2)]));

        let update = ManualSelection
            .init(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;
        assert_eq!(
            update.param_domains[ManualSelection::PARAM_SELECTION],
            serde_json::json!([entry(1), entry(2)])
        );
    }

    #[tokio::test]
    async fn test_connection_update_prunes_selection() {
        let backend = MockBackend::new();
        let mut operator = ManualSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        operator
            .parameter_mut(ManualSelection::PARAM_SELECTION)
            .unwrap()
            .value = Some(serde_json::json!([entry(1), entry(3)]));

        // Upstream no longer contains entry 3
        let mut inputs = InputValues::new();
        inputs.insert(ManualSelection::IN_TS, serde_json::json!([entry(1), entry(2)]));

        let update = ManualSelection
            .on_connection_update(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;

        assert_eq!(
            update.param_values[ManualSelection::PARAM_SELECTION],
            Some(serde_json::json!([entry(1)]))
        );
        // Losing entries invalidates previous outputs
        assert!(update.clear_outputs);
        assert_eq!(update.state, Some(RunState::Idle));
    }

    #[tokio::test]
    async fn test_unchanged_selection_keeps_outputs() {
        let backend = MockBackend::new();
        let mut operator = ManualSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        operator
            .parameter_mut(ManualSelection::PARAM_SELECTION)
            .unwrap()
            .value = Some(serde_json::json!([entry(1)]));

        let mut inputs = InputValues::new();
        inputs.insert(ManualSelection::IN_TS, serde_json::json!([entry(1), entry(2)]));

        let update = ManualSelection
            .on_connection_update(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;
        assert!(!update.clear_outputs);
        assert!(update.state.is_none());
    }

    #[tokio::test]
    async fn test_run_emits_selection() {
        let backend = MockBackend::new();
        let mut operator = ManualSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        operator
            .parameter_mut(ManualSelection::PARAM_SELECTION)
            .unwrap()
            .value = Some(serde_json::json!([entry(2)]));

        let outcome = ManualSelection
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &InputValues::new(),
                backend: &backend,
            })
            .await;
        match outcome {
            RunOutcome::Success { outputs } => {
                assert_eq!(
                    outputs[ManualSelection::OUT_TS_LIST],
                    OutputBinding::Value(serde_json::json!([entry(2)]))
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_with_empty_selection_stays_idle() {
        let backend = MockBackend::new();
        let operator = ManualSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        let outcome = ManualSelection
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &InputValues::new(),
                backend: &backend,
            })
            .await;
        assert!(matches!(outcome, RunOutcome::Idle));
    }
}
