//! Dataset Selection operator
//!
//! Entry point of most workflows: picks a dataset by name and emits its
//! time-series list. `init` fills the Source parameter's domain of values
//! with the dataset catalog so the UI can offer a dropdown.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome, RunState,
};

pub struct DatasetSelection;

impl DatasetSelection {
    pub const PARAM_SOURCE: &'static str = "Source";
    pub const OUT_TS_LIST: &'static str = "ts_list";
    pub const OUT_NAME: &'static str = "Name";
}

/// Read the selected dataset name from the Source parameter
///
/// The domain entries are catalog objects, so the stored value is either
/// one of those objects or a plain name string.
fn source_name(args: &OperatorArgs<'_>) -> Option<String> {
    let value = args.parameter_value(DatasetSelection::PARAM_SOURCE)?;
    match value {
        serde_json::Value::String(name) => Some(name.clone()),
        serde_json::Value::Object(entry) => entry
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl OperatorBehavior for DatasetSelection {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 1,
            name: "Dataset Selection".to_string(),
            label: "Dataset Selection".to_string(),
            description: "Get a TS list from a dataset name".to_string(),
            family: "Dataset Preparation/Data Selection".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![],
            outputs: vec![
                Connector::new(Self::OUT_TS_LIST, "TS list", "ts_list"),
                Connector::new(Self::OUT_NAME, "Name", "ds_name"),
            ],
            parameters: vec![Parameter::new(Self::PARAM_SOURCE, "Source", "ds_list")
                .with_description("Select the source dataset for your Workflow")
                .auto_run()],
        }
    }

    async fn init(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        match args.backend.dataset_list().await {
            Ok(datasets) => OperatorUpdate::none()
                .with_domain(Self::PARAM_SOURCE, serde_json::json!(datasets))
                .with_state(100, RunState::Idle),
            Err(e) => {
                log::error!("can't fetch the dataset list: {e}");
                OperatorUpdate::none()
                    .with_domain(Self::PARAM_SOURCE, serde_json::json!([]))
                    .with_state(100, RunState::Failure)
            }
        }
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let Some(name) = source_name(&args) else {
            // Nothing selected yet
            return RunOutcome::Idle;
        };
        match args.backend.dataset_read(&name).await {
            Ok(content) => RunOutcome::Success {
                outputs: HashMap::from([
                    (
                        Self::OUT_TS_LIST.to_string(),
                        OutputBinding::Value(serde_json::json!(content.ts_list)),
                    ),
                    (
                        Self::OUT_NAME.to_string(),
                        OutputBinding::Value(serde_json::json!(name)),
                    ),
                ]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("failed to read dataset '{name}': {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_engine::backend::{DatasetContent, DatasetSummary, TsRef};
    use chart_engine::MockBackend;

    fn operator_with_source(value: Option<serde_json::Value>) -> chart_engine::Operator {
        let mut operator = DatasetSelection.metadata().instantiate(0, 0.0, 0.0).operator;
        operator.parameter_mut(DatasetSelection::PARAM_SOURCE).unwrap().value = value;
        operator
    }

    #[tokio::test]
    async fn test_init_fills_domain_of_values() {
        let backend = MockBackend::new().with_datasets(vec![DatasetSummary {
            name: "flights".to_string(),
            description: "AF flights".to_string(),
        }]);
        let operator = operator_with_source(None);
        let inputs = chart_engine::InputValues::new();

        let update = DatasetSelection
            .init(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;

        let domain = update.param_domains.get(DatasetSelection::PARAM_SOURCE).unwrap();
        assert_eq!(domain[0]["name"], "flights");
        assert_eq!(update.state, Some(RunState::Idle));
    }

    #[tokio::test]
    async fn test_run_reads_selected_dataset() {
        let backend = MockBackend::new().with_dataset_content(
            "flights",
            DatasetContent {
                ts_list: vec![TsRef {
                    tsuid: "t1".to_string(),
                    func_id: "f1".to_string(),
                }],
            },
        );
        let operator = operator_with_source(Some(serde_json::json!({"name": "flights"})));
        let inputs = chart_engine::InputValues::new();

        let outcome = DatasetSelection
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;

        match outcome {
            RunOutcome::Success { outputs } => {
                let OutputBinding::Value(ts_list) = &outputs[DatasetSelection::OUT_TS_LIST] else {
                    panic!("expected a direct value");
                };
                assert_eq!(ts_list.as_array().unwrap().len(), 1);
                assert_eq!(
                    outputs[DatasetSelection::OUT_NAME],
                    OutputBinding::Value(serde_json::json!("flights"))
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_without_selection_stays_idle() {
        let backend = MockBackend::new();
        let operator = operator_with_source(None);
        let inputs = chart_engine::InputValues::new();

        let outcome = DatasetSelection
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;
        assert!(matches!(outcome, RunOutcome::Idle));
    }

    #[tokio::test]
    async fn test_run_unknown_dataset_fails() {
        let backend = MockBackend::new();
        let operator = operator_with_source(Some(serde_json::json!("missing")));
        let inputs = chart_engine::InputValues::new();

        let outcome = DatasetSelection
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;
        assert!(matches!(outcome, RunOutcome::Failure { .. }));
    }
}
