//! Add TS Column operator
//!
//! Joins metric time series from a dataset onto a table as new columns,
//! matching rows on a join column (or metadata) chosen by the user.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::JoinMetricsRequest;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

use super::{name_input, optional_text, required_text};

pub struct AddTsColumn;

impl AddTsColumn {
    pub const IN_TABLE: &'static str = "table";
    pub const IN_DS: &'static str = "ds";
    pub const OUT_TABLE: &'static str = "table";
    pub const PARAM_METRICS: &'static str = "metrics";
    pub const PARAM_JOIN_COL: &'static str = "joinColName";
    pub const PARAM_JOIN_META: &'static str = "joinMetaName";
    pub const PARAM_TARGET_COL: &'static str = "targetColName";
    pub const PARAM_OUTPUT: &'static str = "outputTableName";
}

#[async_trait]
impl OperatorBehavior for AddTsColumn {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 13,
            name: "Add TS Column".to_string(),
            label: "Add TS Column".to_string(),
            description: "Join metric TS from a dataset to a table as new columns".to_string(),
            family: "Processing On Tables".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![
                Connector::new(Self::IN_TABLE, "Table", "table"),
                Connector::new(Self::IN_DS, "DS name", "ds_name"),
            ],
            outputs: vec![Connector::new(Self::OUT_TABLE, "Table", "table")],
            parameters: vec![
                Parameter::new(Self::PARAM_METRICS, "Metrics", "text")
                    .with_description("Metric names to join, separated by ';'"),
                Parameter::new(Self::PARAM_JOIN_COL, "Join Column", "text")
                    .with_default(serde_json::json!("")),
                Parameter::new(Self::PARAM_JOIN_META, "Join Metadata", "text")
                    .with_default(serde_json::json!("")),
                Parameter::new(Self::PARAM_TARGET_COL, "Target Column", "text")
                    .with_default(serde_json::json!("")),
                Parameter::new(Self::PARAM_OUTPUT, "Output Table Name", "text")
                    .with_description("Name of the table to create"),
            ],
        }
    }

    async fn init(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
        OperatorUpdate::idle()
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let table_name = match name_input(&args, Self::IN_TABLE) {
            Ok(Some(name)) => name,
            Ok(None) => return RunOutcome::Idle,
            Err(error) => return RunOutcome::Failure { error },
        };
        let dataset = match name_input(&args, Self::IN_DS) {
            Ok(Some(name)) => name,
            Ok(None) => return RunOutcome::Idle,
            Err(error) => return RunOutcome::Failure { error },
        };
        let (Some(metrics), Some(output_table_name)) = (
            required_text(&args, Self::PARAM_METRICS),
            required_text(&args, Self::PARAM_OUTPUT),
        ) else {
            return RunOutcome::Failure {
                error: "at least one parameter is not filled".to_string(),
            };
        };

        let request = JoinMetricsRequest {
            table_name,
            metrics,
            dataset,
            join_col_name: optional_text(&args, Self::PARAM_JOIN_COL),
            join_meta_name: optional_text(&args, Self::PARAM_JOIN_META),
            target_col_name: optional_text(&args, Self::PARAM_TARGET_COL),
            output_table_name,
        };
        match args.backend.table_join_metrics(&request).await {
            Ok(name) => RunOutcome::Success {
                outputs: HashMap::from([(
                    Self::OUT_TABLE.to_string(),
                    OutputBinding::Value(serde_json::json!(name)),
                )]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("metric join failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_engine::{InputValues, MockBackend};

    fn operator_with(metrics: Option<&str>, output: Option<&str>) -> chart_engine::Operator {
        let mut operator = AddTsColumn.metadata().instantiate(0, 0.0, 0.0).operator;
        for (name, value) in [
            (AddTsColumn::PARAM_METRICS, metrics),
            (AddTsColumn::PARAM_OUTPUT, output),
        ] {
            if let Some(value) = value {
                operator.parameter_mut(name).unwrap().value = Some(serde_json::json!(value));
            }
        }
        operator
    }

    fn wired_inputs() -> InputValues {
        let mut inputs = InputValues::new();
        inputs.insert(AddTsColumn::IN_TABLE, serde_json::json!("flights"));
        inputs.insert(AddTsColumn::IN_DS, serde_json::json!("sensors"));
        inputs
    }

    #[tokio::test]
    async fn test_join_request_carries_both_inputs() {
        let backend = MockBackend::new();
        let operator = operator_with(Some("speed;altitude"), Some("enriched"));

        let outcome = AddTsColumn
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &wired_inputs(),
                backend: &backend,
            })
            .await;
        match outcome {
            RunOutcome::Success { outputs } => {
                assert_eq!(
                    outputs[AddTsColumn::OUT_TABLE],
                    OutputBinding::Value(serde_json::json!("enriched"))
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
        let requests = backend.join_metrics_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].table_name, "flights");
        assert_eq!(requests[0].dataset, "sensors");
        assert_eq!(requests[0].metrics, "speed;altitude");
        // Unfilled join parameters default to empty
        assert_eq!(requests[0].join_col_name, "");
    }

    #[tokio::test]
    async fn test_missing_metrics_fails() {
        let backend = MockBackend::new();
        let operator = operator_with(None, Some("enriched"));

        let outcome = AddTsColumn
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &wired_inputs(),
                backend: &backend,
            })
            .await;
        assert!(matches!(outcome, RunOutcome::Failure { .. }));
        assert!(backend.join_metrics_requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dataset_input_stays_idle() {
        let backend = MockBackend::new();
        let operator = operator_with(Some("speed"), Some("enriched"));
        let mut inputs = InputValues::new();
        inputs.insert(AddTsColumn::IN_TABLE, serde_json::json!("flights"));

        let outcome = AddTsColumn
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend: &backend,
            })
            .await;
        assert!(matches!(outcome, RunOutcome::Idle));
    }
}
