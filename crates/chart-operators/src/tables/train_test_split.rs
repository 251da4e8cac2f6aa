//! Train Test Split operator
//!
//! Splits a table into train and test tables, stratified on the target
//! column so both keep the class distribution of the original.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::TrainTestSplitRequest;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

use super::{name_input, required_text};

pub struct TrainTestSplit;

impl TrainTestSplit {
    pub const IN_TABLE: &'static str = "table";
    pub const OUT_TRAIN: &'static str = "trainTable";
    pub const OUT_TEST: &'static str = "testTable";
    pub const PARAM_TARGET: &'static str = "targetColumnName";
    pub const PARAM_RATE: &'static str = "repartitionRate";
    pub const PARAM_OUTPUT: &'static str = "outputTableName";
}

#[async_trait]
impl OperatorBehavior for TrainTestSplit {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 15,
            name: "Train Test Split".to_string(),
            label: "Train Test Split".to_string(),
            description: "Split a table into train and test tables".to_string(),
            family: "Processing On Tables".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![Connector::new(Self::IN_TABLE, "Table", "table")],
            outputs: vec![
                Connector::new(Self::OUT_TRAIN, "Train", "table"),
                Connector::new(Self::OUT_TEST, "Test", "table"),
            ],
            parameters: vec![
                Parameter::new(Self::PARAM_TARGET, "Target Column", "text")
                    .with_description("Column carrying the class to stratify on"),
                Parameter::new(Self::PARAM_RATE, "Repartition Rate", "number")
                    .with_description("Fraction of rows going to the train table")
                    .with_default(serde_json::json!(0.5)),
                Parameter::new(Self::PARAM_OUTPUT, "Output Table Name", "text")
                    .with_description("Base name of the tables to create"),
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
        let rate = args
            .parameter_value(Self::PARAM_RATE)
            .and_then(|v| v.as_f64());
        let (Some(target_column_name), Some(repartition_rate), Some(output_table_name)) = (
            required_text(&args, Self::PARAM_TARGET),
            rate,
            required_text(&args, Self::PARAM_OUTPUT),
        ) else {
            return RunOutcome::Failure {
                error: "at least one parameter is not filled".to_string(),
            };
        };

        let request = TrainTestSplitRequest {
            table_name,
            target_column_name,
            repartition_rate,
            output_table_name,
        };
        match args.backend.table_train_test_split(&request).await {
            Ok((train, test)) => RunOutcome::Success {
                outputs: HashMap::from([
                    (
                        Self::OUT_TRAIN.to_string(),
                        OutputBinding::Value(serde_json::json!(train)),
                    ),
                    (
                        Self::OUT_TEST.to_string(),
                        OutputBinding::Value(serde_json::json!(test)),
                    ),
                ]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("train/test split failed: {e}"),
            },
        }
    }
}
