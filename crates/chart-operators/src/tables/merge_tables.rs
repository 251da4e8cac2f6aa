//! Merge Tables operator
//!
//! Joins two tables into a new one. The join column is optional: left
//! empty, the service joins on the first column of each table.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::MergeTablesRequest;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

use super::{name_input, optional_text, required_text};

pub struct MergeTables;

impl MergeTables {
    pub const IN_TABLE1: &'static str = "table1";
    pub const IN_TABLE2: &'static str = "table2";
    pub const OUT_TABLE: &'static str = "outputTable";
    pub const PARAM_JOIN_ON: &'static str = "joinOn";
    pub const PARAM_OUTPUT: &'static str = "outputTableName";
}

#[async_trait]
impl OperatorBehavior for MergeTables {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 16,
            name: "Merge Tables".to_string(),
            label: "Merge Tables".to_string(),
            description: "Join two tables into a new one".to_string(),
            family: "Processing On Tables".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![
                Connector::new(Self::IN_TABLE1, "Table 1", "table"),
                Connector::new(Self::IN_TABLE2, "Table 2", "table"),
            ],
            outputs: vec![Connector::new(Self::OUT_TABLE, "Table 3", "table")],
            parameters: vec![
                Parameter::new(Self::PARAM_JOIN_ON, "Join On", "text")
                    .with_description("Join column; empty joins on the first column")
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
        let table1 = match name_input(&args, Self::IN_TABLE1) {
            Ok(Some(name)) => name,
            Ok(None) => return RunOutcome::Idle,
            Err(error) => return RunOutcome::Failure { error },
        };
        let table2 = match name_input(&args, Self::IN_TABLE2) {
            Ok(Some(name)) => name,
            Ok(None) => return RunOutcome::Idle,
            Err(error) => return RunOutcome::Failure { error },
        };
        let Some(output_table_name) = required_text(&args, Self::PARAM_OUTPUT) else {
            return RunOutcome::Failure {
                error: "Output Table is not filled".to_string(),
            };
        };

        let request = MergeTablesRequest {
            table1,
            table2,
            join_on: optional_text(&args, Self::PARAM_JOIN_ON),
            output_table_name,
        };
        match args.backend.table_merge(&request).await {
            Ok(name) => RunOutcome::Success {
                outputs: HashMap::from([(
                    Self::OUT_TABLE.to_string(),
                    OutputBinding::Value(serde_json::json!(name)),
                )]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("table merge failed: {e}"),
            },
        }
    }
}
