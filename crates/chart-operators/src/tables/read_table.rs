//! Read Table operator
//!
//! Entry point of a table workflow: verifies the named table exists on
//! the backend, then emits its name for the downstream table operators.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

use super::required_text;

pub struct ReadTable;

impl ReadTable {
    pub const OUT_TABLE: &'static str = "table";
    pub const PARAM_NAME: &'static str = "name";
}

#[async_trait]
impl OperatorBehavior for ReadTable {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 14,
            name: "Read Table".to_string(),
            label: "Read Table".to_string(),
            description: "Read an existing table".to_string(),
            family: "Processing On Tables".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![],
            outputs: vec![Connector::new(Self::OUT_TABLE, "Table", "table")],
            parameters: vec![Parameter::new(Self::PARAM_NAME, "Table Name", "text")
                .with_description("Name of the table to read")
                .with_default(serde_json::json!(""))],
        }
    }

    async fn init(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
        OperatorUpdate::idle()
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let Some(name) = required_text(&args, Self::PARAM_NAME) else {
            return RunOutcome::Failure {
                error: "parameter name is required".to_string(),
            };
        };
        match args.backend.table_read(&name).await {
            Ok(_) => RunOutcome::Success {
                outputs: HashMap::from([(
                    Self::OUT_TABLE.to_string(),
                    OutputBinding::Value(serde_json::json!(name)),
                )]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("table '{name}' cannot be read: {e}"),
            },
        }
    }
}
