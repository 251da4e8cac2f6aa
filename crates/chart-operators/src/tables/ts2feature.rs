//! Ts2Feature operator
//!
//! Turns a population table into a feature table: observations sharing a
//! population identifier are aggregated along the chosen metadata, one
//! feature column per (metric, aggregation) pair.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::Ts2FeatureRequest;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

use super::{name_input, required_text};

pub struct Ts2Feature;

impl Ts2Feature {
    pub const IN_TABLE: &'static str = "table";
    pub const OUT_TABLE: &'static str = "table";
    pub const PARAM_POPULATION: &'static str = "pop_name";
    pub const PARAM_AGGREGATED_BY: &'static str = "aggregated_by";
    pub const PARAM_OUTPUT: &'static str = "output_table_name";
}

#[async_trait]
impl OperatorBehavior for Ts2Feature {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 12,
            name: "Ts2Feature".to_string(),
            label: "Ts2Feature".to_string(),
            description: "Transform a population of TS into a feature table".to_string(),
            family: "Pre-Processing On Ts/Transforming".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![Connector::new(Self::IN_TABLE, "Table", "table")],
            outputs: vec![Connector::new(Self::OUT_TABLE, "Table", "table")],
            parameters: vec![
                Parameter::new(Self::PARAM_POPULATION, "Population ID", "text")
                    .with_description("Identifier of the population to aggregate"),
                Parameter::new(Self::PARAM_AGGREGATED_BY, "Aggregated by", "text")
                    .with_description("Metadata name the observations are aggregated by"),
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
        let (Some(population_id), Some(meta_name), Some(output_table_name)) = (
            required_text(&args, Self::PARAM_POPULATION),
            required_text(&args, Self::PARAM_AGGREGATED_BY),
            required_text(&args, Self::PARAM_OUTPUT),
        ) else {
            return RunOutcome::Failure {
                error: "at least one parameter is not filled".to_string(),
            };
        };

        let request = Ts2FeatureRequest {
            table_name,
            meta_name,
            population_id,
            output_table_name,
        };
        match args.backend.table_ts2feature(&request).await {
            Ok(name) => RunOutcome::Success {
                outputs: HashMap::from([(
                    Self::OUT_TABLE.to_string(),
                    OutputBinding::Value(serde_json::json!(name)),
                )]),
            },
            Err(e) => RunOutcome::Failure {
                error: format!("feature extraction failed: {e}"),
            },
        }
    }
}
