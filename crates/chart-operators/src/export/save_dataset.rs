//! Save as dataset operator
//!
//! Persists the incoming time-series list as a named dataset, passing the
//! list through so the workflow can continue downstream.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::TsRef;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome, RunState,
};

pub struct SaveDataset;

impl SaveDataset {
    pub const IN_TS_LIST: &'static str = "ts_list";
    pub const OUT_TS_LIST: &'static str = "ts_list";
    pub const OUT_DS: &'static str = "ds";
    pub const PARAM_LIST: &'static str = "List";
    pub const PARAM_NAME: &'static str = "Name";
    pub const PARAM_DESCRIPTION: &'static str = "Description";
}

#[async_trait]
impl OperatorBehavior for SaveDataset {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 4,
            name: "Save as dataset".to_string(),
            label: "Save as dataset".to_string(),
            description: "Save a list of TS as a new Dataset".to_string(),
            family: "Dataset Preparation/Dataset Management".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![Connector::new(Self::IN_TS_LIST, "TS list", "ts_list")],
            outputs: vec![
                Connector::new(Self::OUT_TS_LIST, "TS list", "ts_list"),
                Connector::new(Self::OUT_DS, "DS name", "ds_name"),
            ],
            parameters: vec![
                Parameter::new(Self::PARAM_LIST, "TS List", "ts_selection")
                    .with_description("Select the TS to save"),
                Parameter::new(Self::PARAM_NAME, "Dataset Name", "text")
                    .with_description("Name of the dataset to create")
                    .with_default(serde_json::json!("")),
                Parameter::new(Self::PARAM_DESCRIPTION, "Description", "text")
                    .with_description("Description of the dataset to create")
                    .with_default(serde_json::json!("")),
            ],
        }
    }

    async fn init(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        let input = args
            .inputs
            .get(Self::IN_TS_LIST)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let mut update = OperatorUpdate::none()
            .with_domain(Self::PARAM_LIST, input.clone())
            .with_state(100, RunState::Idle);
        update
            .param_values
            .insert(Self::PARAM_LIST.to_string(), Some(input));
        update
    }

    async fn on_connection_update(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        self.init(args).await
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let ts_list: Vec<TsRef> = match args.inputs.get(Self::IN_TS_LIST) {
            None | Some(serde_json::Value::Null) => return RunOutcome::Idle,
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(list) => list,
                Err(e) => {
                    return RunOutcome::Failure {
                        error: format!("malformed TS list input: {e}"),
                    }
                }
            },
        };
        if ts_list.is_empty() {
            return RunOutcome::Idle;
        }

        let name = args
            .parameter_value(Self::PARAM_NAME)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            return RunOutcome::Failure {
                error: "a dataset name is mandatory".to_string(),
            };
        }
        let description = args
            .parameter_value(Self::PARAM_DESCRIPTION)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        match args.backend.save_dataset(&name, &description, &ts_list).await {
            Ok(()) => {
                log::info!("dataset {name} created ({} TS)", ts_list.len());
                RunOutcome::Success {
                    outputs: HashMap::from([
                        (
                            Self::OUT_TS_LIST.to_string(),
                            OutputBinding::Value(serde_json::json!(ts_list)),
                        ),
                        (
                            Self::OUT_DS.to_string(),
                            OutputBinding::Value(serde_json::json!(name)),
                        ),
                    ]),
                }
            }
            Err(e) => RunOutcome::Failure {
                error: format!("dataset creation failed: {e}"),
            },
        }
    }
}
