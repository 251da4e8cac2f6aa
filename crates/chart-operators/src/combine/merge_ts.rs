//! Merge TS lists operator
//!
//! Concatenates two time-series lists into one, de-duplicated by tsuid.
//! When the same tsuid appears in both inputs, the second list's
//! functional id wins.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::TsRef;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OutputBinding,
    RunOutcome,
};

pub struct MergeTs;

impl MergeTs {
    pub const IN_TS_1: &'static str = "TS_1";
    pub const IN_TS_2: &'static str = "TS_2";
    pub const OUT_MERGED: &'static str = "Merged";
}

fn parse_list(input: Option<&serde_json::Value>) -> Vec<TsRef> {
    input
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

/// Merge two lists, keeping first-seen order and last-seen func_id per tsuid
fn merge(first: Vec<TsRef>, second: Vec<TsRef>) -> Vec<TsRef> {
    let mut merged: Vec<TsRef> = Vec::with_capacity(first.len() + second.len());
    let mut index_by_tsuid: HashMap<String, usize> = HashMap::new();
    for entry in first.into_iter().chain(second) {
        match index_by_tsuid.get(&entry.tsuid) {
            Some(&i) => merged[i].func_id = entry.func_id,
            None => {
                index_by_tsuid.insert(entry.tsuid.clone(), merged.len());
                merged.push(entry);
            }
        }
    }
    merged
}

#[async_trait]
impl OperatorBehavior for MergeTs {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 5,
            name: "Merge TS lists".to_string(),
            label: "Merge TS lists".to_string(),
            description: "Merge 2 TS lists into 1".to_string(),
            family: "Dataset Preparation/Dataset Management".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![
                Connector::new(Self::IN_TS_1, "TS list 1", "ts_list"),
                Connector::new(Self::IN_TS_2, "TS list 2", "ts_list"),
            ],
            outputs: vec![Connector::new(Self::OUT_MERGED, "Merged TS list", "ts_list")],
            parameters: vec![],
        }
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let first = parse_list(args.inputs.get(Self::IN_TS_1));
        let second = parse_list(args.inputs.get(Self::IN_TS_2));
        if first.is_empty() && second.is_empty() {
            return RunOutcome::Failure {
                error: "no TS list connected to either input".to_string(),
            };
        }
        let merged = merge(first, second);
        RunOutcome::Success {
            outputs: HashMap::from([(
                Self::OUT_MERGED.to_string(),
                OutputBinding::Value(serde_json::json!(merged)),
            )]),
        }
    }
}
