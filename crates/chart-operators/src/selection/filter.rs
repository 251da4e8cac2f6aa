//! Filter operator
//!
//! Narrows a time-series list by metadata criteria, delegating the match
//! to the backend's filtering endpoint. Date-typed criteria values are
//! converted to epoch milliseconds before the call (unless the comparator
//! is a "like" pattern, which stays textual).

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::{MetadataCriterion, TsFilterRequest, TsRef};
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome, RunState,
};

pub struct Filter;

impl Filter {
    pub const IN_TS: &'static str = "TS";
    pub const OUT_TS: &'static str = "TS";
    pub const OUT_RATIO: &'static str = "Ratio";
    pub const PARAM_CRITERIA: &'static str = "Criteria";

    /// Decimal places kept in the ratio output
    const RATIO_PRECISION: i32 = 3;
}

/// Convert a date criterion value to epoch milliseconds
///
/// Accepts a raw timestamp (digits) or a parsable "YYYY-MM-DD[ HH:MM:SS]"
/// string. Unparsable values pass through unchanged.
fn date_criterion_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
        return value.to_string();
    }
    let parsed = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        });
    match parsed {
        Ok(dt) => dt.and_utc().timestamp_millis().to_string(),
        Err(_) => {
            log::error!("cannot parse date criterion value '{value}'");
            value.to_string()
        }
    }
}

/// Build the criteria list from the parameter value and its metadata types
fn build_criteria(
    value: &serde_json::Value,
    metadata_types: Option<&serde_json::Value>,
) -> Vec<MetadataCriterion> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let name = entry
                .get("meta_name")
                .or_else(|| entry.get("metadataName"))?
                .as_str()?
                .to_string();
            let comparator = entry
                .get("comparator")
                .and_then(|c| c.as_str())
                .unwrap_or("=")
                .to_string();
            let mut criterion_value = match entry.get("value") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let is_date = metadata_types
                .and_then(|types| types.get(&name))
                .and_then(|t| t.as_str())
                == Some("date");
            if is_date && !comparator.contains("like") {
                criterion_value = date_criterion_value(&criterion_value);
            }
            Some(MetadataCriterion {
                metadata_name: name,
                comparator,
                value: criterion_value,
            })
        })
        .collect()
}

#[async_trait]
impl OperatorBehavior for Filter {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 2,
            name: "Filter".to_string(),
            label: "Filter".to_string(),
            description: "Filter TS using metadata".to_string(),
            family: "Dataset Preparation/Data Selection".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![Connector::new(Self::IN_TS, "TS list", "ts_list")],
            outputs: vec![
                Connector::new(Self::OUT_TS, "TS list", "ts_list"),
                Connector::new(Self::OUT_RATIO, "Ratio", "percentage"),
            ],
            parameters: vec![Parameter::new(Self::PARAM_CRITERIA, "Criteria", "md_filter")
                .with_description("Filter the input data according to meta-data")
                .with_default(serde_json::json!([{}]))
                .auto_run()],
        }
    }

    async fn init(&self, args: OperatorArgs<'_>) -> OperatorUpdate {
        match args.backend.metadata_types().await {
            Ok(types) => {
                OperatorUpdate::none().with_domain(Self::PARAM_CRITERIA, serde_json::json!(types))
            }
            Err(e) => {
                log::error!("impossible to get the metadata list: {e}");
                OperatorUpdate::none().with_state(100, RunState::Failure)
            }
        }
    }

    async fn on_connection_update(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
        OperatorUpdate::idle()
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let input = args.inputs.get(Self::IN_TS);

        // The upstream output is either a TS list or a bare dataset name
        let (ds_name, ts_list): (String, Vec<TsRef>) = match input {
            None | Some(serde_json::Value::Null) => return RunOutcome::Idle,
            Some(serde_json::Value::String(name)) => (name.clone(), Vec::new()),
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(list) => (String::new(), list),
                Err(e) => {
                    return RunOutcome::Failure {
                        error: format!("malformed TS list input: {e}"),
                    }
                }
            },
        };
        if ds_name.is_empty() && ts_list.is_empty() {
            return RunOutcome::Idle;
        }

        let criteria = build_criteria(
            args.parameter_value(Self::PARAM_CRITERIA)
                .unwrap_or(&serde_json::Value::Null),
            args.parameter_domain(Self::PARAM_CRITERIA),
        );
        let input_len = ts_list.len();
        let request = TsFilterRequest {
            ds_name,
            ts_list,
            criteria,
        };

        match args.backend.ts_filter(&request).await {
            Ok(filtered) => {
                let scale = 10f64.powi(Self::RATIO_PRECISION);
                let ratio = if input_len > 0 {
                    ((scale * filtered.len() as f64 / input_len as f64).trunc()) / scale
                } else {
                    0.0
                };
                log::info!("{} TS filtered out of {input_len}", filtered.len());
                RunOutcome::Success {
                    outputs: HashMap::from([
                        (
                            Self::OUT_TS.to_string(),
                            OutputBinding::Value(serde_json::json!(filtered)),
                        ),
                        (
                            Self::OUT_RATIO.to_string(),
                            OutputBinding::Value(serde_json::json!(ratio)),
                        ),
                    ]),
                }
            }
            Err(e) => RunOutcome::Failure {
                error: format!("time-series filtering failed: {e}"),
            },
        }
    }
}
