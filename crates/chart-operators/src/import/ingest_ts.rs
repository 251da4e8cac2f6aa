//! Import TS operator
//!
//! Starts a backend ingestion session and polls it until the session
//! reaches a terminal status. Unlike remote jobs, a session can complete
//! with only part of the items imported, so the final progress is the
//! reported import rate rather than a flat 100%.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chart_engine::backend::IngestRequest;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OutputBinding,
    Parameter, PollOutcome, RunOutcome,
};

pub struct IngestTs;

impl IngestTs {
    pub const OUT_TS_LIST: &'static str = "ts_list";
    pub const OUT_DATASET: &'static str = "dataset";
    pub const OUT_SUMMARY: &'static str = "summary";
    pub const PARAM_DATASET: &'static str = "dataset";
    pub const PARAM_DESCRIPTION: &'static str = "description";
    pub const PARAM_ROOT_PATH: &'static str = "rootPath";
    pub const PARAM_PATH_PATTERN: &'static str = "pathPattern";
    pub const PARAM_FUNC_ID_PATTERN: &'static str = "funcIdPattern";

    const PARAMS: [&'static str; 5] = [
        Self::PARAM_DATASET,
        Self::PARAM_DESCRIPTION,
        Self::PARAM_ROOT_PATH,
        Self::PARAM_PATH_PATTERN,
        Self::PARAM_FUNC_ID_PATTERN,
    ];
}

/// Render the session record as sorted "key = value" lines
fn format_summary(details: &serde_json::Value) -> String {
    let Some(fields) = details.as_object() else {
        return String::new();
    };
    let sorted: BTreeMap<&String, &serde_json::Value> = fields.iter().collect();
    let mut summary = String::new();
    for (key, value) in sorted {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        summary.push_str(&format!("{key} = {rendered}\n"));
    }
    summary
}

fn param_text(args: &OperatorArgs<'_>, name: &str) -> Option<String> {
    let text = args.parameter_value(name)?.as_str()?.to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl OperatorBehavior for IngestTs {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 17,
            name: "IngestTS".to_string(),
            label: "Import TS".to_string(),
            description: "Import a TS dataset".to_string(),
            family: "Dataset Preparation/Import Export".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![],
            outputs: vec![
                Connector::new(Self::OUT_TS_LIST, "TS list", "ts_list"),
                Connector::new(Self::OUT_DATASET, "Dataset name", "ds_name"),
                Connector::new(Self::OUT_SUMMARY, "Import summary", "text"),
            ],
            parameters: vec![
                Parameter::new(Self::PARAM_DATASET, "Dataset name", "text")
                    .with_description("Name of the dataset to create"),
                Parameter::new(Self::PARAM_DESCRIPTION, "Description", "text")
                    .with_description("Description of the dataset"),
                Parameter::new(Self::PARAM_ROOT_PATH, "Root path", "text")
                    .with_description("Server-side root path of the files to import"),
                Parameter::new(Self::PARAM_PATH_PATTERN, "Path mapping rule", "text")
                    .with_description("Regex extracting tags from each file path"),
                Parameter::new(Self::PARAM_FUNC_ID_PATTERN, "FuncId pattern", "text")
                    .with_description("Pattern building the functional id from the tags"),
            ],
        }
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        let fields = Self::PARAMS.map(|name| param_text(&args, name));
        if fields.iter().any(Option::is_none) {
            return RunOutcome::Failure {
                error: "all parameters are mandatory".to_string(),
            };
        }
        let [dataset, description, root_path, path_pattern, func_id_pattern] =
            fields.map(Option::unwrap_or_default);
        let request = IngestRequest {
            dataset,
            description,
            root_path,
            path_pattern,
            func_id_pattern,
        };

        match args.backend.ingest_start(&request).await {
            Ok(pid) => {
                log::info!("ingestion session {pid} started for dataset {}", request.dataset);
                RunOutcome::Pending { pid }
            }
            Err(e) => RunOutcome::Failure {
                error: format!("ingestion session creation failed: {e}"),
            },
        }
    }

    async fn poll(&self, args: OperatorArgs<'_>) -> PollOutcome {
        let Some(pid) = args.operator.pid.clone() else {
            return PollOutcome::Failure {
                progress: 100,
                error: "no ingestion session attached".to_string(),
            };
        };
        let report = match args.backend.ingest_status(&pid).await {
            Ok(report) => report,
            Err(e) => {
                return PollOutcome::Failure {
                    progress: 100,
                    error: format!("ingestion status read failed: {e}"),
                }
            }
        };
        let rate = report.rate_of_imported_items.unwrap_or(0);

        match report.session_status.as_str() {
            "CREATED" | "ANALYSED" | "DATASET_REGISTERED" | "CLEANSING_PASSES" | "RUNNING"
            | "IMPORTED" => PollOutcome::Running { progress: rate },
            "COMPLETED" => {
                let dataset = args
                    .parameter_value(Self::PARAM_DATASET)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                match args.backend.dataset_read(&dataset).await {
                    Ok(content) => PollOutcome::Success {
                        progress: rate,
                        outputs: HashMap::from([
                            (
                                Self::OUT_TS_LIST.to_string(),
                                OutputBinding::Value(serde_json::json!(content.ts_list)),
                            ),
                            (
                                Self::OUT_DATASET.to_string(),
                                OutputBinding::Value(serde_json::json!(dataset)),
                            ),
                            (
                                Self::OUT_SUMMARY.to_string(),
                                OutputBinding::Value(serde_json::json!(format_summary(
                                    &report.details
                                ))),
                            ),
                        ]),
                    },
                    Err(e) => PollOutcome::Failure {
                        progress: rate,
                        error: format!("imported dataset '{dataset}' unreadable: {e}"),
                    },
                }
            }
            "CANCELLED" => PollOutcome::Failure {
                progress: rate.max(10),
                error: "ingestion session cancelled".to_string(),
            },
            "ERROR" => PollOutcome::Failure {
                progress: rate.max(10),
                error: "ingestion session ended in error".to_string(),
            },
            other => PollOutcome::Failure {
                progress: 100,
                error: format!("unexpected ingestion status '{other}'"),
            },
        }
    }
}
