//! TS Finder operator
//!
//! Looks up time series by functional identifier pattern across the whole
//! backend, without going through a dataset first. `*` in the pattern
//! matches any span of characters; matching is case-insensitive unless
//! the case parameter says otherwise.

use std::collections::HashMap;

use async_trait::async_trait;
use chart_engine::backend::TsRef;
use chart_engine::{
    Connector, OperatorArgs, OperatorBehavior, OperatorKind, OperatorMetadata, OperatorUpdate,
    OutputBinding, Parameter, RunOutcome,
};

pub struct TsFinder;

impl TsFinder {
    pub const OUT_TS: &'static str = "out";
    pub const PARAM_PATTERN: &'static str = "pattern";
    pub const PARAM_CASE: &'static str = "case";
}

/// Wildcard match of `pattern` against `source`
///
/// Segments between `*` must appear in order. Without a leading `*` the
/// first segment is anchored at the start, without a trailing `*` the
/// last one at the end.
fn wildcard_match(pattern: &str, source: &str, case_sensitive: bool) -> bool {
    let (pattern, source) = if case_sensitive {
        (pattern.to_string(), source.to_string())
    } else {
        (pattern.to_lowercase(), source.to_lowercase())
    };
    let parts: Vec<&str> = pattern.split('*').collect();
    if let [only] = parts.as_slice() {
        return source == *only;
    }
    let (first, rest) = parts.split_first().unwrap();
    let (last, middle) = rest.split_last().unwrap();

    let Some(mut remaining) = source.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match remaining.find(part) {
            Some(i) => remaining = &remaining[i + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

#[async_trait]
impl OperatorBehavior for TsFinder {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            op_id: 9,
            name: "TSFinder".to_string(),
            label: "TS Finder".to_string(),
            description: "Find TS by functional identifier pattern".to_string(),
            family: "Dataset Preparation/Data Selection".to_string(),
            kind: OperatorKind::Local,
            inputs: vec![],
            outputs: vec![Connector::new(Self::OUT_TS, "TS list", "ts_list")],
            parameters: vec![
                Parameter::new(Self::PARAM_PATTERN, "Pattern", "text")
                    .with_description("Functional identifier pattern to find (* is a wildcard)")
                    .with_default(serde_json::json!("")),
                Parameter::new(Self::PARAM_CASE, "Case sensitive", "bool")
                    .with_default(serde_json::json!(false)),
            ],
        }
    }

    async fn init(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
        OperatorUpdate::idle()
    }

    async fn on_connection_update(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
        OperatorUpdate::idle()
    }

    async fn run(&self, args: OperatorArgs<'_>) -> RunOutcome {
        // An empty pattern matches everything
        let pattern = args
            .parameter_value(Self::PARAM_PATTERN)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("*")
            .to_string();
        let case_sensitive = args
            .parameter_value(Self::PARAM_CASE)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match args.backend.fid_list().await {
            Ok(refs) => {
                let matched: Vec<TsRef> = refs
                    .into_iter()
                    .filter(|r| wildcard_match(&pattern, &r.func_id, case_sensitive))
                    .collect();
                log::info!("{} TS matching pattern '{pattern}'", matched.len());
                RunOutcome::Success {
                    outputs: HashMap::from([(
                        Self::OUT_TS.to_string(),
                        OutputBinding::Value(serde_json::json!(matched)),
                    )]),
                }
            }
            Err(e) => RunOutcome::Failure {
                error: format!("functional identifier lookup failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_engine::{InputValues, MockBackend};

    fn fid(name: &str) -> TsRef {
        TsRef {
            tsuid: format!("tsuid_{name}"),
            func_id: name.to_string(),
        }
    }

    async fn run(backend: &MockBackend, pattern: &str, case_sensitive: bool) -> RunOutcome {
        let mut operator = TsFinder.metadata().instantiate(0, 0.0, 0.0).operator;
        operator
            .parameter_mut(TsFinder::PARAM_PATTERN)
            .unwrap()
            .value = Some(serde_json::json!(pattern));
        operator.parameter_mut(TsFinder::PARAM_CASE).unwrap().value =
            Some(serde_json::json!(case_sensitive));
        let inputs = InputValues::new();
        TsFinder
            .run(OperatorArgs {
                node_id: 0,
                operator: &operator,
                inputs: &inputs,
                backend,
            })
            .await
    }

    fn matched(outcome: RunOutcome) -> Vec<TsRef> {
        match outcome {
            RunOutcome::Success { outputs } => {
                let OutputBinding::Value(list) = &outputs[TsFinder::OUT_TS] else {
                    panic!("expected a direct value");
                };
                serde_json::from_value(list.clone()).unwrap()
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(wildcard_match("*", "anything", false));
        assert!(wildcard_match("AF84_*", "af84_speed", false));
        assert!(!wildcard_match("AF84_*", "af85_speed", false));
        assert!(wildcard_match("*_speed", "af84_speed", false));
        assert!(!wildcard_match("*_speed", "af84_speed_raw", false));
        assert!(wildcard_match("af*sp*ed", "af84_speed", false));
        // Exact match when no wildcard at all
        assert!(wildcard_match("af84_speed", "af84_speed", false));
        assert!(!wildcard_match("af84", "af84_speed", false));
    }

    #[test]
    fn test_case_sensitivity_flag() {
        assert!(wildcard_match("AF84*", "af84_speed", false));
        assert!(!wildcard_match("AF84*", "af84_speed", true));
        assert!(wildcard_match("af84*", "af84_speed", true));
    }

    #[tokio::test]
    async fn test_pattern_narrows_fid_list() {
        let backend = MockBackend::new().with_fid_list(vec![
            fid("AF84_speed"),
            fid("AF84_altitude"),
            fid("BA12_speed"),
        ]);
        let found = matched(run(&backend, "af84_*", false).await);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.func_id.starts_with("AF84")));
    }

    #[tokio::test]
    async fn test_empty_pattern_matches_everything() {
        let backend = MockBackend::new().with_fid_list(vec![fid("a"), fid("b")]);
        let found = matched(run(&backend, "", false).await);
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_success() {
        let backend = MockBackend::new().with_fid_list(vec![fid("AF84_speed")]);
        let found = matched(run(&backend, "ZZ*", false).await);
        assert!(found.is_empty());
    }
}
