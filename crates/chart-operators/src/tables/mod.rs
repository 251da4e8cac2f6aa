//! Operators working on backend tables
//!
//! Tables flow between nodes as their backend name: each operator hands
//! that name to a table endpoint and emits the name of the table the
//! service produced.

pub mod add_ts_column;
pub mod merge_tables;
pub mod read_table;
pub mod train_test_split;
pub mod ts2feature;

pub use add_ts_column::AddTsColumn;
pub use merge_tables::MergeTables;
pub use read_table::ReadTable;
pub use train_test_split::TrainTestSplit;
pub use ts2feature::Ts2Feature;

use chart_engine::OperatorArgs;

/// A mandatory text parameter: `None` when missing or blank
fn required_text(args: &OperatorArgs<'_>, name: &str) -> Option<String> {
    args.parameter_value(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// An optional text parameter, defaulting to empty
fn optional_text(args: &OperatorArgs<'_>, name: &str) -> String {
    required_text(args, name).unwrap_or_default()
}

/// Read a name-valued input connector
///
/// `Ok(None)` when the input is unconnected or has no value yet.
fn name_input(args: &OperatorArgs<'_>, name: &str) -> Result<Option<String>, String> {
    match args.inputs.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) if value.is_empty() => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(format!("input '{name}' is not a name: {other}")),
    }
}
