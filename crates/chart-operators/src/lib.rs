//! Chart Operators - built-in local operators for the chart engine
//!
//! Each operator implements [`chart_engine::OperatorBehavior`] and is
//! wired into an [`OperatorRegistry`] through [`builtin_registry`].
//! Remote (catalog) operators are not defined here; the engine drives
//! those through its generic job submit/poll path.
//!
//! # Categories
//!
//! - **selection**: pick datasets and narrow time-series lists
//!   (Dataset Selection, Filter, Manual Selection, TS Finder)
//! - **combine**: merge several lists into one (Merge TS lists)
//! - **export**: persist results as datasets (Save as dataset)
//! - **import**: ingest external files as new datasets (IngestTS)
//! - **tables**: build and transform backend tables (Read Table,
//!   Ts2Feature, Add TS Column, Train Test Split, Merge Tables)

use std::sync::Arc;

use chart_engine::OperatorRegistry;

pub mod combine;
pub mod export;
pub mod import;
pub mod selection;
pub mod tables;

pub use combine::MergeTs;
pub use export::SaveDataset;
pub use import::IngestTs;
pub use selection::{DatasetSelection, Filter, ManualSelection, TsFinder};
pub use tables::{AddTsColumn, MergeTables, ReadTable, TrainTestSplit, Ts2Feature};

/// Build a registry holding every built-in operator
pub fn builtin_registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry.register(Arc::new(DatasetSelection));
    registry.register(Arc::new(Filter));
    registry.register(Arc::new(ManualSelection));
    registry.register(Arc::new(TsFinder));
    registry.register(Arc::new(MergeTs));
    registry.register(Arc::new(SaveDataset));
    registry.register(Arc::new(IngestTs));
    registry.register(Arc::new(ReadTable));
    registry.register(Arc::new(Ts2Feature));
    registry.register(Arc::new(AddTsColumn));
    registry.register(Arc::new(TrainTestSplit));
    registry.register(Arc::new(MergeTables));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_complete() {
        let registry = builtin_registry();
        assert_eq!(registry.operator_names().len(), 12);
        for name in [
            "Dataset Selection",
            "Filter",
            "Manual Selection",
            "TSFinder",
            "Merge TS lists",
            "Save as dataset",
            "IngestTS",
            "Read Table",
            "Ts2Feature",
            "Add TS Column",
            "Train Test Split",
            "Merge Tables",
        ] {
            assert!(registry.has_operator(name), "missing operator '{name}'");
            assert!(
                registry.get_behavior(name).is_some(),
                "operator '{name}' has no behavior"
            );
        }
    }

    #[test]
    fn test_op_ids_are_unique() {
        let registry = builtin_registry();
        let mut ids: Vec<i64> = registry.all_metadata().iter().map(|m| m.op_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }
}
