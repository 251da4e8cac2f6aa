//! Data selection operators

pub mod dataset_selection;
pub mod filter;
pub mod manual_selection;
pub mod ts_finder;

pub use dataset_selection::DatasetSelection;
pub use filter::Filter;
pub use manual_selection::ManualSelection;
pub use ts_finder::TsFinder;
