//! Operators combining several time-series lists

pub mod merge_ts;

pub use merge_ts::MergeTs;
