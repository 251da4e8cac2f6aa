//! Operators persisting results back to the backend

pub mod save_dataset;

pub use save_dataset::SaveDataset;
