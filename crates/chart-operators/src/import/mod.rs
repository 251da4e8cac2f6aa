//! Operators bringing external data into the backend

pub mod ingest_ts;

pub use ingest_ts::IngestTs;
