//! Backend collaborator interface
//!
//! The engine treats the backend as an opaque service exposing the small
//! set of operation contracts it needs: the type compatibility matrix, the
//! operator catalog, job submit/status/results, and the dataset and
//! time-series endpoints the built-in operators call. Implementations:
//! [`http::HttpBackend`] for the real service, and a scripted
//! [`mock::MockBackend`] for tests (behind the `test-support` feature).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ProcessId;

pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

/// Status of a submitted backend job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// Job accepted, not yet scheduled
    Init,
    /// Job executing
    Run,
    /// Job completed, results available
    AlgoOk,
    /// Job completed with an algorithm error
    AlgoKo,
    /// Execution engine failed
    EngineKo,
    /// Unrecognized status, treated as terminal failure
    Other(String),
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "INIT" => JobStatus::Init,
            "RUN" => JobStatus::Run,
            "ALGO_OK" => JobStatus::AlgoOk,
            "ALGO_KO" => JobStatus::AlgoKo,
            "ENGINE_KO" => JobStatus::EngineKo,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Init => "INIT".to_string(),
            JobStatus::Run => "RUN".to_string(),
            JobStatus::AlgoOk => "ALGO_OK".to_string(),
            JobStatus::AlgoKo => "ALGO_KO".to_string(),
            JobStatus::EngineKo => "ENGINE_KO".to_string(),
            JobStatus::Other(s) => s,
        }
    }
}

/// Handle returned by a job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub pid: ProcessId,
    pub status: JobStatus,
}

/// One poll of a job's status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    /// Start time reported by the server (epoch seconds)
    #[serde(default)]
    pub start_date: Option<i64>,
    /// Run duration in seconds, once the server knows it
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One entry of a completed job's result list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Resource id to bind onto an output connector
    pub rid: String,
    pub data_type: String,
    pub name: String,
}

/// Catalog description of a remote operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOperator {
    pub id: i64,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub inputs: Vec<CatalogConnector>,
    #[serde(default)]
    pub parameters: Vec<CatalogParameter>,
    #[serde(default)]
    pub outputs: Vec<CatalogConnector>,
}

/// A connector declaration from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConnector {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// A parameter declaration from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogParameter {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub domain: Option<serde_json::Value>,
}

/// Reference to one time series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsRef {
    pub tsuid: String,
    pub func_id: String,
}

/// Summary entry of the dataset list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Content of one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetContent {
    pub ts_list: Vec<TsRef>,
}

/// One metadata criterion of a time-series filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCriterion {
    pub metadata_name: String,
    pub comparator: String,
    pub value: String,
}

/// Request for the time-series filtering endpoint
///
/// Either `ds_name` or `ts_list` scopes the search; `criteria` narrows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsFilterRequest {
    #[serde(default)]
    pub ds_name: String,
    #[serde(default)]
    pub ts_list: Vec<TsRef>,
    #[serde(default)]
    pub criteria: Vec<MetadataCriterion>,
}

/// Request for the feature extraction table endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ts2FeatureRequest {
    pub table_name: String,
    /// Metadata the observations are aggregated by
    pub meta_name: String,
    pub population_id: String,
    pub output_table_name: String,
}

/// Request to join metric time series onto a table as new columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMetricsRequest {
    pub table_name: String,
    /// Semicolon-separated metric names to join
    pub metrics: String,
    pub dataset: String,
    #[serde(default)]
    pub join_col_name: String,
    #[serde(default)]
    pub join_meta_name: String,
    #[serde(default)]
    pub target_col_name: String,
    pub output_table_name: String,
}

/// Request to split a table into train and test parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainTestSplitRequest {
    pub table_name: String,
    pub target_column_name: String,
    /// Fraction of rows going to the train table, in (0, 1)
    pub repartition_rate: f64,
    pub output_table_name: String,
}

/// Request to merge two tables on a join column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeTablesRequest {
    pub table1: String,
    pub table2: String,
    /// Empty joins on the first column of each table
    #[serde(default)]
    pub join_on: String,
    pub output_table_name: String,
}

/// Request to start an ingestion session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub dataset: String,
    pub description: String,
    pub root_path: String,
    pub path_pattern: String,
    pub func_id_pattern: String,
}

/// One poll of an ingestion session's status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatusReport {
    pub session_status: String,
    /// Percentage of items imported so far
    #[serde(default)]
    pub rate_of_imported_items: Option<u8>,
    /// Full session record, formatted into the summary output
    #[serde(default)]
    pub details: serde_json::Value,
}

/// The backend service contract
///
/// Every call is asynchronous; errors come back as `ChartError::Backend`
/// (or `Http` from the reqwest implementation). The engine never lets
/// these cross into the graph as panics or partial mutations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the type compatibility matrix (once per session)
    async fn type_compatibility(&self) -> Result<HashMap<String, Vec<String>>>;

    /// Read a remote operator's full catalog entry
    async fn read_operator(&self, name: &str) -> Result<CatalogOperator>;

    /// Submit a job for a remote operator
    async fn submit_job(
        &self,
        op_id: i64,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<JobHandle>;

    /// Poll a job's status
    async fn job_status(&self, pid: &ProcessId) -> Result<JobStatusReport>;

    /// Fetch the ordered result list of a completed job
    async fn job_results(&self, pid: &ProcessId) -> Result<Vec<JobResult>>;

    /// Fetch a result's raw payload by resource id
    async fn result_payload(&self, rid: &str) -> Result<serde_json::Value>;

    /// List all datasets
    async fn dataset_list(&self) -> Result<Vec<DatasetSummary>>;

    /// Read one dataset's content
    async fn dataset_read(&self, name: &str) -> Result<DatasetContent>;

    /// Filter time series by metadata criteria
    ///
    /// No matches yields an empty list, not an error.
    async fn ts_filter(&self, request: &TsFilterRequest) -> Result<Vec<TsRef>>;

    /// Map of metadata name to metadata type
    async fn metadata_types(&self) -> Result<HashMap<String, String>>;

    /// Persist a time-series list as a named dataset
    async fn save_dataset(&self, name: &str, description: &str, ts_list: &[TsRef]) -> Result<()>;

    /// List every registered functional identifier
    async fn fid_list(&self) -> Result<Vec<TsRef>>;

    /// Read one table's content, verifying it exists
    async fn table_read(&self, name: &str) -> Result<serde_json::Value>;

    /// Aggregate a population table into a feature table
    ///
    /// Returns the name of the produced table.
    async fn table_ts2feature(&self, request: &Ts2FeatureRequest) -> Result<String>;

    /// Join metric time series onto a table, returning the new table's name
    async fn table_join_metrics(&self, request: &JoinMetricsRequest) -> Result<String>;

    /// Split a table into (train, test) tables, returning both names
    async fn table_train_test_split(
        &self,
        request: &TrainTestSplitRequest,
    ) -> Result<(String, String)>;

    /// Merge two tables into a new one, returning its name
    async fn table_merge(&self, request: &MergeTablesRequest) -> Result<String>;

    /// Start an ingestion session, returning its process id
    async fn ingest_start(&self, request: &IngestRequest) -> Result<ProcessId>;

    /// Poll an ingestion session's status
    async fn ingest_status(&self, pid: &ProcessId) -> Result<IngestStatusReport>;
}
