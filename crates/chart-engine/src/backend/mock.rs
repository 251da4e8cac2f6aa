//! Scripted in-memory backend for tests
//!
//! Responses are seeded through the builder methods; job and ingestion
//! status polls consume a script one entry per call, so a test can assert
//! exactly how many polls fired. Requests with side effects are recorded
//! for later inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ChartError, Result};
use crate::types::ProcessId;

use super::{
    Backend, CatalogOperator, DatasetContent, DatasetSummary, IngestRequest, IngestStatusReport,
    JobHandle, JobResult, JobStatus, JobStatusReport, JoinMetricsRequest, MergeTablesRequest,
    TrainTestSplitRequest, Ts2FeatureRequest, TsFilterRequest, TsRef,
};

#[derive(Default)]
struct MockState {
    compat: HashMap<String, Vec<String>>,
    operators: HashMap<String, CatalogOperator>,
    job_script: VecDeque<JobStatusReport>,
    job_results: Vec<JobResult>,
    results_delay: Option<Duration>,
    payloads: HashMap<String, serde_json::Value>,
    datasets: Vec<DatasetSummary>,
    dataset_contents: HashMap<String, DatasetContent>,
    filter_result: Vec<TsRef>,
    metadata_types: HashMap<String, String>,
    fids: Vec<TsRef>,
    tables: HashMap<String, serde_json::Value>,
    ts2feature_requests: Vec<Ts2FeatureRequest>,
    join_metrics_requests: Vec<JoinMetricsRequest>,
    split_requests: Vec<TrainTestSplitRequest>,
    merge_requests: Vec<MergeTablesRequest>,
    ingest_script: VecDeque<IngestStatusReport>,
    fail_submit: Option<String>,
    fail_status: Option<String>,
    submitted: Vec<(i64, serde_json::Map<String, serde_json::Value>)>,
    saved: Vec<(String, String, Vec<TsRef>)>,
    filter_requests: Vec<TsFilterRequest>,
    status_polls: usize,
}

/// Scripted backend double
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compat(self, matrix: HashMap<String, Vec<String>>) -> Self {
        self.state.lock().unwrap().compat = matrix;
        self
    }

    pub fn with_operator(self, entry: CatalogOperator) -> Self {
        self.state
            .lock()
            .unwrap()
            .operators
            .insert(entry.name.clone(), entry);
        self
    }

    /// Script the status sequence returned by successive `job_status` calls
    pub fn with_job_script(self, statuses: Vec<JobStatus>) -> Self {
        self.state.lock().unwrap().job_script = statuses
            .into_iter()
            .map(|status| JobStatusReport {
                status,
                start_date: Some(1_700_000_000),
                duration: None,
                error_message: None,
            })
            .collect();
        self
    }

    pub fn with_job_results(self, results: Vec<JobResult>) -> Self {
        self.state.lock().unwrap().job_results = results;
        self
    }

    /// Delay every `job_results` call, leaving a window to cancel mid-fetch
    pub fn with_results_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().results_delay = Some(delay);
        self
    }

    pub fn with_payload(self, rid: impl Into<String>, payload: serde_json::Value) -> Self {
        self.state.lock().unwrap().payloads.insert(rid.into(), payload);
        self
    }

    pub fn with_datasets(self, datasets: Vec<DatasetSummary>) -> Self {
        self.state.lock().unwrap().datasets = datasets;
        self
    }

    pub fn with_dataset_content(self, name: impl Into<String>, content: DatasetContent) -> Self {
        self.state
            .lock()
            .unwrap()
            .dataset_contents
            .insert(name.into(), content);
        self
    }

    pub fn with_filter_result(self, ts_list: Vec<TsRef>) -> Self {
        self.state.lock().unwrap().filter_result = ts_list;
        self
    }

    pub fn with_metadata_types(self, types: HashMap<String, String>) -> Self {
        self.state.lock().unwrap().metadata_types = types;
        self
    }

    pub fn with_fid_list(self, fids: Vec<TsRef>) -> Self {
        self.state.lock().unwrap().fids = fids;
        self
    }

    pub fn with_table(self, name: impl Into<String>, content: serde_json::Value) -> Self {
        self.state.lock().unwrap().tables.insert(name.into(), content);
        self
    }

    pub fn with_ingest_script(self, reports: Vec<IngestStatusReport>) -> Self {
        self.state.lock().unwrap().ingest_script = reports.into();
        self
    }

    /// Make every `submit_job` call fail with the given message
    pub fn failing_submit(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().fail_submit = Some(message.into());
        self
    }

    /// Make every `job_status` call fail with the given message
    pub fn failing_status(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().fail_status = Some(message.into());
        self
    }

    /// Jobs submitted so far, as (op_id, argument map) pairs
    pub fn submitted_jobs(&self) -> Vec<(i64, serde_json::Map<String, serde_json::Value>)> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Datasets persisted through `save_dataset`
    pub fn saved_datasets(&self) -> Vec<(String, String, Vec<TsRef>)> {
        self.state.lock().unwrap().saved.clone()
    }

    /// Filter requests received so far
    pub fn filter_requests(&self) -> Vec<TsFilterRequest> {
        self.state.lock().unwrap().filter_requests.clone()
    }

    /// How many times `job_status` was called
    pub fn status_poll_count(&self) -> usize {
        self.state.lock().unwrap().status_polls
    }

    /// Feature extraction requests received so far
    pub fn ts2feature_requests(&self) -> Vec<Ts2FeatureRequest> {
        self.state.lock().unwrap().ts2feature_requests.clone()
    }

    /// Metric join requests received so far
    pub fn join_metrics_requests(&self) -> Vec<JoinMetricsRequest> {
        self.state.lock().unwrap().join_metrics_requests.clone()
    }

    /// Train/test split requests received so far
    pub fn split_requests(&self) -> Vec<TrainTestSplitRequest> {
        self.state.lock().unwrap().split_requests.clone()
    }

    /// Table merge requests received so far
    pub fn merge_requests(&self) -> Vec<MergeTablesRequest> {
        self.state.lock().unwrap().merge_requests.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn type_compatibility(&self) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.state.lock().unwrap().compat.clone())
    }

    async fn read_operator(&self, name: &str) -> Result<CatalogOperator> {
        self.state
            .lock()
            .unwrap()
            .operators
            .get(name)
            .cloned()
            .ok_or_else(|| ChartError::UnknownOperator(name.to_string()))
    }

    async fn submit_job(
        &self,
        op_id: i64,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<JobHandle> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_submit {
            return Err(ChartError::backend(message.clone()));
        }
        state.submitted.push((op_id, args));
        Ok(JobHandle {
            pid: format!("job-{}", state.submitted.len()),
            status: JobStatus::Init,
        })
    }

    async fn job_status(&self, _pid: &ProcessId) -> Result<JobStatusReport> {
        let mut state = self.state.lock().unwrap();
        state.status_polls += 1;
        if let Some(message) = &state.fail_status {
            return Err(ChartError::backend(message.clone()));
        }
        state
            .job_script
            .pop_front()
            .ok_or_else(|| ChartError::backend("job status script exhausted"))
    }

    async fn job_results(&self, _pid: &ProcessId) -> Result<Vec<JobResult>> {
        let delay = self.state.lock().unwrap().results_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().job_results.clone())
    }

    async fn result_payload(&self, rid: &str) -> Result<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .payloads
            .get(rid)
            .cloned()
            .ok_or_else(|| ChartError::backend(format!("no payload for rid '{rid}'")))
    }

    async fn dataset_list(&self) -> Result<Vec<DatasetSummary>> {
        Ok(self.state.lock().unwrap().datasets.clone())
    }

    async fn dataset_read(&self, name: &str) -> Result<DatasetContent> {
        self.state
            .lock()
            .unwrap()
            .dataset_contents
            .get(name)
            .cloned()
            .ok_or_else(|| ChartError::backend(format!("dataset '{name}' not found")))
    }

    async fn ts_filter(&self, request: &TsFilterRequest) -> Result<Vec<TsRef>> {
        let mut state = self.state.lock().unwrap();
        state.filter_requests.push(request.clone());
        Ok(state.filter_result.clone())
    }

    async fn metadata_types(&self) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().metadata_types.clone())
    }

    async fn save_dataset(&self, name: &str, description: &str, ts_list: &[TsRef]) -> Result<()> {
        self.state.lock().unwrap().saved.push((
            name.to_string(),
            description.to_string(),
            ts_list.to_vec(),
        ));
        Ok(())
    }

    async fn fid_list(&self) -> Result<Vec<TsRef>> {
        Ok(self.state.lock().unwrap().fids.clone())
    }

    async fn table_read(&self, name: &str) -> Result<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| ChartError::backend(format!("table '{name}' not found")))
    }

    async fn table_ts2feature(&self, request: &Ts2FeatureRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.ts2feature_requests.push(request.clone());
        Ok(request.output_table_name.clone())
    }

    async fn table_join_metrics(&self, request: &JoinMetricsRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.join_metrics_requests.push(request.clone());
        Ok(request.output_table_name.clone())
    }

    async fn table_train_test_split(
        &self,
        request: &TrainTestSplitRequest,
    ) -> Result<(String, String)> {
        let mut state = self.state.lock().unwrap();
        state.split_requests.push(request.clone());
        Ok((
            format!("{}_Train", request.output_table_name),
            format!("{}_Test", request.output_table_name),
        ))
    }

    async fn table_merge(&self, request: &MergeTablesRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.merge_requests.push(request.clone());
        Ok(request.output_table_name.clone())
    }

    async fn ingest_start(&self, _request: &IngestRequest) -> Result<ProcessId> {
        Ok("ingest-1".to_string())
    }

    async fn ingest_status(&self, _pid: &ProcessId) -> Result<IngestStatusReport> {
        let mut state = self.state.lock().unwrap();
        state.status_polls += 1;
        state
            .ingest_script
            .pop_front()
            .ok_or_else(|| ChartError::backend("ingest status script exhausted"))
    }
}
