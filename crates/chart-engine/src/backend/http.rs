//! HTTP backend implementation
//!
//! Talks to the workbench REST service with `reqwest`. Paths follow the
//! service's resource layout; every response is decoded into the typed
//! contract structs from [`super`]. Non-success statuses become
//! `ChartError::Backend`, transport errors `ChartError::Http`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ChartError, Result};
use crate::types::ProcessId;

use super::{
    Backend, CatalogOperator, DatasetContent, DatasetSummary, IngestRequest, IngestStatusReport,
    JobHandle, JobResult, JobStatusReport, JoinMetricsRequest, MergeTablesRequest,
    TrainTestSplitRequest, Ts2FeatureRequest, TsFilterRequest, TsRef,
};

/// Backend client over HTTP
pub struct HttpBackend {
    http_client: reqwest::Client,
    /// Base URL of the service, without trailing slash
    base_url: String,
}

#[derive(Deserialize)]
struct IngestSession {
    id: i64,
}

impl HttpBackend {
    /// Create a client for the given service base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Map a non-success response to a backend error with context
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(ChartError::backend(format!(
            "{url} returned {status}: {body}"
        )))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http_client.get(self.url(path)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: serde::Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn type_compatibility(&self) -> Result<HashMap<String, Vec<String>>> {
        self.get_json("types/compatibility").await
    }

    async fn read_operator(&self, name: &str) -> Result<CatalogOperator> {
        self.get_json(&format!("operators/{name}")).await
    }

    async fn submit_job(
        &self,
        op_id: i64,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<JobHandle> {
        let response = self
            .http_client
            .post(self.url(&format!("operators/{op_id}/run")))
            .json(&args)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn job_status(&self, pid: &ProcessId) -> Result<JobStatusReport> {
        self.get_json(&format!("jobs/{pid}/status")).await
    }

    async fn job_results(&self, pid: &ProcessId) -> Result<Vec<JobResult>> {
        self.get_json(&format!("jobs/{pid}/results")).await
    }

    async fn result_payload(&self, rid: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("results/{rid}")).await
    }

    async fn dataset_list(&self) -> Result<Vec<DatasetSummary>> {
        self.get_json("datasets").await
    }

    async fn dataset_read(&self, name: &str) -> Result<DatasetContent> {
        self.get_json(&format!("datasets/{name}")).await
    }

    async fn ts_filter(&self, request: &TsFilterRequest) -> Result<Vec<TsRef>> {
        let response = self
            .http_client
            .post(self.url("ts/filter"))
            .json(request)
            .send()
            .await?;
        // No matching series is an empty result, not an error
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Ok(Self::check(response).await?.json().await?)
    }

    async fn metadata_types(&self) -> Result<HashMap<String, String>> {
        self.get_json("metadata/types").await
    }

    async fn save_dataset(&self, name: &str, description: &str, ts_list: &[TsRef]) -> Result<()> {
        let body = serde_json::json!({
            "description": description,
            "tsList": ts_list,
        });
        let response = self
            .http_client
            .post(self.url(&format!("datasets/{name}")))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fid_list(&self) -> Result<Vec<TsRef>> {
        self.get_json("ts/fids").await
    }

    async fn table_read(&self, name: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("tables/{name}")).await
    }

    async fn table_ts2feature(&self, request: &Ts2FeatureRequest) -> Result<String> {
        self.post_json("tables/ts2feature", request).await
    }

    async fn table_join_metrics(&self, request: &JoinMetricsRequest) -> Result<String> {
        self.post_json("tables/join/metrics", request).await
    }

    async fn table_train_test_split(
        &self,
        request: &TrainTestSplitRequest,
    ) -> Result<(String, String)> {
        // The service answers with both table names joined by a comma
        let joined: String = self.post_json("tables/traintestsplit", request).await?;
        match joined.split_once(',') {
            Some((train, test)) => Ok((train.to_string(), test.to_string())),
            None => Err(ChartError::backend(format!(
                "expected 'train,test' table names, got '{joined}'"
            ))),
        }
    }

    async fn table_merge(&self, request: &MergeTablesRequest) -> Result<String> {
        self.post_json("tables/merge", request).await
    }

    async fn ingest_start(&self, request: &IngestRequest) -> Result<ProcessId> {
        let response = self
            .http_client
            .post(self.url("ingest/sessions"))
            .json(request)
            .send()
            .await?;
        let session: IngestSession = Self::check(response).await?.json().await?;
        Ok(session.id.to_string())
    }

    async fn ingest_status(&self, pid: &ProcessId) -> Result<IngestStatusReport> {
        self.get_json(&format!("ingest/sessions/{pid}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let backend = HttpBackend::new("http://localhost:8080/api/");
        assert_eq!(
            backend.url("/datasets"),
            "http://localhost:8080/api/datasets"
        );
        assert_eq!(
            backend.url("jobs/42/status"),
            "http://localhost:8080/api/jobs/42/status"
        );
    }
}
