//! HTTP client for the query-status service.

use crate::error::ClientError;
use crate::QuerySource;
use async_trait::async_trait;
use planscope_common::{Database, QueryTree};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidBaseUrl { url: base_url.to_string(), reason };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self { base_url: parsed, http })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub async fn query_ids(&self) -> Result<Vec<String>, ClientError> {
        self.get_json(&["queries", "ids"]).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let url = self.endpoint(segments);
        debug!(%url, "GET");
        let response = self.http.get(url.clone()).send().await.map_err(|source| {
            ClientError::Unreachable { base_url: self.base_url().to_string(), source }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, url: url.to_string(), body });
        }
        response.json::<T>().await.map_err(ClientError::Decode)
    }
}

#[async_trait]
impl QuerySource for ApiClient {
    async fn list_queries(&self) -> Result<Vec<QueryTree>, ClientError> {
        self.get_json(&["queries"]).await
    }

    async fn fetch_query(&self, query_id: &str) -> Result<QueryTree, ClientError> {
        match self.get_json(&["queries", query_id]).await {
            Err(ClientError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(ClientError::NotFound(query_id.to_string()))
            }
            result => result,
        }
    }

    async fn list_databases(&self) -> Result<Vec<Database>, ClientError> {
        self.get_json(&["databases"]).await
    }
}
