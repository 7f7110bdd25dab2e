use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use package_pulse_core::{Ecosystem, ProviderError, Vulnerability, VulnerabilitySource};

const OSV_API_URL: &str = "https://api.osv.dev/v1/query";
const OSV_BATCH_API_URL: &str = "https://api.osv.dev/v1/querybatch";
const OSV_USER_AGENT: &str = concat!("package-pulse/", env!("CARGO_PKG_VERSION"));

/// Client for the OSV.dev vulnerability query API.
#[derive(Clone)]
pub struct OsvClient {
    http: Client,
    query_url: String,
    batch_url: String,
    timeout: Duration,
}

/// One package in a batch query.
#[derive(Debug, Clone)]
pub struct BatchQuery {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub version: Option<String>,
}

impl OsvClient {
    /// Builds a client against the public API, honoring URL overrides from the
    /// environment.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let query_url =
            env::var("PACKAGE_PULSE_OSV_API_URL").unwrap_or_else(|_| OSV_API_URL.to_string());
        let batch_url = env::var("PACKAGE_PULSE_OSV_BATCH_API_URL")
            .unwrap_or_else(|_| OSV_BATCH_API_URL.to_string());
        Self::with_urls(query_url, batch_url, timeout)
    }

    pub fn with_urls(
        query_url: impl Into<String>,
        batch_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(OSV_USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: format!("unable to build OSV HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            query_url: query_url.into(),
            batch_url: batch_url.into(),
            timeout,
        })
    }

    /// Queries known vulnerabilities for one package, optionally pinned to a version.
    pub async fn query(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: Option<&str>,
    ) -> Result<Vec<Vulnerability>, ProviderError> {
        let body = OsvQueryRequest::new(ecosystem, package, version);

        tracing::debug!(
            ecosystem = ecosystem.osv_name(),
            package,
            version = version.unwrap_or_default(),
            "querying OSV"
        );

        let response = self
            .http
            .post(&self.query_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("unable to query OSV advisory API", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if response.status().is_server_error() {
            return Err(ProviderError::Transport {
                message: format!("OSV advisory API server error {}", response.status()),
            });
        }

        if !response.status().is_success() {
            return Err(ProviderError::Transport {
                message: format!("OSV advisory API returned status {}", response.status()),
            });
        }

        let body: OsvQueryResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: format!("failed to parse OSV advisory response JSON: {e}"),
                })?;

        tracing::debug!(vulns_found = body.vulns.len(), "OSV query complete");
        Ok(body.vulns)
    }

    /// Queries several packages in one request.
    ///
    /// Results are returned in query order. The batch endpoint only fills in
    /// vulnerability ids and modification times; use [`OsvClient::query`] for
    /// full records.
    pub async fn query_batch(
        &self,
        queries: &[BatchQuery],
    ) -> Result<Vec<Vec<Vulnerability>>, ProviderError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let body = OsvBatchRequest {
            queries: queries
                .iter()
                .map(|query| {
                    OsvQueryRequest::new(query.ecosystem, &query.package, query.version.as_deref())
                })
                .collect(),
        };

        tracing::debug!(query_count = queries.len(), "batch querying OSV");

        let response = self
            .http
            .post(&self.batch_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("unable to query OSV batch API", e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Transport {
                message: format!("OSV batch API returned status {}", response.status()),
            });
        }

        let body: OsvBatchResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: format!("failed to parse OSV batch response JSON: {e}"),
                })?;

        if body.results.len() != queries.len() {
            return Err(ProviderError::InvalidResponse {
                message: format!(
                    "OSV batch API returned {} result(s) for {} queries",
                    body.results.len(),
                    queries.len()
                ),
            });
        }

        tracing::debug!(results = body.results.len(), "OSV batch query complete");
        Ok(body.results.into_iter().map(|result| result.vulns).collect())
    }

    fn transport_error(&self, action: &str, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            return ProviderError::timeout(self.timeout);
        }
        ProviderError::Transport {
            message: format!("{action}: {error}"),
        }
    }
}

#[async_trait]
impl VulnerabilitySource for OsvClient {
    async fn query_vulnerabilities(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: Option<&str>,
    ) -> Result<Vec<Vulnerability>, ProviderError> {
        self.query(ecosystem, package, version).await
    }
}

#[derive(Debug, Serialize)]
struct OsvQueryRequest {
    package: OsvPackage,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl OsvQueryRequest {
    fn new(ecosystem: Ecosystem, package: &str, version: Option<&str>) -> Self {
        Self {
            package: OsvPackage {
                name: package.to_string(),
                ecosystem: ecosystem.osv_name().to_string(),
            },
            version: version
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        }
    }
}

#[derive(Debug, Serialize)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Debug, Serialize)]
struct OsvBatchRequest {
    queries: Vec<OsvQueryRequest>,
}

#[derive(Debug, Deserialize)]
struct OsvQueryResponse {
    #[serde(default)]
    vulns: Vec<Vulnerability>,
}

#[derive(Debug, Deserialize)]
struct OsvBatchResponse {
    #[serde(default)]
    results: Vec<OsvQueryResponse>,
}
