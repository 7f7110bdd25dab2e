use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use package_pulse_core::{
    Ecosystem, MetadataSource, PackageLink, PackageMetadata, ProviderError, VersionRecord,
};

const DEPS_DEV_USER_AGENT: &str = concat!("package-pulse/", env!("CARGO_PKG_VERSION"));
const DEFAULT_DEPS_DEV_API_BASE_URL: &str = "https://api.deps.dev/v3alpha";

/// Client for the deps.dev package metadata API.
#[derive(Clone)]
pub struct DepsDevClient {
    http: Client,
    api_base_url: String,
    timeout: Duration,
}

impl DepsDevClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let api_base_url = env::var("PACKAGE_PULSE_DEPS_DEV_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_DEPS_DEV_API_BASE_URL.to_string());
        Self::with_base_url(api_base_url, timeout)
    }

    pub fn with_base_url(
        api_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(DEPS_DEV_USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: format!("unable to build deps.dev HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_base_url: api_base_url.into(),
            timeout,
        })
    }

    /// Fetches version history and links for a package.
    pub async fn get_package(
        &self,
        ecosystem: Ecosystem,
        package: &str,
    ) -> Result<PackageMetadata, ProviderError> {
        let url = package_url(&self.api_base_url, ecosystem, package)?;

        tracing::debug!(
            ecosystem = ecosystem.deps_dev_system(),
            package,
            "querying deps.dev"
        );

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::timeout(self.timeout)
            } else {
                ProviderError::Transport {
                    message: format!("unable to query deps.dev API: {e}"),
                }
            }
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                source_name: "deps.dev",
                package: format!("{}/{}", ecosystem.deps_dev_system(), package),
            });
        }

        if !response.status().is_success() {
            return Err(ProviderError::Transport {
                message: format!("deps.dev API returned status {}", response.status()),
            });
        }

        let body: DepsDevPackageResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: format!("failed to parse deps.dev response JSON: {e}"),
                })?;

        tracing::debug!(versions = body.versions.len(), "deps.dev query complete");
        Ok(body.into_metadata(ecosystem, package))
    }
}

#[async_trait]
impl MetadataSource for DepsDevClient {
    async fn fetch_package_metadata(
        &self,
        ecosystem: Ecosystem,
        package: &str,
    ) -> Result<PackageMetadata, ProviderError> {
        self.get_package(ecosystem, package).await
    }
}

/// Builds `{base}/systems/{system}/packages/{name}` with the name as a single
/// escaped path segment, so Go module paths keep their slashes encoded.
fn package_url(base: &str, ecosystem: Ecosystem, package: &str) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base).map_err(|e| ProviderError::Transport {
        message: format!("invalid deps.dev base URL '{base}': {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::Transport {
            message: format!("deps.dev base URL '{base}' cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(["systems", ecosystem.deps_dev_system(), "packages", package]);
    Ok(url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepsDevPackageResponse {
    package_key: Option<DepsDevPackageKey>,
    #[serde(default)]
    versions: Vec<DepsDevVersion>,
    #[serde(default)]
    links: Vec<DepsDevLink>,
}

impl DepsDevPackageResponse {
    fn into_metadata(self, ecosystem: Ecosystem, requested_name: &str) -> PackageMetadata {
        let (name, system) = match self.package_key {
            Some(key) => (key.name, key.system),
            None => (
                requested_name.to_string(),
                ecosystem.deps_dev_system().to_ascii_uppercase(),
            ),
        };

        PackageMetadata {
            name,
            ecosystem: system,
            versions: self
                .versions
                .into_iter()
                .map(|version| VersionRecord {
                    version: version.version_key.version,
                    published_at: version.published_at,
                    is_default: version.is_default,
                    licenses: version.licenses,
                })
                .collect(),
            links: self
                .links
                .into_iter()
                .map(|link| PackageLink {
                    label: link.label,
                    url: link.url,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DepsDevPackageKey {
    system: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepsDevVersion {
    version_key: DepsDevVersionKey,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    licenses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DepsDevVersionKey {
    version: String,
}

#[derive(Debug, Deserialize)]
struct DepsDevLink {
    label: String,
    url: String,
}
