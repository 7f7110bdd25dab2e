//! Shared application service behind the MCP tools and the one-off CLI commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use package_pulse_core::{
    Ecosystem, MetadataSource, Vulnerability, VulnerabilitySource, VulnerabilitySummary,
    summarize_vulnerabilities,
};
use package_pulse_depsdev::DepsDevClient;
use package_pulse_health::{HealthMetrics, compute_health_metrics};
use package_pulse_osv::OsvClient;
use package_pulse_spdx::{LicenseCatalog, LicenseInfo};
use package_pulse_upgrade::{UpgradePlan, UpgradeRequest, bounded, plan_upgrade};

use crate::cache::{ResponseCache, SqliteCache};
use crate::config::PackagePulseConfig;

/// Payload of the `deps.vulns` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub package: String,
    pub ecosystem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub vulnerability_count: usize,
    pub vulnerabilities: Vec<Vulnerability>,
    pub summary: VulnerabilitySummary,
}

/// Licenses of one catalog category, as listed by `license --categories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCategory {
    pub category: String,
    pub licenses: Vec<LicenseInfo>,
}

/// Core runtime service wiring the upstream sources, the license catalog and the cache.
#[derive(Clone)]
pub struct PackagePulseService {
    vulnerabilities: Arc<dyn VulnerabilitySource>,
    metadata: Arc<dyn MetadataSource>,
    licenses: Arc<LicenseCatalog>,
    cache: Arc<dyn ResponseCache>,
    config: Arc<PackagePulseConfig>,
}

impl PackagePulseService {
    /// Creates a service using default config, live upstream clients, and the on-disk cache.
    ///
    /// # Errors
    ///
    /// Returns an error if config, HTTP client, or cache initialization fails.
    pub fn new() -> anyhow::Result<Self> {
        let config = PackagePulseConfig::load()?;
        let timeout = config.upstream.timeout();
        let osv = OsvClient::new(timeout).context("failed to initialize OSV client")?;
        let deps_dev = DepsDevClient::new(timeout).context("failed to initialize deps.dev client")?;
        let cache = SqliteCache::new()?;
        Ok(Self::with_parts(
            config,
            Arc::new(osv),
            Arc::new(deps_dev),
            Arc::new(cache),
        ))
    }

    pub(crate) fn with_parts(
        config: PackagePulseConfig,
        vulnerabilities: Arc<dyn VulnerabilitySource>,
        metadata: Arc<dyn MetadataSource>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            vulnerabilities,
            metadata,
            licenses: Arc::new(LicenseCatalog::new()),
            cache,
            config: Arc::new(config),
        }
    }

    /// Lists known vulnerabilities for a package, optionally pinned to one version.
    ///
    /// # Errors
    ///
    /// Returns an error wrapping the `ProviderError` when the query fails or is cancelled.
    pub async fn vulnerabilities(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: Option<&str>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<VulnerabilityReport> {
        let cache_key = vulns_cache_key(ecosystem, package, version);
        if let Some(report) = self.cached::<VulnerabilityReport>(&cache_key) {
            return Ok(report);
        }

        let vulnerabilities = bounded(
            cancel,
            self.upstream_timeout(),
            self.vulnerabilities
                .query_vulnerabilities(ecosystem, package, version),
        )
        .await
        .with_context(|| format!("query OSV for {ecosystem}/{package}"))?;

        let report = VulnerabilityReport {
            package: package.to_string(),
            ecosystem: ecosystem.key().to_string(),
            version: version.map(str::to_string),
            vulnerability_count: vulnerabilities.len(),
            summary: summarize_vulnerabilities(&vulnerabilities),
            vulnerabilities,
        };

        self.store(&cache_key, &report, self.config.cache.ttl());
        Ok(report)
    }

    /// Computes maintenance health from deps.dev metadata.
    ///
    /// # Errors
    ///
    /// Returns an error wrapping the `ProviderError` when metadata cannot be fetched.
    pub async fn health(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<HealthMetrics> {
        let cache_key = format!("health:{}:{}", ecosystem.key(), package);
        if let Some(metrics) = self.cached::<HealthMetrics>(&cache_key) {
            return Ok(metrics);
        }

        let metadata = bounded(
            cancel,
            self.upstream_timeout(),
            self.metadata.fetch_package_metadata(ecosystem, package),
        )
        .await
        .with_context(|| format!("query deps.dev for {ecosystem}/{package}"))?;

        let metrics = compute_health_metrics(&metadata);
        self.store(&cache_key, &metrics, self.config.cache.ttl());
        Ok(metrics)
    }

    /// Looks up a license in the static catalog.
    ///
    /// # Errors
    ///
    /// Returns an error wrapping `LicenseError::NotFound` for unknown identifiers.
    pub fn license(&self, license_id: &str) -> anyhow::Result<LicenseInfo> {
        let cache_key = format!("license:{license_id}");
        if let Some(license) = self.cached::<LicenseInfo>(&cache_key) {
            return Ok(license);
        }

        let license = self
            .licenses
            .lookup(license_id)
            .cloned()
            .with_context(|| format!("look up license {license_id}"))?;
        self.store(&cache_key, &license, self.config.cache.license_ttl());
        Ok(license)
    }

    pub fn search_licenses(&self, query: &str) -> Vec<LicenseInfo> {
        self.licenses.search(query).into_iter().cloned().collect()
    }

    /// Groups the catalog by category in catalog order.
    pub fn license_categories(&self) -> Vec<LicenseCategory> {
        self.licenses
            .categories()
            .into_iter()
            .map(|category| LicenseCategory {
                category: category.to_string(),
                licenses: self
                    .licenses
                    .by_category(category)
                    .into_iter()
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Builds a prioritized upgrade plan for the current version of a package.
    ///
    /// # Errors
    ///
    /// Returns an error when metadata cannot be fetched or the request is cancelled.
    /// Vulnerability lookup failures only degrade the plan.
    pub async fn upgrade_plan(
        &self,
        request: &UpgradeRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<UpgradePlan> {
        let cache_key = format!(
            "upgrade:{}:{}:{}",
            request.ecosystem.key(),
            request.package,
            request.current_version
        );
        if let Some(plan) = self.cached::<UpgradePlan>(&cache_key) {
            return Ok(plan);
        }

        let plan = plan_upgrade(
            self.vulnerabilities.as_ref(),
            self.metadata.as_ref(),
            request,
            cancel,
            self.upstream_timeout(),
        )
        .await
        .with_context(|| {
            format!(
                "plan upgrade for {}/{}@{}",
                request.ecosystem, request.package, request.current_version
            )
        })?;

        self.store(&cache_key, &plan, self.config.cache.ttl());
        Ok(plan)
    }

    fn upstream_timeout(&self) -> Duration {
        self.config.upstream.timeout()
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                return None;
            }
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key, "cache hit");
                Some(value)
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable cache entry");
                if let Err(err) = self.cache.remove(key) {
                    tracing::warn!(key, error = %format!("{err:#}"), "cache delete failed");
                }
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, &encoded, ttl) {
            tracing::warn!(key, error = %format!("{err:#}"), "cache write failed");
        }
    }
}

fn vulns_cache_key(ecosystem: Ecosystem, package: &str, version: Option<&str>) -> String {
    format!(
        "vulns:{}:{}:{}",
        ecosystem.key(),
        package,
        version.unwrap_or_default()
    )
}

#[cfg(test)]
#[path = "tests/service.rs"]
mod tests;
