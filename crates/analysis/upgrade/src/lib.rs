use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use package_pulse_core::{
    Ecosystem, MetadataSource, ProviderError, Vulnerability, VulnerabilitySource,
    VulnerabilitySummary, summarize_vulnerabilities,
};
use package_pulse_health::{HealthMetrics, compute_health_metrics};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub current_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Urgent,
    Ok,
    Warning,
    Low,
    Medium,
    Recommended,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "URGENT",
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::Recommended => "RECOMMENDED",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the vulnerability query for the current version.
///
/// `Unavailable` is scored like an empty result but stays distinguishable in
/// the plan through `vulnerability_data_available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VulnerabilityLookup {
    Available(Vec<Vulnerability>),
    Unavailable { reason: String },
}

impl VulnerabilityLookup {
    fn vulnerabilities(&self) -> &[Vulnerability] {
        match self {
            Self::Available(vulnerabilities) => vulnerabilities.as_slice(),
            Self::Unavailable { .. } => &[],
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub package: String,
    pub ecosystem: String,
    pub current_version: String,
    pub latest_version: String,
    pub is_up_to_date: bool,
    pub has_vulnerabilities: bool,
    pub vulnerability_count: usize,
    pub vulnerability_data_available: bool,
    pub maintenance_level: String,
    pub maintenance_score: f64,
    pub days_since_update: i64,
    pub priority: Priority,
    pub recommendation: String,
    pub upgrade_path: Vec<String>,
    pub breaking_changes_possible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_summary: Option<VulnerabilitySummary>,
    pub health: HealthMetrics,
}

/// Cheap major-version heuristic: the versions differ in their first
/// character. Not semver-aware, so `9.0.0 -> 10.0.0` counts and
/// `1.0.0 -> 1.9.0` does not.
pub fn breaking_change_possible(current: &str, latest: &str) -> bool {
    match (current.chars().next(), latest.chars().next()) {
        (Some(current_first), Some(latest_first)) => current_first != latest_first,
        _ => false,
    }
}

/// Combines a vulnerability lookup and health metrics into a prioritized plan.
pub fn build_plan(
    request: &UpgradeRequest,
    lookup: &VulnerabilityLookup,
    health: HealthMetrics,
) -> UpgradePlan {
    let vulnerabilities = lookup.vulnerabilities();
    let has_vulnerabilities = !vulnerabilities.is_empty();
    let vulnerability_summary = has_vulnerabilities.then(|| summarize_vulnerabilities(vulnerabilities));

    let latest = health.latest_version.clone();
    let is_up_to_date = request.current_version == latest;
    let breaking_changes_possible = breaking_change_possible(&request.current_version, &latest);
    let level = health.maintenance_level;

    let (priority, recommendation) = if let Some(summary) = &vulnerability_summary {
        let message = if summary.critical > 0 {
            format!(
                "CRITICAL: Upgrade immediately! Found {} critical vulnerabilities in current version.",
                summary.critical
            )
        } else if summary.high > 0 {
            format!(
                "URGENT: Upgrade to {latest} to address {} high-severity vulnerabilities.",
                summary.high
            )
        } else {
            format!(
                "URGENT: Upgrade to {latest} to address {} known vulnerabilities.",
                vulnerabilities.len()
            )
        };
        (Priority::Urgent, message)
    } else if is_up_to_date {
        let message = if level.is_concerning() {
            format!("On latest version, but package shows {level} maintenance. Consider alternatives.")
        } else {
            "Already on latest version. No action needed.".to_string()
        };
        (Priority::Ok, message)
    } else if level.is_concerning() {
        (
            Priority::Warning,
            format!(
                "WARNING: Package shows {level} maintenance (score: {:.1}). Upgrade to {latest} available, but consider package alternatives.",
                health.maintenance_score
            ),
        )
    } else if health.days_since_update > 180 {
        (
            Priority::Low,
            format!(
                "Upgrade available ({latest}), but no urgent issues. Current version is {} days old.",
                health.days_since_update
            ),
        )
    } else if breaking_changes_possible {
        (
            Priority::Medium,
            format!(
                "Upgrade to {latest} recommended, but may contain breaking changes. Review changelog before upgrading."
            ),
        )
    } else {
        (
            Priority::Recommended,
            format!("Upgrade to {latest} recommended for latest features and improvements."),
        )
    };

    UpgradePlan {
        package: request.package.clone(),
        ecosystem: request.ecosystem.key().to_string(),
        current_version: request.current_version.clone(),
        latest_version: latest.clone(),
        is_up_to_date,
        has_vulnerabilities,
        vulnerability_count: vulnerabilities.len(),
        vulnerability_data_available: lookup.is_available(),
        maintenance_level: level.to_string(),
        maintenance_score: health.maintenance_score,
        days_since_update: health.days_since_update,
        priority,
        recommendation,
        upgrade_path: vec![request.current_version.clone(), latest],
        breaking_changes_possible,
        vulnerability_summary,
        health,
    }
}

/// Queries both sources concurrently and builds the plan.
///
/// A failed vulnerability query degrades to `VulnerabilityLookup::Unavailable`;
/// a failed metadata query fails the plan as soon as it returns. Cancellation
/// of either call surfaces as `ProviderError::Cancelled`.
pub async fn plan_upgrade(
    vulnerabilities: &dyn VulnerabilitySource,
    metadata: &dyn MetadataSource,
    request: &UpgradeRequest,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<UpgradePlan, ProviderError> {
    tracing::debug!(
        ecosystem = %request.ecosystem,
        package = %request.package,
        current_version = %request.current_version,
        "planning upgrade"
    );

    let vulnerability_call = bounded(
        cancel,
        timeout,
        vulnerabilities.query_vulnerabilities(
            request.ecosystem,
            &request.package,
            Some(&request.current_version),
        ),
    );
    let metadata_call = bounded(
        cancel,
        timeout,
        metadata.fetch_package_metadata(request.ecosystem, &request.package),
    );
    tokio::pin!(vulnerability_call, metadata_call);

    // A metadata failure ends the plan without waiting on the vulnerability call.
    let mut vulnerability_result = None;
    let package_metadata = loop {
        tokio::select! {
            result = &mut metadata_call => break result?,
            result = &mut vulnerability_call, if vulnerability_result.is_none() => {
                vulnerability_result = Some(result);
            }
        }
    };
    let vulnerability_result = match vulnerability_result {
        Some(result) => result,
        None => vulnerability_call.await,
    };

    let lookup = match vulnerability_result {
        Ok(found) => VulnerabilityLookup::Available(found),
        Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
        Err(error) => {
            tracing::warn!(
                ecosystem = %request.ecosystem,
                package = %request.package,
                error = %error,
                "vulnerability lookup failed; planning without vulnerability data"
            );
            VulnerabilityLookup::Unavailable {
                reason: error.to_string(),
            }
        }
    };

    let health = compute_health_metrics(&package_metadata);
    let plan = build_plan(request, &lookup, health);

    tracing::debug!(priority = %plan.priority, "upgrade plan complete");
    Ok(plan)
}

/// Runs a source call under the caller's cancellation token and a deadline.
pub async fn bounded<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        outcome = tokio::time::timeout(timeout, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(timeout)),
        },
    }
}
