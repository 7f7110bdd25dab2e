use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use package_pulse_core::PackageMetadata;

const REPOSITORY_LABELS: [&str; 2] = ["SOURCE_REPO", "REPOSITORY"];
const DOCUMENTATION_LABEL: &str = "DOCUMENTATION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl MaintenanceLevel {
    /// Bands are inclusive on their lower bound.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 40.0 {
            Self::Fair
        } else if score >= 20.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Critical => "critical",
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            Self::Excellent => {
                "This package is actively maintained with good development practices."
            }
            Self::Good => "Package shows regular maintenance and good health indicators.",
            Self::Fair => {
                "Package is maintained but may have slower update cycles. Review before use."
            }
            Self::Poor => "WARNING: Package shows signs of poor maintenance. Consider alternatives.",
            Self::Critical => {
                "CRITICAL: Package appears abandoned or unmaintained. Strongly consider alternatives."
            }
        }
    }

    pub fn is_concerning(self) -> bool {
        matches!(self, Self::Poor | Self::Critical)
    }
}

impl fmt::Display for MaintenanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub package_name: String,
    pub ecosystem: String,
    pub latest_version: String,
    pub version_count: usize,
    pub last_published: Option<DateTime<Utc>>,
    pub days_since_update: i64,
    pub has_repository: bool,
    pub has_documentation: bool,
    pub license_count: usize,
    pub maintenance_score: f64,
    pub maintenance_level: MaintenanceLevel,
    pub recommendation: String,
}

pub fn compute_health_metrics(metadata: &PackageMetadata) -> HealthMetrics {
    compute_health_metrics_at(metadata, Utc::now())
}

/// Scores a package against a fixed clock.
///
/// A package with no published timestamps keeps `days_since_update` at 0
/// and `last_published` empty, so it earns the full recency points.
pub fn compute_health_metrics_at(metadata: &PackageMetadata, now: DateTime<Utc>) -> HealthMetrics {
    let mut latest_version = String::new();
    let mut license_count = 0;
    let mut last_published: Option<DateTime<Utc>> = None;

    for version in &metadata.versions {
        if version.is_default {
            latest_version = version.version.clone();
            license_count = version.licenses.len();
        }
        if let Some(published) = version.published_at
            && last_published.is_none_or(|current| published > current)
        {
            last_published = Some(published);
        }
    }

    let days_since_update = last_published
        .map(|published| now.signed_duration_since(published).num_hours() / 24)
        .unwrap_or(0);

    let has_repository = metadata
        .links
        .iter()
        .any(|link| REPOSITORY_LABELS.contains(&link.label.as_str()));
    let has_documentation = metadata
        .links
        .iter()
        .any(|link| link.label == DOCUMENTATION_LABEL);

    let version_count = metadata.versions.len();
    let maintenance_score = recency_points(days_since_update)
        + cadence_points(version_count)
        + if has_repository { 20.0 } else { 0.0 }
        + if has_documentation { 10.0 } else { 0.0 }
        + if license_count > 0 { 10.0 } else { 0.0 };
    let maintenance_level = MaintenanceLevel::from_score(maintenance_score);

    HealthMetrics {
        package_name: metadata.name.clone(),
        ecosystem: metadata.ecosystem.clone(),
        latest_version,
        version_count,
        last_published,
        days_since_update,
        has_repository,
        has_documentation,
        license_count,
        maintenance_score,
        maintenance_level,
        recommendation: maintenance_level.recommendation().to_string(),
    }
}

fn recency_points(days_since_update: i64) -> f64 {
    match days_since_update {
        ..=30 => 40.0,
        31..=90 => 30.0,
        91..=180 => 20.0,
        181..=365 => 10.0,
        _ => 0.0,
    }
}

fn cadence_points(version_count: usize) -> f64 {
    match version_count {
        50.. => 20.0,
        20..=49 => 15.0,
        10..=19 => 10.0,
        5..=9 => 5.0,
        _ => 0.0,
    }
}
