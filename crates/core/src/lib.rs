use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    Npm,
    PyPI,
    Go,
    Maven,
    Cargo,
    NuGet,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 6] = [
        Self::Npm,
        Self::PyPI,
        Self::Go,
        Self::Maven,
        Self::Cargo,
        Self::NuGet,
    ];

    /// Canonical lowercase key used in tool inputs and cache keys.
    pub fn key(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::PyPI => "pypi",
            Self::Go => "go",
            Self::Maven => "maven",
            Self::Cargo => "cargo",
            Self::NuGet => "nuget",
        }
    }

    pub fn osv_name(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::PyPI => "PyPI",
            Self::Go => "Go",
            Self::Maven => "Maven",
            Self::Cargo => "crates.io",
            Self::NuGet => "NuGet",
        }
    }

    pub fn deps_dev_system(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::PyPI => "pypi",
            Self::Go => "go",
            Self::Maven => "maven",
            Self::Cargo => "cargo",
            Self::NuGet => "nuget",
        }
    }

    pub fn supported_keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|ecosystem| ecosystem.key()).collect()
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported ecosystem '{0}'")]
pub struct UnknownEcosystem(pub String);

impl FromStr for Ecosystem {
    type Err = UnknownEcosystem;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "pypi" | "pip" | "python" => Ok(Self::PyPI),
            "go" | "golang" => Ok(Self::Go),
            "maven" => Ok(Self::Maven),
            "cargo" | "crates.io" | "crates" => Ok(Self::Cargo),
            "nuget" => Ok(Self::NuGet),
            _ => Err(UnknownEcosystem(raw.to_string())),
        }
    }
}

/// One published version as reported by the metadata source.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_default: bool,
    pub licenses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLink {
    pub label: String,
    pub url: String,
}

/// Package-level metadata consumed by the health scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    pub name: String,
    pub ecosystem: String,
    pub versions: Vec<VersionRecord>,
    pub links: Vec<PackageLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityScore {
    #[serde(rename = "type")]
    pub kind: String,
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<AffectedRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
    pub ecosystem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub events: Vec<RangeEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduced: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// A vulnerability record as reported by the vulnerability source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severity: Vec<SeverityScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected: Vec<AffectedPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityBucket {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

/// Counts of vulnerabilities bucketed by coarse severity keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilitySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl VulnerabilitySummary {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.unknown
    }

    fn record(&mut self, bucket: SeverityBucket) {
        let counter = match bucket {
            SeverityBucket::Critical => &mut self.critical,
            SeverityBucket::High => &mut self.high,
            SeverityBucket::Medium => &mut self.medium,
            SeverityBucket::Low => &mut self.low,
            SeverityBucket::Unknown => &mut self.unknown,
        };
        *counter += 1;
    }
}

/// Classifies a severity score string by case-insensitive keyword match.
///
/// Keywords are tested in descending severity, so a score containing both
/// "critical" and "low" lands in the critical bucket.
pub fn classify_severity(score: &str) -> SeverityBucket {
    let normalized = score.to_ascii_lowercase();
    if normalized.contains("critical") {
        SeverityBucket::Critical
    } else if normalized.contains("high") {
        SeverityBucket::High
    } else if normalized.contains("medium") {
        SeverityBucket::Medium
    } else if normalized.contains("low") {
        SeverityBucket::Low
    } else {
        SeverityBucket::Unknown
    }
}

/// Partitions vulnerabilities by the first severity score of each record.
///
/// Records without any severity entry count as unknown, so the counters always
/// sum to `vulnerabilities.len()`.
pub fn summarize_vulnerabilities(vulnerabilities: &[Vulnerability]) -> VulnerabilitySummary {
    let mut summary = VulnerabilitySummary::default();
    for vulnerability in vulnerabilities {
        let bucket = vulnerability
            .severity
            .first()
            .map(|entry| classify_severity(&entry.score))
            .unwrap_or(SeverityBucket::Unknown);
        summary.record(bucket);
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("package '{package}' was not found in {source_name}")]
    NotFound {
        source_name: &'static str,
        package: String,
    },
    #[error("upstream request failed: {message}")]
    Transport { message: String },
    #[error("upstream returned invalid data: {message}")]
    InvalidResponse { message: String },
    #[error("request was cancelled")]
    Cancelled,
    #[error("upstream request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ProviderError {
    /// Deadline error for `deadline`, rounded up to whole seconds so a
    /// sub-second deadline never reports `0s`.
    pub fn timeout(deadline: Duration) -> Self {
        let whole = deadline.as_secs();
        let seconds = if deadline.subsec_nanos() > 0 {
            whole.saturating_add(1)
        } else {
            whole
        };
        Self::Timeout { seconds }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
pub trait VulnerabilitySource: Send + Sync {
    async fn query_vulnerabilities(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: Option<&str>,
    ) -> Result<Vec<Vulnerability>, ProviderError>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_package_metadata(
        &self,
        ecosystem: Ecosystem,
        package: &str,
    ) -> Result<PackageMetadata, ProviderError>;
}
