//! Configuration loading and merge logic for `package-pulse`.
//!
//! Global config and project-local config are merged with project values taking precedence.

mod overlay;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use self::overlay::ConfigOverlay;

/// Default TTL in minutes for vulnerability, health and upgrade-plan entries.
pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 5;
/// Default TTL in minutes for license entries.
pub const DEFAULT_LICENSE_TTL_MINUTES: u64 = 24 * 60;
/// Default per-call deadline for upstream queries.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 30;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PackagePulseConfig {
    /// Cache lifetimes.
    pub cache: CacheConfig,
    /// Upstream API settings.
    pub upstream: UpstreamConfig,
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for package-derived entries.
    pub ttl_minutes: u64,
    /// TTL for license catalog entries.
    pub license_ttl_minutes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            license_ttl_minutes: DEFAULT_LICENSE_TTL_MINUTES,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_UPSTREAM_TIMEOUT_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    pub fn license_ttl(&self) -> Duration {
        Duration::from_secs(self.license_ttl_minutes.saturating_mul(60))
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PackagePulseConfig {
    /// Loads and merges global + project configuration from default paths.
    ///
    /// # Errors
    ///
    /// Returns an error if any discovered config file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with_paths(global_config_path(), project_config_path())
    }

    #[cfg(test)]
    fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        Self::load_with_paths(Some(path.to_path_buf()), None)
    }

    fn load_with_paths(global: Option<PathBuf>, project: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = global {
            config.merge_from_path(&path)?;
        }
        if let Some(path) = project {
            config.merge_from_path(&path)?;
        }
        Ok(config)
    }

    fn merge_from_path(&mut self, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let overlay: ConfigOverlay = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        tracing::debug!(path = %path.display(), "merged config file");
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(cache) = overlay.cache {
            if let Some(ttl_minutes) = cache.ttl_minutes {
                self.cache.ttl_minutes =
                    sanitize_positive_u64(ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
            }
            if let Some(license_ttl_minutes) = cache.license_ttl_minutes {
                self.cache.license_ttl_minutes =
                    sanitize_positive_u64(license_ttl_minutes, DEFAULT_LICENSE_TTL_MINUTES);
            }
        }
        if let Some(upstream) = overlay.upstream
            && let Some(timeout_seconds) = upstream.timeout_seconds
        {
            self.upstream.timeout_seconds =
                sanitize_positive_u64(timeout_seconds, DEFAULT_UPSTREAM_TIMEOUT_SECONDS);
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("PACKAGE_PULSE_CONFIG_GLOBAL_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)?;

    Some(home.join(".config").join("package-pulse").join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("PACKAGE_PULSE_CONFIG_PROJECT_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let cwd = env::current_dir().ok()?;
    Some(cwd.join(".package-pulse.toml"))
}

fn sanitize_positive_u64(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}

#[cfg(test)]
#[path = "../tests/config.rs"]
mod tests;
