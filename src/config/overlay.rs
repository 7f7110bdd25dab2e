use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ConfigOverlay {
    pub cache: Option<CacheOverlay>,
    pub upstream: Option<UpstreamOverlay>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(super) struct CacheOverlay {
    pub ttl_minutes: Option<u64>,
    pub license_ttl_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(super) struct UpstreamOverlay {
    pub timeout_seconds: Option<u64>,
}
