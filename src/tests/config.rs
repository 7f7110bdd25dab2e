use super::*;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("package-pulse-{nanos}-{file_name}"))
}

#[test]
fn missing_config_uses_defaults() {
    let path = unique_temp_path("missing-config.toml");
    let config = PackagePulseConfig::load_from_path(&path).expect("default config");

    assert_eq!(config.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
    assert_eq!(config.cache.license_ttl_minutes, DEFAULT_LICENSE_TTL_MINUTES);
    assert_eq!(
        config.upstream.timeout_seconds,
        DEFAULT_UPSTREAM_TIMEOUT_SECONDS
    );
    assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    assert_eq!(config.cache.license_ttl(), Duration::from_secs(86_400));
    assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
}

#[test]
fn parses_config_values() {
    let path = unique_temp_path("config.toml");
    let raw = r#"
[cache]
ttl_minutes = 15
license_ttl_minutes = 60

[upstream]
timeout_seconds = 10
"#;
    fs::write(&path, raw).expect("write config");

    let config = PackagePulseConfig::load_from_path(&path).expect("parsed config");
    let _ = fs::remove_file(path);

    assert_eq!(config.cache.ttl_minutes, 15);
    assert_eq!(config.cache.license_ttl_minutes, 60);
    assert_eq!(config.upstream.timeout_seconds, 10);
}

#[test]
fn project_overrides_global_config() {
    let global_path = unique_temp_path("global-config.toml");
    let project_path = unique_temp_path("project-config.toml");
    fs::write(
        &global_path,
        r#"
[cache]
ttl_minutes = 20
license_ttl_minutes = 120

[upstream]
timeout_seconds = 45
"#,
    )
    .expect("write global config");
    fs::write(
        &project_path,
        r#"
[cache]
ttl_minutes = 2
"#,
    )
    .expect("write project config");

    let config =
        PackagePulseConfig::load_with_paths(Some(global_path.clone()), Some(project_path.clone()))
            .expect("merged config");

    let _ = fs::remove_file(global_path);
    let _ = fs::remove_file(project_path);

    assert_eq!(config.cache.ttl_minutes, 2);
    assert_eq!(config.cache.license_ttl_minutes, 120);
    assert_eq!(config.upstream.timeout_seconds, 45);
}

#[test]
fn zero_values_fall_back_to_defaults() {
    let path = unique_temp_path("zero-config.toml");
    let raw = r#"
[cache]
ttl_minutes = 0
license_ttl_minutes = 0

[upstream]
timeout_seconds = 0
"#;
    fs::write(&path, raw).expect("write config");

    let config = PackagePulseConfig::load_from_path(&path).expect("parsed config");
    let _ = fs::remove_file(path);

    assert_eq!(config.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
    assert_eq!(config.cache.license_ttl_minutes, DEFAULT_LICENSE_TTL_MINUTES);
    assert_eq!(
        config.upstream.timeout_seconds,
        DEFAULT_UPSTREAM_TIMEOUT_SECONDS
    );
}

#[test]
fn malformed_config_reports_path() {
    let path = unique_temp_path("broken-config.toml");
    fs::write(&path, "[cache\nttl_minutes = ").expect("write config");

    let err = PackagePulseConfig::load_from_path(&path).expect_err("malformed config");
    let _ = fs::remove_file(&path);
    assert!(err.to_string().contains("failed to parse config file"));
}
