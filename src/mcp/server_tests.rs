use super::*;
use async_trait::async_trait;
use package_pulse_core::{MetadataSource, PackageMetadata, Vulnerability, VulnerabilitySource};

use crate::cache::SqliteCache;
use crate::config::PackagePulseConfig;

struct Offline;

#[async_trait]
impl VulnerabilitySource for Offline {
    async fn query_vulnerabilities(
        &self,
        _ecosystem: Ecosystem,
        _package: &str,
        _version: Option<&str>,
    ) -> Result<Vec<Vulnerability>, ProviderError> {
        Err(ProviderError::Transport {
            message: "offline".to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for Offline {
    async fn fetch_package_metadata(
        &self,
        _ecosystem: Ecosystem,
        _package: &str,
    ) -> Result<PackageMetadata, ProviderError> {
        Err(ProviderError::Transport {
            message: "offline".to_string(),
        })
    }
}

fn test_server() -> PackagePulseServer {
    let cache = SqliteCache::in_memory().expect("in-memory cache");
    PackagePulseServer::with_service(PackagePulseService::with_parts(
        PackagePulseConfig::default(),
        Arc::new(Offline),
        Arc::new(Offline),
        Arc::new(cache),
    ))
}

fn required_fields(server: &PackagePulseServer, tool: &str) -> Vec<String> {
    let tool = server.get_tool(tool).expect("tool");
    tool.input_schema
        .get("required")
        .and_then(|v| v.as_array())
        .expect("required array")
        .iter()
        .map(|v| v.as_str().expect("required key as str").to_string())
        .collect()
}

#[test]
fn all_tools_are_registered() {
    let server = test_server();
    for name in [
        "deps.vulns",
        "deps.health",
        "license.info",
        "license.search",
        "deps.upgrade_plan",
    ] {
        let tool = server.get_tool(name);
        assert!(tool.is_some(), "{name} should be registered");
        assert_eq!(tool.expect("tool exists").name.as_ref(), name);
    }
}

#[test]
fn upgrade_plan_schema_requires_identity_and_version() {
    let server = test_server();
    let required = required_fields(&server, "deps.upgrade_plan");
    assert!(required.contains(&"ecosystem".to_string()));
    assert!(required.contains(&"package".to_string()));
    assert!(required.contains(&"current_version".to_string()));
}

#[test]
fn vulns_schema_keeps_version_optional() {
    let server = test_server();
    let required = required_fields(&server, "deps.vulns");
    assert!(required.contains(&"package".to_string()));
    assert!(!required.contains(&"version".to_string()));
}

#[test]
fn ecosystem_schema_lists_supported_keys() {
    let server = test_server();
    let tool = server.get_tool("deps.health").expect("tool");
    let values = tool
        .input_schema
        .get("properties")
        .and_then(|v| v.get("ecosystem"))
        .and_then(|v| v.get("enum"))
        .and_then(|v| v.as_array())
        .expect("ecosystem enum");
    let values: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    assert_eq!(values, vec!["npm", "pypi", "go", "maven", "cargo", "nuget"]);
}

#[test]
fn server_info_enables_tools() {
    let server = test_server();
    let info = server.get_info();
    assert!(info.capabilities.tools.is_some());
    assert!(
        info.instructions
            .expect("instructions")
            .contains("deps.upgrade_plan")
    );
}

#[test]
fn parse_ecosystem_rejects_unknown_and_blank_values() {
    assert_eq!(parse_ecosystem("PyPI").expect("pypi"), Ecosystem::PyPI);
    assert!(parse_ecosystem("  ").is_err());

    let err = parse_ecosystem("cobol").expect_err("unknown ecosystem");
    assert!(err.message.contains("supported ecosystems: npm, pypi"));
}

#[test]
fn validate_upgrade_query_trims_and_requires_fields() {
    let request = validate_upgrade_query(&UpgradePlanQuery {
        ecosystem: "npm".to_string(),
        package: " lodash ".to_string(),
        current_version: "4.17.19".to_string(),
    })
    .expect("valid query");
    assert_eq!(request.package, "lodash");

    let missing_version = UpgradePlanQuery {
        ecosystem: "npm".to_string(),
        package: "lodash".to_string(),
        current_version: " ".to_string(),
    };
    let err = validate_upgrade_query(&missing_version).expect_err("blank version");
    assert!(err.message.contains("current_version"));
}

#[test]
fn optional_version_rejects_blank_strings() {
    assert_eq!(optional_version(None).expect("none"), None);
    assert_eq!(optional_version(Some(" 1.0.0 ")).expect("some"), Some("1.0.0"));
    assert!(optional_version(Some("  ")).is_err());
}

#[test]
fn domain_errors_become_error_results() {
    let provider = anyhow::Error::new(ProviderError::NotFound {
        source_name: "deps.dev",
        package: "npm/missing".to_string(),
    })
    .context("query deps.dev for npm/missing");
    let result = tool_failure(provider).expect("tool-level error result");
    assert_eq!(result.is_error, Some(true));

    let license = anyhow::Error::new(LicenseError::NotFound {
        id: "NOPE".to_string(),
    });
    let result = tool_failure(license).expect("tool-level error result");
    assert_eq!(result.is_error, Some(true));
}

#[test]
fn other_errors_become_internal_errors() {
    let err = tool_failure(anyhow::anyhow!("sqlite cache mutex poisoned"))
        .expect_err("internal error");
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
}
