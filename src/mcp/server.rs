//! MCP tool handlers and request/response orchestration.

use std::sync::Arc;

use rmcp::service::{RequestContext, RoleServer};
use rmcp::{
    ErrorData as McpError, ServerHandler, handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters, model::*, tool, tool_handler, tool_router,
};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

use package_pulse_core::{Ecosystem, ProviderError};
use package_pulse_spdx::LicenseError;
use package_pulse_upgrade::UpgradeRequest;

use crate::service::PackagePulseService;

fn ecosystem_schema(generator: &mut SchemaGenerator) -> Schema {
    let mut schema = String::json_schema(generator);
    schema.insert(
        "enum".into(),
        serde_json::json!(Ecosystem::supported_keys()),
    );
    schema
}

/// Parameters for the `deps.vulns` MCP tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct VulnsQuery {
    #[schemars(description = "Package ecosystem, e.g. \"npm\", \"pypi\", \"go\", \"maven\", \"cargo\", \"nuget\".")]
    #[schemars(schema_with = "ecosystem_schema")]
    pub ecosystem: String,

    #[schemars(description = "Package name, e.g. \"lodash\" or \"github.com/gin-gonic/gin\".")]
    pub package: String,

    #[schemars(description = "Specific version to check. Omit to list vulnerabilities across all versions.")]
    pub version: Option<String>,
}

/// Parameters for the `deps.health` MCP tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HealthQuery {
    #[schemars(description = "Package ecosystem, e.g. \"npm\", \"pypi\", \"go\", \"maven\", \"cargo\", \"nuget\".")]
    #[schemars(schema_with = "ecosystem_schema")]
    pub ecosystem: String,

    #[schemars(description = "Package name.")]
    pub package: String,
}

/// Parameters for the `license.info` MCP tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LicenseQuery {
    #[schemars(description = "SPDX license identifier, e.g. \"MIT\" or \"Apache-2.0\". Matched case-insensitively.")]
    pub license_id: String,
}

/// Parameters for the `license.search` MCP tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LicenseSearchQuery {
    #[schemars(description = "Text matched against license identifiers, names, and notes.")]
    pub query: String,
}

/// Parameters for the `deps.upgrade_plan` MCP tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpgradePlanQuery {
    #[schemars(description = "Package ecosystem, e.g. \"npm\", \"pypi\", \"go\", \"maven\", \"cargo\", \"nuget\".")]
    #[schemars(schema_with = "ecosystem_schema")]
    pub ecosystem: String,

    #[schemars(description = "Package name.")]
    pub package: String,

    #[schemars(description = "Version currently in use, compared verbatim against the latest release.")]
    pub current_version: String,
}

#[derive(Debug, Serialize)]
struct LicenseSearchResponse {
    query: String,
    count: usize,
    licenses: Vec<package_pulse_spdx::LicenseInfo>,
}

/// MCP transport adapter for the shared package intelligence service.
#[derive(Clone)]
pub struct PackagePulseServer {
    tool_router: ToolRouter<Self>,
    service: Arc<PackagePulseService>,
}

#[tool_router]
impl PackagePulseServer {
    /// Creates a server using the default runtime service.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying service fails to initialize.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_service(PackagePulseService::new()?))
    }

    pub(crate) fn with_service(service: PackagePulseService) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service: Arc::new(service),
        }
    }

    #[tool(
        name = "deps.vulns",
        description = "List known vulnerabilities (OSV.dev) for a package, optionally pinned to a version. Returns each advisory plus counts by severity (critical, high, medium, low, unknown)."
    )]
    async fn vulns(
        &self,
        Parameters(query): Parameters<VulnsQuery>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let ecosystem = parse_ecosystem(&query.ecosystem)?;
        let package = required("package", &query.package)?;
        let version = optional_version(query.version.as_deref())?;
        tracing::info!(tool = "deps.vulns", %ecosystem, package, version, "handling tool call");

        match self
            .service
            .vulnerabilities(ecosystem, package, version, &context.ct)
            .await
        {
            Ok(report) => json_result(&report),
            Err(err) => tool_failure(err),
        }
    }

    #[tool(
        name = "deps.health",
        description = "Score the maintenance health of a package from deps.dev metadata: release recency, release count, repository, documentation, and license. Returns a 0-100 score, a level (excellent, good, fair, poor, critical), and advice."
    )]
    async fn health(
        &self,
        Parameters(query): Parameters<HealthQuery>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let ecosystem = parse_ecosystem(&query.ecosystem)?;
        let package = required("package", &query.package)?;
        tracing::info!(tool = "deps.health", %ecosystem, package, "handling tool call");

        match self.service.health(ecosystem, package, &context.ct).await {
            Ok(metrics) => json_result(&metrics),
            Err(err) => tool_failure(err),
        }
    }

    #[tool(
        name = "license.info",
        description = "Look up an SPDX license: full name, OSI/FSF approval, category (permissive, copyleft, ...), and compatibility notes."
    )]
    async fn license_info(
        &self,
        Parameters(query): Parameters<LicenseQuery>,
    ) -> Result<CallToolResult, McpError> {
        let license_id = required("license_id", &query.license_id)?;
        tracing::info!(tool = "license.info", license_id, "handling tool call");

        match self.service.license(license_id) {
            Ok(license) => json_result(&license),
            Err(err) => tool_failure(err),
        }
    }

    #[tool(
        name = "license.search",
        description = "Search the SPDX license catalog by identifier, name, or description text."
    )]
    async fn license_search(
        &self,
        Parameters(query): Parameters<LicenseSearchQuery>,
    ) -> Result<CallToolResult, McpError> {
        let text = required("query", &query.query)?;
        tracing::info!(tool = "license.search", query = text, "handling tool call");

        let licenses = self.service.search_licenses(text);
        json_result(&LicenseSearchResponse {
            query: text.to_string(),
            count: licenses.len(),
            licenses,
        })
    }

    #[tool(
        name = "deps.upgrade_plan",
        description = "Recommend whether and how urgently to upgrade a dependency. Combines vulnerabilities in the current version with package health and returns a priority (URGENT, OK, WARNING, LOW, MEDIUM, RECOMMENDED), the target version, and a breaking-change hint."
    )]
    async fn upgrade_plan(
        &self,
        Parameters(query): Parameters<UpgradePlanQuery>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let request = validate_upgrade_query(&query)?;
        tracing::info!(
            tool = "deps.upgrade_plan",
            ecosystem = %request.ecosystem,
            package = %request.package,
            current_version = %request.current_version,
            "handling tool call"
        );

        match self.service.upgrade_plan(&request, &context.ct).await {
            Ok(plan) => json_result(&plan),
            Err(err) => tool_failure(err),
        }
    }
}

#[tool_handler]
impl ServerHandler for PackagePulseServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Package intelligence for dependency decisions. Use `deps.vulns` for known vulnerabilities, `deps.health` for maintenance health, `deps.upgrade_plan` before bumping a dependency, and `license.info` / `license.search` for SPDX license details.".into(),
            ),
        }
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(mcp_internal_error)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Domain failures go back to the caller as error results; anything else is internal.
fn tool_failure(error: anyhow::Error) -> Result<CallToolResult, McpError> {
    let message = format!("{error:#}");
    if error.downcast_ref::<ProviderError>().is_some()
        || error.downcast_ref::<LicenseError>().is_some()
    {
        tracing::warn!(error = %message, "tool call failed");
        return Ok(CallToolResult::error(vec![Content::text(message)]));
    }
    tracing::error!(error = %message, "tool call failed with internal error");
    Err(mcp_internal_error(message))
}

fn mcp_internal_error(error: impl ToString) -> McpError {
    McpError::internal_error(error.to_string(), None)
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, McpError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(McpError::invalid_params(
            format!("{field} must not be empty"),
            None,
        ));
    }
    Ok(trimmed)
}

fn optional_version(version: Option<&str>) -> Result<Option<&str>, McpError> {
    match version {
        Some(version) if version.trim().is_empty() => Err(McpError::invalid_params(
            "version must not be an empty string",
            None,
        )),
        Some(version) => Ok(Some(version.trim())),
        None => Ok(None),
    }
}

fn parse_ecosystem(raw: &str) -> Result<Ecosystem, McpError> {
    required("ecosystem", raw)?.parse::<Ecosystem>().map_err(|err| {
        McpError::invalid_params(
            format!(
                "{err}; supported ecosystems: {}",
                Ecosystem::supported_keys().join(", ")
            ),
            None,
        )
    })
}

fn validate_upgrade_query(query: &UpgradePlanQuery) -> Result<UpgradeRequest, McpError> {
    let ecosystem = parse_ecosystem(&query.ecosystem)?;
    let package = required("package", &query.package)?;
    let current_version = required("current_version", &query.current_version)?;
    Ok(UpgradeRequest {
        ecosystem,
        package: package.to_string(),
        current_version: current_version.to_string(),
    })
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
