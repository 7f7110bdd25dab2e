use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn send_and_receive_with_env(
    messages: &[&str],
    expected_responses: usize,
    envs: &[(&str, &str)],
) -> Vec<serde_json::Value> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_package-pulse"));
    cmd.args(["serve", "--mcp"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().expect("failed to start package-pulse");

    let stdin = child.stdin.take().expect("stdin");
    let stdout = child.stdout.take().expect("stdout");

    let owned_messages: Vec<String> = messages.iter().map(|s| s.to_string()).collect();
    let writer = std::thread::spawn(move || {
        let mut stdin = stdin;
        for msg in &owned_messages {
            writeln!(stdin, "{msg}").expect("write message");
            stdin.flush().expect("flush message");
        }
        std::thread::sleep(std::time::Duration::from_secs(5));
        drop(stdin);
    });

    let reader = BufReader::new(stdout);
    let mut responses = Vec::new();
    for line in reader.lines() {
        let line = line.expect("line read");
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(val) = serde_json::from_str::<serde_json::Value>(&line) {
            responses.push(val);
            if responses.len() >= expected_responses {
                break;
            }
        }
    }

    writer.join().expect("writer join");
    let _ = child.kill();
    let _ = child.wait();
    responses
}

fn unique_temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("package-pulse-{nanos}-{name}"))
}

const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"0.1.0"}}}"#;
const INITIALIZED: &str = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;

fn call_tool(id: u64, name: &str, args: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{id},"method":"tools/call","params":{{"name":"{name}","arguments":{args}}}}}"#
    )
}

/// Isolated config, cache, and upstream URLs pointing at the mock server.
struct TestEnv {
    osv_url: String,
    deps_dev_url: String,
    config_path: String,
    project_config_path: String,
    cache_path: PathBuf,
}

impl TestEnv {
    fn new(mock_server: &MockServer) -> Self {
        let mock_uri = mock_server.uri();
        Self {
            osv_url: format!("{mock_uri}/v1/query"),
            deps_dev_url: format!("{mock_uri}/v3alpha"),
            config_path: unique_temp_path("config.toml")
                .to_string_lossy()
                .to_string(),
            project_config_path: unique_temp_path("project-config.toml")
                .to_string_lossy()
                .to_string(),
            cache_path: unique_temp_path("cache.db"),
        }
    }

    fn run(&self, messages: &[&str], expected_responses: usize) -> Vec<serde_json::Value> {
        let cache_path = self.cache_path.to_string_lossy().to_string();
        send_and_receive_with_env(
            messages,
            expected_responses,
            &[
                ("PACKAGE_PULSE_OSV_API_URL", self.osv_url.as_str()),
                ("PACKAGE_PULSE_DEPS_DEV_API_BASE_URL", self.deps_dev_url.as_str()),
                ("PACKAGE_PULSE_CONFIG_GLOBAL_PATH", self.config_path.as_str()),
                (
                    "PACKAGE_PULSE_CONFIG_PROJECT_PATH",
                    self.project_config_path.as_str(),
                ),
                ("PACKAGE_PULSE_CACHE_DB_PATH", cache_path.as_str()),
            ],
        )
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.cache_path);
    }
}

fn tool_body(response: &serde_json::Value) -> serde_json::Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("tool body");
    serde_json::from_str(text).expect("response json")
}

async fn mount_package(mock_server: &MockServer, name: &str) {
    let published = (Utc::now() - Duration::days(10)).to_rfc3339();
    let older = (Utc::now() - Duration::days(400)).to_rfc3339();
    let payload = serde_json::json!({
        "packageKey": { "system": "NPM", "name": name },
        "versions": [
            {
                "versionKey": { "system": "NPM", "name": name, "version": "1.4.0" },
                "publishedAt": older,
                "isDefault": false
            },
            {
                "versionKey": { "system": "NPM", "name": name, "version": "2.0.0" },
                "publishedAt": published,
                "isDefault": true,
                "licenses": ["MIT"]
            }
        ],
        "links": [
            { "label": "SOURCE_REPO", "url": "https://github.com/example/demo-lib" },
            { "label": "DOCUMENTATION", "url": "https://example.test/docs" }
        ]
    });

    Mock::given(method("GET"))
        .and(path(format!("/v3alpha/systems/npm/packages/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn upgrade_plan_is_urgent_for_critical_vulnerability() {
    let mock_server = MockServer::start().await;
    mount_package(&mock_server, "demo-lib").await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "vulns": [
                {
                    "id": "GHSA-demo-0001",
                    "summary": "Remote code execution",
                    "severity": [{ "type": "CVSS_V3", "score": "CRITICAL" }]
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let env = TestEnv::new(&mock_server);
    let call = call_tool(
        3,
        "deps.upgrade_plan",
        r#"{"ecosystem":"npm","package":"demo-lib","current_version":"1.4.0"}"#,
    );
    let responses = env.run(&[INIT, INITIALIZED, &call], 2);

    let call_resp = responses.iter().find(|item| item["id"] == 3).expect("call");
    assert_eq!(call_resp["result"]["isError"], false);
    let body = tool_body(call_resp);
    assert_eq!(body["priority"], "URGENT");
    assert_eq!(
        body["recommendation"],
        "CRITICAL: Upgrade immediately! Found 1 critical vulnerabilities in current version."
    );
    assert_eq!(body["latest_version"], "2.0.0");
    assert_eq!(body["upgrade_path"], serde_json::json!(["1.4.0", "2.0.0"]));
    assert_eq!(body["breaking_changes_possible"], true);
    assert_eq!(body["vulnerability_summary"]["critical"], 1);
    assert_eq!(body["maintenance_level"], "excellent");
}

#[tokio::test]
async fn upgrade_plan_tolerates_osv_outage() {
    let mock_server = MockServer::start().await;
    mount_package(&mock_server, "demo-lib").await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let env = TestEnv::new(&mock_server);
    let call = call_tool(
        3,
        "deps.upgrade_plan",
        r#"{"ecosystem":"npm","package":"demo-lib","current_version":"2.0.0-rc.1"}"#,
    );
    let responses = env.run(&[INIT, INITIALIZED, &call], 2);

    let call_resp = responses.iter().find(|item| item["id"] == 3).expect("call");
    assert_eq!(call_resp["result"]["isError"], false);
    let body = tool_body(call_resp);
    assert_eq!(body["priority"], "RECOMMENDED");
    assert_eq!(body["has_vulnerabilities"], false);
    assert_eq!(body["vulnerability_data_available"], false);
    assert_eq!(body["breaking_changes_possible"], false);
    assert!(body.get("vulnerability_summary").is_none());
}

#[tokio::test]
async fn health_reports_missing_package_as_tool_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3alpha/systems/npm/packages/ghost-pkg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let env = TestEnv::new(&mock_server);
    let call = call_tool(3, "deps.health", r#"{"ecosystem":"npm","package":"ghost-pkg"}"#);
    let responses = env.run(&[INIT, INITIALIZED, &call], 2);

    let call_resp = responses.iter().find(|item| item["id"] == 3).expect("call");
    assert_eq!(call_resp["result"]["isError"], true);
    let text = call_resp["result"]["content"][0]["text"]
        .as_str()
        .expect("error text");
    assert!(text.contains("query deps.dev for npm/ghost-pkg"));
    assert!(text.contains("not found"));
}

#[tokio::test]
async fn health_scores_mocked_metadata() {
    let mock_server = MockServer::start().await;
    mount_package(&mock_server, "demo-lib").await;

    let env = TestEnv::new(&mock_server);
    let call = call_tool(3, "deps.health", r#"{"ecosystem":"npm","package":"demo-lib"}"#);
    let responses = env.run(&[INIT, INITIALIZED, &call], 2);

    let call_resp = responses.iter().find(|item| item["id"] == 3).expect("call");
    let body = tool_body(call_resp);
    assert_eq!(body["latest_version"], "2.0.0");
    assert_eq!(body["version_count"], 2);
    assert_eq!(body["days_since_update"], 10);
    assert_eq!(body["maintenance_score"], 80.0);
    assert_eq!(body["maintenance_level"], "excellent");
}

#[tokio::test]
async fn vulns_report_includes_summary() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "vulns": [
                { "id": "GHSA-a", "severity": [{ "type": "CVSS_V3", "score": "HIGH" }] },
                { "id": "GHSA-b" }
            ]
        })))
        .mount(&mock_server)
        .await;

    let env = TestEnv::new(&mock_server);
    let call = call_tool(
        3,
        "deps.vulns",
        r#"{"ecosystem":"npm","package":"demo-lib","version":"1.0.0"}"#,
    );
    let responses = env.run(&[INIT, INITIALIZED, &call], 2);

    let call_resp = responses.iter().find(|item| item["id"] == 3).expect("call");
    let body = tool_body(call_resp);
    assert_eq!(body["vulnerability_count"], 2);
    assert_eq!(body["summary"]["high"], 1);
    assert_eq!(body["summary"]["unknown"], 1);
    assert_eq!(body["version"], "1.0.0");
}
