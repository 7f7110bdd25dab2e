//! CLI entrypoint for serving MCP tools and running one-off package queries.

mod cache;
mod config;
mod mcp;
mod service;

use clap::{Parser, Subcommand};
use mcp::PackagePulseServer;
use package_pulse_core::Ecosystem;
use package_pulse_upgrade::UpgradeRequest;
use rmcp::ServiceExt;
use serde::Serialize;
use service::PackagePulseService;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "package-pulse",
    version,
    about = "MCP server for package vulnerability, health, license, and upgrade intelligence"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server
    Serve {
        /// Run as MCP server over stdio
        #[arg(long)]
        mcp: bool,
    },
    /// List known vulnerabilities for a package
    Vulns {
        /// Ecosystem key (npm, pypi, go, maven, cargo, nuget)
        ecosystem: String,
        package: String,
        /// Restrict the query to one version
        #[arg(long)]
        version: Option<String>,
    },
    /// Score package maintenance health
    Health { ecosystem: String, package: String },
    /// Recommend an upgrade for the version currently in use
    UpgradePlan {
        ecosystem: String,
        package: String,
        current_version: String,
    },
    /// Look up an SPDX license, search the catalog, or list it by category
    License {
        /// License identifier, e.g. MIT
        #[arg(required_unless_present_any = ["search", "categories"])]
        id: Option<String>,
        /// Search identifiers, names, and notes instead of an exact lookup
        #[arg(long, conflicts_with = "id")]
        search: Option<String>,
        /// List every license grouped by category
        #[arg(long, conflicts_with_all = ["id", "search"])]
        categories: bool,
    },
}

fn init_tracing() {
    // stdout carries the MCP transport and command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

/// Resolves with the name of the first shutdown signal received. A handler
/// that fails to install is logged and never fires.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Serve { mcp } = cli.command {
        if !mcp {
            anyhow::bail!("Only --mcp mode is currently supported");
        }

        tracing::info!("package-pulse MCP server starting");

        let server = PackagePulseServer::new()?;
        let running = server.serve(rmcp::transport::stdio()).await?;
        tokio::select! {
            quit = running.waiting() => {
                quit?;
            }
            signal = shutdown_signal() => {
                tracing::info!(signal, "shutting down");
                // The stdio transport's blocking stdin read would hold runtime
                // shutdown until the host closes the pipe.
                std::process::exit(0);
            }
        }
        return Ok(());
    }

    let service = PackagePulseService::new()?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Serve { .. } => {}
        Commands::Vulns {
            ecosystem,
            package,
            version,
        } => {
            let ecosystem = ecosystem.parse::<Ecosystem>()?;
            let report = service
                .vulnerabilities(ecosystem, &package, version.as_deref(), &cancel)
                .await?;
            print_json(&report)?;
        }
        Commands::Health { ecosystem, package } => {
            let ecosystem = ecosystem.parse::<Ecosystem>()?;
            let metrics = service.health(ecosystem, &package, &cancel).await?;
            print_json(&metrics)?;
        }
        Commands::UpgradePlan {
            ecosystem,
            package,
            current_version,
        } => {
            let request = UpgradeRequest {
                ecosystem: ecosystem.parse()?,
                package,
                current_version,
            };
            let plan = service.upgrade_plan(&request, &cancel).await?;
            print_json(&plan)?;
        }
        Commands::License {
            id,
            search,
            categories,
        } => match (id, search) {
            _ if categories => print_json(&service.license_categories())?,
            (_, Some(query)) => print_json(&service.search_licenses(&query))?,
            (Some(id), None) => print_json(&service.license(&id)?)?,
            (None, None) => {
                anyhow::bail!("a license id, --search query, or --categories is required")
            }
        },
    }

    Ok(())
}
