use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use youtube_resolver::build_orchestrator;
use youtube_resolver::resolver::cookies;
use youtube_resolver::resolver::credentials::{Credential, CredentialSource};
use youtube_resolver::resolver::{EngineCommand, ResolveRequest, ResolveResponse, ResolverConfig};

#[derive(Parser)]
#[command(name = "youtube-resolver", version, about = "Tiered yt-dlp resolver for YouTube")]
struct Cli {
    /// Extraction engine command (e.g. "/usr/bin/yt-dlp" or "python3 -m yt_dlp")
    #[arg(long, global = true, env = "YTR_ENGINE")]
    engine: Option<String>,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long, global = true, env = "YTR_TOTAL_BUDGET_SECS")]
    budget_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch video metadata and the format list
    Metadata {
        /// YouTube URL
        #[arg(short, long)]
        url: String,

        /// Cookies file (Netscape, JSON export, key=value or base64)
        #[arg(short, long)]
        cookies: Option<PathBuf>,
    },

    /// Resolve a direct media URL for one format
    DirectUrl {
        /// YouTube URL
        #[arg(short, long)]
        url: String,

        /// Format id from the metadata response
        #[arg(short, long)]
        format: String,

        /// Cookies file (Netscape, JSON export, key=value or base64)
        #[arg(short, long)]
        cookies: Option<PathBuf>,
    },

    /// Check that a cookies file carries the required authentication cookies
    ValidateCookies {
        /// Cookies file
        path: PathBuf,
    },

    /// Show which extraction engine would be used and its version
    Engine,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ResolverConfig::from_env();
    if cli.engine.is_some() {
        config = config.with_engine(cli.engine);
    }
    if let Some(secs) = cli.budget_secs {
        config = config.with_total_budget(Duration::from_secs(secs));
    }

    let ok = match cli.command {
        Commands::Metadata { url, cookies } => {
            let request = ResolveRequest {
                url,
                format_id: None,
                cookies: read_cookies(cookies.as_deref())?,
                operation: None,
            };
            cmd_resolve(config, request).await?
        }
        Commands::DirectUrl {
            url,
            format,
            cookies,
        } => {
            let request = ResolveRequest {
                url,
                format_id: Some(format),
                cookies: read_cookies(cookies.as_deref())?,
                operation: None,
            };
            cmd_resolve(config, request).await?
        }
        Commands::ValidateCookies { path } => cmd_validate_cookies(&path)?,
        Commands::Engine => cmd_engine(&config)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn read_cookies(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read cookies file {}", p.display()))
    })
    .transpose()
}

async fn cmd_resolve(config: ResolverConfig, request: ResolveRequest) -> Result<bool> {
    let orchestrator = build_orchestrator(config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning remaining tiers");
            on_signal.cancel();
        }
    });

    let result = orchestrator.resolve_request(&request, &cancel).await;
    let response = ResolveResponse::from_result(result);

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.is_success())
}

fn cmd_validate_cookies(path: &Path) -> Result<bool> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cookies file {}", path.display()))?;

    let parsed = cookies::normalize(&raw)
        .map_err(anyhow::Error::from)
        .and_then(|canonical| {
            Credential::from_netscape(CredentialSource::File, &canonical)
                .map_err(anyhow::Error::from)
        });

    let report = match parsed {
        Ok(credential) => serde_json::json!({
            "valid": true,
            "fresh": credential.is_fresh(),
        }),
        Err(e) => serde_json::json!({
            "valid": false,
            "error": e.to_string(),
        }),
    };

    let valid = report["valid"].as_bool().unwrap_or(false);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(valid)
}

fn cmd_engine(config: &ResolverConfig) -> Result<bool> {
    let engine = EngineCommand::discover(config);
    let version = engine.version();

    let report = serde_json::json!({
        "kind": engine.kind,
        "command": engine.to_string(),
        "version": version,
        "available": version.is_some(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(version.is_some())
}
