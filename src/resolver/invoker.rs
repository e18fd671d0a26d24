// Extraction invoker - one yt-dlp call with a fixed strategy
//
// The trait is the seam the orchestrator is tested through; `YtDlpInvoker` is the
// only production implementation.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::{InvokeError, PayloadDefect};
use super::fingerprint::Identity;
use super::models::{AttemptResult, DirectUrl, Operation, Payload, Target, VideoMetadata};
use super::strategy::Strategy;
use super::tools::EngineCommand;
use super::utils::run_output_with_timeout;

const REFERER: &str = "https://www.youtube.com/";

/// Everything needed for a single engine call
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub target: &'a Target,
    pub operation: &'a Operation,
    pub strategy: &'a Strategy,
    pub identity: &'a Identity,
    /// Materialized cookies.txt, when the tier runs with a credential
    pub credential_file: Option<&'a Path>,
    /// Ephemeral cache directory, also used as the engine's HOME
    pub cache_dir: &'a Path,
    /// `--geo-bypass-country` value for geo-bypass tiers
    pub geo_country: Option<&'a str>,
    /// Effective hard timeout (strategy timeout capped by the run budget)
    pub timeout: Duration,
    pub cancel: &'a CancellationToken,
}

/// Runs one extraction attempt.
///
/// A non-zero exit is a normal [`AttemptResult`]; only timeout, cancellation and
/// launch failures are errors.
#[async_trait]
pub trait ExtractionInvoker: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, invocation: Invocation<'_>) -> Result<AttemptResult, InvokeError>;
}

/// yt-dlp child-process invoker
pub struct YtDlpInvoker {
    engine: EngineCommand,
}

impl YtDlpInvoker {
    pub fn new(engine: EngineCommand) -> Self {
        Self { engine }
    }

    /// Engine arguments for one invocation, prefix args included
    pub fn build_args(&self, inv: &Invocation<'_>) -> Vec<String> {
        let strategy = inv.strategy;
        let mut args = self.engine.prefix_args.clone();

        match inv.operation {
            Operation::FetchMetadata => {
                args.push("--dump-json".to_string());
                args.push("--no-download".to_string());
            }
            Operation::ResolveDirectUrl(selector) => {
                args.push("-g".to_string());
                args.push("-f".to_string());
                args.push(selector.as_str().to_string());
            }
        }

        args.extend(
            [
                "--no-playlist",
                "--no-warnings",
                "--force-ipv4",
                "--cache-dir",
            ]
            .map(String::from),
        );
        args.push(inv.cache_dir.display().to_string());

        // Identity
        args.push("--user-agent".to_string());
        args.push(inv.identity.user_agent.clone());
        args.push("--referer".to_string());
        args.push(REFERER.to_string());
        for (name, value) in inv.identity.headers_for(strategy.identity_profile) {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }
        if strategy.impersonate {
            if let Some(profile) = &inv.identity.network_profile {
                args.push("--impersonate".to_string());
                args.push(profile.clone());
            }
        }

        // Engine-side retries
        args.push("--extractor-retries".to_string());
        args.push(strategy.extractor_retries.to_string());
        args.push("--fragment-retries".to_string());
        args.push(strategy.fragment_retries.to_string());
        if let Some(sleep) = &strategy.retry_sleep {
            args.push("--retry-sleep".to_string());
            args.push(sleep.clone());
        }
        args.push("--socket-timeout".to_string());
        args.push(strategy.socket_timeout.to_string());

        // Engine-side pacing
        if let Some(min) = strategy.sleep_interval {
            args.push("--sleep-interval".to_string());
            args.push(min.to_string());
            if let Some(max) = strategy.max_sleep_interval {
                args.push("--max-sleep-interval".to_string());
                args.push(max.to_string());
            }
        }
        if let Some(seconds) = strategy.sleep_requests {
            args.push("--sleep-requests".to_string());
            args.push(seconds.to_string());
        }

        if let Some(extractor_args) = youtube_extractor_args(strategy) {
            args.push("--extractor-args".to_string());
            args.push(extractor_args);
        }

        if strategy.geo_bypass {
            args.push("--geo-bypass".to_string());
            if let Some(country) = inv.geo_country {
                args.push("--geo-bypass-country".to_string());
                args.push(country.to_string());
            }
        }

        if let Some(path) = inv.credential_file {
            args.push("--cookies".to_string());
            args.push(path.display().to_string());
        }

        args.push(inv.target.as_str().to_string());
        args
    }
}

fn youtube_extractor_args(strategy: &Strategy) -> Option<String> {
    let mut parts = Vec::new();
    if !strategy.player_clients.is_empty() {
        parts.push(format!("player_client={}", strategy.player_clients.join(",")));
    }
    if !strategy.skip_manifests.is_empty() {
        parts.push(format!("skip={}", strategy.skip_manifests.join(",")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("youtube:{}", parts.join(";")))
    }
}

/// Turn a zero exit into a payload or a defect
fn parse_payload(
    operation: &Operation,
    stdout: &str,
    target: &str,
) -> Result<Payload, PayloadDefect> {
    match operation {
        Operation::FetchMetadata => {
            VideoMetadata::from_engine_json(stdout, target).map(Payload::Metadata)
        }
        Operation::ResolveDirectUrl(_) => DirectUrl::from_engine_output(stdout)
            .map(Payload::DirectUrl)
            .ok_or(PayloadDefect::EmptyResult),
    }
}

#[async_trait]
impl ExtractionInvoker for YtDlpInvoker {
    fn name(&self) -> &str {
        &self.engine.program
    }

    async fn invoke(&self, inv: Invocation<'_>) -> Result<AttemptResult, InvokeError> {
        let args = self.build_args(&inv);
        debug!(
            engine = %self.engine,
            strategy = %inv.strategy.name,
            operation = inv.operation.name(),
            with_cookies = inv.credential_file.is_some(),
            "Invoking extraction engine"
        );

        let started = Instant::now();
        let output = run_output_with_timeout(
            &self.engine.program,
            &args,
            &[("HOME", inv.cache_dir)],
            inv.timeout,
            inv.cancel,
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(
            exit_status = ?output.exit_status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            "Engine finished"
        );

        let mut result = AttemptResult {
            payload: None,
            diagnostic,
            exit_status: output.exit_status,
            defect: None,
        };

        if output.exit_status == Some(0) {
            match parse_payload(inv.operation, &stdout, inv.target.as_str()) {
                Ok(payload) => result.payload = Some(payload),
                Err(defect) => result.defect = Some(defect),
            }
        }

        Ok(result)
    }
}
