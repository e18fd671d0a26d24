// Data models for targets, payloads and orchestration outcomes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::credentials::CredentialSource;
use super::diagnostics::FailureKind;
use super::errors::{PayloadDefect, ResolveError};

/// Host family a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportedHost {
    /// youtube.com and its subdomains (www, m, music)
    YouTube,
    /// youtu.be short links
    ShortLink,
    /// youtube-nocookie.com embeds
    NoCookie,
}

/// Validated YouTube locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    host: SupportedHost,
}

impl Target {
    /// Parse and validate a URL; anything off the supported domains is rejected.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::InvalidTarget("URL is empty".to_string()));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| ResolveError::InvalidTarget(format!("{}: {}", trimmed, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::InvalidTarget(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| ResolveError::InvalidTarget(format!("{}: missing host", trimmed)))?;

        let family = if is_domain(&host, "youtube.com") {
            SupportedHost::YouTube
        } else if host == "youtu.be" {
            SupportedHost::ShortLink
        } else if is_domain(&host, "youtube-nocookie.com") {
            SupportedHost::NoCookie
        } else {
            return Err(ResolveError::InvalidTarget(format!(
                "'{}' is not a YouTube host",
                host
            )));
        };

        Ok(Self { url, host: family })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> SupportedHost {
        self.host
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn is_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Opaque yt-dlp format selector (e.g. `22`, `bestaudio`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormatSelector(String);

impl FormatSelector {
    pub fn new(raw: &str) -> Result<Self, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::InvalidFormatSelector);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a run should produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    FetchMetadata,
    ResolveDirectUrl(FormatSelector),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchMetadata => "fetch_metadata",
            Self::ResolveDirectUrl(_) => "resolve_direct_url",
        }
    }
}

/// Video-level metadata returned by `FetchMetadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub fulltitle: String,
    pub description: String,
    pub duration: f64,
    pub uploader: String,
    pub channel: String,
    pub channel_id: String,
    pub upload_date: String,
    pub view_count: u64,
    pub like_count: u64,
    pub thumbnail: String,
    pub webpage_url: String,
}

/// One downloadable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub format_note: Option<String>,
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub fps: Option<f64>,
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub info: VideoInfo,
    pub formats: Vec<StreamFormat>,
}

impl VideoMetadata {
    /// Parse `--dump-json` output.
    ///
    /// Formats without both `url` and `format_id` are dropped; the rest are sorted
    /// by `quality`, best first.
    pub fn from_engine_json(stdout: &str, target: &str) -> Result<Self, PayloadDefect> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Err(PayloadDefect::EmptyResult);
        }

        let json: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| PayloadDefect::MalformedPayload(format!("Invalid JSON: {}", e)))?;

        if !json.is_object() {
            return Err(PayloadDefect::MalformedPayload(
                "Expected a JSON object".to_string(),
            ));
        }

        let text = |key: &str| json[key].as_str().filter(|s| !s.is_empty());
        let title = text("title").unwrap_or("Unknown Title");

        let info = VideoInfo {
            id: text("id").unwrap_or("").to_string(),
            title: title.to_string(),
            fulltitle: text("fulltitle").unwrap_or(title).to_string(),
            description: text("description").unwrap_or("").to_string(),
            duration: json["duration"].as_f64().unwrap_or(0.0),
            uploader: text("uploader")
                .or_else(|| text("channel"))
                .unwrap_or("Unknown")
                .to_string(),
            channel: text("channel")
                .or_else(|| text("uploader"))
                .unwrap_or("Unknown")
                .to_string(),
            channel_id: text("channel_id")
                .or_else(|| text("uploader_id"))
                .unwrap_or("")
                .to_string(),
            upload_date: text("upload_date").unwrap_or("").to_string(),
            view_count: json["view_count"].as_u64().unwrap_or(0),
            like_count: json["like_count"].as_u64().unwrap_or(0),
            thumbnail: text("thumbnail").unwrap_or("").to_string(),
            webpage_url: text("webpage_url").unwrap_or(target).to_string(),
        };

        Ok(Self {
            info,
            formats: parse_formats(&json),
        })
    }
}

fn parse_formats(json: &serde_json::Value) -> Vec<StreamFormat> {
    let Some(entries) = json["formats"].as_array() else {
        return Vec::new();
    };

    let opt_str = |f: &serde_json::Value, key: &str| f[key].as_str().map(|s| s.to_string());

    let mut formats: Vec<StreamFormat> = entries
        .iter()
        .filter(|f| f["url"].as_str().is_some_and(|u| !u.is_empty()))
        .filter_map(|f| {
            let format_id = f["format_id"].as_str().filter(|s| !s.is_empty())?;
            Some(StreamFormat {
                format_id: format_id.to_string(),
                ext: opt_str(f, "ext"),
                resolution: opt_str(f, "resolution"),
                format_note: opt_str(f, "format_note"),
                filesize: f["filesize"].as_u64(),
                vcodec: opt_str(f, "vcodec"),
                acodec: opt_str(f, "acodec"),
                fps: f["fps"].as_f64(),
                quality: f["quality"].as_f64(),
            })
        })
        .collect();

    formats.sort_by(|a, b| {
        let qa = a.quality.unwrap_or(0.0);
        let qb = b.quality.unwrap_or(0.0);
        qb.total_cmp(&qa)
    });
    formats
}

/// Direct media URL(s) printed by `yt-dlp -g`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectUrl {
    raw: String,
}

impl DirectUrl {
    /// Trimmed engine output; `None` when nothing was printed.
    pub fn from_engine_output(stdout: &str) -> Option<Self> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            raw: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Split video+audio selectors print one URL per line.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.raw.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Metadata(VideoMetadata),
    DirectUrl(DirectUrl),
}

/// Outcome of one engine invocation
#[derive(Debug, Clone, Default)]
pub struct AttemptResult {
    pub payload: Option<Payload>,
    /// Captured stderr (engine diagnostics)
    pub diagnostic: String,
    /// `None` when the process was killed by a signal
    pub exit_status: Option<i32>,
    /// Set when the engine exited zero but the payload is unusable
    pub defect: Option<PayloadDefect>,
}

impl AttemptResult {
    pub fn succeeded(&self) -> bool {
        self.payload.is_some()
    }
}

/// Which tier produced the result, or was attempted last
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub tier: usize,
    pub strategy: String,
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "kind")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(FailureKind),
    /// Required credential missing; the engine was not invoked
    Skipped,
}

/// Observability record for one tier visit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub tier: usize,
    pub strategy: String,
    pub retry: u32,
    pub outcome: AttemptOutcome,
    pub used_credential: Option<CredentialSource>,
    #[serde(rename = "elapsedMs", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Successful run
#[derive(Debug, Clone)]
pub struct Resolution {
    pub payload: Payload,
    pub provenance: Provenance,
    pub attempts: Vec<AttemptRecord>,
}

/// Aggregated failure of a run
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub kind: FailureKind,
    pub message: String,
    pub suggestions: Vec<String>,
    /// Context line from the last attempt's diagnostic
    pub detail: Option<String>,
    /// Raw stderr of the last attempt
    pub diagnostic: String,
    pub defect: Option<PayloadDefect>,
    pub provenance: Option<Provenance>,
    pub attempts: Vec<AttemptRecord>,
    /// Stopped early on a content-level failure
    pub terminal: bool,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(p) = &self.provenance {
            write!(f, " (last tier: {} #{})", p.strategy, p.tier)?;
        }
        Ok(())
    }
}
