// Error types for the resolver

use std::time::Duration;

use thiserror::Error;

use super::credentials::CredentialSource;
use super::diagnostics::FailureKind;
use super::models::ExtractionFailure;

/// Request-level errors surfaced to the caller.
///
/// Everything except [`ResolveError::Extraction`] is raised before or outside the
/// tier walk and is never retried.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// URL is not a supported YouTube locator
    #[error("Invalid URL: {0}")]
    InvalidTarget(String),

    /// `ResolveDirectUrl` without a usable format selector
    #[error("Invalid format selector: a non-empty format id is required")]
    InvalidFormatSelector,

    /// Credential is missing the minimal set of authentication cookies
    #[error(
        "Invalid credential ({origin}): found [{}], required [{}]",
        .found.join(", "),
        .required.join(", ")
    )]
    InvalidCredential {
        origin: CredentialSource,
        found: Vec<String>,
        required: Vec<&'static str>,
    },

    /// Extraction engine could not be started (binary missing, cannot fork)
    #[error("Failed to start extraction engine {program}: {reason}")]
    ProcessLaunchFailure { program: String, reason: String },

    /// Ephemeral cache directory or credential file could not be created
    #[error("Failed to prepare ephemeral resources: {0}")]
    Resource(#[from] std::io::Error),

    /// Caller went away; remaining tiers were abandoned
    #[error("Request cancelled")]
    Cancelled,

    /// Every applicable tier failed, or a tier hit a terminal failure
    #[error("{0}")]
    Extraction(Box<ExtractionFailure>),
}

impl ResolveError {
    /// FailureKind for extraction failures, `None` for request/infrastructure errors.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Extraction(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// Actionable hints for the caller
    pub fn suggestions(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Self::Extraction(failure) => return failure.suggestions.clone(),
            Self::InvalidTarget(_) => &[
                "Use a youtube.com, youtu.be or youtube-nocookie.com link",
                "Try a different target",
            ],
            Self::InvalidFormatSelector => &["Pass a format id from the metadata response"],
            Self::InvalidCredential { .. } => &[
                "Export cookies again from a logged-in browser session",
                "Supply fresh credentials in Netscape cookies.txt format",
            ],
            Self::ProcessLaunchFailure { .. } => &[
                "Install yt-dlp: pip3 install yt-dlp",
                "Point YTR_ENGINE at the yt-dlp binary",
            ],
            Self::Resource(_) => &["Check that the temp directory is writable"],
            Self::Cancelled => &["Retry the request"],
        };
        hints.iter().map(|s| s.to_string()).collect()
    }
}

impl From<ExtractionFailure> for ResolveError {
    fn from(failure: ExtractionFailure) -> Self {
        Self::Extraction(Box::new(failure))
    }
}

/// Exceptional outcomes of a single engine invocation.
///
/// A non-zero exit status is not an error; it is captured in the attempt result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Failed to start {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("Invocation cancelled")]
    Cancelled,
}

/// Engine exited zero but its output is not a usable result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadDefect {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Engine exited successfully but printed no result")]
    EmptyResult,
}
