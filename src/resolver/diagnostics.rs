// Failure diagnostics - classifies yt-dlp failures
//
// Maps the engine's stderr to a FailureKind that drives tier advancement:
// - which failures a credentialed tier may fix (bot wall, sign-in)
// - which failures are worth retrying in place (timeouts, flaky network)
// - which failures no tier can repair (removed, region/age gated, bad format)

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Why a single attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Bot wall, captcha, PO token, 403/429 throttling
    BotDetectionSuspected,

    /// Private or members-only content, sign-in required
    AuthRequired,

    /// Deleted, removed, terminated or DRM-protected content
    ContentUnavailable,

    /// Age gate or geographic restriction
    RegionOrAgeRestricted,

    /// Requested format selector matched nothing
    FormatUnavailable,

    /// Engine process exceeded its wall-clock budget
    Timeout,

    /// Flaky network, 5xx responses, process killed by a signal
    Transient,

    /// Nothing recognizable in the diagnostic text
    Unknown,
}

impl FailureKind {
    /// No further tier can repair content-level unavailability
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ContentUnavailable | Self::RegionOrAgeRestricted | Self::FormatUnavailable
        )
    }

    /// Worth repeating the same strategy with a fresh identity
    pub fn is_retryable_in_place(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient)
    }

    /// A credential-bearing tier may get past this
    pub fn credentials_might_help(&self) -> bool {
        matches!(self, Self::BotDetectionSuspected | Self::AuthRequired)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::BotDetectionSuspected => "YouTube detected automated access",
            Self::AuthRequired => "This video requires signing in",
            Self::ContentUnavailable => "Video is unavailable",
            Self::RegionOrAgeRestricted => "Video is age-restricted or blocked in this region",
            Self::FormatUnavailable => "Requested format is not available",
            Self::Timeout => "Extraction timed out",
            Self::Transient => "Temporary network failure",
            Self::Unknown => "Extraction failed for an unknown reason",
        }
    }

    /// Short actionable list shown to the caller
    pub fn suggestions(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Self::BotDetectionSuspected => &[
                "Supply fresh cookies from a logged-in browser",
                "Retry later from a different network",
            ],
            Self::AuthRequired => &[
                "Supply cookies from an account that can view this video",
                "Make sure the exported cookies include SID, HSID, SSID, APISID and SAPISID",
            ],
            Self::ContentUnavailable => &[
                "The video may have been deleted, removed or made private",
                "Try a different target",
            ],
            Self::RegionOrAgeRestricted => &[
                "Supply cookies from an 18+ account for age-restricted videos",
                "Region-locked videos need a network in an allowed country",
            ],
            Self::FormatUnavailable => &[
                "Fetch metadata again and pick a listed format id",
                "Use a generic selector such as \"best\"",
            ],
            Self::Timeout => &["Retry", "Check the server's connection to YouTube"],
            Self::Transient => &["Retry in a few seconds"],
            Self::Unknown => &[
                "Retry",
                "Check the video URL",
                "Update yt-dlp: pip3 install -U yt-dlp",
            ],
        };
        hints.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One ordered classification rule
struct Rule {
    kind: FailureKind,
    needles: &'static [&'static str],
    pattern: Option<Regex>,
}

impl Rule {
    fn matches(&self, lower: &str) -> Vec<String> {
        let mut hits: Vec<String> = self
            .needles
            .iter()
            .filter(|n| lower.contains(*n))
            .map(|n| n.to_string())
            .collect();
        if let Some(m) = self.pattern.as_ref().and_then(|re| re.find(lower)) {
            hits.push(m.as_str().to_string());
        }
        hits
    }
}

lazy_static! {
    // Evaluated top to bottom, first match wins.
    static ref RULES: Vec<Rule> = vec![
        Rule {
            kind: FailureKind::BotDetectionSuspected,
            needles: &[
                "not a bot",
                "not a robot",
                "captcha",
                "unusual traffic",
                "automated queries",
                "po token",
                "proof of origin",
                "sabr",
                "too many requests",
                "forbidden",
            ],
            pattern: Some(Regex::new(r"\bbot\b|http error (403|429)|rate[ -]?limit").unwrap()),
        },
        Rule {
            kind: FailureKind::AuthRequired,
            needles: &[
                "requires sign-in",
                "sign in to view",
                "private video",
                "video is private",
                "granted access",
                "members-only",
                "members only",
                "join this channel",
                "membership required",
                "available to members",
                "login required",
                "requires authentication",
                "registered users",
            ],
            pattern: None,
        },
        Rule {
            kind: FailureKind::ContentUnavailable,
            needles: &[
                "video unavailable",
                "video is unavailable",
                "no longer available",
                "has been removed",
                "been terminated",
                "has been deleted",
                "does not exist",
                "incomplete youtube id",
                "drm",
                "widevine",
                "playready",
                "fairplay",
                "requires payment",
                "requires purchase",
            ],
            pattern: None,
        },
        Rule {
            kind: FailureKind::RegionOrAgeRestricted,
            needles: &[
                "confirm your age",
                "age-restricted",
                "age restricted",
                "age_verification",
                "inappropriate for some users",
                "available in your country",
                "blocked in your country",
                "from your location",
                "geo restrict",
                "geo-restrict",
                "geographic restriction",
            ],
            pattern: None,
        },
        Rule {
            kind: FailureKind::FormatUnavailable,
            needles: &[
                "requested format is not available",
                "requested format not available",
                "format is not available",
                "no video formats found",
            ],
            pattern: None,
        },
        Rule {
            kind: FailureKind::Transient,
            needles: &[
                "timed out",
                "connection reset",
                "connection refused",
                "connection aborted",
                "remote end closed connection",
                "temporary failure in name resolution",
                "name or service not known",
                "network is unreachable",
                "incompleteread",
            ],
            pattern: Some(Regex::new(r"http error 5\d\d").unwrap()),
        },
    ];
}

/// Classify a failed attempt from its diagnostic text and exit status.
///
/// Process timeouts never reach this function; the orchestrator maps them to
/// [`FailureKind::Timeout`] directly.
pub fn classify(diagnostic: &str, exit_status: Option<i32>) -> FailureKind {
    analyze(diagnostic, exit_status).kind
}

/// Detailed diagnostics for a failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Classified failure
    pub kind: FailureKind,

    /// First useful line of the engine output
    pub context: Option<String>,

    /// Needles/patterns of the winning rule that matched
    pub matched_patterns: Vec<String>,
}

/// Full diagnostic analysis of an attempt's stderr
pub fn analyze(diagnostic: &str, exit_status: Option<i32>) -> Diagnosis {
    let lower = diagnostic.to_lowercase();

    let (kind, matched_patterns) = RULES
        .iter()
        .find_map(|rule| {
            let hits = rule.matches(&lower);
            (!hits.is_empty()).then_some((rule.kind, hits))
        })
        .unwrap_or_else(|| {
            // Killed by a signal without a recognizable message
            if exit_status.is_none() {
                (FailureKind::Transient, Vec::new())
            } else {
                (FailureKind::Unknown, Vec::new())
            }
        });

    Diagnosis {
        kind,
        context: context_line(diagnostic),
        matched_patterns,
    }
}

/// First `ERROR:` line, else the last non-empty line
pub fn context_line(diagnostic: &str) -> Option<String> {
    diagnostic
        .lines()
        .map(str::trim)
        .find(|l| l.to_lowercase().starts_with("error:"))
        .or_else(|| diagnostic.lines().map(str::trim).rev().find(|l| !l.is_empty()))
        .map(|l| l.chars().take(300).collect())
}
