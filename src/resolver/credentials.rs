// Credential store - cookie bundles in priority order
//
// Sources, highest priority first:
// 1. user-supplied (per request)
// 2. environment variable (loaded once at start-up)
// 3. cookies.txt at a well-known location (loaded once at start-up)
// 4. built-in bundle provided by the embedder
// 5. no credential

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::config::ResolverConfig;
use super::cookies;
use super::errors::ResolveError;

/// Authentication cookies every usable bundle must carry
pub const REQUIRED_MARKERS: [&str; 5] = ["SID", "HSID", "SSID", "APISID", "SAPISID"];

const YOUTUBE_DOMAIN: &str = "youtube.com";

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    UserSupplied,
    Environment,
    File,
    BuiltIn,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserSupplied => write!(f, "user-supplied"),
            Self::Environment => write!(f, "environment"),
            Self::File => write!(f, "file"),
            Self::BuiltIn => write!(f, "built-in"),
        }
    }
}

/// Validated cookie bundle in canonical Netscape form
#[derive(Clone)]
pub struct Credential {
    source: CredentialSource,
    netscape: String,
    fresh: Option<bool>,
}

// Cookie values never go to logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("bytes", &self.netscape.len())
            .field("fresh", &self.fresh)
            .finish()
    }
}

impl Credential {
    /// Validate canonical Netscape text and build a credential.
    pub fn from_netscape(source: CredentialSource, netscape: &str) -> Result<Self, ResolveError> {
        let entries = parse_entries(netscape);

        let found: BTreeSet<&str> = entries
            .iter()
            .filter(|e| e.domain.contains(YOUTUBE_DOMAIN))
            .map(|e| e.name)
            .filter(|name| REQUIRED_MARKERS.contains(name))
            .collect();

        if found.len() < REQUIRED_MARKERS.len() {
            return Err(ResolveError::InvalidCredential {
                origin: source,
                found: found.iter().map(|s| s.to_string()).collect(),
                required: REQUIRED_MARKERS.to_vec(),
            });
        }

        let fresh = freshness(&entries, OffsetDateTime::now_utc().unix_timestamp());

        let mut canonical = netscape.trim().to_string();
        canonical.push('\n');

        Ok(Self {
            source,
            netscape: canonical,
            fresh,
        })
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Canonical bytes written to the credential lease
    pub fn as_bytes(&self) -> &[u8] {
        self.netscape.as_bytes()
    }

    /// `Some(false)` if any required cookie has expired, `None` for session-only bundles
    pub fn is_fresh(&self) -> Option<bool> {
        self.fresh
    }
}

struct CookieEntry<'a> {
    domain: &'a str,
    expires: i64,
    name: &'a str,
}

fn parse_entries(netscape: &str) -> Vec<CookieEntry<'_>> {
    netscape
        .lines()
        .map(|line| line.strip_prefix("#HttpOnly_").unwrap_or(line))
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 7 {
                return None;
            }
            Some(CookieEntry {
                domain: parts[0],
                expires: parts[4].trim().parse().unwrap_or(0),
                name: parts[5].trim(),
            })
        })
        .collect()
}

fn freshness(entries: &[CookieEntry<'_>], now: i64) -> Option<bool> {
    let expiries: Vec<i64> = entries
        .iter()
        .filter(|e| REQUIRED_MARKERS.contains(&e.name) && e.expires > 0)
        .map(|e| e.expires)
        .collect();

    if expiries.is_empty() {
        return None;
    }
    Some(expiries.iter().all(|&exp| exp > now))
}

/// One option the orchestrator can present to a credentialed tier
#[derive(Debug, Clone)]
pub enum CredentialCandidate {
    Present(Arc<Credential>),
    /// Final option: run without cookies
    Anonymous,
}

impl CredentialCandidate {
    pub fn credential(&self) -> Option<&Arc<Credential>> {
        match self {
            Self::Present(c) => Some(c),
            Self::Anonymous => None,
        }
    }
}

/// Read-only store of static credentials, shared across runs
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    statics: Arc<[Arc<Credential>]>,
}

impl CredentialStore {
    /// Build a store from already validated static credentials.
    ///
    /// Order is by source priority; the user-supplied slot is reserved for requests.
    pub fn new(mut credentials: Vec<Credential>) -> Self {
        credentials.retain(|c| c.source != CredentialSource::UserSupplied);
        credentials.sort_by_key(|c| c.source);
        Self {
            statics: credentials.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load environment and file sources once at process start.
    ///
    /// Broken static sources are logged and skipped, never fatal.
    pub fn load(config: &ResolverConfig, builtin: Option<Credential>) -> Self {
        let mut credentials = Vec::new();

        if let Ok(raw) = std::env::var(&config.cookies_env_var) {
            match load_static(CredentialSource::Environment, &raw) {
                Ok(c) => {
                    info!(var = %config.cookies_env_var, "Loaded cookies from environment");
                    credentials.push(c);
                }
                Err(e) => {
                    warn!(var = %config.cookies_env_var, "Ignoring environment cookies: {}", e)
                }
            }
        }

        if let Some(c) = config.cookie_files.iter().find_map(|p| load_file(p)) {
            credentials.push(c);
        }

        if let Some(c) = builtin {
            credentials.push(c);
        }

        credentials.iter().for_each(warn_if_stale);

        Self::new(credentials)
    }

    /// Number of static candidates
    pub fn len(&self) -> usize {
        self.statics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statics.is_empty()
    }

    /// Ordered candidates for one request, ending with [`CredentialCandidate::Anonymous`].
    ///
    /// `user_supplied` must already be canonical Netscape text; an invalid bundle
    /// rejects the request.
    pub fn resolve(
        &self,
        user_supplied: Option<&str>,
    ) -> Result<Vec<CredentialCandidate>, ResolveError> {
        let mut candidates = Vec::with_capacity(self.statics.len() + 2);

        if let Some(raw) = user_supplied {
            let user = Credential::from_netscape(CredentialSource::UserSupplied, raw)?;
            warn_if_stale(&user);
            candidates.push(CredentialCandidate::Present(Arc::new(user)));
        }

        candidates.extend(
            self.statics
                .iter()
                .cloned()
                .map(CredentialCandidate::Present),
        );
        candidates.push(CredentialCandidate::Anonymous);

        debug!(count = candidates.len(), "Resolved credential candidates");
        Ok(candidates)
    }
}

// Stale bundles are still offered
fn warn_if_stale(credential: &Credential) {
    if credential.is_fresh() == Some(false) {
        warn!(source = %credential.source(), "Cookies look expired");
    }
}

fn load_static(source: CredentialSource, raw: &str) -> Result<Credential, ResolveError> {
    let canonical = cookies::normalize(raw).map_err(|e| ResolveError::InvalidCredential {
        origin: source,
        found: vec![e.to_string()],
        required: REQUIRED_MARKERS.to_vec(),
    })?;
    Credential::from_netscape(source, &canonical)
}

fn load_file(path: &Path) -> Option<Credential> {
    let raw = std::fs::read_to_string(path).ok()?;
    match load_static(CredentialSource::File, &raw) {
        Ok(c) => {
            info!(path = %path.display(), "Loaded cookies file");
            Some(c)
        }
        Err(e) => {
            warn!(path = %path.display(), "Ignoring cookies file: {}", e);
            None
        }
    }
}
