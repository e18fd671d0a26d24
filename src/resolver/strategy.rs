// Extraction strategies - declarative tier configuration
//
// A strategy is an immutable record; the orchestrator walks them by rank and the
// invoker turns one into engine arguments.

use std::time::Duration;

use serde::Serialize;

pub use super::fingerprint::IdentityProfile;

/// Whether a tier runs with cookies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRequirement {
    None,
    /// Uses the current credential candidate when there is one
    Optional,
    /// Skipped when no credential candidate remains
    Required,
}

impl CredentialRequirement {
    pub fn accepts_credential(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One tier of the escalation ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: String,
    /// Lower runs first
    pub rank: u32,
    pub identity_profile: IdentityProfile,
    pub credential: CredentialRequirement,
    /// Hard wall-clock limit for one invocation
    pub timeout: Duration,
    /// In-place retries after Timeout/Transient
    pub retry_budget: u32,
    /// Engine-side `--extractor-retries`
    pub extractor_retries: u32,
    /// Engine-side `--fragment-retries`
    pub fragment_retries: u32,
    /// Engine-side `--retry-sleep` expression
    pub retry_sleep: Option<String>,
    /// Engine-side `--socket-timeout` seconds
    pub socket_timeout: u32,
    /// `youtube:player_client=` list
    pub player_clients: Vec<String>,
    /// Manifests passed to `youtube:skip=`
    pub skip_manifests: Vec<String>,
    pub geo_bypass: bool,
    /// Pass the identity's network profile to `--impersonate`
    pub impersonate: bool,
    /// Engine-side `--sleep-interval` seconds
    pub sleep_interval: Option<u32>,
    /// Engine-side `--max-sleep-interval` seconds, only with `sleep_interval`
    pub max_sleep_interval: Option<u32>,
    /// Engine-side `--sleep-requests` seconds
    pub sleep_requests: Option<u32>,
}

impl Strategy {
    pub fn new(name: &str, rank: u32) -> Self {
        Self {
            name: name.to_string(),
            rank,
            identity_profile: IdentityProfile::Minimal,
            credential: CredentialRequirement::None,
            timeout: Duration::from_secs(30),
            retry_budget: 1,
            extractor_retries: 3,
            fragment_retries: 3,
            retry_sleep: None,
            socket_timeout: 30,
            player_clients: Vec::new(),
            skip_manifests: Vec::new(),
            geo_bypass: false,
            impersonate: false,
            sleep_interval: None,
            max_sleep_interval: None,
            sleep_requests: None,
        }
    }

    pub fn with_identity(mut self, profile: IdentityProfile) -> Self {
        self.identity_profile = profile;
        self
    }

    pub fn with_credential(mut self, requirement: CredentialRequirement) -> Self {
        self.credential = requirement;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    pub fn with_engine_retries(mut self, extractor: u32, fragment: u32) -> Self {
        self.extractor_retries = extractor;
        self.fragment_retries = fragment;
        self
    }

    pub fn with_retry_sleep(mut self, expr: &str) -> Self {
        self.retry_sleep = Some(expr.to_string());
        self
    }

    pub fn with_socket_timeout(mut self, seconds: u32) -> Self {
        self.socket_timeout = seconds;
        self
    }

    pub fn with_player_clients(mut self, clients: &[&str]) -> Self {
        self.player_clients = clients.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_skip_manifests(mut self, manifests: &[&str]) -> Self {
        self.skip_manifests = manifests.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_geo_bypass(mut self, enabled: bool) -> Self {
        self.geo_bypass = enabled;
        self
    }

    pub fn with_impersonate(mut self, enabled: bool) -> Self {
        self.impersonate = enabled;
        self
    }

    /// Randomized engine sleep between `min` and `max` seconds
    pub fn with_sleep_interval(mut self, min: u32, max: u32) -> Self {
        self.sleep_interval = Some(min);
        self.max_sleep_interval = Some(max.max(min));
        self
    }

    pub fn with_sleep_requests(mut self, seconds: u32) -> Self {
        self.sleep_requests = Some(seconds);
        self
    }

    /// Escalation ladder: plain, cookies, full browser headers, stealth, fallback
    pub fn default_tiers() -> Vec<Strategy> {
        vec![
            Strategy::new("basic", 0)
                .with_player_clients(&["web", "mweb"])
                .with_skip_manifests(&["hls", "dash"])
                .with_sleep_interval(1, 3)
                .with_sleep_requests(1),
            Strategy::new("cookies", 1)
                .with_credential(CredentialRequirement::Required)
                .with_identity(IdentityProfile::Browser)
                .with_player_clients(&["web", "mweb"])
                .with_sleep_interval(1, 3)
                .with_sleep_requests(1),
            Strategy::new("enhanced", 2)
                .with_credential(CredentialRequirement::Optional)
                .with_identity(IdentityProfile::Browser)
                .with_timeout(Duration::from_secs(60))
                .with_engine_retries(7, 7)
                .with_retry_sleep("exp=1:120")
                .with_socket_timeout(90)
                .with_sleep_interval(2, 10)
                .with_impersonate(true),
            Strategy::new("stealth", 3)
                .with_credential(CredentialRequirement::Optional)
                .with_identity(IdentityProfile::Stealth)
                .with_timeout(Duration::from_secs(90))
                .with_engine_retries(5, 5)
                .with_socket_timeout(60)
                .with_player_clients(&["tv", "web_safari"])
                .with_skip_manifests(&["hls", "dash"])
                .with_geo_bypass(true)
                .with_impersonate(true),
            Strategy::new("fallback", 4)
                .with_timeout(Duration::from_secs(45))
                .with_engine_retries(5, 5)
                .with_socket_timeout(45)
                .with_player_clients(&["android", "ios"])
                .with_skip_manifests(&["dash"])
                .with_sleep_interval(2, 5)
                .with_sleep_requests(1),
        ]
    }
}
