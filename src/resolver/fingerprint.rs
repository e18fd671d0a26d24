// Fingerprint generator - randomized browser identities per attempt
//
// One generator lives for one run. It never hands out the same identity twice in a
// row, so a retry after a block always presents a different client.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const ACCEPT_FIREFOX: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_SAFARI: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Countries used for `--geo-bypass-country`
pub const GEO_COUNTRIES: [&str; 4] = ["US", "CA", "GB", "AU"];

struct BrowserProfile {
    user_agent: &'static str,
    accept: &'static str,
    /// yt-dlp `--impersonate` target
    network_profile: &'static str,
}

const POOL: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        accept: ACCEPT_HTML,
        network_profile: "chrome",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: ACCEPT_HTML,
        network_profile: "chrome",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        accept: ACCEPT_HTML,
        network_profile: "chrome",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        accept: ACCEPT_HTML,
        network_profile: "chrome",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: ACCEPT_HTML,
        network_profile: "chrome",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
        accept: ACCEPT_FIREFOX,
        network_profile: "firefox",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        accept: ACCEPT_SAFARI,
        network_profile: "safari",
    },
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en-US,en;q=0.8"];

/// How much of an identity is presented to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProfile {
    /// User agent only
    Minimal,
    /// Full navigation header set
    Browser,
    /// Accept headers only, paired with geo-bypass on the strategy
    Stealth,
}

/// Client identity for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    /// Header name/value pairs in browser order
    pub headers: Vec<(String, String)>,
    /// Optional network-stack identity (yt-dlp impersonation target)
    pub network_profile: Option<String>,
}

impl Identity {
    /// Headers to inject for the given profile
    pub fn headers_for(&self, profile: IdentityProfile) -> &[(String, String)] {
        let take = match profile {
            IdentityProfile::Minimal => 0,
            IdentityProfile::Stealth => 2,
            IdentityProfile::Browser => self.headers.len(),
        };
        &self.headers[..take.min(self.headers.len())]
    }
}

/// Per-run identity source
pub struct FingerprintGenerator {
    rng: StdRng,
    last: Option<usize>,
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            last: None,
        }
    }

    /// Deterministic generator for tests and reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            last: None,
        }
    }

    /// Uniform pick from the pool, excluding the previous pick.
    pub fn generate(&mut self) -> Identity {
        let index = match self.last {
            None => self.rng.gen_range(0..POOL.len()),
            Some(last) => {
                // Draw from the pool minus one slot and shift past `last`.
                let i = self.rng.gen_range(0..POOL.len() - 1);
                if i >= last {
                    i + 1
                } else {
                    i
                }
            }
        };
        self.last = Some(index);

        let profile = &POOL[index];
        let language = ACCEPT_LANGUAGES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("en-US,en;q=0.9");

        let headers = [
            ("Accept", profile.accept),
            ("Accept-Language", language),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("DNT", "1"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Cache-Control", "max-age=0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Identity {
            user_agent: profile.user_agent.to_string(),
            headers,
            network_profile: Some(profile.network_profile.to_string()),
        }
    }

    /// Jittered delay in `[min, max]`
    pub fn pacing_delay(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let ms = self
            .rng
            .gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    pub fn geo_country(&mut self) -> &'static str {
        GEO_COUNTRIES.choose(&mut self.rng).copied().unwrap_or("US")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_repeats_previous_identity() {
        let mut gen = FingerprintGenerator::with_seed(7);
        let mut previous = gen.generate();
        for _ in 0..500 {
            let next = gen.generate();
            assert_ne!(next.user_agent, previous.user_agent);
            previous = next;
        }
    }

    #[test]
    fn test_covers_pool() {
        let mut gen = FingerprintGenerator::with_seed(42);
        let seen: std::collections::HashSet<String> =
            (0..2000).map(|_| gen.generate().user_agent).collect();
        assert_eq!(seen.len(), POOL.len());
    }

    #[test]
    fn test_headers_per_profile() {
        let identity = FingerprintGenerator::with_seed(1).generate();
        assert!(identity.headers_for(IdentityProfile::Minimal).is_empty());
        let stealth = identity.headers_for(IdentityProfile::Stealth);
        assert_eq!(stealth.len(), 2);
        assert_eq!(stealth[0].0, "Accept");
        assert_eq!(
            identity.headers_for(IdentityProfile::Browser).len(),
            identity.headers.len()
        );
    }

    #[test]
    fn test_pacing_bounds() {
        let mut gen = FingerprintGenerator::with_seed(3);
        let (min, max) = (Duration::from_millis(100), Duration::from_millis(300));
        for _ in 0..200 {
            let d = gen.pacing_delay(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(gen.pacing_delay(max, min), max);
        assert_eq!(gen.pacing_delay(Duration::ZERO, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_geo_country_from_pool() {
        let mut gen = FingerprintGenerator::with_seed(9);
        assert!(GEO_COUNTRIES.contains(&gen.geo_country()));
    }

    #[test]
    fn test_accept_header_matches_browser() {
        let mut gen = FingerprintGenerator::with_seed(11);
        for _ in 0..200 {
            let identity = gen.generate();
            let accept = &identity.headers[0];
            assert_eq!(accept.0, "Accept");
            let expected = match identity.network_profile.as_deref() {
                Some("safari") => ACCEPT_SAFARI,
                Some("firefox") => ACCEPT_FIREFOX,
                _ => ACCEPT_HTML,
            };
            assert_eq!(accept.1, expected, "{}", identity.user_agent);
        }
    }
}
