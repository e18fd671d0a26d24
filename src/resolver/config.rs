// Resolver configuration - defaults, environment overrides and builders

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Environment variable holding the default cookie bundle
pub const DEFAULT_COOKIES_ENV: &str = "YOUTUBE_COOKIES";

/// Process-wide resolver settings
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Explicit engine command (`YTR_ENGINE`), e.g. `/usr/bin/yt-dlp` or `python3 -m yt_dlp`
    pub engine: Option<String>,
    /// Python interpreter used for the `yt_dlp` module (`YTDLP_PYTHON`)
    pub python: Option<String>,
    /// Name of the variable carrying environment cookies
    pub cookies_env_var: String,
    /// Candidate cookies.txt locations, first existing wins
    pub cookie_files: Vec<PathBuf>,
    /// Wall-clock cap for a whole run
    pub total_budget: Duration,
    /// Pacing delay bounds between attempts
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    /// Parent directory for per-run ephemeral resources (system temp dir if unset)
    pub temp_root: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            engine: None,
            python: None,
            cookies_env_var: DEFAULT_COOKIES_ENV.to_string(),
            cookie_files: default_cookie_files(),
            total_budget: Duration::from_secs(120),
            pacing_min: Duration::from_millis(500),
            pacing_max: Duration::from_millis(2000),
            temp_root: None,
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `YTR_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(engine) = env_string("YTR_ENGINE") {
            config.engine = Some(engine);
        }
        if let Some(python) = env_string("YTDLP_PYTHON") {
            config.python = Some(python);
        }
        if let Some(files) = env_string("YTR_COOKIE_FILES") {
            config.cookie_files = std::env::split_paths(&files).collect();
        }
        if let Some(secs) = env_number("YTR_TOTAL_BUDGET_SECS") {
            config.total_budget = Duration::from_secs(secs);
        }
        if let Some(ms) = env_number("YTR_PACING_MIN_MS") {
            config.pacing_min = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number("YTR_PACING_MAX_MS") {
            config.pacing_max = Duration::from_millis(ms);
        }
        if let Some(root) = env_string("YTR_TEMP_ROOT") {
            config.temp_root = Some(PathBuf::from(root));
        }

        config.normalized()
    }

    pub fn with_engine(mut self, engine: Option<String>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_cookie_files(mut self, files: Vec<PathBuf>) -> Self {
        self.cookie_files = files;
        self
    }

    pub fn with_total_budget(mut self, budget: Duration) -> Self {
        self.total_budget = budget;
        self
    }

    pub fn with_pacing(mut self, min: Duration, max: Duration) -> Self {
        self.pacing_min = min;
        self.pacing_max = max;
        self.normalized()
    }

    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    // pacing_min must never exceed pacing_max
    fn normalized(mut self) -> Self {
        if self.pacing_min > self.pacing_max {
            std::mem::swap(&mut self.pacing_min, &mut self.pacing_max);
        }
        self
    }
}

/// `./cookies.txt`, then the per-user config dir, then `~/.youtube-resolver`
pub fn default_cookie_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("cookies.txt")];
    if let Some(config) = dirs::config_dir() {
        files.push(config.join("youtube-resolver").join("cookies.txt"));
    }
    if let Some(home) = dirs::home_dir() {
        files.push(home.join(".youtube-resolver").join("cookies.txt"));
    }
    files
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_number(name: &str) -> Option<u64> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.total_budget, Duration::from_secs(120));
        assert_eq!(config.cookies_env_var, "YOUTUBE_COOKIES");
        assert_eq!(config.cookie_files[0], PathBuf::from("cookies.txt"));
        assert!(config.pacing_min <= config.pacing_max);
    }

    #[test]
    fn test_pacing_is_ordered() {
        let config = ResolverConfig::default()
            .with_pacing(Duration::from_millis(900), Duration::from_millis(100));
        assert_eq!(config.pacing_min, Duration::from_millis(100));
        assert_eq!(config.pacing_max, Duration::from_millis(900));
    }
}
