// Engine discovery - locates yt-dlp as a Python module or a native binary

use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

use super::config::ResolverConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// `python3 -m yt_dlp`
    PythonModule,
    /// Native `yt-dlp` binary
    Binary,
    /// Command given explicitly via configuration
    Override,
}

/// How to start the extraction engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub kind: EngineKind,
    pub program: String,
    /// Arguments placed before the per-invocation arguments
    pub prefix_args: Vec<String>,
}

impl EngineCommand {
    pub fn binary(path: &str) -> Self {
        Self {
            kind: EngineKind::Binary,
            program: path.to_string(),
            prefix_args: Vec::new(),
        }
    }

    pub fn python_module(python: &str) -> Self {
        Self {
            kind: EngineKind::PythonModule,
            program: python.to_string(),
            prefix_args: vec!["-m".to_string(), "yt_dlp".to_string()],
        }
    }

    /// Whitespace-separated command line, e.g. `python3.12 -m yt_dlp`
    pub fn parse_override(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            kind: EngineKind::Override,
            program,
            prefix_args: parts.collect(),
        })
    }

    /// Override first, then the Python module, then the binary.
    pub fn discover(config: &ResolverConfig) -> Self {
        if let Some(engine) = config.engine.as_deref().and_then(Self::parse_override) {
            info!(engine = %engine, "Using configured extraction engine");
            return engine;
        }

        let python = config
            .python
            .clone()
            .unwrap_or_else(find_python);
        if has_ytdlp_module(&python) {
            info!(python = %python, "Using yt_dlp Python module");
            return Self::python_module(&python);
        }

        let binary = find_ytdlp();
        info!(binary = %binary, "Using yt-dlp binary");
        Self::binary(&binary)
    }

    /// Engine version, if it runs at all
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program)
            .args(&self.prefix_args)
            .arg("--version")
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }
}

impl std::fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.prefix_args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn find_python() -> String {
    let candidates = ["python3", "/opt/homebrew/bin/python3", "/usr/local/bin/python3"];
    for cmd in candidates {
        if let Ok(output) = Command::new(cmd).arg("--version").output() {
            if output.status.success() {
                return cmd.to_string();
            }
        }
    }
    "python3".to_string()
}

fn has_ytdlp_module(python: &str) -> bool {
    let ok = Command::new(python)
        .args(["-c", "import yt_dlp"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    debug!(python = %python, available = ok, "Checked yt_dlp module");
    ok
}

/// Common install locations, then `which`, then bare `yt-dlp`
fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac / pip
        "/usr/bin/yt-dlp",          // System package
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path;
            }
        }
    }

    "yt-dlp".to_string()
}
