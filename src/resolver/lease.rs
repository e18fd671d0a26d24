// Resource lease - scoped ephemeral cache directories and credential files
//
// Every resource lives under a per-run directory with a random suffix, so
// concurrent runs never share paths. Handles release themselves on drop; an
// explicit `release()` only makes the point of cleanup visible in the caller.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::{Builder, TempDir, TempPath};
use tracing::debug;

use super::credentials::Credential;

const RUN_PREFIX: &str = "ytr-run-";

/// Acquire/release counters, shared by every run of one orchestrator
#[derive(Debug, Default)]
pub struct LeaseStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl LeaseStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles currently alive
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// What to acquire
#[derive(Debug, Clone, Copy)]
pub enum LeaseKind<'a> {
    /// Empty directory for the engine's cache and HOME
    CacheDir,
    /// Credential materialized as a cookies.txt file
    Credential(&'a Credential),
}

enum Resource {
    Dir(TempDir),
    File(TempPath),
}

/// Exclusively owned ephemeral resource, removed exactly once
pub struct LeaseHandle {
    path: PathBuf,
    resource: Option<Resource>,
    stats: Arc<LeaseStats>,
}

impl fmt::Debug for LeaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseHandle")
            .field("path", &self.path)
            .field("live", &self.resource.is_some())
            .finish()
    }
}

impl LeaseHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the resource now. Deletion errors are ignored.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        let result = match resource {
            Resource::Dir(dir) => dir.close(),
            Resource::File(file) => file.close(),
        };
        if let Err(e) = result {
            debug!(path = %self.path.display(), "Ignoring cleanup error: {}", e);
        }
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Everything one attempt needs on disk
#[derive(Debug)]
pub struct AttemptResources {
    pub cache_dir: LeaseHandle,
    pub credential: Option<LeaseHandle>,
}

impl AttemptResources {
    pub fn credential_path(&self) -> Option<&Path> {
        self.credential.as_ref().map(LeaseHandle::path)
    }

    pub fn release(self) {
        if let Some(credential) = self.credential {
            credential.release();
        }
        self.cache_dir.release();
    }
}

/// Per-run namespace for ephemeral resources
pub struct ResourceLease {
    run_dir: TempDir,
    stats: Arc<LeaseStats>,
}

impl ResourceLease {
    /// Create the run directory under `root`, or the system temp dir.
    pub fn for_run(root: Option<&Path>, stats: Arc<LeaseStats>) -> io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(RUN_PREFIX);
        let run_dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { run_dir, stats })
    }

    /// Random suffix of the run directory, used as the run id in logs
    pub fn run_id(&self) -> String {
        self.run_dir
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_PREFIX))
            .unwrap_or_default()
            .to_string()
    }

    pub fn run_dir(&self) -> &Path {
        self.run_dir.path()
    }

    pub fn acquire(&self, kind: LeaseKind<'_>) -> io::Result<LeaseHandle> {
        let resource = match kind {
            LeaseKind::CacheDir => Resource::Dir(
                Builder::new()
                    .prefix("cache-")
                    .tempdir_in(self.run_dir.path())?,
            ),
            LeaseKind::Credential(credential) => {
                // tempfile creates the file with 0600 on unix
                let mut file = Builder::new()
                    .prefix("cookies-")
                    .suffix(".txt")
                    .tempfile_in(self.run_dir.path())?;
                file.write_all(credential.as_bytes())?;
                file.flush()?;
                Resource::File(file.into_temp_path())
            }
        };

        let path = match &resource {
            Resource::Dir(dir) => dir.path().to_path_buf(),
            Resource::File(file) => file.to_path_buf(),
        };
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(LeaseHandle {
            path,
            resource: Some(resource),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Fresh cache directory plus the credential file if one is given.
    ///
    /// On partial failure the handles already acquired are released before the
    /// error is returned.
    pub fn acquire_attempt(&self, credential: Option<&Credential>) -> io::Result<AttemptResources> {
        let cache_dir = self.acquire(LeaseKind::CacheDir)?;
        let credential = match credential {
            Some(c) => Some(self.acquire(LeaseKind::Credential(c))?),
            None => None,
        };
        Ok(AttemptResources {
            cache_dir,
            credential,
        })
    }

    /// Remove the run directory. Errors are ignored.
    pub fn close(self) {
        let path = self.run_dir.path().to_path_buf();
        if let Err(e) = self.run_dir.close() {
            debug!(path = %path.display(), "Ignoring run dir cleanup error: {}", e);
        }
    }
}
