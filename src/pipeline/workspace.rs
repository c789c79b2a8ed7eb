use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::Result;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Private working directory for one pipeline invocation.
///
/// The directory name is `{prefix}_{millis}_{pid}_{n}`. Leftovers from
/// crashed runs with the same prefix are swept when a new workspace is
/// created, and the directory is removed when the workspace is dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    pub fn create(root: &Path, prefix: &str, stale_after: Duration) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let swept = sweep_stale(root, prefix, stale_after);
        if swept > 0 {
            info!("Removed {} stale {} director{}", swept, prefix, if swept == 1 { "y" } else { "ies" });
        }

        let name = format!(
            "{}_{}_{}_{}",
            prefix,
            chrono::Utc::now().timestamp_millis(),
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = root.join(name);
        std::fs::create_dir_all(&path)?;
        debug!("Created workspace {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a subdirectory
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}

/// Remove directories under `root` named `{prefix}_*` that were last
/// modified more than `stale_after` ago. Returns how many were removed.
pub fn sweep_stale(root: &Path, prefix: &str, stale_after: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    let marker = format!("{}_", prefix);
    let now = SystemTime::now();

    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&marker))
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= stale_after)
        })
        .filter(|entry| match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not remove stale directory {}: {}", entry.path().display(), e);
                false
            }
        })
        .count()
}
