use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Locks older than this are assumed to belong to a dead builder.
const STALE_AFTER: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory per-key build lock: a file created exclusively next to the
/// entry. It only serializes builders to save work; correctness comes from
/// the atomic rename, so a lock that cannot be taken is simply skipped.
#[derive(Debug)]
pub(super) struct BuildLock {
    path: Option<PathBuf>,
}

impl BuildLock {
    pub fn acquire(path: &Path) -> Self {
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Self {
                        path: Some(path.to_path_buf()),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        tracing::warn!(lock = %path.display(), "removing stale build lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if started.elapsed() > STALE_AFTER {
                        tracing::warn!(lock = %path.display(), "build lock contended, building anyway");
                        return Self { path: None };
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::debug!(lock = %path.display(), "cannot take build lock: {}", e);
                    return Self { path: None };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.path.is_some()
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > STALE_AFTER)
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}
