//! Build cache for generated sources and compiled kernels.
//!
//! Entries are keyed by a blake3 hash of the normalized definition, the
//! backend, its options and the crate version. A hit skips code generation
//! and compilation entirely.
//!
//! Cache location: `~/.tessera/cache/` (or `$TESSERA_CACHE_DIR`)
//!
//! Layout:
//! ```text
//! <root>/
//! ├── <backend>/
//! │   ├── <key>/
//! │   │   ├── meta.json
//! │   │   ├── source.{json,c,wgsl}
//! │   │   └── kernel.so            (native only)
//! │   └── <key>.lock               (while a build is running)
//! └── failed/<key>.<ext>           (source of the last failed build)
//! ```
//!
//! Entries are published by renaming a fully written temporary directory,
//! so readers never observe a partial entry. Concurrent builders of the
//! same key race harmlessly: the first rename wins, later ones discard
//! their copy.

mod entry;
mod lock;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;

pub use entry::EntryMeta;

use crate::analysis::AnalyzedStencil;
use crate::backend::{self, Backend, BuildOptions, CompiledArtifact};
use crate::error::{CacheError, Error};

// ─── Cache Directory ───────────────────────────────────────────────

/// Resolve the default cache directory.
///
/// Priority:
/// 1. `$TESSERA_CACHE_DIR` environment variable
/// 2. `~/.tessera/cache/`
/// 3. `.tessera/cache` under the working directory
pub fn default_root() -> PathBuf {
    if let Some(dir) = std::env::var_os("TESSERA_CACHE_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(".tessera").join("cache")
}

// ─── Cache Key ─────────────────────────────────────────────────────

/// Hex blake3 signature of everything that influences a build.
pub fn cache_key(stencil: &AnalyzedStencil, backend: Backend, options: &BuildOptions) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tessera\0");
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(b"\0");
    hasher.update(backend.name().as_bytes());
    hasher.update(b"\0");
    hasher.update(options.resolved(backend).fingerprint().as_bytes());
    hasher.update(b"\0");
    hasher.update(stencil.definition.normalized().as_bytes());
    hasher.finalize().to_hex().to_string()
}

// ─── Statistics ────────────────────────────────────────────────────

/// Counters for one cache instance plus what is on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from memory or disk.
    pub hits: usize,
    /// Lookups that had to build.
    pub misses: usize,
    /// Times a backend generated code.
    pub codegen_runs: usize,
    /// Published entries per backend.
    pub entries: Vec<(Backend, usize)>,
    /// Total size in bytes.
    pub total_bytes: u64,
}

// ─── Build Cache ───────────────────────────────────────────────────

/// A cache rooted at one directory. Loaded artifacts are also kept in
/// memory for the life of the process.
#[derive(Debug)]
pub struct BuildCache {
    root: PathBuf,
    loaded: Mutex<HashMap<String, Arc<CompiledArtifact>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    codegen_runs: AtomicUsize,
}

static GLOBAL: OnceLock<BuildCache> = OnceLock::new();

/// Initialize the process-wide cache at `root`. Calling it again with the
/// same root is a no-op; a different root is an error.
pub fn init(root: impl Into<PathBuf>) -> Result<&'static BuildCache, CacheError> {
    let root = root.into();
    let cache = GLOBAL.get_or_init(|| BuildCache::new(root.clone()));
    if cache.root != root {
        return Err(CacheError::AlreadyInitialized {
            existing: cache.root.clone(),
        });
    }
    Ok(cache)
}

/// The process-wide cache, initialized at [`default_root`] on first use.
pub fn global() -> &'static BuildCache {
    GLOBAL.get_or_init(|| BuildCache::new(default_root()))
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            codegen_runs: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the entry for `key`.
    pub fn entry_dir(&self, backend: Backend, key: &str) -> PathBuf {
        self.root.join(backend.name()).join(key)
    }

    /// Return the artifact for `stencil`, building and publishing it on a
    /// miss or when `options.rebuild` is set.
    pub fn get_or_build(
        &self,
        stencil: &Arc<AnalyzedStencil>,
        backend: Backend,
        options: &BuildOptions,
    ) -> Result<Arc<CompiledArtifact>, Error> {
        // Key and build must agree on the compiler even if `$CC` changes.
        let options = &options.resolved(backend);
        let key = cache_key(stencil, backend, options);
        let _span = tracing::debug_span!("cache", %backend, stencil = stencil.name(), key = &key[..16]).entered();

        if !options.rebuild {
            if let Some(artifact) = self.memory_lookup(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("memory hit");
                return Ok(artifact);
            }
            if let Some(meta) = self.disk_lookup(backend, &key) {
                let dir = self.entry_dir(backend, &key);
                let artifact = self.load(stencil, backend, options, &key, &dir, meta)?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(dir = %dir.display(), "disk hit");
                return Ok(self.remember(key, artifact));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let backend_dir = self.root.join(backend.name());
        std::fs::create_dir_all(&backend_dir).map_err(|e| CacheError::io(&backend_dir, e))?;
        let _lock = lock::BuildLock::acquire(&backend_dir.join(format!("{}.lock", key)));

        // Another process may have published while we waited for the lock.
        if !options.rebuild {
            if let Some(meta) = self.disk_lookup(backend, &key) {
                let dir = self.entry_dir(backend, &key);
                let artifact = self.load(stencil, backend, options, &key, &dir, meta)?;
                return Ok(self.remember(key, artifact));
            }
        }

        let meta = self.build(stencil, backend, options, &key)?;
        let dir = self.entry_dir(backend, &key);
        let artifact = self.load(stencil, backend, options, &key, &dir, meta)?;
        Ok(self.remember(key, artifact))
    }

    /// Emit, compile and publish one entry.
    fn build(
        &self,
        stencil: &AnalyzedStencil,
        backend: Backend,
        options: &BuildOptions,
        key: &str,
    ) -> Result<EntryMeta, Error> {
        let backend_dir = self.root.join(backend.name());
        let staging = tempfile::Builder::new()
            .prefix(".build-")
            .tempdir_in(&backend_dir)
            .map_err(|e| CacheError::io(&backend_dir, e))?;

        self.codegen_runs.fetch_add(1, Ordering::Relaxed);
        let source = backend::emit(backend, stencil, options)?;
        let source_path = staging.path().join(backend.source_file_name());
        std::fs::write(&source_path, &source).map_err(|e| CacheError::io(&source_path, e))?;

        if let Err(err) = backend::compile(backend, &source_path, staging.path(), options) {
            return Err(self.keep_failed_source(backend, key, &source, err).into());
        }

        let meta = EntryMeta::describe(stencil, backend, key, staging.path())?;
        meta.write(staging.path())?;

        let target = self.entry_dir(backend, key);
        // Replace a forced or invalid entry; a valid one can only have
        // appeared through a concurrent publish and is kept.
        if target.exists() && (options.rebuild || self.disk_lookup(backend, key).is_none()) {
            std::fs::remove_dir_all(&target).map_err(|e| CacheError::io(&target, e))?;
        }
        let staged = staging.keep();
        match std::fs::rename(&staged, &target) {
            Ok(()) => tracing::info!(dir = %target.display(), "published cache entry"),
            Err(_) if target.exists() => {
                // Lost the race to a concurrent builder; theirs is equivalent.
                tracing::debug!("entry published concurrently, discarding ours");
                let _ = std::fs::remove_dir_all(&staged);
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staged);
                return Err(CacheError::io(&target, e).into());
            }
        }
        Ok(meta)
    }

    /// Copy the source of a failed build where the user can read it and
    /// point the error at it. The staging directory itself is discarded.
    fn keep_failed_source(
        &self,
        backend: Backend,
        key: &str,
        source: &str,
        err: crate::error::BackendCompilationError,
    ) -> crate::error::BackendCompilationError {
        let dir = self.root.join("failed");
        let path = dir.join(format!("{}.{}", key, backend.source_extension()));
        match std::fs::create_dir_all(&dir).and_then(|()| std::fs::write(&path, source)) {
            Ok(()) => err.with_source_path(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot keep failed source: {}", e);
                err
            }
        }
    }

    fn load(
        &self,
        stencil: &Arc<AnalyzedStencil>,
        backend: Backend,
        options: &BuildOptions,
        key: &str,
        dir: &Path,
        _meta: EntryMeta,
    ) -> Result<CompiledArtifact, Error> {
        let source_path = dir.join(backend.source_file_name());
        let source =
            std::fs::read_to_string(&source_path).map_err(|e| CacheError::io(&source_path, e))?;
        let kernel = backend::load(backend, stencil, dir, options)?;
        Ok(CompiledArtifact {
            backend,
            key: key.to_string(),
            entry_point: backend::entry_point(stencil),
            source,
            source_path,
            stencil: stencil.clone(),
            kernel,
        })
    }

    fn memory_lookup(&self, key: &str) -> Option<Arc<CompiledArtifact>> {
        self.loaded.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: String, artifact: CompiledArtifact) -> Arc<CompiledArtifact> {
        let artifact = Arc::new(artifact);
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.insert(key, artifact.clone());
        }
        artifact
    }

    /// Validated metadata of a published entry, or `None` for a miss.
    fn disk_lookup(&self, backend: Backend, key: &str) -> Option<EntryMeta> {
        let dir = self.entry_dir(backend, key);
        if !dir.is_dir() {
            return None;
        }
        match EntryMeta::read(&dir).and_then(|meta| meta.validate(backend, key, &dir).map(|()| meta)) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), "ignoring invalid cache entry: {}", err);
                None
            }
        }
    }

    /// Counters for this instance plus what is on disk.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            codegen_runs: self.codegen_runs.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for backend in Backend::ALL {
            let dir = self.root.join(backend.name());
            let Ok(read) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut count = 0;
            for entry in read.flatten() {
                let path = entry.path();
                if path.is_dir() && path.join(entry::META_FILE).is_file() {
                    count += 1;
                    stats.total_bytes += entry::dir_size(&path)?;
                }
            }
            if count > 0 {
                stats.entries.push((backend, count));
            }
        }
        Ok(stats)
    }

    /// Delete every entry on disk and forget loaded artifacts.
    pub fn clear(&self) -> Result<(), CacheError> {
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.clear();
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                tracing::info!(root = %self.root.display(), "cleared build cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.root, e)),
        }
    }
}
