use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalyzedStencil, FieldInfo};
use crate::backend::{self, Backend};
use crate::error::CacheError;

pub(super) const META_FILE: &str = "meta.json";

/// Contents of `meta.json`: what was built and hashes to validate it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub backend: Backend,
    pub stencil: String,
    pub entry_point: String,
    pub tessera_version: String,
    pub fields: Vec<FieldInfo>,
    /// `(file name, hex blake3)` of every artifact file.
    pub files: Vec<(String, String)>,
}

impl EntryMeta {
    /// Describe the artifact files already written to `dir`.
    pub(super) fn describe(
        stencil: &AnalyzedStencil,
        backend: Backend,
        key: &str,
        dir: &Path,
    ) -> Result<Self, CacheError> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map_err(|e| CacheError::io(dir, e))?
            .flatten()
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name != META_FILE)
            .collect();
        names.sort();

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let hash = hash_file(&dir.join(&name))?;
            files.push((name, hash));
        }

        Ok(Self {
            key: key.to_string(),
            backend,
            stencil: stencil.name().to_string(),
            entry_point: backend::entry_point(stencil),
            tessera_version: env!("CARGO_PKG_VERSION").to_string(),
            fields: stencil.fields.clone(),
            files,
        })
    }

    pub(super) fn write(&self, dir: &Path) -> Result<(), CacheError> {
        let path = dir.join(META_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Metadata {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(&path, e))
    }

    pub(super) fn read(dir: &Path) -> Result<Self, CacheError> {
        let path = dir.join(META_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| CacheError::io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| CacheError::Metadata {
            path,
            message: e.to_string(),
        })
    }

    /// Check that the entry is the one asked for and that no file changed
    /// since it was published.
    pub(super) fn validate(&self, backend: Backend, key: &str, dir: &Path) -> Result<(), CacheError> {
        let path = dir.join(META_FILE);
        let mismatch = |message: String| CacheError::Metadata {
            path: path.clone(),
            message,
        };
        if self.key != key || self.backend != backend {
            return Err(mismatch(format!(
                "entry is for {} key {}",
                self.backend, self.key
            )));
        }
        if !self
            .files
            .iter()
            .any(|(name, _)| *name == backend.source_file_name())
        {
            return Err(mismatch("entry has no generated source".into()));
        }
        for (name, expected) in &self.files {
            let actual = hash_file(&dir.join(name))?;
            if actual != *expected {
                return Err(mismatch(format!("content hash of '{}' changed", name)));
            }
        }
        Ok(())
    }
}

fn hash_file(path: &Path) -> Result<String, CacheError> {
    let bytes = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Total size of the files under `dir`.
pub(super) fn dir_size(dir: &Path) -> Result<u64, CacheError> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            total += dir_size(&path)?;
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    Ok(total)
}
