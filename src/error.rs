//! Error taxonomy shared by every stage of the pipeline.
//!
//! Each kind reflects a programming error at the definition or call site,
//! so nothing here is retried automatically.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::Backend;
use crate::diagnostic::Diagnostic;
use crate::ir::{DType, ParamKind};

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    BackendCompilation(#[from] BackendCompilationError),

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBoundsError),

    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// An illegal construct found while parsing, lowering or analyzing a
/// definition. Carries every error diagnostic that was collected.
#[derive(Debug, Error)]
pub struct DefinitionError {
    pub diagnostics: Vec<Diagnostic>,
}

impl DefinitionError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut errors = self.diagnostics.iter().filter(|d| d.is_error());
        match errors.next() {
            Some(first) => {
                write!(f, "invalid stencil definition: {}", first.message)?;
                let rest = errors.count();
                if rest > 0 {
                    write!(f, " (and {} more)", rest)?;
                }
                Ok(())
            }
            None => write!(f, "invalid stencil definition"),
        }
    }
}

/// The backend could not turn generated source into an executable kernel.
#[derive(Debug, Error)]
pub struct BackendCompilationError {
    pub backend: Backend,
    pub message: String,
    pub source_path: Option<PathBuf>,
}

impl BackendCompilationError {
    pub fn new(backend: Backend, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

impl fmt::Display for BackendCompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} backend failed to compile stencil: {}",
            self.backend, self.message
        )?;
        if let Some(path) = &self.source_path {
            write!(f, " (generated source: {})", path.display())?;
        }
        Ok(())
    }
}

/// Which side of the computed region ran out of storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

/// The computed region plus the required halo does not fit a storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub struct OutOfBoundsError {
    pub field: String,
    /// 0 = i, 1 = j, 2 = k.
    pub axis: usize,
    pub bound: Bound,
    /// Lower: cells needed before the start. Upper: last index needed, exclusive.
    pub required: i64,
    /// Lower: cells available before the start. Upper: storage extent.
    pub available: i64,
}

impl fmt::Display for OutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis = ["i", "j", "k"].get(self.axis).copied().unwrap_or("?");
        match self.bound {
            Bound::Lower => write!(
                f,
                "field '{}' out of bounds on axis {}: {} halo cells needed below the computed region, {} available",
                self.field, axis, self.required, self.available
            ),
            Bound::Upper => write!(
                f,
                "field '{}' out of bounds on axis {}: region plus halo extends to {}, storage extent is {}",
                self.field, axis, self.required, self.available
            ),
        }
    }
}

/// An invocation does not match the stencil's parameter signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureMismatchError {
    #[error("missing field argument '{0}'")]
    MissingField(String),

    #[error("missing scalar argument '{0}'")]
    MissingScalar(String),

    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("argument '{0}' is bound more than once")]
    DuplicateArgument(String),

    #[error("argument '{name}' must be a {expected}")]
    WrongKind { name: String, expected: ParamKind },

    #[error("argument '{name}' has dtype {found}, expected {expected}")]
    WrongDType {
        name: String,
        expected: DType,
        found: DType,
    },

    #[error("origin given for unknown field '{0}'")]
    UnknownOrigin(String),
}

/// Allocation, layout and transfer failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid shape {0:?}: every extent must be positive")]
    InvalidShape([usize; 3]),

    #[error("origin {origin:?} lies outside shape {shape:?}")]
    InvalidOrigin {
        origin: [usize; 3],
        shape: [usize; 3],
    },

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("{backend} backend does not support {dtype} fields")]
    UnsupportedDType { backend: Backend, dtype: DType },

    #[error("no device available: {0}")]
    DeviceUnavailable(String),

    #[error("device transfer failed: {0}")]
    Transfer(String),

    #[error("invalid layout: {0}")]
    Layout(String),
}

/// Build cache failures that are not simply misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cache metadata at {}: {message}", .path.display())]
    Metadata { path: PathBuf, message: String },

    #[error("build cache is already initialized at {}", .existing.display())]
    AlreadyInitialized { existing: PathBuf },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
