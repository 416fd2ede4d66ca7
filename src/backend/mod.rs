//! Backends: turn an [`AnalyzedStencil`] into an executable kernel.
//!
//! Every backend goes through the same two steps. `emit` produces source
//! text (the cached, human-readable artifact), `load` turns an artifact
//! directory into a [`Kernel`]. Native compilation happens between the two
//! and leaves `kernel.so` next to the source.

pub mod gpu;
pub mod native;
mod program;
mod reference;
mod vectorized;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzedStencil;
use crate::error::{BackendCompilationError, Error};
use crate::storage::FieldStorage;

pub(crate) use program::Program;

// ─── Backend Selector ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Interpreted index loops over the IR.
    Reference,
    /// Whole-array `ndarray` expressions.
    Vectorized,
    /// C compiled by the system compiler.
    Native,
    /// WGSL compute shaders through wgpu.
    Gpu,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Reference,
        Backend::Vectorized,
        Backend::Native,
        Backend::Gpu,
    ];

    pub fn from_name(name: &str) -> Option<Backend> {
        match name {
            "reference" | "ref" => Some(Backend::Reference),
            "vectorized" | "numpy" => Some(Backend::Vectorized),
            "native" | "c" => Some(Backend::Native),
            "gpu" | "wgpu" => Some(Backend::Gpu),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Reference => "reference",
            Backend::Vectorized => "vectorized",
            Backend::Native => "native",
            Backend::Gpu => "gpu",
        }
    }

    /// True when kernels run against device copies of the storages.
    pub fn is_device(&self) -> bool {
        matches!(self, Backend::Gpu)
    }

    /// File extension of the emitted source.
    pub fn source_extension(&self) -> &'static str {
        match self {
            Backend::Reference | Backend::Vectorized => "json",
            Backend::Native => "c",
            Backend::Gpu => "wgsl",
        }
    }

    pub fn source_file_name(&self) -> String {
        format!("source.{}", self.source_extension())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Build Options ─────────────────────────────────────────────────

/// Options that influence generated code. Everything except `rebuild` is
/// part of the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildOptions {
    /// `-O` level for the native backend.
    pub opt_level: u8,
    /// Extra flags for the native backend's compiler.
    pub cflags: Vec<String>,
    /// Compiler override; `$CC` or `cc` when unset.
    pub cc: Option<String>,
    /// GPU workgroup size in (i, j).
    pub workgroup: [u32; 2],
    /// Ignore cached artifacts and build again.
    #[serde(skip)]
    pub rebuild: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            opt_level: 3,
            cflags: Vec::new(),
            cc: None,
            workgroup: [8, 8],
            rebuild: false,
        }
    }
}

impl BuildOptions {
    /// Canonical text hashed into the cache key.
    pub(crate) fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// These options with environment lookups made concrete for `backend`.
    /// The native compiler is fixed here, so `$CC` ends up in the cache key.
    pub fn resolved(&self, backend: Backend) -> BuildOptions {
        let mut options = self.clone();
        if backend == Backend::Native {
            options.cc = Some(native::compiler::compiler_command(self));
        }
        options
    }
}

// ─── Kernels ───────────────────────────────────────────────────────

/// A field argument of one launch. Coordinates passed to kernels are
/// relative to the computed domain; `origin` maps them onto the storage.
pub(crate) struct FieldArg<'a> {
    pub storage: &'a mut dyn FieldStorage,
    pub origin: [usize; 3],
}

/// Arguments of one launch, in declaration order.
pub(crate) struct Launch<'a> {
    /// One entry per field parameter.
    pub fields: Vec<FieldArg<'a>>,
    /// One entry per scalar parameter.
    pub scalars: Vec<f64>,
    pub domain: [usize; 3],
}

impl Launch<'_> {
    /// Storage index of domain point `p` shifted by `offset` in field `f`.
    #[inline]
    pub fn index(&self, f: usize, p: [usize; 3], offset: [i64; 3]) -> [usize; 3] {
        let origin = self.fields[f].origin;
        [0, 1, 2].map(|a| (origin[a] as i64 + p[a] as i64 + offset[a]) as usize)
    }
}

/// An executable stencil for one backend. Storages are already synced to
/// the side the backend reads when `launch` is called.
pub(crate) trait Kernel: Send + Sync {
    fn launch(&self, launch: &mut Launch<'_>) -> Result<(), Error>;
}

/// A built stencil: generated source plus the loaded kernel.
pub struct CompiledArtifact {
    pub backend: Backend,
    /// Cache key (hex blake3).
    pub key: String,
    pub entry_point: String,
    pub source: String,
    /// Where the generated source was published.
    pub source_path: PathBuf,
    pub stencil: Arc<AnalyzedStencil>,
    pub(crate) kernel: Box<dyn Kernel>,
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledArtifact")
            .field("backend", &self.backend)
            .field("key", &self.key)
            .field("entry_point", &self.entry_point)
            .field("source_path", &self.source_path)
            .finish_non_exhaustive()
    }
}

/// Name of the generated entry point.
pub fn entry_point(stencil: &AnalyzedStencil) -> String {
    format!("tessera_{}", stencil.name())
}

/// Generate source text for `backend`.
pub fn emit(
    backend: Backend,
    stencil: &AnalyzedStencil,
    options: &BuildOptions,
) -> Result<String, BackendCompilationError> {
    let _span = tracing::debug_span!("emit", %backend, stencil = stencil.name()).entered();
    match backend {
        Backend::Reference => Ok(Program::new(stencil).listing(stencil, "point loops")),
        Backend::Vectorized => Ok(Program::new(stencil).listing(stencil, "array statements")),
        Backend::Native => Ok(native::codegen::emit(stencil)),
        Backend::Gpu => gpu::codegen::emit(stencil, options)
            .map_err(|msg| BackendCompilationError::new(Backend::Gpu, msg)),
    }
}

/// Produce binary artifacts next to an emitted source in `dir`.
pub(crate) fn compile(
    backend: Backend,
    source_path: &Path,
    dir: &Path,
    options: &BuildOptions,
) -> Result<(), BackendCompilationError> {
    match backend {
        Backend::Native => native::compiler::compile(source_path, dir, options),
        Backend::Reference | Backend::Vectorized | Backend::Gpu => Ok(()),
    }
}

/// Turn a published artifact directory into a kernel.
pub(crate) fn load(
    backend: Backend,
    stencil: &Arc<AnalyzedStencil>,
    dir: &Path,
    options: &BuildOptions,
) -> Result<Box<dyn Kernel>, BackendCompilationError> {
    let source_path = dir.join(backend.source_file_name());
    match backend {
        Backend::Reference => Ok(Box::new(reference::ReferenceKernel::new(stencil))),
        Backend::Vectorized => Ok(Box::new(vectorized::VectorizedKernel::new(stencil))),
        Backend::Native => native::NativeKernel::load(dir, &entry_point(stencil))
            .map(|k| Box::new(k) as Box<dyn Kernel>)
            .map_err(|e| e.with_source_path(source_path)),
        Backend::Gpu => {
            let source = std::fs::read_to_string(&source_path).map_err(|e| {
                BackendCompilationError::new(backend, format!("cannot read shader: {}", e))
                    .with_source_path(&source_path)
            })?;
            gpu::GpuKernel::new(stencil, &source, options)
                .map(|k| Box::new(k) as Box<dyn Kernel>)
                .map_err(|e| e.with_source_path(source_path))
        }
    }
}
