//! Natively compiled CPU backend: C loop nests built by the system compiler
//! and bound with `libloading`.

pub mod codegen;
pub mod compiler;

use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{BackendCompilationError, Error};

use super::{Backend, Kernel, Launch};

/// `void entry(void **fields, const int64_t *geom, const double *scalars)`
type KernelFn = unsafe extern "C" fn(*mut *mut u8, *const i64, *const f64);

pub(crate) struct NativeKernel {
    func: KernelFn,
    // Keeps `func` mapped.
    _library: Library,
}

impl NativeKernel {
    pub fn load(dir: &Path, entry_point: &str) -> Result<Self, BackendCompilationError> {
        let lib_path = dir.join(compiler::LIBRARY_NAME);
        // SAFETY: the library was produced by `compiler::compile` from our own
        // generated source; its initializers are the C runtime's.
        let library = unsafe { Library::new(&lib_path) }.map_err(|e| {
            BackendCompilationError::new(
                Backend::Native,
                format!("cannot load {}: {}", lib_path.display(), e),
            )
        })?;
        let func = {
            // SAFETY: the generated entry point has exactly the `KernelFn` ABI.
            let symbol: Symbol<KernelFn> =
                unsafe { library.get(entry_point.as_bytes()) }.map_err(|e| {
                    BackendCompilationError::new(
                        Backend::Native,
                        format!("missing entry point '{}': {}", entry_point, e),
                    )
                })?;
            *symbol
        };
        tracing::debug!(path = %lib_path.display(), entry_point, "loaded native kernel");
        Ok(Self {
            func,
            _library: library,
        })
    }
}

impl Kernel for NativeKernel {
    fn launch(&self, launch: &mut Launch<'_>) -> Result<(), Error> {
        let mut geom: Vec<i64> = launch.domain.iter().map(|&n| n as i64).collect();
        let mut pointers = Vec::with_capacity(launch.fields.len());
        for arg in launch.fields.iter_mut() {
            let strides = arg.storage.strides();
            geom.extend(arg.origin.iter().map(|&o| o as i64));
            geom.push(strides[0] as i64);
            geom.push(strides[1] as i64);
            pointers.push(arg.storage.host_ptr_mut());
        }
        debug_assert_eq!(geom.len(), 3 + launch.fields.len() * codegen::GEOM_PER_FIELD);

        // SAFETY: every pointer addresses a live host buffer borrowed mutably
        // for the whole call, and the caller has checked that origin, domain
        // and halo keep every access inside its field's shape.
        unsafe {
            (self.func)(pointers.as_mut_ptr(), geom.as_ptr(), launch.scalars.as_ptr());
        }
        Ok(())
    }
}
