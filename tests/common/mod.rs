#![allow(dead_code)]

use ndarray::Array3;
use tempfile::TempDir;

use tessera::backend::{gpu, native};
use tessera::{Backend, BuildCache, BuildOptions, Stencil, Storage};

/// A build cache in a fresh temporary directory.
pub fn cache() -> (TempDir, BuildCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = BuildCache::new(dir.path().join("cache"));
    (dir, cache)
}

/// Build the single stencil in `source`.
pub fn build(source: &str, backend: Backend, cache: &BuildCache) -> Stencil {
    let mut defs = tessera::parse(source).unwrap_or_else(|e| panic!("{}", e));
    assert_eq!(defs.len(), 1);
    tessera::build_with(defs.remove(0), backend, &BuildOptions::default(), cache)
        .unwrap_or_else(|e| panic!("{} build failed: {}", backend, e))
}

/// Backends usable on this machine. Native needs a C compiler, GPU an adapter.
pub fn available_backends() -> Vec<Backend> {
    let mut backends = vec![Backend::Reference, Backend::Vectorized];
    if native::compiler::is_available(&BuildOptions::default()) {
        backends.push(Backend::Native);
    } else {
        eprintln!("note: no C compiler, skipping the native backend");
    }
    if gpu::shared_context().is_some() {
        backends.push(Backend::Gpu);
    } else {
        eprintln!("note: no GPU adapter, skipping the gpu backend");
    }
    backends
}

/// Deterministic, irregular test data.
pub fn pattern(shape: [usize; 3], seed: f64) -> Array3<f64> {
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(i, j, k)| {
        let x = (i * 31 + j * 17 + k * 7) as f64 + seed;
        (x * 0.37).sin() * 4.0 + (i as f64) * 0.5
    })
}

/// Storage for `backend` holding `values`, converted to `T`.
pub fn storage<T: tessera::storage::Element>(
    backend: Backend,
    values: &Array3<f64>,
    origin: [usize; 3],
) -> Storage<T> {
    let typed = values.mapv(T::from_f64);
    Storage::from_array(backend, typed.view(), origin).unwrap()
}

pub fn assert_close(expected: &Array3<f64>, actual: &Array3<f64>, tolerance: f64) {
    assert_eq!(expected.dim(), actual.dim());
    for ((idx, e), a) in expected.indexed_iter().zip(actual.iter()) {
        assert!(
            (e - a).abs() <= tolerance * e.abs().max(1.0),
            "at {:?}: expected {}, got {}",
            idx,
            e,
            a
        );
    }
}
