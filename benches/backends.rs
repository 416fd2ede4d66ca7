//! Per-backend throughput of a 2-D Laplacian and a vertical sweep.
//!
//! Artifacts are built once into a temporary cache outside the timed
//! loop, so the numbers cover launch plus compute only.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tessera::backend::{gpu, native};
use tessera::{Backend, Bindings, BuildCache, BuildOptions, Stencil, Storage};

const LAPLACIAN: &str = "stencil laplacian(phi: Field<f32>, lap: Field<f32>) {
    with computation(PARALLEL), interval(...) {
        lap = -4.0 * phi + phi[-1, 0, 0] + phi[1, 0, 0] + phi[0, -1, 0] + phi[0, 1, 0]
    }
}";

const CUMSUM: &str = "stencil cumsum(a: Field<f32>, s: Field<f32>) {
    with computation(FORWARD), interval(0, 1) { s = a }
    with computation(FORWARD), interval(1, None) { s = s[0, 0, -1] + a }
}";

const SHAPE: [usize; 3] = [130, 130, 64];

fn backends() -> Vec<Backend> {
    let mut backends = vec![Backend::Reference, Backend::Vectorized];
    if native::compiler::is_available(&BuildOptions::default()) {
        backends.push(Backend::Native);
    }
    if gpu::shared_context().is_some() {
        backends.push(Backend::Gpu);
    }
    backends
}

fn build(source: &str, backend: Backend, cache: &BuildCache) -> Option<Stencil> {
    let definition = tessera::parse(source).ok()?.pop()?;
    match tessera::build_with(definition, backend, &BuildOptions::default(), cache) {
        Ok(stencil) => Some(stencil),
        Err(e) => {
            eprintln!("skipping {}: {}", backend, e);
            None
        }
    }
}

fn bench_stencil(c: &mut Criterion, group_name: &str, source: &str, fields: [&str; 2], origin: [usize; 3]) {
    let dir = tempfile::tempdir().expect("temp dir");
    let cache = BuildCache::new(dir.path());
    let cells = ((SHAPE[0] - 2) * (SHAPE[1] - 2) * SHAPE[2]) as u64;

    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(cells));
    group.sample_size(10);
    for backend in backends() {
        let Some(stencil) = build(source, backend, &cache) else {
            continue;
        };
        let mut input = Storage::<f32>::full(backend, SHAPE, origin, 1.25).expect("storage");
        let mut output = stencil.zeros::<f32>(SHAPE, origin).expect("storage");
        group.bench_with_input(BenchmarkId::from_parameter(backend), &backend, |b, _| {
            b.iter(|| {
                stencil
                    .run(
                        Bindings::new()
                            .field(fields[0], &mut input)
                            .field(fields[1], &mut output),
                    )
                    .expect("run");
                black_box(&mut output);
            })
        });
        // Include the download once so device results are observed.
        black_box(output.to_array().expect("download"));
    }
    group.finish();
}

fn bench_laplacian(c: &mut Criterion) {
    bench_stencil(c, "laplacian_130x130x64", LAPLACIAN, ["phi", "lap"], [1, 1, 0]);
}

fn bench_cumsum(c: &mut Criterion) {
    bench_stencil(c, "cumsum_130x130x64", CUMSUM, ["a", "s"], [1, 1, 0]);
}

criterion_group!(benches, bench_laplacian, bench_cumsum);
criterion_main!(benches);
