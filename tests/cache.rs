//! Build cache behaviour seen through the public build API.

mod common;

use tessera::{Backend, BuildCache, BuildOptions, GridIndex, Storage};

const SCALE: &str = "stencil scale(a: Field<f64>, b: Field<f64>, s: f64) {
    with computation(PARALLEL), interval(...) { b = s * a }
}";

fn run_scale(stencil: &tessera::Stencil) -> f64 {
    let mut a = Storage::full(stencil.backend(), [3, 3, 3], [0, 0, 0], 2.0).unwrap();
    let mut b = stencil.zeros::<f64>([3, 3, 3], [0, 0, 0]).unwrap();
    stencil
        .run(
            tessera::Bindings::new()
                .field("a", &mut a)
                .field("b", &mut b)
                .scalar("s", 1.5),
        )
        .unwrap();
    b.get([1, 1, 1]).unwrap()
}

#[test]
fn identical_definitions_share_one_build() {
    let (_dir, cache) = common::cache();
    let first = common::build(SCALE, Backend::Vectorized, &cache);
    // Whitespace and comments do not change the normalized definition.
    let second = common::build(
        "stencil scale(a: Field<f64>, b: Field<f64>, s: f64) {
            // same computation
            with computation(PARALLEL), interval(...) {
                b = s * a
            }
        }",
        Backend::Vectorized,
        &cache,
    );
    assert_eq!(first.artifact().key, second.artifact().key);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.codegen_runs, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, vec![(Backend::Vectorized, 1)]);
    assert_eq!(run_scale(&second), 3.0);
}

#[test]
fn different_definitions_and_backends_get_different_keys() {
    let (_dir, cache) = common::cache();
    let scale = common::build(SCALE, Backend::Reference, &cache);
    let shifted = common::build(&SCALE.replace("s * a", "s * a[0, 0, 0] + 1.0"), Backend::Reference, &cache);
    let vectorized = common::build(SCALE, Backend::Vectorized, &cache);
    assert_ne!(scale.artifact().key, shifted.artifact().key);
    assert_ne!(scale.artifact().key, vectorized.artifact().key);
    assert_eq!(cache.stats().unwrap().codegen_runs, 3);
    assert_eq!(run_scale(&shifted), 4.0);
}

#[test]
fn entries_persist_across_cache_instances() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cache");

    let backends: Vec<Backend> = common::available_backends()
        .into_iter()
        .filter(|b| *b != Backend::Gpu)
        .collect();
    let first = BuildCache::new(&root);
    for &backend in &backends {
        common::build(SCALE, backend, &first);
    }
    assert_eq!(first.stats().unwrap().codegen_runs, backends.len());

    let second = BuildCache::new(&root);
    for &backend in &backends {
        let stencil = common::build(SCALE, backend, &second);
        assert!(stencil.source_path().starts_with(&root));
        assert_eq!(run_scale(&stencil), 3.0, "{}", backend);
    }
    let stats = second.stats().unwrap();
    assert_eq!(stats.codegen_runs, 0);
    assert_eq!(stats.hits, backends.len());
    assert!(stats.total_bytes > 0);
}

#[test]
fn rebuild_regenerates_and_clear_empties() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(SCALE, Backend::Reference, &cache);
    let key = stencil.artifact().key.clone();

    let options = BuildOptions {
        rebuild: true,
        ..BuildOptions::default()
    };
    let mut defs = tessera::parse(SCALE).unwrap();
    let rebuilt = tessera::build_with(defs.remove(0), Backend::Reference, &options, &cache).unwrap();
    assert_eq!(rebuilt.artifact().key, key);
    assert_eq!(cache.stats().unwrap().codegen_runs, 2);

    cache.clear().unwrap();
    assert!(!cache.root().exists());
    assert!(cache.stats().unwrap().entries.is_empty());

    // Still usable after clearing.
    let again = common::build(SCALE, Backend::Reference, &cache);
    assert_eq!(run_scale(&again), 3.0);
    assert_eq!(cache.stats().unwrap().codegen_runs, 3);
}

#[test]
fn compile_builds_every_stencil_in_a_source() {
    let dir = tempfile::tempdir().unwrap();
    tessera::cache::init(dir.path().join("global")).unwrap();
    let stencils = tessera::compile(
        &format!("{}\n{}", SCALE, SCALE.replace("scale", "scale2")),
        Backend::Reference,
        &BuildOptions::default(),
    )
    .unwrap();
    let names: Vec<&str> = stencils.iter().map(|s| s.name()).collect();
    assert_eq!(names, ["scale", "scale2"]);
    assert!(stencils
        .iter()
        .all(|s| s.source_path().starts_with(dir.path())));
}
