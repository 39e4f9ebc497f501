//! Performance benchmarks for the Trellis resource graph
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Versioning throughput on wide and deep graphs
//! - Versioning a graph made of import cycles
//! - Hot update propagation up a long chain
//! - Output name reservation under heavy collisions

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis::config::BuildConfig;
use trellis::graph::{HotFlags, ResourceCategory};
use trellis::naming::NameRegistry;
use trellis::{CookedResource, Project};

fn module(id: String, deps: Vec<String>) -> CookedResource {
    CookedResource::new(id.as_str(), ResourceCategory::ScriptModule)
        .with_content(format!("export const id = {:?};", id))
        .with_dependencies(deps)
}

/// One entry importing `width` leaves
fn wide_project(width: usize) -> Project {
    let project = Project::new(BuildConfig::default()).unwrap();
    let leaves: Vec<String> = (0..width).map(|i| format!("/leaf{}.js", i)).collect();
    project.ingest(module("/main.js".to_string(), leaves.clone())).unwrap();
    for leaf in leaves {
        project.ingest(module(leaf, Vec::new())).unwrap();
    }
    project
}

/// A chain of `depth` modules, each importing the next
fn deep_project(depth: usize, cyclic: bool) -> Project {
    let project = Project::new(BuildConfig::default()).unwrap();
    for i in 0..depth {
        let next = if i + 1 < depth {
            vec![format!("/m{}.js", i + 1)]
        } else if cyclic {
            vec!["/m0.js".to_string()]
        } else {
            Vec::new()
        };
        project.ingest(module(format!("/m{}.js", i), next)).unwrap();
    }
    project
}

/// Benchmark: versioning from scratch
fn bench_versioning(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("version_all");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("wide", size), &size, |b, &size| {
            b.iter_with_setup(
                || wide_project(size),
                |project| rt.block_on(async { black_box(project.version_all().await.unwrap()) }),
            )
        });
        group.bench_with_input(BenchmarkId::new("deep", size), &size, |b, &size| {
            b.iter_with_setup(
                || deep_project(size, false),
                |project| rt.block_on(async { black_box(project.version_all().await.unwrap()) }),
            )
        });
    }

    group.bench_function("cycle_100", |b| {
        b.iter_with_setup(
            || deep_project(100, true),
            |project| rt.block_on(async { black_box(project.version_all().await.unwrap()) }),
        )
    });

    group.finish();
}

/// Benchmark: propagating a leaf edit up to the entry
fn bench_propagation(c: &mut Criterion) {
    let project = deep_project(200, false);
    project
        .ingest(module("/m0.js".to_string(), vec!["/m1.js".to_string()]).with_hot(HotFlags::self_accepting()))
        .unwrap();

    c.bench_function("propagate_chain_200", |b| {
        b.iter(|| black_box(project.on_resource_changed(black_box("/m199.js"), None)))
    });
}

/// Benchmark: reserving colliding names
fn bench_naming(c: &mut Criterion) {
    c.bench_function("reserve_collisions_500", |b| {
        b.iter(|| {
            let mut registry = NameRegistry::new();
            for _ in 0..500 {
                black_box(registry.reserve("assets", "logo.png"));
            }
        })
    });
}

criterion_group!(benches, bench_versioning, bench_propagation, bench_naming);
criterion_main!(benches);
