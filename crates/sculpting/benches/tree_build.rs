//! Tree construction over each backend.

use std::hint::black_box;

use chisel_config::SculptConfig;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sculpting::{DynMesh, GridsSurface, MeshSurface, SpatialTree};
use subdiv::{BilinearEvaluator, Mesh, SubdivCcg, SubdivToCcgSettings};

fn bench_mesh_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build_mesh");
    let config = SculptConfig::default();

    for cols in [32u32, 128, 256] {
        let surface = MeshSurface::new(Mesh::quad_grid(cols, cols, 2.0));
        group.throughput(Throughput::Elements(u64::from(cols * cols)));
        group.bench_with_input(BenchmarkId::from_parameter(cols), &surface, |b, surface| {
            b.iter(|| black_box(SpatialTree::from_mesh(surface, &config).nodes_num()))
        });
    }

    group.finish();
}

fn bench_grids_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build_grids");
    let config = SculptConfig::default();
    let mesh = Mesh::quad_grid(32, 32, 2.0);

    for level in [2u32, 3, 4] {
        let settings = SubdivToCcgSettings {
            level,
            need_normal: true,
            need_mask: false,
        };
        let Ok(ccg) = SubdivCcg::new(&mesh, settings, &BilinearEvaluator, None) else {
            continue;
        };
        let surface = GridsSurface::new(ccg);
        group.bench_with_input(BenchmarkId::from_parameter(level), &surface, |b, surface| {
            b.iter(|| black_box(SpatialTree::from_grids(surface, &mesh, &config).nodes_num()))
        });
    }

    group.finish();
}

fn bench_dyntopo_build(c: &mut Criterion) {
    let config = SculptConfig::default();
    let mesh = Mesh::quad_grid(128, 128, 2.0);

    c.bench_function("tree_build_dyntopo_128", |b| {
        b.iter_batched(
            || DynMesh::from_mesh(&mesh),
            |mut dyn_mesh| black_box(SpatialTree::from_dyntopo(&mut dyn_mesh, &config).nodes_num()),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_mesh_build, bench_grids_build, bench_dyntopo_build);
criterion_main!(benches);
