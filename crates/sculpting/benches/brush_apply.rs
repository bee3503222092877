//! One dab of each brush on a dense grid.

use std::hint::black_box;

use chisel_config::SculptConfig;
use criterion::{criterion_group, criterion_main, Criterion};
use glam::Vec3;
use sculpting::brush::{apply_brush, gather_brush_nodes, BrushContext, BrushSettings, Dab};
use sculpting::{MeshSurface, SpatialTree, Surface};
use subdiv::Mesh;

fn bench_brushes(c: &mut Criterion) {
    let mut group = c.benchmark_group("brush_apply_256");
    let config = SculptConfig::default();

    let presets = [
        ("draw", BrushSettings::draw()),
        ("inflate", BrushSettings::inflate()),
        ("flatten", BrushSettings::flatten()),
        ("clay_strips", BrushSettings::clay_strips()),
        ("smooth", BrushSettings::smooth()),
    ];

    for (name, settings) in presets {
        let surface = MeshSurface::new(Mesh::quad_grid(256, 256, 2.0));
        let mut tree = SpatialTree::from_mesh(&surface, &config);
        let mut surface = Surface::Mesh(surface);
        let mut dab = Dab::new(Vec3::ZERO, Vec3::Z, 0.3, 0.05);
        dab.grab_delta = Vec3::X * 0.01;

        group.bench_function(name, |b| {
            b.iter(|| {
                let nodes = gather_brush_nodes(&tree, &settings, &dab);
                let stats = apply_brush(&mut tree, &mut surface, &nodes, &settings, &dab, &BrushContext::default());
                black_box(stats.map(|stats| stats.verts_moved).unwrap_or(0))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_brushes);
criterion_main!(benches);
