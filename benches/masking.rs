use std::path::Path;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use cubemask::math::{Axis, VoxelBox};
use cubemask::slice::grid::Grid2;
use cubemask::slice::{label_regions, select_voxels};
use cubemask::volume::sizing::compute_factors;
use cubemask::volume::{CubeBackend, MemoryBackend};
use cubemask::mask::{BrushMode, MaskLayer};

use glam::{I64Vec3, IVec2, IVec3, Vec2};

fn circle(center: Vec2, radius: f32, points: usize) -> Vec<Vec2> {
    (0..points)
        .map(|i| {
            let a = i as f32 / points as f32 * std::f32::consts::TAU;
            center + Vec2::new(a.cos(), a.sin()) * radius
        })
        .collect()
}

fn bench_compute_factors(c: &mut Criterion) {
    c.bench_function("compute_factors_large_cube", |b| {
        b.iter(|| compute_factors(black_box(1000), black_box(I64Vec3::new(4096, 4096, 16384))))
    });
    c.bench_function("compute_factors_tiny_budget", |b| {
        b.iter(|| compute_factors(black_box(1), black_box(I64Vec3::new(2048, 2048, 2048))))
    });
}

fn bench_select_voxels(c: &mut Criterion) {
    let mask = Grid2::filled(512, 512, 0i16);
    let polygon = circle(Vec2::splat(256.0), 200.0, 64);

    c.bench_function("select_voxels_512_circle", |b| {
        b.iter(|| {
            select_voxels(black_box(&polygon), IVec2::splat(512), Axis::Z, 1, black_box(&mask), 1)
        })
    });
}

fn bench_label_regions(c: &mut Criterion) {
    // Checkerboard of 8x8 blocks: many small regions
    let grid = Grid2::from_fn(512, 512, |u, v| if ((u / 8) + (v / 8)) % 2 == 0 { 1.0f32 } else { 0.0 });
    c.bench_function("label_regions_512_blocks", |b| {
        b.iter(|| label_regions(black_box(&grid)))
    });

    let solid = Grid2::filled(512, 512, 1.0f32);
    c.bench_function("label_regions_512_solid", |b| {
        b.iter(|| label_regions(black_box(&solid)))
    });
}

fn bench_brush_stroke(c: &mut Criterion) {
    c.bench_function("brush_stroke_9_cubed", |b| {
        let mut layer = MaskLayer::new(IVec3::splat(128));
        let id = layer.next_source_id().unwrap();
        b.iter(|| {
            layer.begin_stroke().unwrap();
            layer.paint_brush(black_box(IVec3::splat(64)), 9, BrushMode::Paint(id)).unwrap();
            layer.finish_stroke().unwrap();
            layer.undo().unwrap();
        })
    });
}

fn bench_crop_and_downsample(c: &mut Criterion) {
    let backend = MemoryBackend::new();
    let n = 128 * 128 * 128;
    backend
        .insert_cube("bench.fits", IVec3::splat(128), (0..n).map(|i| (i % 97) as f32).collect())
        .unwrap();
    let (handle, dims) = backend.open_cube(Path::new("bench.fits"), false).unwrap();
    let crop = VoxelBox::from_extent(IVec3::splat(128));

    c.bench_function("crop_and_downsample_128_by_4", |b| {
        b.iter(|| backend.crop_and_downsample(handle, dims, black_box(&crop), IVec3::splat(4), false))
    });
}

criterion_group!(
    benches,
    bench_compute_factors,
    bench_select_voxels,
    bench_label_regions,
    bench_brush_stroke,
    bench_crop_and_downsample,
);
criterion_main!(benches);
