//! Mask demo binary: builds a synthetic cube, masks its sources, writes slice PNGs.
//!
//! Usage: cargo run --release --bin mask_demo -- [OPTIONS]
//!
//! Options:
//!   --size <N>        Cube edge length in voxels (default: 64)
//!   --budget <MB>     Region memory budget in MB (default: from config, 1000)
//!   --config <PATH>   JSON engine config to load
//!   --out <DIR>       Output directory for PNGs (default: "mask_demo_out")
//!
//! Output:
//!   <out>/slice_full.png      Middle slice before masking
//!   <out>/slice_masked.png    Same slice with both sources outlined
//!   <out>/slice_undo.png      After undoing the brush stroke

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::{IVec3, Vec2};

use cubemask::core::{logging, EngineConfig, Result};
use cubemask::editor::EditorSession;
use cubemask::math::{Axis, VoxelBox};
use cubemask::volume::MemoryBackend;

/// Blob centers and widths as fractions of the cube edge
const SOURCES: [(f32, f32, f32, f32); 2] = [(0.3, 0.3, 0.5, 0.08), (0.7, 0.65, 0.5, 0.12)];

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let size = parse_i32_arg(&args, "--size").unwrap_or(64).max(8);
    let budget = parse_i64_arg(&args, "--budget");
    let config_path = parse_str_arg(&args, "--config");
    let out_dir = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "mask_demo_out".to_string()));

    if let Err(e) = run(size, budget, config_path.as_deref(), &out_dir) {
        log::error!("mask_demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(size: i32, budget: Option<i64>, config_path: Option<&str>, out_dir: &Path) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(mb) = budget {
        config.max_cube_size_mb = mb;
    }
    std::fs::create_dir_all(out_dir)?;

    println!("=== Cubemask Demo ===");
    println!("Cube:   {0} x {0} x {0}", size);
    println!("Budget: {} MB", config.max_cube_size_mb);
    println!("Output: {}", out_dir.display());
    println!();

    let backend = Arc::new(MemoryBackend::new());
    let start = Instant::now();
    backend.insert_cube("demo.fits", IVec3::splat(size), synthesize(size))?;
    println!("Synthesized cube in {:.1} ms", start.elapsed().as_secs_f32() * 1000.0);

    let mut session = EditorSession::open(backend.clone(), "demo.fits", None, config)?;
    if let Some(region) = session.data().region() {
        println!("Region: {} (downsample {})", region.extent(), region.downsample());
    }

    // Painting needs full resolution; crop around the sources if the budget forced downsampling
    if !session.data().is_full_resolution() {
        let half = size / 4;
        let center = IVec3::splat(size / 2);
        session.crop_to(VoxelBox::new(center - half, center + half))?;
        println!("Cropped to {:?}", session.crop());
    }

    let extent = session.data().region().map_or(IVec3::ONE, |r| r.extent());
    let mid = (extent.z / 2).max(1);
    session.set_slice(Axis::Z, mid)?;
    session.slice_view()?.save_png(out_dir.join("slice_full.png"))?;

    session.enter_paint_mode()?;

    // Source 1: polygon around the first blob
    let first = session.new_source()?;
    let (cx, cy, _, w) = SOURCES[0];
    let polygon = octagon(Vec2::new(cx, cy) * extent.x as f32, w * 2.5 * extent.x as f32);
    let painted = session.paint_polygon(&polygon)?;
    println!("Source {}: polygon painted {} voxels", first, painted);

    // Source 2: brush on the second blob, three slices deep
    let second = session.new_source()?;
    let (cx, cy, _, w) = SOURCES[1];
    let center = IVec3::new((cx * extent.x as f32) as i32, (cy * extent.y as f32) as i32, mid);
    let brush = ((w * 3.0 * extent.x as f32) as i32).max(3);
    let painted = session.paint_brush(center, brush)?;
    println!("Source {}: brush painted {} voxels", second, painted);

    // Overlapping the first source must be rejected as a whole
    match session.paint_polygon(&octagon(Vec2::new(cx, cy) * extent.x as f32, extent.x as f32)) {
        Err(e) => println!("Rejected overlapping polygon: {}", e),
        Ok(n) => println!("Unexpectedly painted {} voxels", n),
    }

    let view = session.slice_view()?;
    view.save_png(out_dir.join("slice_masked.png"))?;

    if let Some(layer) = session.layer() {
        for id in layer.source_ids() {
            println!("  source {:>3}: {} voxels", id, layer.voxel_count(id));
        }
    }

    let selection = VoxelBox::new(center - IVec3::splat(brush / 2), center + IVec3::splat(brush / 2));
    if let Some(stats) = session.selection_stats(&selection) {
        println!(
            "Brush box stats: {} voxels, {} blank, mean {:.3}, range {:.3} .. {:.3}",
            stats.voxel_count, stats.blank_count, stats.mean, stats.min, stats.max
        );
    }

    session.undo()?;
    session.slice_view()?.save_png(out_dir.join("slice_undo.png"))?;
    session.redo()?;

    if let Some(mask) = session.mask() {
        backend.save_mask(mask.handle(), "demo_mask.fits")?;
        println!("Saved mask with sources {:?}", mask.masked_source_ids()?);
    }

    println!();
    println!("Done in {:.2} s", start.elapsed().as_secs_f32());
    Ok(())
}

/// Two Gaussian blobs over a weak gradient, with a blank (NaN) corner
fn synthesize(size: i32) -> Vec<f32> {
    let n = size as f32;
    let mut values = Vec::with_capacity((size * size * size) as usize);
    for z in 1..=size {
        for y in 1..=size {
            for x in 1..=size {
                if x <= size / 8 && y <= size / 8 {
                    values.push(f32::NAN);
                    continue;
                }
                let p = glam::Vec3::new(x as f32, y as f32, z as f32) / n;
                let mut value = 0.05 * p.x;
                for (cx, cy, cz, w) in SOURCES {
                    let d2 = (p - glam::Vec3::new(cx, cy, cz)).length_squared();
                    value += (-d2 / (2.0 * w * w)).exp();
                }
                values.push(value);
            }
        }
    }
    values
}

fn octagon(center: Vec2, radius: f32) -> Vec<Vec2> {
    (0..8)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::FRAC_PI_4;
            center + Vec2::new(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

fn parse_i32_arg(args: &[String], flag: &str) -> Option<i32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_i64_arg(args: &[String], flag: &str) -> Option<i64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
