//! Sample-grid rendering to PNG.

use std::path::Path;

use anyhow::Context;
use image::{Rgb, RgbImage};

/// Side length of the square RGB image flattened into `dim` values, if any.
pub fn image_side(dim: usize) -> Option<u32> {
    if dim == 0 || dim % 3 != 0 {
        return None;
    }
    let plane = dim / 3;
    let side = (plane as f64).sqrt().round() as usize;
    (side * side == plane).then_some(side as u32)
}

/// Tile channel-major samples into a `grid × grid` RGB image.
///
/// Values are clipped to `[0, 1]` before quantizing to 8 bits. Missing
/// tiles stay black.
pub fn sample_grid(samples: &[Vec<f32>], grid: u32, side: u32) -> anyhow::Result<RgbImage> {
    let plane = (side * side) as usize;
    let mut img = RgbImage::new(grid * side, grid * side);

    for (i, sample) in samples.iter().take((grid * grid) as usize).enumerate() {
        anyhow::ensure!(
            sample.len() == 3 * plane,
            "sample {i} has {} values, expected {} for {side}x{side} RGB",
            sample.len(),
            3 * plane
        );
        let (row, col) = (i as u32 / grid, i as u32 % grid);
        for y in 0..side {
            for x in 0..side {
                let offset = (y * side + x) as usize;
                let channel = |c: usize| (sample[c * plane + offset].clamp(0.0, 1.0) * 255.0).round() as u8;
                img.put_pixel(
                    col * side + x,
                    row * side + y,
                    Rgb([channel(0), channel(1), channel(2)]),
                );
            }
        }
    }
    Ok(img)
}

/// Render `samples` as a grid and write it as PNG to `path`.
pub fn write_sample_grid(
    samples: &[Vec<f32>],
    grid: u32,
    side: u32,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    sample_grid(samples, grid, side)?
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), grid, side, "Wrote sample grid");
    Ok(())
}
