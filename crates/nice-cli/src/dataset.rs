//! Image-folder dataset: PNG files flattened to channel-major samples.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::imageops::FilterType;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use nice::FlowError;
use rand::Rng;

use crate::config::DataConfig;

/// Sorted paths of the `*.png` files directly inside `dir`.
pub fn list_png_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Flatten an RGB image to `[r-plane, g-plane, b-plane]` in `[0, 1]`.
pub fn image_to_sample(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut sample = vec![0.0_f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for (c, &value) in pixel.0.iter().enumerate() {
            sample[c * plane + offset] = value as f32 / 255.0;
        }
    }
    sample
}

/// Load up to `config.max_images` PNGs from `dir` as flow samples.
///
/// Images are resized to `image_size × image_size` RGB. With
/// `config.dequantize`, each pixel gets uniform noise in `[0, 1/255)` so the
/// discrete intensities become a continuous density.
pub fn load_image_folder<R: Rng>(
    dir: &Path,
    config: &DataConfig,
    rng: &mut R,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut paths = list_png_files(dir)?;
    paths.truncate(config.max_images);
    if paths.is_empty() {
        return Err(FlowError::Configuration(format!(
            "no PNG images found in {}",
            dir.display()
        ))
        .into());
    }

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=> "),
    );
    pb.set_message("loading images");

    let size = config.image_size;
    let mut samples = Vec::with_capacity(paths.len());
    for path in &paths {
        let img = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        let mut sample = image_to_sample(&img);
        if config.dequantize {
            for v in sample.iter_mut() {
                *v += rng.gen::<f32>() / 255.0;
            }
        }
        samples.push(sample);
        pb.inc(1);
    }
    pb.finish_with_message("images loaded");

    tracing::info!(
        count = samples.len(),
        dim = config.sample_dim(),
        path = %dir.display(),
        "Loaded image dataset"
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn write_png(path: &Path, size: u32, rgb: [u8; 3]) {
        RgbImage::from_pixel(size, size, image::Rgb(rgb))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_channel_major_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 51]));
        img.put_pixel(1, 0, image::Rgb([0, 255, 102]));

        let sample = image_to_sample(&img);
        let expected = [1.0, 0.0, 0.0, 1.0, 0.2, 0.4];
        for (got, want) in sample.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "expected {want}, got {got}");
        }
    }

    #[test]
    fn test_lists_sorted_pngs_only() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("b.png"), 2, [0, 0, 0]);
        write_png(&tmp.path().join("a.PNG"), 2, [0, 0, 0]);
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let names: Vec<String> = list_png_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }

    #[test]
    fn test_load_resizes_and_dequantizes() {
        let tmp = TempDir::new().unwrap();
        for i in 0..3 {
            write_png(&tmp.path().join(format!("{i}.png")), 8, [255, 128, 0]);
        }
        let config = DataConfig {
            max_images: 2,
            image_size: 4,
            dequantize: true,
        };

        let samples = load_image_folder(tmp.path(), &config, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.len() == 48));

        // Noise never moves a pixel past the next intensity level.
        for &v in &samples[0][..16] {
            assert!(v > 254.0 / 255.0 && v < 1.0 + 1.0 / 255.0, "red value {v}");
        }
        for &v in &samples[0][32..] {
            assert!((0.0..2.0 / 255.0).contains(&v), "blue value {v}");
        }
    }

    #[test]
    fn test_empty_folder_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_image_folder(tmp.path(), &DataConfig::default(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(
            matches!(err.downcast_ref::<FlowError>(), Some(FlowError::Configuration(_))),
            "unexpected error: {err}"
        );
    }
}
