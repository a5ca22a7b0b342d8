//! Evaluation samples.
//!
//! `DATASET_PATH` may name a directory of images, a `.flist` file listing one
//! image path per line, or a single image.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use tracing::debug;

use crate::{PiRecError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Ordered list of sample image paths.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    paths: Vec<PathBuf>,
}

impl Dataset {
    /// Resolves `path` into a list of samples.
    pub fn open(path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let paths = if path.is_dir() {
            list_dir(path)?
        } else if has_extension(path, &["flist"]) {
            read_flist(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(PiRecError::Dataset(format!(
                "{} does not exist",
                path.display()
            )));
        };

        debug!(path = %path.display(), samples = paths.len(), "dataset opened");
        Ok(Dataset { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| exts.contains(&e.as_str()))
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, IMAGE_EXTENSIONS) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_flist(file: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(file)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Reads an image as a `[1, 3, H, W]` f32 tensor scaled to `[-1, 1]`.
///
/// A non-zero `size` resizes the image to `size x size` first.
pub fn load_image(path: &Path, size: u32, device: &Device) -> Result<Tensor> {
    let mut img = image::open(path)?;
    if size > 0 && (img.width() != size || img.height() != size) {
        img = img.resize_exact(size, size, FilterType::Triangle);
    }
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);

    let tensor = Tensor::from_vec(rgb.into_raw(), (h, w, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2.0 / 255.0, -1.0)?
        .unsqueeze(0)?;
    Ok(tensor)
}

/// Converts a `[1, 3, H, W]` tensor in `[-1, 1]` back to an RGB image.
pub fn to_image(tensor: &Tensor) -> Result<image::RgbImage> {
    let (_, c, h, w) = tensor.dims4()?;
    if c != 3 {
        return Err(PiRecError::Dataset(format!(
            "expected 3 output channels, got {c}"
        )));
    }

    let pixels = tensor
        .squeeze(0)?
        .permute((1, 2, 0))?
        .clamp(-1f32, 1f32)?
        .affine(127.5, 127.5)?
        .round()?
        .to_dtype(DType::U8)?
        .to_device(&Device::Cpu)?
        .flatten_all()?
        .to_vec1::<u8>()?;

    image::RgbImage::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| PiRecError::Dataset("output buffer size mismatch".to_string()))
}
