//! Result writing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::device::Device;
use crate::model::Stage;

/// Report filename written next to a stage's images.
pub const REPORT_FILE: &str = "report.yaml";

/// Summary of one test stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub device: Device,
    pub samples: usize,
    pub output_dir: PathBuf,
    pub elapsed_ms: u64,
}

/// Output directory for one stage.
pub struct Output {
    dir: PathBuf,
}

impl Output {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves an image; the format follows the file extension.
    pub fn save_image(&self, img: &image::RgbImage, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        img.save(&path)?;
        Ok(path)
    }

    /// Writes a value as YAML under `name`.
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, serde_yaml::to_string(value)?)?;
        Ok(path)
    }

    /// Writes the stage report as [`REPORT_FILE`].
    pub fn write_report(&self, report: &StageReport) -> Result<PathBuf> {
        self.write(REPORT_FILE, report)
    }
}
