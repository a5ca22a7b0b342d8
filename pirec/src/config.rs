//! Run configuration.
//!
//! Every run directory carries a `config.yaml` with upper-case keys
//! (`MODE`, `DATASET_PATH`, `SEED`, ...). Keys the runner does not know are
//! preserved so collaborators can still look them up through [`Config::get`].
//!
//! The compute device is deliberately not part of this file; see
//! [`crate::RunContext`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::Result;

/// Default configuration filename inside a run directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Default results directory name inside a run directory.
pub const DEFAULT_RESULTS_DIR: &str = "results";
/// Seed used when `SEED` is missing.
pub const DEFAULT_SEED: u64 = 10;

/// Configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mode selector (2: G, 3: R, 4: G + R, 5: drawing).
    #[serde(rename = "MODE")]
    pub mode: i64,

    /// Directory, `.flist` file or single image to evaluate.
    #[serde(rename = "DATASET_PATH", default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,

    /// Seed applied to the selected device.
    #[serde(rename = "SEED", default = "default_seed")]
    pub seed: u64,

    /// Square resize applied to every sample; 0 keeps the original size.
    #[serde(rename = "INPUT_SIZE", default, skip_serializing_if = "is_zero")]
    pub input_size: u32,

    /// Output directory (optional, defaults to `<run dir>/results`).
    #[serde(rename = "RESULTS", default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,

    /// Non-zero raises the default log level to debug.
    #[serde(rename = "VERBOSE", default, skip_serializing_if = "is_off")]
    pub verbose: i64,

    /// Non-zero logs every evaluated sample.
    #[serde(rename = "DEBUG", default, skip_serializing_if = "is_off")]
    pub debug: i64,

    /// Remaining keys, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    /// Raw file contents (not serialized).
    #[serde(skip)]
    raw: String,

    /// Directory the config was loaded from (not serialized).
    #[serde(skip)]
    dir: PathBuf,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_off(n: &i64) -> bool {
    *n == 0
}

impl Config {
    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&content, dir)
    }

    /// Loads `config.yaml` from a run directory.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Config> {
        Self::load(dir.as_ref().join(DEFAULT_CONFIG_FILE))
    }

    /// Parses YAML text as if it had been read from `dir`.
    pub fn parse(content: &str, dir: impl Into<PathBuf>) -> Result<Config> {
        let mut cfg: Config = serde_yaml::from_str(content)?;
        cfg.raw = content.to_string();
        cfg.dir = dir.into();
        Ok(cfg)
    }

    /// Returns the run directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the raw YAML text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Looks up a key that has no typed field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Returns the dataset path, treating an empty string as unset.
    pub fn dataset_path(&self) -> Option<&str> {
        self.dataset_path.as_deref().filter(|p| !p.is_empty())
    }

    /// Returns the directory results are written to.
    pub fn results_dir(&self) -> PathBuf {
        match self.results.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.dir.join(DEFAULT_RESULTS_DIR),
        }
    }

    /// Renders the configuration banner.
    pub fn banner(&self) -> String {
        let rule = "-".repeat(33);
        format!(
            "Model configurations:\n{rule}\n{}\n{rule}\n",
            self.raw.trim_end()
        )
    }

    /// Prints the configuration banner to stdout.
    pub fn print(&self) {
        println!("{}", self.banner());
    }
}
