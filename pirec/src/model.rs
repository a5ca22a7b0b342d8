//! PiRec model: checkpoint discovery and G/R evaluation.
//!
//! A run directory may hold a generation checkpoint
//! ([`G_CHECKPOINT`]) and a refinement checkpoint ([`R_CHECKPOINT`]). Each one
//! is a safetensors file with a sequential convolution stack:
//!
//! ```text
//! conv0.weight [out, in, k, k]   conv0.bias [out]   (bias optional)
//! conv1.weight ...
//! ```
//!
//! Hidden layers use ReLU, the last layer tanh. Both stages map RGB in
//! `[-1, 1]` to RGB in `[-1, 1]`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dataset::{self, Dataset};
use crate::device::{Device, RunContext};
use crate::inference;
use crate::output::{Output, StageReport};
use crate::{PiRecError, Result};

/// Generation checkpoint filename inside the run directory.
pub const G_CHECKPOINT: &str = "g_model.safetensors";
/// Refinement checkpoint filename inside the run directory.
pub const R_CHECKPOINT: &str = "r_model.safetensors";

const IMAGE_CHANNELS: usize = 3;

/// Test stage selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Generation only.
    #[serde(rename = "G")]
    G,
    /// Refinement only.
    #[serde(rename = "R")]
    R,
    /// Generation followed by refinement.
    #[serde(rename = "G_R")]
    GR,
}

impl Stage {
    /// Results subdirectory for this stage.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::G => "G",
            Stage::R => "R",
            Stage::GR => "G_R",
        }
    }
}

struct ConvLayer {
    weight: Tensor,
    bias: Option<Tensor>,
    padding: usize,
}

/// One loaded sub-model (G or R).
pub struct SubModel {
    name: String,
    path: PathBuf,
    layers: Vec<ConvLayer>,
}

impl SubModel {
    /// Loads a convolution stack from a safetensors checkpoint.
    pub fn load(name: &str, path: &Path, device: &candle_core::Device) -> Result<SubModel> {
        let mut tensors = candle_core::safetensors::load(path, device)?;
        let layers = build_layers(name, &mut tensors)?;

        if !tensors.is_empty() {
            let mut unused: Vec<_> = tensors.keys().cloned().collect();
            unused.sort();
            warn!(model = name, ?unused, "checkpoint has unused tensors");
        }

        Ok(SubModel {
            name: name.to_string(),
            path: path.to_path_buf(),
            layers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of convolution layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Total number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weight.elem_count() + l.bias.as_ref().map_or(0, Tensor::elem_count))
            .sum()
    }

    /// Evaluates the stack on a `[N, 3, H, W]` batch.
    ///
    /// Fails unless an [`inference::InferenceMode`] guard is alive.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if !inference::is_active() {
            return Err(PiRecError::OutsideInference(self.name.clone()));
        }

        let last = self.layers.len() - 1;
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = x.conv2d(&layer.weight, layer.padding, 1, 1, 1)?;
            if let Some(bias) = &layer.bias {
                let bias = bias.reshape((1, bias.elem_count(), 1, 1))?;
                x = x.broadcast_add(&bias)?;
            }
            x = if i == last { x.tanh()? } else { x.relu()? };
        }
        Ok(x)
    }
}

fn build_layers(name: &str, tensors: &mut HashMap<String, Tensor>) -> Result<Vec<ConvLayer>> {
    let mut layers: Vec<ConvLayer> = Vec::new();
    let mut channels = IMAGE_CHANNELS;

    while let Some(weight) = tensors.remove(&format!("conv{}.weight", layers.len())) {
        let i = layers.len();
        let (out_c, in_c, kh, kw) = weight.dims4()?;
        if kh != kw || kh % 2 == 0 {
            return Err(PiRecError::checkpoint(
                name,
                format!("conv{i}: kernel must be square with odd size, got {kh}x{kw}"),
            ));
        }
        if in_c != channels {
            return Err(PiRecError::checkpoint(
                name,
                format!("conv{i}: expected {channels} input channels, got {in_c}"),
            ));
        }

        let bias = match tensors.remove(&format!("conv{i}.bias")) {
            Some(b) => {
                if b.dims() != [out_c] {
                    return Err(PiRecError::checkpoint(
                        name,
                        format!("conv{i}: bias shape {:?} does not match {out_c} outputs", b.dims()),
                    ));
                }
                Some(b.to_dtype(DType::F32)?)
            }
            None => None,
        };

        layers.push(ConvLayer {
            weight: weight.to_dtype(DType::F32)?,
            bias,
            padding: kh / 2,
        });
        channels = out_c;
    }

    if layers.is_empty() {
        return Err(PiRecError::checkpoint(name, "missing conv0.weight"));
    }
    if channels != IMAGE_CHANNELS {
        return Err(PiRecError::checkpoint(
            name,
            format!("last layer must produce {IMAGE_CHANNELS} channels, got {channels}"),
        ));
    }
    Ok(layers)
}

/// Picks a unique PNG name for sample `index`.
///
/// The source stem is used as is; a stem already taken by an earlier sample
/// gets the sample index appended.
fn output_name(path: &Path, index: usize, used: &mut HashSet<String>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{index:05}"));
    let mut name = format!("{stem}.png");
    if !used.insert(name.clone()) {
        name = format!("{stem}_{index:05}.png");
        used.insert(name.clone());
    }
    name
}

/// PiRec model with optional generation and refinement stages.
pub struct PiRec {
    config: Config,
    device: Device,
    backend: candle_core::Device,
    pub g_model: Option<SubModel>,
    pub r_model: Option<SubModel>,
}

impl PiRec {
    /// Creates an unloaded model bound to the context's device.
    pub fn new(ctx: &RunContext) -> Result<PiRec> {
        Ok(PiRec {
            config: ctx.config.clone(),
            device: ctx.device,
            backend: ctx.open_device()?,
            g_model: None,
            r_model: None,
        })
    }

    /// Loads whichever checkpoints exist in the run directory.
    ///
    /// A missing file leaves the stage absent; a present but invalid file is
    /// an error.
    pub fn load(&mut self) -> Result<()> {
        self.g_model = self.discover("G", G_CHECKPOINT)?;
        self.r_model = self.discover("R", R_CHECKPOINT)?;
        Ok(())
    }

    fn discover(&self, name: &str, file: &str) -> Result<Option<SubModel>> {
        let path = self.config.dir().join(file);
        if !path.is_file() {
            debug!(model = name, path = %path.display(), "checkpoint not found");
            return Ok(None);
        }

        let model = SubModel::load(name, &path, &self.backend)?;
        info!(
            model = name,
            path = %path.display(),
            layers = model.depth(),
            params = model.parameter_count(),
            "checkpoint loaded"
        );
        Ok(Some(model))
    }

    /// Runs generation over the dataset.
    pub fn test_g(&self) -> Result<StageReport> {
        self.run_stage(Stage::G)
    }

    /// Runs refinement over the dataset.
    pub fn test_r(&self) -> Result<StageReport> {
        self.run_stage(Stage::R)
    }

    /// Runs generation then refinement over the dataset.
    pub fn test_g_r(&self) -> Result<StageReport> {
        self.run_stage(Stage::GR)
    }

    fn generator(&self) -> Result<&SubModel> {
        self.g_model
            .as_ref()
            .ok_or_else(|| PiRecError::checkpoint("G", "not loaded"))
    }

    fn refiner(&self) -> Result<&SubModel> {
        self.r_model
            .as_ref()
            .ok_or_else(|| PiRecError::checkpoint("R", "not loaded"))
    }

    fn evaluate(&self, stage: Stage, input: &Tensor) -> Result<Tensor> {
        match stage {
            Stage::G => self.generator()?.forward(input),
            Stage::R => self.refiner()?.forward(input),
            Stage::GR => {
                let generated = self.generator()?.forward(input)?;
                self.refiner()?.forward(&generated)
            }
        }
    }

    fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        let dataset_path = self
            .config
            .dataset_path()
            .ok_or_else(|| PiRecError::Dataset("DATASET_PATH is not set".to_string()))?;
        let dataset = Dataset::open(dataset_path)?;
        if dataset.is_empty() {
            return Err(PiRecError::Dataset(format!(
                "no samples found in {dataset_path}"
            )));
        }

        let output = Output::new(self.config.results_dir().join(stage.dir_name()))?;
        let started = Instant::now();
        let mut used = HashSet::new();

        for (i, path) in dataset.paths().iter().enumerate() {
            let input = dataset::load_image(path, self.config.input_size, &self.backend)?;
            let result = self.evaluate(stage, &input)?;
            let name = output_name(path, i, &mut used);
            let saved = output.save_image(&dataset::to_image(&result)?, &name)?;

            if self.config.debug != 0 {
                debug!(stage = stage.dir_name(), sample = i, saved = %saved.display(), "sample done");
            }
        }

        let report = StageReport {
            stage,
            device: self.device,
            samples: dataset.len(),
            output_dir: output.dir().to_path_buf(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        output.write_report(&report)?;
        info!(
            stage = stage.dir_name(),
            samples = report.samples,
            elapsed_ms = report.elapsed_ms,
            "stage finished"
        );
        Ok(report)
    }
}
