//! Compute device selection.
//!
//! The device is probed once per run and combined with the loaded
//! [`Config`] into a [`RunContext`]; the configuration itself stays untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::config::Config;

/// Compute target for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// First CUDA accelerator.
    Cuda,
    /// General-purpose fallback.
    #[default]
    Cpu,
}

impl Device {
    /// Returns the name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Whether the backend accepts `set_seed`. The CPU backend has no
    /// seedable generator.
    pub fn is_seedable(&self) -> bool {
        matches!(self, Device::Cuda)
    }

    /// Opens the matching tensor backend device.
    pub fn open(&self) -> Result<candle_core::Device> {
        match self {
            Device::Cuda => Ok(candle_core::Device::new_cuda(0)?),
            Device::Cpu => Ok(candle_core::Device::Cpu),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports which accelerators are usable.
pub trait DeviceProbe {
    fn cuda_available(&self) -> bool;
}

/// Probes the tensor backend compiled into this binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn cuda_available(&self) -> bool {
        candle_core::utils::cuda_is_available()
    }
}

/// Picks the accelerator when the probe reports one, else the CPU.
pub fn select(probe: &dyn DeviceProbe) -> Device {
    if probe.cuda_available() {
        Device::Cuda
    } else {
        Device::Cpu
    }
}

/// Loaded configuration plus the runtime-selected device.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub device: Device,
}

impl RunContext {
    /// Probes the device and binds it to `config`.
    pub fn new(config: Config, probe: &dyn DeviceProbe) -> Self {
        let device = select(probe);
        debug!(%device, "device selected");
        Self { config, device }
    }

    /// Opens the backend device and applies the configured seed.
    pub fn open_device(&self) -> Result<candle_core::Device> {
        let device = self.device.open()?;
        if !self.device.is_seedable() {
            debug!(device = %self.device, "seed skipped");
            return Ok(device);
        }
        if let Err(err) = device.set_seed(self.config.seed) {
            warn!(seed = self.config.seed, "seed not applied: {}", err);
        }
        Ok(device)
    }
}
