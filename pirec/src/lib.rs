//! PiRec runner library.
//!
//! Loads a run directory's `config.yaml`, picks a compute device, discovers the
//! generation (G) and refinement (R) checkpoints, and dispatches one of the
//! test or drawing modes.
//!
//! # Usage
//!
//! ```no_run
//! use giztoy_pirec::{Config, PiRec, RunContext, SystemProbe, dispatch};
//!
//! let config = Config::load_dir("checkpoints/places2").unwrap();
//! let ctx = RunContext::new(config, &SystemProbe);
//! let mut model = PiRec::new(&ctx).unwrap();
//! model.load().unwrap();
//! let outcome = dispatch::run(&ctx.config, &mut model).unwrap();
//! ```

pub mod config;
pub mod dataset;
pub mod device;
pub mod dispatch;
mod error;
pub mod inference;
pub mod model;
pub mod output;

pub use config::{Config, DEFAULT_CONFIG_FILE};
pub use dataset::Dataset;
pub use device::{Device, DeviceProbe, RunContext, SystemProbe};
pub use dispatch::{Mode, Outcome, Pipeline, Requirement};
pub use error::PiRecError;
pub use inference::InferenceMode;
pub use model::{PiRec, Stage, SubModel};
pub use output::{Output, StageReport};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PiRecError>;
