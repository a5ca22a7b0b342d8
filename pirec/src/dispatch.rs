//! Mode validation and dispatch.
//!
//! The configured `MODE` decides which sub-models must be present and which
//! test action runs:
//!
//! | MODE | requires | action                 |
//! |------|----------|------------------------|
//! | 2    | G        | generation testing     |
//! | 3    | R        | refinement testing     |
//! | 4    | G and R  | combined testing       |
//! | 5    | G        | drawing (announced)    |
//! | 6    | R        | none, invalid mode     |
//!
//! Mode 6 is checked against R but has no action, so it always ends as an
//! invalid mode.

use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::Result;
use crate::config::Config;
use crate::inference::InferenceMode;
use crate::model::PiRec;

/// Runnable modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    TestG,
    TestR,
    TestGR,
    Draw,
}

impl Mode {
    /// Maps a `MODE` value to a runnable mode.
    pub fn from_code(code: i64) -> Option<Mode> {
        match code {
            2 => Some(Mode::TestG),
            3 => Some(Mode::TestR),
            4 => Some(Mode::TestGR),
            5 => Some(Mode::Draw),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Mode::TestG => 2,
            Mode::TestR => 3,
            Mode::TestGR => 4,
            Mode::Draw => 5,
        }
    }

    fn banner(&self) -> &'static str {
        match self {
            Mode::TestG => "Starting Testing (G)...",
            Mode::TestR => "Starting Refinement Testing (R)...",
            Mode::TestGR => "Starting Full Testing (G + R)...",
            Mode::Draw => "Drawing Mode Selected (Ensure input images are provided)...",
        }
    }
}

/// Sub-models a mode needs before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    G,
    R,
    Both,
}

impl Requirement {
    /// Returns the requirement for a `MODE` value, if any.
    pub fn for_mode(code: i64) -> Option<Requirement> {
        match code {
            2 | 5 => Some(Requirement::G),
            3 | 6 => Some(Requirement::R),
            4 => Some(Requirement::Both),
            _ => None,
        }
    }

    pub fn is_met(&self, has_g: bool, has_r: bool) -> bool {
        match self {
            Requirement::G => has_g,
            Requirement::R => has_r,
            Requirement::Both => has_g && has_r,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Requirement::G => "g_model not loaded!",
            Requirement::R => "r_model not loaded!",
            Requirement::Both => "Both g_model and r_model must be loaded for MODE 4!",
        }
    }
}

/// Sub-model presence and the test actions run by the dispatcher.
pub trait Pipeline {
    fn has_g(&self) -> bool;
    fn has_r(&self) -> bool;
    fn test_g(&mut self) -> Result<()>;
    fn test_r(&mut self) -> Result<()>;
    fn test_g_r(&mut self) -> Result<()>;
}

impl Pipeline for PiRec {
    fn has_g(&self) -> bool {
        self.g_model.is_some()
    }

    fn has_r(&self) -> bool {
        self.r_model.is_some()
    }

    fn test_g(&mut self) -> Result<()> {
        PiRec::test_g(self).map(|_| ())
    }

    fn test_r(&mut self) -> Result<()> {
        PiRec::test_r(self).map(|_| ())
    }

    fn test_g_r(&mut self) -> Result<()> {
        PiRec::test_g_r(self).map(|_| ())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The mode's action ran (or was announced, for drawing).
    Completed(Mode),
    /// A required sub-model is absent.
    MissingModel(Requirement),
    /// `DATASET_PATH` is unset, empty or does not exist.
    MissingDataset(Option<String>),
    /// `MODE` has no action.
    InvalidMode(i64),
}

impl Outcome {
    /// True when an action ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// Checks the mode's sub-models and the dataset path.
///
/// Returns the failing outcome, or `None` when dispatch may proceed.
pub fn validate(config: &Config, pipeline: &dyn Pipeline) -> Option<Outcome> {
    if let Some(req) = Requirement::for_mode(config.mode) {
        if !req.is_met(pipeline.has_g(), pipeline.has_r()) {
            return Some(Outcome::MissingModel(req));
        }
    }

    match config.dataset_path() {
        Some(path) if Path::new(path).exists() => None,
        _ => Some(Outcome::MissingDataset(config.dataset_path.clone())),
    }
}

/// Validates and dispatches, printing progress to stdout.
pub fn run<P: Pipeline>(config: &Config, pipeline: &mut P) -> Result<Outcome> {
    let stdout = std::io::stdout();
    run_with(config, pipeline, &mut stdout.lock())
}

/// Validates and dispatches, printing progress to `out`.
pub fn run_with<P: Pipeline, W: Write>(
    config: &Config,
    pipeline: &mut P,
    out: &mut W,
) -> Result<Outcome> {
    if let Some(outcome) = validate(config, pipeline) {
        match &outcome {
            Outcome::MissingModel(req) => {
                warn!(mode = config.mode, ?req, "required sub-model missing");
                writeln!(out, "⚠️ ERROR: {}", req.message())?;
            }
            Outcome::MissingDataset(path) => {
                warn!(mode = config.mode, ?path, "dataset path missing");
                writeln!(
                    out,
                    "⚠️ ERROR: Dataset path does not exist! Path: {}",
                    path.as_deref().unwrap_or("None")
                )?;
            }
            _ => {}
        }
        return Ok(outcome);
    }

    let outcome = match Mode::from_code(config.mode) {
        Some(mode) => {
            writeln!(out, "\n{}\n", mode.banner())?;
            out.flush()?;
            match mode {
                Mode::TestG => {
                    let _scope = InferenceMode::enter();
                    pipeline.test_g()?;
                }
                Mode::TestR => {
                    let _scope = InferenceMode::enter();
                    pipeline.test_r()?;
                }
                Mode::TestGR => {
                    let _scope = InferenceMode::enter();
                    pipeline.test_g_r()?;
                }
                Mode::Draw => {}
            }
            info!(mode = mode.code(), "mode finished");
            Outcome::Completed(mode)
        }
        None => {
            warn!(mode = config.mode, "invalid mode");
            writeln!(out, "⚠️ ERROR: Invalid MODE selected: {}", config.mode)?;
            Outcome::InvalidMode(config.mode)
        }
    };

    writeln!(out, "\n✅ Process Completed Successfully.")?;
    Ok(outcome)
}
