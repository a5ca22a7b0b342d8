//! PiRec CLI - runs a PiRec test or drawing mode from a run directory.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use giztoy_pirec::{
    Config, DEFAULT_CONFIG_FILE, DeviceProbe, Outcome, PiRec, RunContext, SystemProbe, dispatch,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// PiRec CLI - runs a PiRec test or drawing mode.
///
/// The run directory holds `config.yaml` and, optionally, the generation
/// (`g_model.safetensors`) and refinement (`r_model.safetensors`) checkpoints.
/// `MODE` in the config selects the action:
///   - 2: test generation (G)
///   - 3: test refinement (R)
///   - 4: test generation + refinement
///   - 5: drawing mode
#[derive(Parser, Debug)]
#[command(name = "pirec")]
#[command(about = "PiRec image completion runner")]
#[command(version)]
struct Args {
    /// Path to checkpoints/configuration
    #[arg(short, long)]
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let config = Config::load_dir(&args.path).with_context(|| {
        format!("failed to load {}", args.path.join(DEFAULT_CONFIG_FILE).display())
    })?;
    init_logging(config.verbose != 0);

    let stdout = std::io::stdout();
    let outcome = run(config, &SystemProbe, &mut stdout.lock())?;
    debug!(?outcome, "run finished");
    Ok(())
}

/// Prints the config banner and selected device, loads the model, and
/// dispatches on `MODE`. All user-facing lines go to `out`.
fn run<W: Write>(config: Config, probe: &dyn DeviceProbe, out: &mut W) -> anyhow::Result<Outcome> {
    writeln!(out, "{}", config.banner())?;

    // Select device
    let ctx = RunContext::new(config, probe);
    writeln!(out, "🚀 DEVICE Selected: {}", ctx.device)?;

    // Model initialization
    let mut model = PiRec::new(&ctx)?;
    model.load()?;

    Ok(dispatch::run_with(&ctx.config, &mut model, out)?)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use giztoy_pirec::Requirement;
    use tempfile::TempDir;

    struct CpuOnly;

    impl DeviceProbe for CpuOnly {
        fn cuda_available(&self) -> bool {
            false
        }
    }

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle)
            .unwrap_or_else(|| panic!("{needle:?} missing from:\n{text}"))
    }

    #[test]
    fn test_output_order() {
        let run_dir = TempDir::new().unwrap();
        let data = run_dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(
            run_dir.path().join(DEFAULT_CONFIG_FILE),
            format!("MODE: 2\nDATASET_PATH: {}\n", data.display()),
        )
        .unwrap();
        let config = Config::load_dir(run_dir.path()).unwrap();

        let mut out = Vec::new();
        let outcome = run(config, &CpuOnly, &mut out).unwrap();
        assert_eq!(outcome, Outcome::MissingModel(Requirement::G));

        let text = String::from_utf8(out).unwrap();
        let banner = position(&text, "Model configurations:");
        let device = position(&text, "🚀 DEVICE Selected: cpu");
        let error = position(&text, "⚠️ ERROR: g_model not loaded!");
        assert!(banner < device && device < error, "{text}");
        assert!(!text.contains("Process Completed"));
    }
}
