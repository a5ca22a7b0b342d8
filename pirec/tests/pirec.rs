//! End-to-end runs over a temporary run directory.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device as Backend, Tensor};
use giztoy_pirec::model::{G_CHECKPOINT, R_CHECKPOINT};
use giztoy_pirec::{
    Config, Device, DeviceProbe, Outcome, PiRec, PiRecError, RunContext, Stage, StageReport,
    dispatch, inference,
};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

struct CpuOnly;

impl DeviceProbe for CpuOnly {
    fn cuda_available(&self) -> bool {
        false
    }
}

/// Two-layer stack: 3x3 conv to 4 channels, then 1x1 conv back to 3.
fn write_checkpoint(path: &Path) {
    let dev = Backend::Cpu;
    let tensors = HashMap::from([
        (
            "conv0.weight".to_string(),
            Tensor::ones((4, 3, 3, 3), DType::F32, &dev).unwrap().affine(0.01, 0.0).unwrap(),
        ),
        (
            "conv0.bias".to_string(),
            Tensor::zeros(4, DType::F32, &dev).unwrap(),
        ),
        (
            "conv1.weight".to_string(),
            Tensor::ones((3, 4, 1, 1), DType::F32, &dev).unwrap(),
        ),
    ]);
    candle_core::safetensors::save(&tensors, path).unwrap();
}

fn write_samples(dir: &Path, n: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..n {
        RgbImage::from_pixel(6, 4, Rgb([40 * i as u8, 100, 200]))
            .save(dir.join(format!("sample_{i}.png")))
            .unwrap();
    }
}

fn run_dir(mode: i64, with_g: bool, with_r: bool, extra: &str) -> TempDir {
    let run = TempDir::new().unwrap();
    write_samples(&run.path().join("data"), 2);
    if with_g {
        write_checkpoint(&run.path().join(G_CHECKPOINT));
    }
    if with_r {
        write_checkpoint(&run.path().join(R_CHECKPOINT));
    }
    let yaml = format!(
        "MODE: {mode}\nDATASET_PATH: {}\n{extra}",
        run.path().join("data").display()
    );
    std::fs::write(run.path().join("config.yaml"), yaml).unwrap();
    run
}

fn load(run: &TempDir) -> (RunContext, PiRec) {
    let cfg = Config::load_dir(run.path()).unwrap();
    let ctx = RunContext::new(cfg, &CpuOnly);
    let mut model = PiRec::new(&ctx).unwrap();
    model.load().unwrap();
    (ctx, model)
}

#[test]
fn load_discovers_present_checkpoints() {
    let run = run_dir(2, true, false, "");
    let (ctx, model) = load(&run);
    assert_eq!(ctx.device, Device::Cpu);
    assert!(model.g_model.is_some());
    assert!(model.r_model.is_none());
    assert_eq!(model.g_model.as_ref().unwrap().depth(), 2);

    let run = run_dir(3, false, true, "");
    let (_, model) = load(&run);
    assert!(model.g_model.is_none());
    assert!(model.r_model.is_some());

    let run = run_dir(4, false, false, "");
    let (_, model) = load(&run);
    assert!(model.g_model.is_none() && model.r_model.is_none());
}

#[test]
fn corrupt_checkpoint_is_an_error() {
    let run = run_dir(2, false, false, "");
    std::fs::write(run.path().join(G_CHECKPOINT), b"not a checkpoint").unwrap();

    let cfg = Config::load_dir(run.path()).unwrap();
    let ctx = RunContext::new(cfg, &CpuOnly);
    let mut model = PiRec::new(&ctx).unwrap();
    assert!(model.load().is_err());
}

#[test]
fn generation_writes_images_and_report() {
    let run = run_dir(2, true, false, "");
    let (ctx, mut model) = load(&run);

    let outcome = dispatch::run(&ctx.config, &mut model).unwrap();
    assert_eq!(outcome, Outcome::Completed(dispatch::Mode::TestG));

    let out = run.path().join("results/G");
    for i in 0..2 {
        let img = image::open(out.join(format!("sample_{i}.png"))).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));
    }
    let report: StageReport =
        serde_yaml::from_str(&std::fs::read_to_string(out.join("report.yaml")).unwrap()).unwrap();
    assert_eq!(report.stage, Stage::G);
    assert_eq!(report.samples, 2);
    assert_eq!(report.device, Device::Cpu);
}

#[test]
fn combined_testing_respects_results_and_input_size() {
    let out_dir = TempDir::new().unwrap();
    let extra = format!("RESULTS: {}\nINPUT_SIZE: 8\n", out_dir.path().display());
    let run = run_dir(4, true, true, &extra);
    let (_, model) = load(&run);

    let report = inference::no_grad(|| model.test_g_r()).unwrap();
    assert_eq!(report.stage, Stage::GR);
    assert_eq!(report.output_dir, out_dir.path().join("G_R"));

    let img = image::open(out_dir.path().join("G_R/sample_1.png")).unwrap();
    assert_eq!((img.width(), img.height()), (8, 8));
}

#[test]
fn refinement_over_flist() {
    let run = run_dir(3, false, true, "");
    let list = run.path().join("val.flist");
    std::fs::write(
        &list,
        format!("{}\n", run.path().join("data/sample_0.png").display()),
    )
    .unwrap();

    let yaml = format!("MODE: 3\nDATASET_PATH: {}\n", list.display());
    std::fs::write(run.path().join("config.yaml"), yaml).unwrap();
    let (_, model) = load(&run);

    let report = inference::no_grad(|| model.test_r()).unwrap();
    assert_eq!(report.samples, 1);
    assert!(run.path().join("results/R/sample_0.png").is_file());
}

#[test]
fn testing_outside_inference_scope_fails() {
    let run = run_dir(2, true, false, "");
    let (_, model) = load(&run);
    let err = model.test_g().unwrap_err();
    assert!(matches!(err, PiRecError::OutsideInference(_)));
}

#[test]
fn empty_dataset_is_an_error() {
    let run = run_dir(2, true, false, "");
    let empty = run.path().join("empty");
    std::fs::create_dir(&empty).unwrap();
    let yaml = format!("MODE: 2\nDATASET_PATH: {}\n", empty.display());
    std::fs::write(run.path().join("config.yaml"), yaml).unwrap();
    let (_, model) = load(&run);

    let err = inference::no_grad(|| model.test_g()).unwrap_err();
    assert!(matches!(err, PiRecError::Dataset(_)));
}

#[test]
fn shared_stems_keep_every_output() {
    let run = run_dir(2, true, false, "");
    let data = run.path().join("data");
    RgbImage::from_pixel(6, 4, Rgb([1, 2, 3]))
        .save(data.join("x.png"))
        .unwrap();
    RgbImage::from_pixel(6, 4, Rgb([4, 5, 6]))
        .save(data.join("x.jpg"))
        .unwrap();
    let (_, model) = load(&run);

    let report = inference::no_grad(|| model.test_g()).unwrap();
    assert_eq!(report.samples, 4);

    let mut files: Vec<String> = std::fs::read_dir(run.path().join("results/G"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "report.yaml",
            "sample_0.png",
            "sample_1.png",
            "x.png",
            "x_00003.png"
        ]
    );
}
