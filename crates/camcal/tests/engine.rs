use camcal::aruco::Dictionary;
use camcal::core::{DictionaryId, GrayImage, ImageSize, TargetConfig, TargetConfigRecord};
use camcal::loader::save_png;
use camcal::solver::synthetic::{look_at_pose, target_centre, tilt_schedule};
use camcal::solver::{Intrinsics, Pose};
use camcal::synthetic::render_view;
use camcal::{
    CalibrationEngine, CalibrationRequest, EngineConfig, ImageLoadError, ImageLoader,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const FX: f64 = 800.0;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn chessboard() -> TargetConfig {
    TargetConfig::chessboard(9, 6, 25.0).expect("target")
}

fn intrinsics(size: ImageSize) -> Intrinsics {
    let c = Intrinsics::image_centre(size);
    Intrinsics::new(FX, FX, c.x, c.y)
}

fn poses(target: &TargetConfig, n: usize) -> Vec<Pose> {
    tilt_schedule(n, 25f64.to_radians())
        .into_iter()
        .enumerate()
        .map(|(i, (ax, ay))| look_at_pose(target_centre(target), ax, ay, 560.0 + 10.0 * i as f64))
        .collect()
}

fn render(target: &TargetConfig, pose: &Pose, size: ImageSize) -> GrayImage {
    render_view(target, None, &intrinsics(size), pose, size).expect("render")
}

/// Render `n` views of `target` into `dir` as PNG files.
fn write_views(dir: &Path, target: &TargetConfig, n: usize) -> Vec<PathBuf> {
    let size = ImageSize::new(640, 480);
    poses(target, n)
        .iter()
        .enumerate()
        .map(|(i, pose)| {
            let path = dir.join(format!("view_{i:02}.png"));
            save_png(&render(target, pose, size), &path).expect("write png");
            path
        })
        .collect()
}

/// Serves pre-rendered images by path.
#[derive(Default)]
struct MemoryLoader {
    images: HashMap<PathBuf, GrayImage>,
}

impl ImageLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<GrayImage, ImageLoadError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| ImageLoadError::Empty {
                path: path.display().to_string(),
            })
    }
}

/// A 7x5-square ChArUco board and the dictionary it is printed with.
fn charuco() -> (TargetConfig, Dictionary) {
    let id = DictionaryId::Generated {
        marker_size: 4,
        markers: 20,
        min_distance: 3,
    };
    let target = TargetConfig::charuco(6, 4, 30.0, None, id).expect("target");
    (target, Dictionary::generate(4, 20, 3).expect("dictionary"))
}

/// Render `n` ChArUco views into a memory loader.
fn charuco_views(n: usize) -> (TargetConfig, MemoryLoader, Vec<PathBuf>) {
    let (target, dict) = charuco();
    let size = ImageSize::new(640, 480);
    let k = intrinsics(size);
    let mut loader = MemoryLoader::default();
    let mut paths = Vec::new();
    for (i, (ax, ay)) in tilt_schedule(n, 20f64.to_radians()).into_iter().enumerate() {
        let pose = look_at_pose(target_centre(&target), ax, ay, 450.0 + 10.0 * i as f64);
        let img = render_view(&target, Some(&dict), &k, &pose, size).expect("render");
        let path = PathBuf::from(format!("mem/charuco_{i:02}.png"));
        loader.images.insert(path.clone(), img);
        paths.push(path);
    }
    (target, loader, paths)
}

#[test]
fn calibrates_rendered_chessboard_views() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let target = chessboard();
    let paths = write_views(dir.path(), &target, 12);

    let engine = CalibrationEngine::default();
    let report = engine.calibrate(&CalibrationRequest::new(paths, &target));
    let result = &report.result;
    assert!(result.success, "{:?}", result.error_message);

    let k = result.intrinsics.expect("intrinsics");
    assert!((k.fx - FX).abs() < 0.01 * FX, "fx = {}", k.fx);
    assert!((k.fy - FX).abs() < 0.01 * FX, "fy = {}", k.fy);
    assert_eq!((k.cx, k.cy), (319.5, 239.5));
    let rms = result.rms_reprojection_error.expect("rms");
    assert!(rms.is_finite() && (0.0..0.5).contains(&rms), "rms = {rms}");
    assert_eq!(result.distortion.as_ref().map(Vec::len), Some(5));

    let diag = &report.diagnostics;
    assert_eq!(diag.extraction.attempted, 12);
    assert_eq!(diag.extraction.accepted, 12);
    assert_eq!(diag.per_view_rms.len(), 12);

    let record = report.record();
    assert!(record.success);
    assert!(record.error_message.is_none());
}

#[test]
fn nine_views_are_not_enough_for_a_chessboard() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let target = chessboard();
    let paths = write_views(dir.path(), &target, 9);

    let report = CalibrationEngine::default().calibrate(&CalibrationRequest::new(paths, &target));
    let record = report.record();
    assert!(!record.success);
    let msg = record.error_message.expect("message");
    assert!(msg.contains('9') && msg.contains("10"), "{msg}");
    assert_eq!((record.fx, record.rms_error), (0.0, 0.0));
    assert!(record.distortion_coefficients.is_empty());
}

#[test]
fn min_views_override_accepts_fewer_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = chessboard();
    let paths = write_views(dir.path(), &target, 6);

    let request = CalibrationRequest::new(paths, &target).with_min_views(6);
    let report = CalibrationEngine::default().calibrate(&request);
    assert!(report.result.success, "{:?}", report.result.error_message);
}

#[test]
fn images_without_a_target_give_a_distinct_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths: Vec<PathBuf> = (0..3)
        .map(|i| {
            let path = dir.path().join(format!("blank_{i}.png"));
            save_png(&GrayImage::filled(320, 240, 128), &path).expect("write png");
            path
        })
        .collect();

    let report =
        CalibrationEngine::default().calibrate(&CalibrationRequest::new(paths, &chessboard()));
    let msg = report.result.error_message.expect("message");
    assert!(msg.contains("no calibration target detected"), "{msg}");
    assert_eq!(report.diagnostics.extraction.target_not_found, 3);
}

#[test]
fn view_with_other_dimensions_is_skipped() {
    init_logger();
    let target = chessboard();
    let size = ImageSize::new(640, 480);
    let mut loader = MemoryLoader::default();
    let mut paths = Vec::new();
    for (i, pose) in poses(&target, 11).iter().enumerate() {
        let path = PathBuf::from(format!("mem/view_{i:02}.png"));
        loader.images.insert(path.clone(), render(&target, pose, size));
        paths.push(path);
    }
    // Same board, larger sensor.
    let odd = PathBuf::from("mem/odd.png");
    let odd_size = ImageSize::new(800, 600);
    loader
        .images
        .insert(odd.clone(), render(&target, &poses(&target, 1)[0], odd_size));
    paths.insert(3, odd);

    let config = EngineConfig {
        parallel: false,
        ..EngineConfig::default()
    };
    let engine = CalibrationEngine::new(config).with_loader(loader);
    let report = engine.calibrate(&CalibrationRequest::new(paths, &target));
    assert!(report.result.success, "{:?}", report.result.error_message);

    let diag = &report.diagnostics;
    assert_eq!(diag.extraction.size_inconsistent, 1);
    assert_eq!(diag.extraction.accepted, 11);
    assert_eq!(diag.skipped.len(), 1);
    assert_eq!(diag.skipped[0].0, "mem/odd.png");
}

#[test]
fn undecodable_files_are_counted_and_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = chessboard();
    let mut paths = write_views(dir.path(), &target, 10);
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not a png").expect("write");
    paths.push(broken);
    paths.push(dir.path().join("missing.png"));

    let report = CalibrationEngine::default().calibrate(&CalibrationRequest::new(paths, &target));
    assert!(report.result.success, "{:?}", report.result.error_message);
    assert_eq!(report.diagnostics.extraction.decode_failures, 2);
    assert_eq!(report.diagnostics.extraction.accepted, 10);
}

#[test]
fn unknown_target_kind_fails_before_loading_images() {
    let mut record = TargetConfigRecord::from(&chessboard());
    record.kind = "circles".to_string();
    let request = CalibrationRequest {
        image_paths: vec![PathBuf::from("does/not/exist.png")],
        target_config: record,
        min_views_override: None,
    };
    let report = CalibrationEngine::default().calibrate(&request);
    assert!(!report.result.success);
    let msg = report.result.error_message.expect("message");
    assert!(msg.contains("circles"), "{msg}");
    assert_eq!(report.diagnostics.extraction.attempted, 0);
}

#[test]
fn request_json_uses_camel_case() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("request.json");
    std::fs::write(
        &path,
        r#"{
            "imagePaths": ["a.png", "b.png"],
            "targetConfig": {
                "kind": "chessboard",
                "innerCornersX": 9,
                "innerCornersY": 6,
                "squareSizeMM": 25.0
            },
            "minViewsOverride": 2
        }"#,
    )
    .expect("write");
    let request = CalibrationRequest::load_json(&path).expect("request");
    assert_eq!(request.image_paths.len(), 2);
    assert_eq!(request.min_views_override, Some(2));
    let target = TargetConfig::try_from(request.target_config).expect("target");
    assert_eq!(target, chessboard());
}

#[test]
fn detect_target_reports_presence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = chessboard();
    let paths = write_views(dir.path(), &target, 1);
    let blank = dir.path().join("blank.png");
    save_png(&GrayImage::filled(640, 480, 90), &blank).expect("write png");

    let engine = CalibrationEngine::default();
    let record = TargetConfigRecord::from(&target);
    assert!(engine.detect_target(&record, &paths[0]).expect("detect"));
    assert!(!engine.detect_target(&record, &blank).expect("detect"));
}

#[test]
fn calibrates_rendered_charuco_views() {
    init_logger();
    let (target, loader, paths) = charuco_views(8);
    let engine = CalibrationEngine::default().with_loader(loader);
    let report = engine.calibrate(&CalibrationRequest::new(paths, &target));
    let result = &report.result;
    assert!(result.success, "{:?}", result.error_message);

    let k = result.intrinsics.expect("intrinsics");
    assert!((k.fx - FX).abs() < 0.01 * FX, "fx = {}", k.fx);
    assert!((k.fy - FX).abs() < 0.01 * FX, "fy = {}", k.fy);
    let rms = result.rms_reprojection_error.expect("rms");
    assert!(rms < 1.0, "rms = {rms}");
    assert!(report.diagnostics.extraction.accepted >= 5);
}

#[test]
fn four_charuco_views_are_not_enough() {
    let (target, loader, paths) = charuco_views(4);
    let engine = CalibrationEngine::default().with_loader(loader);
    let report = engine.calibrate(&CalibrationRequest::new(paths, &target));
    let record = report.record();
    assert!(!record.success);
    let msg = record.error_message.expect("message");
    assert!(msg.contains('4') && msg.contains('5'), "{msg}");
}

#[test]
fn repeated_view_is_degenerate() {
    let target = chessboard();
    let size = ImageSize::new(640, 480);
    let pose = look_at_pose(target_centre(&target), 0.3, 0.2, 600.0);
    let img = render(&target, &pose, size);
    let mut loader = MemoryLoader::default();
    let paths: Vec<PathBuf> = (0..10)
        .map(|i| {
            let path = PathBuf::from(format!("mem/same_{i:02}.png"));
            loader.images.insert(path.clone(), img.clone());
            path
        })
        .collect();

    let engine = CalibrationEngine::default().with_loader(loader);
    let report = engine.calibrate(&CalibrationRequest::new(paths, &target));
    assert!(!report.result.success);
    assert_eq!(report.diagnostics.extraction.accepted, 10);
    let msg = report.result.error_message.expect("message");
    assert!(msg.starts_with("calibration failed to converge"), "{msg}");
    assert!(msg.contains("degenerate") || msg.contains("rotation"), "{msg}");
}
