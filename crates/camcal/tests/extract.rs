use camcal::aruco::Dictionary;
use camcal::core::{DictionaryId, ImageSize, TargetConfig};
use camcal::solver::synthetic::{look_at_pose, target_centre};
use camcal::solver::{project, Intrinsics, Pose};
use camcal::synthetic::render_view;
use camcal::{EngineConfig, TargetExtractor};
use nalgebra::Point2;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn camera() -> (Intrinsics, ImageSize) {
    (
        Intrinsics::new(800.0, 800.0, 319.5, 239.5),
        ImageSize::new(640, 480),
    )
}

fn truth(target: &TargetConfig, k: &Intrinsics, pose: &Pose) -> Vec<Point2<f64>> {
    (0..target.point_count() as u32)
        .map(|id| {
            let p = target.reference_point(id).expect("reference point");
            project(k, &[], pose, &p).expect("in front of the camera")
        })
        .collect()
}

#[test]
fn rendered_chessboard_corners_are_recovered_within_half_a_pixel() {
    init_logger();
    let target = TargetConfig::chessboard(9, 6, 25.0).expect("target");
    let (k, size) = camera();
    let pose = look_at_pose(target_centre(&target), 0.2, -0.15, 560.0);
    let img = render_view(&target, None, &k, &pose, size).expect("render");

    let extractor =
        TargetExtractor::new(&target, &EngineConfig::default(), None).expect("extractor");
    let view = extractor
        .extract("rendered", &img.view())
        .expect("chessboard found");
    assert_eq!(view.len(), 54);
    assert_eq!(view.image_size, size);

    // The grid may be reported turned by a half or quarter turn, so match
    // every detection to its nearest true corner.
    let expected = truth(&target, &k, &pose);
    let mut used = vec![false; expected.len()];
    for c in &view.correspondences {
        let (best, dist) = expected
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - c.image).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .expect("non-empty");
        assert!(dist < 0.5, "corner {} is {dist:.3}px from truth", c.id);
        assert!(!used[best], "two detections matched corner {best}");
        used[best] = true;
    }
}

#[test]
fn rendered_charuco_board_yields_identified_corners() {
    init_logger();
    let id = DictionaryId::Generated {
        marker_size: 4,
        markers: 20,
        min_distance: 3,
    };
    let target = TargetConfig::charuco(5, 4, 30.0, None, id).expect("target");
    let dict = Dictionary::generate(4, 20, 3).expect("dictionary");
    let (k, size) = camera();
    let pose = look_at_pose(target_centre(&target), 0.15, -0.1, 450.0);
    let img = render_view(&target, Some(&dict), &k, &pose, size).expect("render");

    let extractor =
        TargetExtractor::new(&target, &EngineConfig::default(), None).expect("extractor");
    let view = extractor
        .extract("charuco", &img.view())
        .expect("charuco found");
    assert!(view.len() > 4, "only {} corners", view.len());

    // Identities are absolute on a ChArUco board.
    let expected = truth(&target, &k, &pose);
    for c in &view.correspondences {
        let err = (expected[c.id as usize] - c.image).norm();
        assert!(err < 1.0, "corner {} is {err:.3}px from truth", c.id);
        assert_eq!(Some(c.object), target.reference_point(c.id));
    }
    let ids: Vec<u32> = view.correspondences.iter().map(|c| c.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(ids, sorted);
}

#[test]
fn blank_image_has_no_charuco_board() {
    let id = DictionaryId::Generated {
        marker_size: 4,
        markers: 20,
        min_distance: 3,
    };
    let target = TargetConfig::charuco(5, 4, 30.0, None, id).expect("target");
    let extractor =
        TargetExtractor::new(&target, &EngineConfig::default(), None).expect("extractor");
    let img = camcal::core::GrayImage::filled(320, 240, 200);
    assert!(extractor.extract("blank", &img.view()).is_none());
}
