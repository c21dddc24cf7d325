//! End-to-end tracking scenarios
//!
//! Each test feeds a small hand-built detection sequence through the full
//! engine, drains it, and checks the verified tracks and false alarms.

use corner_mht::{
    ConstVelModel, ConstVelParams, Detection, DetectionBatch, ElementCode, MhtTracker,
    ScanOutcome, Texture, TextureMetric,
};

const FALARM_LL: f64 = -4.605_170_185_988_091; // ln(0.01)

fn model() -> ConstVelModel {
    ConstVelModel::new(ConstVelParams {
        position_variance_x: 1.0,
        position_variance_y: 1.0,
        intensity_variance: 100.0,
        process_variance: 0.01,
        start_prob: 0.2,
        lambda: 15.0,
        detect_prob: 0.9,
        state_variance: 5.0,
        intensity_threshold: 0.5,
        max_distance: 5.99,
        texture_metric: TextureMetric::Correlation,
    })
}

fn tracker() -> MhtTracker<ConstVelModel> {
    MhtTracker::new(3, 0.001, 64, vec![model()], FALARM_LL, 100)
}

fn detection(x: f64, y: f64, frame: i32, corner_id: u64) -> Detection {
    Detection {
        x,
        y,
        texture: Texture::default(),
        frame,
        corner_id,
    }
}

fn run(tracker: &mut MhtTracker<ConstVelModel>, frames: Vec<Vec<Detection>>) {
    for detections in frames {
        tracker.add_reports(DetectionBatch::new(1.0, detections));
    }
    while tracker.scan() == ScanOutcome::Progressed {}
    tracker.clear();
}

#[test]
fn test_single_isolated_point() {
    let mut t = tracker();
    run(&mut t, vec![vec![detection(10.0, 20.0, 0, 1)]]);

    assert_eq!(t.tracks().len(), 1);
    assert!(t.false_alarms().is_empty());

    let track = &t.tracks()[0];
    assert_eq!(track.elements.len(), 1);
    let el = &track.elements[0];
    assert_eq!(el.code, ElementCode::Measured);
    assert_eq!(el.rx, 10.0);
    assert_eq!(el.ry, 20.0);
    assert_eq!(el.sx, 10.0);
    assert_eq!(el.sy, 20.0);
    assert_eq!(el.corner_id, 1);
}

#[test]
fn test_straight_line_three_scans() {
    let mut t = tracker();
    run(
        &mut t,
        vec![
            vec![detection(0.0, 0.0, 0, 1)],
            vec![detection(1.0, 0.0, 1, 2)],
            vec![detection(2.0, 0.0, 2, 3)],
        ],
    );

    assert_eq!(t.tracks().len(), 1);
    assert!(t.false_alarms().is_empty());

    let track = &t.tracks()[0];
    assert_eq!(track.elements.len(), 3);
    for (el, expected_rx) in track.elements.iter().zip([0.0, 1.0, 2.0]) {
        assert_eq!(el.code, ElementCode::Measured);
        assert_eq!(el.rx, expected_rx);
        assert_eq!(el.ry, 0.0);
    }
    // The filter has locked on to the motion by the third measurement
    let last = &track.elements[2];
    assert!(last.sx > 1.0 && last.sx <= 2.2, "sx = {}", last.sx);
    assert!(last.sy.abs() < 0.5, "sy = {}", last.sy);
}

#[test]
fn test_out_of_gate_blip_becomes_false_alarm() {
    let mut t = tracker();
    run(
        &mut t,
        vec![
            vec![detection(0.0, 0.0, 0, 1)],
            vec![detection(1.0, 0.0, 1, 2)],
            vec![detection(100.0, 100.0, 2, 3)],
        ],
    );

    assert_eq!(t.false_alarms().len(), 1);
    let falarm = &t.false_alarms()[0];
    assert_eq!(falarm.x, 100.0);
    assert_eq!(falarm.y, 100.0);
    assert_eq!(falarm.corner_id, 3);

    assert_eq!(t.tracks().len(), 1);
    let track = &t.tracks()[0];
    assert!(
        track.elements.len() == 2 || track.elements.len() == 3,
        "track length {}",
        track.elements.len()
    );
    assert_eq!(track.elements[0].code, ElementCode::Measured);
    assert_eq!(track.elements[0].rx, 0.0);
    assert_eq!(track.elements[1].code, ElementCode::Measured);
    assert_eq!(track.elements[1].rx, 1.0);
    if track.elements.len() == 3 {
        assert_eq!(track.elements[2].code, ElementCode::Skipped);
    }
}

#[test]
fn test_missed_detection_recovery() {
    let mut t = tracker();
    run(
        &mut t,
        vec![
            vec![detection(0.0, 0.0, 0, 1)],
            vec![],
            vec![detection(2.0, 0.0, 2, 2)],
        ],
    );

    assert_eq!(t.tracks().len(), 1);
    assert!(t.false_alarms().is_empty());

    let track = &t.tracks()[0];
    let codes: Vec<ElementCode> = track.elements.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec![
            ElementCode::Measured,
            ElementCode::Skipped,
            ElementCode::Measured
        ]
    );
    let skip = &track.elements[1];
    assert!(skip.rx.is_nan());
    assert_eq!(skip.frame, -9);
    assert_eq!(skip.corner_id, 0);
    // The update from the recovered measurement pulls the estimate along
    // the motion
    let last = &track.elements[2];
    assert_eq!(last.rx, 2.0);
    assert!(last.sx > 1.0 && last.sx < 2.2, "sx = {}", last.sx);
}

#[test]
fn test_two_crossing_tracks() {
    let mut ramp = [0.0; 25];
    for (i, v) in ramp.iter_mut().enumerate() {
        *v = i as f64;
    }
    let mut reversed = [0.0; 25];
    for (i, v) in reversed.iter_mut().enumerate() {
        *v = (24 - i) as f64;
    }
    let tex_a = Texture::new(ramp);
    let tex_b = Texture::new(reversed);

    let mut frames = Vec::new();
    let path_a = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
    let path_b = [(0.0, 3.0), (1.0, 2.0), (2.0, 1.0), (3.0, 0.0)];
    for (i, (&(ax, ay), &(bx, by))) in path_a.iter().zip(path_b.iter()).enumerate() {
        frames.push(vec![
            Detection {
                x: ax,
                y: ay,
                texture: tex_a.clone(),
                frame: i as i32,
                corner_id: 2 * i as u64,
            },
            Detection {
                x: bx,
                y: by,
                texture: tex_b.clone(),
                frame: i as i32,
                corner_id: 2 * i as u64 + 1,
            },
        ]);
    }

    let mut t = tracker();
    run(&mut t, frames);

    assert_eq!(t.tracks().len(), 2);
    assert!(t.false_alarms().is_empty());

    for track in t.tracks() {
        assert_eq!(track.elements.len(), 4);
        assert!(track.elements.iter().all(|e| e.code == ElementCode::Measured));
        let rx: Vec<f64> = track.elements.iter().map(|e| e.rx).collect();
        assert_eq!(rx, vec![0.0, 1.0, 2.0, 3.0]);
    }

    // Texture matching keeps each track on its own line through the
    // crossing: the descending starter ends at y = 0
    let down = t
        .tracks()
        .iter()
        .find(|track| track.elements[0].ry == 3.0)
        .expect("one track starts at (0, 3)");
    assert_eq!(down.elements[3].ry, 0.0);
    let up = t
        .tracks()
        .iter()
        .find(|track| track.elements[0].ry == 0.0)
        .expect("one track starts at (0, 0)");
    assert_eq!(up.elements[3].ry, 3.0);
}

#[test]
fn test_lone_late_detection_cannot_start_a_track() {
    let mut t = tracker();
    run(
        &mut t,
        vec![
            vec![detection(0.0, 0.0, 0, 1)],
            vec![],
            vec![detection(50.0, 50.0, 2, 2)],
        ],
    );

    // Track initiation is first-scan only, so the lone late detection must
    // come out as a false alarm
    assert!(t
        .false_alarms()
        .iter()
        .any(|f| f.x == 50.0 && f.y == 50.0 && f.corner_id == 2));
    assert!(t
        .tracks()
        .iter()
        .all(|track| track.elements[0].rx != 50.0));
}

#[test]
fn test_idle_scan_changes_nothing() {
    let mut t = tracker();
    assert_eq!(t.scan(), ScanOutcome::Idle);

    t.add_reports(DetectionBatch::new(1.0, vec![detection(1.0, 1.0, 0, 1)]));
    assert_eq!(t.scan(), ScanOutcome::Progressed);
    assert_eq!(t.current_time(), 1);

    // Queue exhausted again
    assert_eq!(t.scan(), ScanOutcome::Idle);
    assert_eq!(t.current_time(), 1);
}

#[test]
fn test_empty_batch_progresses() {
    let mut t = tracker();
    t.add_reports(DetectionBatch::new(1.0, vec![]));
    assert_eq!(t.scan(), ScanOutcome::Progressed);
    assert_eq!(t.current_time(), 1);
    assert!(!t.is_in_use());
}

#[test]
fn test_deep_sequence_verifies_incrementally() {
    // A long unambiguous track: with max depth 3 the early elements are
    // verified while scans are still coming in
    let mut t = tracker();
    for i in 0..8 {
        t.add_reports(DetectionBatch::new(
            1.0,
            vec![detection(i as f64, 0.0, i, i as u64 + 1)],
        ));
    }
    while t.scan() == ScanOutcome::Progressed {}

    assert_eq!(t.tracks().len(), 1);
    let verified_before_clear = t.tracks()[0].elements.len();
    assert!(
        verified_before_clear >= 4,
        "only {} elements verified before clear",
        verified_before_clear
    );

    t.clear();
    assert_eq!(t.tracks()[0].elements.len(), 8);
    assert!(t.false_alarms().is_empty());
    assert!(!t.is_in_use());
}

#[test]
fn test_stats_reflect_engine_state() {
    let mut t = tracker();
    t.add_reports(DetectionBatch::new(1.0, vec![detection(0.0, 0.0, 0, 1)]));
    t.scan();

    let stats = t.stats();
    assert_eq!(stats.trees, 1);
    assert_eq!(stats.groups, 1);
    assert!(stats.group_hypos >= 1);
    assert!(stats.active_leaves >= 1);
}
