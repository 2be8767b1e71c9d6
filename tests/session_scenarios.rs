// tests/session_scenarios.rs
use std::time::Duration;

use posture_monitor::landmarks::POSE_LANDMARK_COUNT;
use posture_monitor::session::ManualClock;
use posture_monitor::{
    CorrectionKind, Landmark, LandmarkFrame, PoseLandmark, PostureAnalyzer, ProfileRegistry,
    SessionAggregator, Status,
};

fn symmetric_frame(shoulder_drop: f64, hip_visibility: f64) -> LandmarkFrame {
    let mut landmarks = vec![Landmark::new(0.5, 0.5, 1.0); POSE_LANDMARK_COUNT];
    let points = [
        (PoseLandmark::LeftEar, 0.56, 0.22, 1.0),
        (PoseLandmark::RightEar, 0.44, 0.22, 1.0),
        (PoseLandmark::LeftShoulder, 0.68, 0.42 + shoulder_drop, 1.0),
        (PoseLandmark::RightShoulder, 0.32, 0.42, 1.0),
        (PoseLandmark::LeftHip, 0.62, 0.85, hip_visibility),
        (PoseLandmark::RightHip, 0.38, 0.85, hip_visibility),
    ];
    for (lm, x, y, visibility) in points {
        landmarks[lm.index()] = Landmark::new(x, y, visibility);
    }
    LandmarkFrame::new(landmarks)
}

#[test]
fn symmetric_pose_scores_excellent_on_every_profile() {
    let analyzer = PostureAnalyzer::default();
    for profile in ProfileRegistry::builtin().iter() {
        let result = analyzer.analyze(Some(&symmetric_frame(0.0, 1.0)), profile);
        assert_eq!(result.score, 100, "profile {}", profile.id);
        assert_eq!(result.status, Status::Excellent);
        assert_eq!(result.correction_keys(), vec![CorrectionKind::Perfect]);
    }
}

#[test]
fn twenty_degree_shoulder_tilt_is_reported_for_sitting() {
    let sitting = ProfileRegistry::builtin().require("sitting").unwrap();
    // 0.36 wide shoulders, dropped by 0.36 * tan(20°).
    let drop = 0.36 * 20f64.to_radians().tan();
    let result = PostureAnalyzer::default().analyze(Some(&symmetric_frame(drop, 1.0)), sitting);

    let uneven = result
        .corrections
        .iter()
        .find(|c| c.key == CorrectionKind::UnevenShoulders)
        .unwrap();
    assert_eq!(uneven.value.as_deref(), Some("-20°"));
    assert_ne!(result.status, Status::Excellent);
}

#[test]
fn hidden_hips_only_score_upper_body() {
    let sitting = ProfileRegistry::builtin().require("sitting").unwrap();
    let result = PostureAnalyzer::default().analyze(Some(&symmetric_frame(0.0, 0.5)), sitting);

    assert_eq!(result.score, 100);
    assert_eq!(
        result.correction_keys(),
        vec![CorrectionKind::HipsNotVisible, CorrectionKind::Perfect]
    );
}

#[test]
fn four_second_session_is_not_reported() {
    let clock = ManualClock::new();
    let mut session = SessionAggregator::new("sitting", clock.clone());
    session.start();
    for _ in 0..4 {
        session.record(&posture_monitor::AnalysisResult::no_detection(), false);
        clock.advance(Duration::from_secs(1));
        session.tick();
    }
    assert!(session.stop().is_none());
}

#[test]
fn ten_second_session_reports_rounded_mean() {
    let clock = ManualClock::new();
    let analyzer = PostureAnalyzer::default();
    let sitting = ProfileRegistry::builtin().require("sitting").unwrap();
    let mut session = SessionAggregator::new("sitting", clock.clone());
    session.start();

    let mut scores = Vec::new();
    for second in 0..10 {
        let frame = if second % 3 == 0 {
            symmetric_frame(0.2, 1.0)
        } else {
            symmetric_frame(0.0, 1.0)
        };
        let result = analyzer.analyze(Some(&frame), sitting);
        scores.push(result.score as f64);
        session.record(&result, false);
        clock.advance(Duration::from_secs(1));
        session.tick();
    }

    let record = session.stop().expect("ten seconds is reportable");
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    assert_eq!(record.stats.duration_seconds, 10);
    assert_eq!(record.stats.average_score, mean.round() as u8);
    assert_eq!(record.posture_type, "sitting");
}
