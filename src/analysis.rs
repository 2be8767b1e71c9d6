// src/analysis.rs - Adaptive weighted-deduction posture scoring
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geometry::{angle_at, midpoint, tilt_angle, Point2D};
use crate::landmarks::{Landmark, LandmarkFrame, PoseLandmark};
use crate::profiles::{Metric, PostureProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NoDetection,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Status {
    pub fn from_score(score: u8) -> Self {
        match score {
            95..=u8::MAX => Status::Excellent,
            85..=94 => Status::Good,
            70..=84 => Status::Fair,
            _ => Status::Poor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDetection => "NO_DETECTION",
            Self::Poor => "POOR",
            Self::Fair => "FAIR",
            Self::Good => "GOOD",
            Self::Excellent => "EXCELLENT",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionKind {
    NoPerson,
    NoShoulders,
    UnevenShoulders,
    TiltedHead,
    ForwardHead,
    Leaning,
    HipsNotVisible,
    Perfect,
}

/// How a correction is presented: good news, a note, or something to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CorrectionKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::NoPerson => "No person detected",
            Self::NoShoulders => "Shoulders not clearly visible - face the camera",
            Self::UnevenShoulders => "Uneven shoulders - level them",
            Self::TiltedHead => "Head tilted - keep it level",
            Self::ForwardHead => "Head too far forward - move back",
            Self::Leaning => "Leaning - straighten your back",
            Self::HipsNotVisible => "Hips not visible - neck and torso checks skipped",
            Self::Perfect => "Perfect posture!",
        }
    }

    /// The metric whose violation produces this correction.
    pub fn metric(self) -> Option<Metric> {
        match self {
            Self::UnevenShoulders => Some(Metric::ShoulderTilt),
            Self::TiltedHead => Some(Metric::HeadTilt),
            Self::ForwardHead => Some(Metric::NeckAngle),
            Self::Leaning => Some(Metric::TorsoAngle),
            _ => None,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Perfect => Severity::Success,
            Self::HipsNotVisible => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub key: CorrectionKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Correction {
    pub fn new(key: CorrectionKind) -> Self {
        Self {
            key,
            message: key.message().to_string(),
            value: None,
        }
    }

    /// Attaches a measured angle, rendered as whole degrees (`"12°"`).
    pub fn with_degrees(mut self, degrees: f64) -> Self {
        self.value = Some(format!("{}°", degrees.round() as i64));
        self
    }
}

/// Angles measured for one frame. Hip-dependent angles are `None` when the
/// hips were not confidently visible.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureMeasurements {
    pub shoulder_tilt: f64,
    pub head_tilt: f64,
    pub neck_angle: Option<f64>,
    pub torso_angle: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub status: Status,
    pub score: u8,
    pub corrections: Vec<Correction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<PostureMeasurements>,
}

impl AnalysisResult {
    pub fn no_detection() -> Self {
        Self {
            status: Status::NoDetection,
            score: 0,
            corrections: vec![Correction::new(CorrectionKind::NoPerson)],
            measurements: None,
        }
    }

    pub fn no_shoulders() -> Self {
        Self {
            status: Status::Poor,
            score: 0,
            corrections: vec![Correction::new(CorrectionKind::NoShoulders)],
            measurements: None,
        }
    }

    pub fn has(&self, kind: CorrectionKind) -> bool {
        self.corrections.iter().any(|c| c.key == kind)
    }

    pub fn correction_keys(&self) -> Vec<CorrectionKind> {
        self.corrections.iter().map(|c| c.key).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricWeights {
    pub head_tilt: u32,
    pub shoulder_tilt: u32,
    pub neck_angle: u32,
    pub torso_angle: u32,
}

impl MetricWeights {
    pub fn weight(&self, metric: Metric) -> u32 {
        match metric {
            Metric::HeadTilt => self.head_tilt,
            Metric::ShoulderTilt => self.shoulder_tilt,
            Metric::NeckAngle => self.neck_angle,
            Metric::TorsoAngle => self.torso_angle,
        }
    }
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            head_tilt: 30,
            shoulder_tilt: 25,
            neck_angle: 25,
            torso_angle: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub visibility_threshold: f64,
    pub weights: MetricWeights,
    /// Horizontal offset of the reference point used for the torso angle.
    pub torso_reference_offset: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.8,
            weights: MetricWeights::default(),
            torso_reference_offset: 0.1,
        }
    }
}

/// Running tally of evaluated metrics for one frame.
struct Scorecard<'a> {
    weights: &'a MetricWeights,
    possible: u32,
    deductions: u32,
    violations: usize,
    corrections: Vec<Correction>,
}

impl<'a> Scorecard<'a> {
    fn new(weights: &'a MetricWeights) -> Self {
        Self {
            weights,
            possible: 0,
            deductions: 0,
            violations: 0,
            corrections: Vec::with_capacity(4),
        }
    }

    fn evaluate(&mut self, metric: Metric, violated: bool, correction: impl FnOnce() -> Correction) {
        let weight = self.weights.weight(metric);
        self.possible += weight;
        if violated {
            self.deductions += weight;
            self.violations += 1;
            self.corrections.push(correction());
        }
    }

    fn note(&mut self, kind: CorrectionKind) {
        self.corrections.push(Correction::new(kind));
    }

    fn score(&self) -> u8 {
        if self.possible == 0 {
            return 100;
        }
        let penalty = (100.0 * self.deductions as f64 / self.possible as f64).round();
        (100.0 - penalty).clamp(0.0, 100.0) as u8
    }
}

/// Stateless scorer; the active profile is passed in on every call.
#[derive(Debug, Clone, Default)]
pub struct PostureAnalyzer {
    config: AnalyzerConfig,
}

impl PostureAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn analyze(&self, frame: Option<&LandmarkFrame>, profile: &PostureProfile) -> AnalysisResult {
        let Some(frame) = frame.filter(|f| f.is_complete()) else {
            return AnalysisResult::no_detection();
        };
        let Some(pose) = KeyLandmarks::from_frame(frame) else {
            return AnalysisResult::no_detection();
        };

        let visible = |lm: &Landmark| lm.is_visible(self.config.visibility_threshold);
        let hidden = |pair: [PoseLandmark; 2]| {
            pair.into_iter()
                .find(|&lm| !frame.get(lm).is_some_and(|l| visible(l)))
        };

        if let Some(shoulder) = hidden([PoseLandmark::LeftShoulder, PoseLandmark::RightShoulder]) {
            trace!(landmark = shoulder.name(), "Shoulder below visibility threshold");
            return AnalysisResult::no_shoulders();
        }

        let thresholds = &profile.thresholds;
        let left_shoulder = pose.left_shoulder.point();
        let right_shoulder = pose.right_shoulder.point();
        let avg_shoulder = midpoint(&left_shoulder, &right_shoulder);
        let avg_ear = midpoint(&pose.left_ear.point(), &pose.right_ear.point());

        let mut card = Scorecard::new(&self.config.weights);

        let shoulder_tilt = tilt_angle(&left_shoulder, &right_shoulder);
        card.evaluate(
            Metric::ShoulderTilt,
            shoulder_tilt.abs() > thresholds.shoulder_tilt.max,
            || Correction::new(CorrectionKind::UnevenShoulders).with_degrees(shoulder_tilt),
        );

        // Relative to the shoulder line so a rolled torso is not counted twice.
        let head_tilt = tilt_angle(&pose.left_ear.point(), &pose.right_ear.point()) - shoulder_tilt;
        card.evaluate(
            Metric::HeadTilt,
            head_tilt.abs() > thresholds.head_tilt.max,
            || Correction::new(CorrectionKind::TiltedHead).with_degrees(head_tilt),
        );

        let mut measurements = PostureMeasurements {
            shoulder_tilt,
            head_tilt,
            ..Default::default()
        };

        let hidden_hip = hidden([PoseLandmark::LeftHip, PoseLandmark::RightHip]);
        if hidden_hip.is_none() {
            let avg_hip = midpoint(&pose.left_hip.point(), &pose.right_hip.point());

            let neck_angle = angle_at(&avg_ear, &avg_shoulder, &avg_hip);
            card.evaluate(
                Metric::NeckAngle,
                neck_angle < thresholds.neck_angle.min,
                || Correction::new(CorrectionKind::ForwardHead).with_degrees(neck_angle),
            );

            let reference = Point2D::new(avg_hip.x + self.config.torso_reference_offset, avg_hip.y);
            let torso_angle = angle_at(&avg_shoulder, &avg_hip, &reference);
            card.evaluate(
                Metric::TorsoAngle,
                !thresholds.torso_angle.contains(torso_angle),
                || Correction::new(CorrectionKind::Leaning).with_degrees(torso_angle),
            );

            measurements.neck_angle = Some(neck_angle);
            measurements.torso_angle = Some(torso_angle);
        } else {
            trace!(landmark = hidden_hip.map(PoseLandmark::name), "Hip below visibility threshold");
            card.note(CorrectionKind::HipsNotVisible);
        }

        if card.violations == 0 {
            card.note(CorrectionKind::Perfect);
        }

        let score = card.score();
        let status = Status::from_score(score);
        trace!(
            profile = %profile.id,
            score,
            %status,
            shoulder_tilt,
            head_tilt,
            neck_angle = ?measurements.neck_angle,
            torso_angle = ?measurements.torso_angle,
            "Analyzed frame"
        );

        AnalysisResult {
            status,
            score,
            corrections: card.corrections,
            measurements: Some(measurements),
        }
    }
}

/// The seven landmarks the scorer reads, copied out of a complete frame.
struct KeyLandmarks {
    left_ear: Landmark,
    right_ear: Landmark,
    left_shoulder: Landmark,
    right_shoulder: Landmark,
    left_hip: Landmark,
    right_hip: Landmark,
}

impl KeyLandmarks {
    fn from_frame(frame: &LandmarkFrame) -> Option<Self> {
        Some(Self {
            left_ear: *frame.get(PoseLandmark::LeftEar)?,
            right_ear: *frame.get(PoseLandmark::RightEar)?,
            left_shoulder: *frame.get(PoseLandmark::LeftShoulder)?,
            right_shoulder: *frame.get(PoseLandmark::RightShoulder)?,
            left_hip: *frame.get(PoseLandmark::LeftHip)?,
            right_hip: *frame.get(PoseLandmark::RightHip)?,
        })
    }
}
