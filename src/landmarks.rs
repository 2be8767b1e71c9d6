// src/landmarks.rs
use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

/// Number of landmarks in a full MediaPipe pose frame.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// MediaPipe pose landmark indices used by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseLandmark {
    LeftEar = 7,
    RightEar = 8,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftHip = 23,
    RightHip = 24,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
        }
    }
}

/// One detected keypoint. `z` is accepted from the detector but never used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, z: 0.0, visibility }
    }

    pub fn point(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Strictly above `threshold`; a landmark exactly at the threshold is not visible.
    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility > threshold
    }
}

/// One frame of pose landmarks in detector order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// A frame is only usable when the detector reported the full skeleton.
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= POSE_LANDMARK_COUNT
    }

    pub fn get(&self, landmark: PoseLandmark) -> Option<&Landmark> {
        self.landmarks.get(landmark.index())
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

impl From<Vec<Landmark>> for LandmarkFrame {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Self::new(landmarks)
    }
}
