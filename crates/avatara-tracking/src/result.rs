//! Detection results
//!
//! Created once per detection cycle by the worker, consumed once by the
//! retargeting layer, then dropped.

use avatara_core::{Mat4, Vec3};

/// One named blend-shape score
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShapeScore {
    pub category_name: String,
    /// Model confidence [0.0 - 1.0]
    pub score: f32,
}

impl BlendShapeScore {
    pub fn new(category_name: impl Into<String>, score: f32) -> Self {
        Self {
            category_name: category_name.into(),
            score,
        }
    }
}

/// Face landmarker output for the first detected face
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceResult {
    pub blend_shapes: Vec<BlendShapeScore>,
    /// Facial transformation matrix (column-major)
    pub facial_transform: Option<Mat4>,
}

impl FaceResult {
    /// No face in frame
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blend_shapes.is_empty() && self.facial_transform.is_none()
    }

    pub fn score(&self, name: &str) -> Option<f32> {
        self.blend_shapes
            .iter()
            .find(|b| b.category_name == name)
            .map(|b| b.score)
    }
}

/// Pose world landmark (meters, hip-centred)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoseLandmark {
    pub position: Vec3,
    /// Likelihood of the landmark being visible [0.0 - 1.0]
    pub visibility: f32,
}

impl PoseLandmark {
    pub fn new(position: Vec3, visibility: f32) -> Self {
        Self {
            position,
            visibility,
        }
    }
}

/// Landmark indices of the 33-point body topology
pub mod pose_index {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const COUNT: usize = 33;
}

/// Pose landmarker output for the first detected body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseResult {
    pub world_landmarks: Vec<PoseLandmark>,
}

impl PoseResult {
    pub fn landmark(&self, index: usize) -> Option<&PoseLandmark> {
        self.world_landmarks.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.world_landmarks.is_empty()
    }
}

/// Detector-specific landmark result
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Face(FaceResult),
    Pose(PoseResult),
}

impl DetectionResult {
    pub fn as_face(&self) -> Option<&FaceResult> {
        match self {
            DetectionResult::Face(face) => Some(face),
            DetectionResult::Pose(_) => None,
        }
    }

    pub fn as_pose(&self) -> Option<&PoseResult> {
        match self {
            DetectionResult::Pose(pose) => Some(pose),
            DetectionResult::Face(_) => None,
        }
    }
}
