//! Retargeting - landmark results to avatar-space targets
//!
//! Blend-shape scores become morph influences, the facial transform becomes
//! a head rotation, and a fraction of that rotation becomes upper-spine
//! motion. Nothing here is persisted; a new `RetargetedPose` is produced
//! every detection cycle.

use std::collections::BTreeMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use avatara_core::{Mat4, Quat};
use avatara_tracking::{pose_index, FaceResult, PoseResult};

/// Retargeting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetargetConfig {
    /// Camera feed is mirrored
    pub mirrored: bool,
    /// Subtracted from decomposed head pitch (camera looks up at the face)
    pub pitch_offset: f32,
    /// Slerp factor applied per update
    pub damping: f32,
    pub spine_yaw_factor: f32,
    pub spine_roll_factor: f32,
    /// Raw eye-blink score treated as fully closed
    pub blink_saturation: f32,
    /// Raw scores at or below this are zeroed
    pub influence_gate: f32,
    /// Minimum shoulder visibility for torso retargeting
    pub visibility_gate: f32,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        RetargetConfig {
            mirrored: false,
            pitch_offset: 0.15 * PI,
            damping: 0.3,
            spine_yaw_factor: 0.8,
            spine_roll_factor: 0.85,
            blink_saturation: 0.75,
            influence_gate: 0.1,
            visibility_gate: 0.5,
        }
    }
}

/// Avatar-space targets for one detection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetargetedPose {
    /// Corrected head rotation (unit quaternion)
    pub head_rotation: Option<Quat>,
    /// Fraction of the head rotation carried by the upper spine
    pub spine_rotation: Option<Quat>,
    /// Morph target name → influence [0.0 - 1.0]
    pub morph_weights: BTreeMap<String, f32>,
}

impl RetargetedPose {
    pub fn is_empty(&self) -> bool {
        self.head_rotation.is_none() && self.spine_rotation.is_none() && self.morph_weights.is_empty()
    }
}

/// Eye-blink family morph targets get a steeper response curve
pub fn is_blink_target(name: &str) -> bool {
    name.starts_with("eyeBlink")
}

/// Landmark → avatar retargeter
#[derive(Debug, Clone, Default)]
pub struct Retargeter {
    config: RetargetConfig,
}

impl Retargeter {
    pub fn new(config: RetargetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetargetConfig {
        &self.config
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.config.mirrored = mirrored;
    }

    /// Map a raw blend-shape score to a morph influence
    pub fn morph_influence(&self, name: &str, score: f32) -> f32 {
        if !(score > self.config.influence_gate) {
            return 0.0;
        }
        let value = if is_blink_target(name) {
            score / self.config.blink_saturation
        } else {
            score
        };
        value.clamp(0.0, 1.0)
    }

    /// Decompose, mirror and pitch-correct a facial transform
    pub fn head_rotation(&self, transform: &Mat4) -> Quat {
        let mut rotation = transform.rotation();
        if self.config.mirrored {
            rotation = rotation.mirrored();
        }

        let mut angles = rotation.to_euler();
        angles.pitch -= self.config.pitch_offset;
        Quat::from_euler(angles)
    }

    /// Secondary spine motion: scaled yaw and roll, no pitch
    pub fn spine_rotation(&self, head: &Quat) -> Quat {
        let angles = head.to_euler();
        Quat::from_yaw_pitch_roll(
            angles.yaw * self.config.spine_yaw_factor,
            0.0,
            angles.roll * self.config.spine_roll_factor,
        )
    }

    pub fn retarget_face(&self, face: &FaceResult) -> RetargetedPose {
        let morph_weights = face
            .blend_shapes
            .iter()
            .filter(|b| !b.category_name.starts_with('_'))
            .map(|b| {
                (
                    b.category_name.clone(),
                    self.morph_influence(&b.category_name, b.score),
                )
            })
            .collect();

        let head_rotation = face.facial_transform.as_ref().map(|m| self.head_rotation(m));
        let spine_rotation = head_rotation.as_ref().map(|q| self.spine_rotation(q));

        RetargetedPose {
            head_rotation,
            spine_rotation,
            morph_weights,
        }
    }

    /// Torso rotation from the shoulder line, scaled like the spine
    pub fn torso_rotation(&self, pose: &PoseResult) -> Option<Quat> {
        let left = pose.landmark(pose_index::LEFT_SHOULDER)?;
        let right = pose.landmark(pose_index::RIGHT_SHOULDER)?;
        if left.visibility < self.config.visibility_gate
            || right.visibility < self.config.visibility_gate
        {
            return None;
        }

        let across = left.position - right.position;
        let horizontal = across.x.hypot(across.z);
        if horizontal < f32::EPSILON {
            return None;
        }

        let mut yaw = (-across.z).atan2(across.x);
        let roll = across.y.atan2(horizontal);
        if self.config.mirrored {
            yaw = -yaw;
        }

        Some(Quat::from_yaw_pitch_roll(
            yaw * self.config.spine_yaw_factor,
            0.0,
            roll * self.config.spine_roll_factor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatara_core::Vec3;
    use avatara_tracking::{BlendShapeScore, PoseLandmark};
    use proptest::prelude::*;

    fn shoulders(left: Vec3, right: Vec3) -> PoseResult {
        let mut landmarks = vec![PoseLandmark::new(Vec3::ZERO, 1.0); pose_index::COUNT];
        landmarks[pose_index::LEFT_SHOULDER] = PoseLandmark::new(left, 0.9);
        landmarks[pose_index::RIGHT_SHOULDER] = PoseLandmark::new(right, 0.9);
        PoseResult {
            world_landmarks: landmarks,
        }
    }

    #[test]
    fn test_blink_remap_scales_against_saturation() {
        let r = Retargeter::default();
        let influence = r.morph_influence("eyeBlinkLeft", 0.5);
        assert!((influence - 0.6667).abs() < 0.001);
        assert_eq!(r.morph_influence("eyeBlinkRight", 0.8), 1.0);
    }

    #[test]
    fn test_gate_zeroes_low_scores() {
        let r = Retargeter::default();
        assert_eq!(r.morph_influence("jawOpen", 0.05), 0.0);
        assert_eq!(r.morph_influence("eyeBlinkLeft", 0.1), 0.0);
        assert_eq!(r.morph_influence("jawOpen", f32::NAN), 0.0);
        assert!((r.morph_influence("jawOpen", 0.4) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_neutral_category_is_skipped() {
        let r = Retargeter::default();
        let face = FaceResult {
            blend_shapes: vec![
                BlendShapeScore::new("_neutral", 0.9),
                BlendShapeScore::new("mouthSmileLeft", 0.6),
            ],
            facial_transform: None,
        };

        let pose = r.retarget_face(&face);
        assert_eq!(pose.morph_weights.len(), 1);
        assert!(pose.head_rotation.is_none());
        assert!(pose.spine_rotation.is_none());
    }

    #[test]
    fn test_pitch_correction_offsets_level_face() {
        let r = Retargeter::default();
        let head = r.head_rotation(&Mat4::identity());
        let angles = head.to_euler();

        assert!((angles.pitch + 0.15 * PI).abs() < 1e-4);
        assert!(angles.yaw.abs() < 1e-4);
    }

    #[test]
    fn test_spine_takes_fraction_of_yaw_and_roll() {
        let r = Retargeter::default();
        let head = Quat::from_yaw_pitch_roll(0.5, 0.3, 0.2);
        let spine = r.spine_rotation(&head).to_euler();

        assert!((spine.yaw - 0.4).abs() < 1e-3);
        assert!((spine.roll - 0.17).abs() < 1e-3);
        assert!(spine.pitch.abs() < 1e-4);
    }

    #[test]
    fn test_mirroring_flips_yaw() {
        let transform = Mat4::from_rotation_translation(
            Quat::from_yaw_pitch_roll(0.4, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -40.0),
        );

        let plain = Retargeter::default().head_rotation(&transform).to_euler();
        let mirrored = Retargeter::new(RetargetConfig {
            mirrored: true,
            ..RetargetConfig::default()
        })
        .head_rotation(&transform)
        .to_euler();

        assert!((plain.yaw - 0.4).abs() < 1e-3);
        assert!((mirrored.yaw + 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_torso_from_square_shoulders_is_identity() {
        let r = Retargeter::default();
        let torso = r
            .torso_rotation(&shoulders(Vec3::new(0.2, 0.0, 0.0), Vec3::new(-0.2, 0.0, 0.0)))
            .unwrap();
        assert!(torso.dot(&Quat::IDENTITY).abs() > 0.9999);
    }

    #[test]
    fn test_torso_turn_scaled_by_spine_factor() {
        let r = Retargeter::default();
        let torso = r
            .torso_rotation(&shoulders(Vec3::new(0.2, 0.0, -0.2), Vec3::new(-0.2, 0.0, 0.2)))
            .unwrap();
        assert!((torso.to_euler().yaw - 0.8 * PI / 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_torso_requires_visible_shoulders() {
        let r = Retargeter::default();
        let mut pose = shoulders(Vec3::new(0.2, 0.0, 0.0), Vec3::new(-0.2, 0.0, 0.0));
        pose.world_landmarks[pose_index::LEFT_SHOULDER].visibility = 0.1;
        assert!(r.torso_rotation(&pose).is_none());
        assert!(r.torso_rotation(&PoseResult::default()).is_none());
    }

    #[test]
    fn test_config_fills_missing_fields() {
        let config: RetargetConfig = serde_json::from_str(r#"{"mirrored": true, "damping": 0.5}"#).unwrap();
        assert!(config.mirrored);
        assert_eq!(config.damping, 0.5);
        assert_eq!(config.blink_saturation, 0.75);

        let unknown = serde_json::from_str::<RetargetConfig>(r#"{"smoothing": 1.0}"#);
        assert!(unknown.is_err());
    }

    proptest! {
        #[test]
        fn prop_blink_influence_monotonic(a in 0.0f32..1.0, b in 0.0f32..1.0) {
            let r = Retargeter::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(r.morph_influence("eyeBlinkLeft", lo) <= r.morph_influence("eyeBlinkLeft", hi));
        }

        #[test]
        fn prop_blink_saturates_by_threshold(score in 0.75f32..1.0) {
            let r = Retargeter::default();
            prop_assert_eq!(r.morph_influence("eyeBlinkRight", score), 1.0);
        }

        #[test]
        fn prop_influence_is_bounded(score in -1.0f32..2.0) {
            let r = Retargeter::default();
            let v = r.morph_influence("browInnerUp", score);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        #[test]
        fn prop_head_rotation_is_unit(yaw in -1.0f32..1.0, pitch in -0.8f32..0.8, roll in -0.8f32..0.8) {
            let transform = Mat4::from_rotation_translation(
                Quat::from_yaw_pitch_roll(yaw, pitch, roll),
                Vec3::ZERO,
            );
            let r = Retargeter::new(RetargetConfig { mirrored: true, ..RetargetConfig::default() });
            prop_assert!((r.head_rotation(&transform).norm() - 1.0).abs() < 1e-4);
        }
    }
}
