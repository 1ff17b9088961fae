//! Avatar controller - skeleton, morphs and animation of one avatar

use std::time::Duration;

use serde::{Deserialize, Serialize};

use avatara_core::{Quat, Vec3};

use crate::{
    AnimationController, AnimationLibrary, Completion, Interaction, MorphTargets, RetargetedPose,
    Skeleton,
};

/// Model rig bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvatarConfig {
    pub head_bone: String,
    pub upper_spine_bone: String,
    /// Clip played when nothing else is
    pub idle_clip: Option<String>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        AvatarConfig {
            head_bone: "Head".to_string(),
            upper_spine_bone: "Spine2".to_string(),
            idle_clip: Some("Idle".to_string()),
        }
    }
}

/// Locomotion flags shared with peers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Locomotion {
    pub crouching: bool,
    pub moving: bool,
    pub grounded: bool,
}

/// A rigged avatar instance, local or remote
#[derive(Debug)]
pub struct Avatar {
    config: AvatarConfig,
    pub skeleton: Skeleton,
    pub morphs: MorphTargets,
    pub animation: AnimationController,
    pub position: Vec3,
    pub rotation: Quat,
    pub locomotion: Locomotion,
    pub look_target: Option<Vec3>,
}

impl Avatar {
    /// Avatar with head and upper-spine bones and the ARKit morph set
    pub fn new(config: AvatarConfig, library: AnimationLibrary) -> Self {
        let skeleton = Skeleton::with_bones([config.head_bone.clone(), config.upper_spine_bone.clone()]);
        Self::with_rig(config, skeleton, MorphTargets::arkit(), library)
    }

    pub fn with_rig(
        config: AvatarConfig,
        skeleton: Skeleton,
        morphs: MorphTargets,
        library: AnimationLibrary,
    ) -> Self {
        let mut animation = AnimationController::new(library);
        if let Some(idle) = &config.idle_clip {
            animation = animation.with_idle(idle.clone());
        }

        Self {
            config,
            skeleton,
            morphs,
            animation,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            locomotion: Locomotion {
                grounded: true,
                ..Locomotion::default()
            },
            look_target: None,
        }
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// Damp head and spine toward the targets, set morph influences
    pub fn apply_retargeted(&mut self, pose: &RetargetedPose, damping: f32) {
        if let Some(head) = &pose.head_rotation {
            self.skeleton.slerp_toward(&self.config.head_bone, head, damping);
        }
        if let Some(spine) = &pose.spine_rotation {
            self.skeleton.slerp_toward(&self.config.upper_spine_bone, spine, damping);
        }
        for (name, influence) in &pose.morph_weights {
            self.morphs.set(name, *influence);
        }
    }

    /// Body-tracked torso motion on the upper spine
    pub fn apply_torso(&mut self, torso: &Quat, damping: f32) {
        self.skeleton.slerp_toward(&self.config.upper_spine_bone, torso, damping);
    }

    pub fn head_rotation(&self) -> Option<Quat> {
        self.skeleton.rotation(&self.config.head_bone)
    }

    pub fn spine_rotation(&self) -> Option<Quat> {
        self.skeleton.rotation(&self.config.upper_spine_bone)
    }

    pub fn play(&mut self, interaction: &Interaction) -> Completion {
        self.animation.play_interaction(interaction)
    }

    pub fn end_continuous(&mut self) -> bool {
        self.animation.end_continuous()
    }

    /// Per-frame update from the render loop
    pub fn advance(&mut self, dt: Duration) {
        self.animation.advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnimationClip, RetargetConfig, Retargeter};
    use avatara_core::Mat4;
    use avatara_tracking::{BlendShapeScore, FaceResult};

    fn avatar() -> Avatar {
        let library = AnimationLibrary::new()
            .with(AnimationClip::looped("Idle", Duration::from_secs(2)))
            .with(AnimationClip::once("Wave", Duration::from_secs(1)));
        Avatar::new(AvatarConfig::default(), library)
    }

    fn turned_face(yaw: f32) -> FaceResult {
        FaceResult {
            blend_shapes: vec![
                BlendShapeScore::new("eyeBlinkLeft", 0.5),
                BlendShapeScore::new("jawOpen", 0.05),
            ],
            facial_transform: Some(Mat4::from_rotation_translation(
                Quat::from_yaw_pitch_roll(yaw, 0.0, 0.0),
                Vec3::ZERO,
            )),
        }
    }

    #[test]
    fn test_head_damps_toward_target() {
        let mut avatar = avatar();
        let retargeter = Retargeter::new(RetargetConfig::default());
        let pose = retargeter.retarget_face(&turned_face(0.6));
        let target = pose.head_rotation.unwrap();

        avatar.apply_retargeted(&pose, 0.3);
        let first = avatar.head_rotation().unwrap();
        let remaining = first.angle_to(&target);
        assert!(remaining > 0.0);
        assert!(remaining < Quat::IDENTITY.angle_to(&target));

        for _ in 0..40 {
            avatar.apply_retargeted(&pose, 0.3);
        }
        assert!(avatar.head_rotation().unwrap().angle_to(&target) < 5e-3);
    }

    #[test]
    fn test_morphs_follow_retargeted_weights() {
        let mut avatar = avatar();
        let pose = Retargeter::default().retarget_face(&turned_face(0.0));
        avatar.apply_retargeted(&pose, 0.3);

        assert!((avatar.morphs.get("eyeBlinkLeft").unwrap() - 0.6667).abs() < 0.001);
        assert_eq!(avatar.morphs.get("jawOpen"), Some(0.0));
    }

    #[test]
    fn test_spine_moves_less_than_head() {
        let mut avatar = avatar();
        let pose = Retargeter::default().retarget_face(&turned_face(0.8));
        for _ in 0..60 {
            avatar.apply_retargeted(&pose, 0.3);
        }

        let head_yaw = avatar.head_rotation().unwrap().to_euler().yaw;
        let spine_yaw = avatar.spine_rotation().unwrap().to_euler().yaw;
        assert!(spine_yaw.abs() < head_yaw.abs());
    }

    #[test]
    fn test_idle_plays_on_creation() {
        let mut avatar = avatar();
        assert_eq!(avatar.animation.current_clip().unwrap().name, "Idle");

        avatar.play(&Interaction::simple("Wave"));
        avatar.advance(Duration::from_secs(1));
        assert_eq!(avatar.animation.current_clip().unwrap().name, "Idle");
        assert!(avatar.locomotion.grounded);
    }
}
