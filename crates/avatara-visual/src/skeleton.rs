//! Skeleton bones and morph targets of a loaded avatar model

use std::collections::BTreeMap;

use avatara_core::Quat;

/// The 52 ARKit-compatible blend shapes the face landmarker emits
pub const ARKIT_BLEND_SHAPES: [&str; 52] = [
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
    "tongueOut",
];

/// Named bone rotations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    bones: BTreeMap<String, Quat>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skeleton with the given bones at rest
    pub fn with_bones<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bones: names.into_iter().map(|n| (n.into(), Quat::IDENTITY)).collect(),
        }
    }

    pub fn has_bone(&self, name: &str) -> bool {
        self.bones.contains_key(name)
    }

    pub fn rotation(&self, name: &str) -> Option<Quat> {
        self.bones.get(name).copied()
    }

    /// Overwrite a bone rotation. Unknown bones are ignored.
    pub fn set_rotation(&mut self, name: &str, rotation: Quat) -> bool {
        match self.bones.get_mut(name) {
            Some(bone) => {
                *bone = rotation;
                true
            }
            None => false,
        }
    }

    /// Move a bone a fraction `t` of the way toward `target`
    pub fn slerp_toward(&mut self, name: &str, target: &Quat, t: f32) -> bool {
        match self.bones.get_mut(name) {
            Some(bone) => {
                *bone = bone.slerp(target, t.clamp(0.0, 1.0));
                true
            }
            None => false,
        }
    }

    pub fn bone_names(&self) -> impl Iterator<Item = &str> {
        self.bones.keys().map(String::as_str)
    }
}

/// Morph target influences keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTargets {
    influences: BTreeMap<String, f32>,
}

impl MorphTargets {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            influences: names.into_iter().map(|n| (n.into(), 0.0)).collect(),
        }
    }

    /// Every ARKit blend shape at zero influence
    pub fn arkit() -> Self {
        Self::new(ARKIT_BLEND_SHAPES)
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.influences.get(name).copied()
    }

    /// Set an influence, clamped to [0, 1]. Names the model lacks are ignored.
    pub fn set(&mut self, name: &str, influence: f32) -> bool {
        match self.influences.get_mut(name) {
            Some(slot) => {
                *slot = if influence.is_nan() { 0.0 } else { influence.clamp(0.0, 1.0) };
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.influences.values_mut().for_each(|v| *v = 0.0);
    }

    pub fn len(&self) -> usize {
        self.influences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.influences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.influences.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Influences above `epsilon`, for compact transmission
    pub fn active(&self, epsilon: f32) -> BTreeMap<String, f32> {
        self.influences
            .iter()
            .filter(|(_, v)| **v > epsilon)
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_bone_ignored() {
        let mut skeleton = Skeleton::with_bones(["Head", "Spine2"]);
        assert!(!skeleton.set_rotation("Tail", Quat::IDENTITY));
        assert!(skeleton.slerp_toward("Head", &Quat::from_yaw_pitch_roll(1.0, 0.0, 0.0), 0.3));
        assert!(skeleton.rotation("Head").unwrap().to_euler().yaw > 0.0);
    }

    #[test]
    fn test_morph_clamped_and_filtered() {
        let mut morphs = MorphTargets::arkit();
        assert_eq!(morphs.len(), 52);

        assert!(morphs.set("jawOpen", 1.4));
        assert!(!morphs.set("notAShape", 0.5));
        assert_eq!(morphs.get("jawOpen"), Some(1.0));

        morphs.set("eyeBlinkLeft", 0.005);
        let active = morphs.active(0.01);
        assert_eq!(active.len(), 1);

        morphs.reset();
        assert!(morphs.active(0.0).is_empty());
    }
}
