//! SyncState - the wire snapshot of one avatar
//!
//! The local participant captures a fresh record every outbound tick.
//! Records from peers are applied to that peer's `RemoteAvatar` and nowhere
//! else; a remote avatar only changes through `RemoteAvatar::apply`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use avatara_core::{AvataraError, AvataraResult, ParticipantIdentity, Quat, Vec3};
use avatara_visual::{Avatar, Locomotion};

/// Wire record, camelCase JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub session_id: ParticipantIdentity,
    pub position: Vec3,
    pub rotation: Quat,
    #[serde(default)]
    pub animation: Option<String>,
    #[serde(default)]
    pub animation_loop: bool,
    #[serde(default)]
    pub is_crouching: bool,
    #[serde(default)]
    pub is_moving: bool,
    #[serde(default)]
    pub is_grounded: bool,
    #[serde(default)]
    pub morph_targets: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub look_target: Option<Vec3>,
}

impl SyncState {
    /// Snapshot `avatar`. Morph influences at or below `morph_epsilon` are
    /// left out.
    pub fn capture(session_id: &ParticipantIdentity, avatar: &Avatar, morph_epsilon: f32) -> Self {
        let clip = avatar.animation.current_clip();
        SyncState {
            session_id: session_id.clone(),
            position: avatar.position,
            rotation: avatar.rotation,
            animation: clip.map(|c| c.name.clone()),
            animation_loop: clip.map(|c| c.looping).unwrap_or(false),
            is_crouching: avatar.locomotion.crouching,
            is_moving: avatar.locomotion.moving,
            is_grounded: avatar.locomotion.grounded,
            morph_targets: avatar.morphs.active(morph_epsilon),
            look_target: avatar.look_target,
        }
    }

    pub fn encode(&self) -> AvataraResult<String> {
        serde_json::to_string(self).map_err(|e| AvataraError::InvalidPayload(e.to_string()))
    }

    pub fn decode(payload: &str) -> AvataraResult<Self> {
        let state: SyncState = serde_json::from_str(payload)
            .map_err(|e| AvataraError::InvalidPayload(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Reject non-finite numbers before they reach a scene node
    pub fn validate(&self) -> AvataraResult<()> {
        let p = &self.position;
        let r = &self.rotation;
        let mut values = vec![p.x, p.y, p.z, r.x, r.y, r.z, r.w];
        values.extend(self.morph_targets.values().copied());
        if let Some(t) = &self.look_target {
            values.extend([t.x, t.y, t.z]);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AvataraError::InvalidPayload(format!(
                "non-finite value in state for {}",
                self.session_id
            )));
        }
        if r.norm() < 1e-6 {
            return Err(AvataraError::InvalidPayload("zero rotation".into()));
        }
        Ok(())
    }

    /// Write this record onto an avatar instance
    pub fn apply_to(&self, avatar: &mut Avatar) {
        avatar.position = self.position;
        avatar.rotation = self.rotation.normalize();
        avatar.locomotion = Locomotion {
            crouching: self.is_crouching,
            moving: self.is_moving,
            grounded: self.is_grounded,
        };
        avatar.look_target = self.look_target;

        if let Some(clip) = &self.animation {
            avatar.animation.play_synced(clip, self.animation_loop);
        }

        avatar.morphs.reset();
        for (name, weight) in &self.morph_targets {
            avatar.morphs.set(name, *weight);
        }
    }
}

/// Local stand-in for a peer's avatar
#[derive(Debug)]
pub struct RemoteAvatar {
    identity: ParticipantIdentity,
    avatar: Avatar,
    last_state: Option<SyncState>,
    updates: u64,
}

impl RemoteAvatar {
    pub fn new(identity: ParticipantIdentity, avatar: Avatar) -> Self {
        Self {
            identity,
            avatar,
            last_state: None,
            updates: 0,
        }
    }

    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    pub fn avatar(&self) -> &Avatar {
        &self.avatar
    }

    pub fn last_state(&self) -> Option<&SyncState> {
        self.last_state.as_ref()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// The only mutation path: a record sent by this avatar's owner
    pub fn apply(&mut self, state: SyncState) -> AvataraResult<()> {
        if state.session_id != self.identity {
            return Err(AvataraError::IdentityMismatch {
                caller: self.identity.clone(),
                record: state.session_id,
            });
        }
        state.apply_to(&mut self.avatar);
        self.last_state = Some(state);
        self.updates += 1;
        Ok(())
    }

    /// Advance the mirrored animation clock
    pub fn advance(&mut self, dt: std::time::Duration) {
        self.avatar.advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatara_visual::{AnimationClip, AnimationLibrary, AvatarConfig};
    use std::time::Duration;

    fn avatar() -> Avatar {
        let library = AnimationLibrary::new()
            .with(AnimationClip::looped("Idle", Duration::from_secs(2)))
            .with(AnimationClip::looped("Walk", Duration::from_secs(1)));
        Avatar::new(AvatarConfig::default(), library)
    }

    fn alice() -> ParticipantIdentity {
        ParticipantIdentity::new("alice")
    }

    #[test]
    fn test_wire_field_names() {
        let mut local = avatar();
        local.morphs.set("jawOpen", 0.4);
        local.morphs.set("mouthClose", 0.001);
        let state = SyncState::capture(&alice(), &local, 0.01);

        let json: serde_json::Value = serde_json::from_str(&state.encode().unwrap()).unwrap();
        assert_eq!(json["sessionId"], "alice");
        assert_eq!(json["animation"], "Idle");
        assert_eq!(json["animationLoop"], true);
        assert_eq!(json["isGrounded"], true);
        assert_eq!(json["rotation"].as_array().unwrap().len(), 4);
        assert_eq!(json["morphTargets"].as_object().unwrap().len(), 1);
        assert!(json.get("lookTarget").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(SyncState::decode("{"), Err(AvataraError::InvalidPayload(_))));
        assert!(matches!(
            SyncState::decode(r#"{"sessionId":"a","position":[0,0,0],"rotation":[0,0,0,0]}"#),
            Err(AvataraError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_minimal_record_decodes_with_defaults() {
        let state =
            SyncState::decode(r#"{"sessionId":"a","position":[1,2,3],"rotation":[0,0,0,1]}"#).unwrap();
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(state.animation.is_none());
        assert!(state.morph_targets.is_empty());
    }

    #[test]
    fn test_remote_apply_mirrors_sender() {
        let mut sender = avatar();
        sender.position = Vec3::new(3.0, 0.0, -1.0);
        sender.locomotion.moving = true;
        sender.animation.play_synced("Walk", true);
        sender.morphs.set("eyeBlinkLeft", 0.9);
        sender.look_target = Some(Vec3::new(0.0, 1.6, 2.0));
        let state = SyncState::capture(&alice(), &sender, 0.01);

        let mut remote = RemoteAvatar::new(alice(), avatar());
        remote.apply(state).unwrap();

        let mirrored = remote.avatar();
        assert_eq!(mirrored.position, Vec3::new(3.0, 0.0, -1.0));
        assert!(mirrored.locomotion.moving);
        assert_eq!(mirrored.animation.current_clip().unwrap().name, "Walk");
        assert_eq!(mirrored.morphs.get("eyeBlinkLeft"), Some(0.9));
        assert_eq!(mirrored.look_target, Some(Vec3::new(0.0, 1.6, 2.0)));
        assert_eq!(remote.updates(), 1);
    }

    #[test]
    fn test_remote_rejects_other_session() {
        let mut remote = RemoteAvatar::new(alice(), avatar());
        let state = SyncState::capture(&ParticipantIdentity::new("mallory"), &avatar(), 0.01);

        assert!(matches!(remote.apply(state), Err(AvataraError::IdentityMismatch { .. })));
        assert!(remote.last_state().is_none());
    }

    #[test]
    fn test_morphs_absent_from_record_are_cleared() {
        let mut remote = RemoteAvatar::new(alice(), avatar());
        let mut sender = avatar();

        sender.morphs.set("jawOpen", 0.8);
        remote.apply(SyncState::capture(&alice(), &sender, 0.01)).unwrap();
        sender.morphs.set("jawOpen", 0.0);
        remote.apply(SyncState::capture(&alice(), &sender, 0.01)).unwrap();

        assert_eq!(remote.avatar().morphs.get("jawOpen"), Some(0.0));
    }
}
