//! Cross-crate scenarios
//!
//! Fixtures shared by the scenario tests and the benches: a small asset
//! catalog, a clip library with one continuous interaction, and `Peer`, a
//! participant wired to a `RoomNetwork` with its own recording scene.

use std::sync::Arc;
use std::time::Duration;

use avatara_core::ParticipantIdentity;
use avatara_sync::{
    AssetCatalog, AssetKind, AssetRecord, AvatarTemplate, EventBus, MultiplayerRouter, Room,
};
use avatara_visual::{AnimationClip, AnimationLibrary, AvatarConfig};

use crate::{RecordingScene, RoomNetwork, SimRoom};

/// Two pieces of furniture and one skybox
pub fn catalog() -> AssetCatalog {
    [
        AssetRecord::new("sofa", AssetKind::Furniture, "/models/furniture/sofa.glb"),
        AssetRecord::new("lamp", AssetKind::Furniture, "/models/furniture/lamp.glb"),
        AssetRecord::new("night", AssetKind::Skybox, "/skyboxes/night.hdr"),
    ]
    .into_iter()
    .collect()
}

/// Idle, a one-shot wave and the three clips of the clap interaction
pub fn animation_library() -> AnimationLibrary {
    let ms = Duration::from_millis;
    AnimationLibrary::new()
        .with(AnimationClip::looped("Idle", ms(2000)))
        .with(AnimationClip::once("Wave", ms(1000)))
        .with(AnimationClip::once("IdleToClap", ms(400)))
        .with(AnimationClip::looped("ClapLoop", ms(600)))
        .with(AnimationClip::once("ClapToIdle", ms(400)))
}

/// One participant: room endpoint, scene and router
pub struct Peer {
    pub room: Arc<SimRoom>,
    pub scene: Arc<RecordingScene>,
    pub router: MultiplayerRouter<SimRoom>,
}

impl Peer {
    /// Join `network` with handlers already registered
    pub fn join(network: &Arc<RoomNetwork>, identity: &str) -> Self {
        let room = network.join(identity);
        let scene = Arc::new(RecordingScene::new());
        let router = MultiplayerRouter::new(
            Arc::clone(&room),
            scene.clone(),
            Arc::new(catalog()),
            EventBus::new(),
            AvatarTemplate::new(AvatarConfig::default(), animation_library()),
        );
        router.register_handlers();
        Self {
            room,
            scene,
            router,
        }
    }

    pub fn identity(&self) -> ParticipantIdentity {
        self.room.local_identity()
    }
}
