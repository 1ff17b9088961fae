//! Object placement - ghost preview, then commit
//!
//! Per remote participant:
//!
//! NoHandler → (placing) → GhostPreview → (place) → Committed
//!
//! A handler is created lazily by the first "placing" and reused by every
//! later one. It owns its ghost mesh and material and disposes them when the
//! placement commits or the participant's session ends.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use avatara_core::{
    AssetId, AvataraError, AvataraResult, MaterialId, MeshId, ParticipantIdentity, Transform,
};

use crate::{AssetRecord, Scene};

/// Whose space the object is placed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementOrigin {
    #[serde(rename = "self")]
    Local,
    #[serde(rename = "other")]
    Remote,
}

/// Placement intent, used for both the preview and the commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceObjectRequest {
    pub origin: PlacementOrigin,
    pub asset: AssetId,
    #[serde(default)]
    pub transform: Transform,
}

impl PlaceObjectRequest {
    pub fn new(origin: PlacementOrigin, asset: impl Into<String>, transform: Transform) -> Self {
        Self {
            origin,
            asset: AssetId::new(asset),
            transform,
        }
    }
}

/// Stable handle identity, for telling handlers apart
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPhase {
    GhostPreview,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ghost {
    mesh: MeshId,
    material: MaterialId,
}

/// Ghost-preview state for one remote participant
#[derive(Debug)]
pub struct ObjectPlacementHandler {
    id: HandlerId,
    owner: ParticipantIdentity,
    asset: AssetId,
    transform: Transform,
    phase: PlacementPhase,
    ghost: Option<Ghost>,
    placed: Vec<MeshId>,
}

impl ObjectPlacementHandler {
    fn new(id: HandlerId, owner: ParticipantIdentity, asset: AssetId) -> Self {
        Self {
            id,
            owner,
            asset,
            transform: Transform::IDENTITY,
            phase: PlacementPhase::GhostPreview,
            ghost: None,
            placed: Vec::new(),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn owner(&self) -> &ParticipantIdentity {
        &self.owner
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn phase(&self) -> PlacementPhase {
        self.phase
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn ghost_mesh(&self) -> Option<MeshId> {
        self.ghost.map(|g| g.mesh)
    }

    /// Objects this handler committed, oldest first
    pub fn placed(&self) -> &[MeshId] {
        &self.placed
    }

    fn preview(
        &mut self,
        scene: &dyn Scene,
        record: &AssetRecord,
        transform: &Transform,
    ) -> AvataraResult<()> {
        if self.asset != record.id {
            self.dispose_ghost(scene);
            self.asset = record.id.clone();
        }
        let ghost = match self.ghost {
            Some(ghost) => ghost,
            None => {
                let (mesh, material) = scene.create_ghost(record)?;
                let ghost = Ghost { mesh, material };
                self.ghost = Some(ghost);
                ghost
            }
        };
        scene.set_transform(ghost.mesh, transform);
        self.transform = *transform;
        self.phase = PlacementPhase::GhostPreview;
        Ok(())
    }

    fn commit(
        &mut self,
        scene: &dyn Scene,
        record: &AssetRecord,
        transform: &Transform,
    ) -> AvataraResult<MeshId> {
        let mesh = scene.spawn_object(record, transform)?;
        self.dispose_ghost(scene);
        self.asset = record.id.clone();
        self.transform = *transform;
        self.phase = PlacementPhase::Committed;
        self.placed.push(mesh);
        Ok(mesh)
    }

    fn dispose_ghost(&mut self, scene: &dyn Scene) {
        if let Some(ghost) = self.ghost.take() {
            scene.dispose_mesh(ghost.mesh);
            scene.dispose_material(ghost.material);
        }
    }
}

/// Placement handlers keyed by participant identity
#[derive(Debug, Default)]
pub struct PlacementRegistry {
    handlers: BTreeMap<ParticipantIdentity, ObjectPlacementHandler>,
    next_id: u64,
}

impl PlacementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show or move `owner`'s ghost, creating the handler on first use
    pub fn placing(
        &mut self,
        scene: &dyn Scene,
        owner: &ParticipantIdentity,
        record: &AssetRecord,
        request: &PlaceObjectRequest,
    ) -> AvataraResult<HandlerId> {
        if let Some(handler) = self.handlers.get_mut(owner) {
            handler.preview(scene, record, &request.transform)?;
            return Ok(handler.id);
        }

        // Registered only once its first ghost exists
        let mut handler =
            ObjectPlacementHandler::new(HandlerId(self.next_id + 1), owner.clone(), record.id.clone());
        handler.preview(scene, record, &request.transform)?;
        self.next_id += 1;
        let id = handler.id;
        tracing::debug!(owner = %owner, handler = ?id, "placement handler created");
        self.handlers.insert(owner.clone(), handler);
        Ok(id)
    }

    /// Commit `owner`'s placement. Without a prior "placing" nothing changes.
    pub fn place(
        &mut self,
        scene: &dyn Scene,
        owner: &ParticipantIdentity,
        record: &AssetRecord,
        request: &PlaceObjectRequest,
    ) -> AvataraResult<MeshId> {
        let handler = self
            .handlers
            .get_mut(owner)
            .ok_or_else(|| AvataraError::NoPlacementHandler(owner.clone()))?;
        handler.commit(scene, record, &request.transform)
    }

    /// End `owner`'s placement session
    pub fn dispose(&mut self, scene: &dyn Scene, owner: &ParticipantIdentity) -> bool {
        match self.handlers.remove(owner) {
            Some(mut handler) => {
                handler.dispose_ghost(scene);
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&mut self, scene: &dyn Scene) {
        for (_, mut handler) in std::mem::take(&mut self.handlers) {
            handler.dispose_ghost(scene);
        }
    }

    pub fn handler(&self, owner: &ParticipantIdentity) -> Option<&ObjectPlacementHandler> {
        self.handlers.get(owner)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
