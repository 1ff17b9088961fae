//! Studio history - append-only operation log per participant
//!
//! Entries are never edited. Undo appends the inverse of the most recent
//! operation that has not already been reverted, pointing back at it
//! through `reverts`.

use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use avatara_core::{AssetId, MeshId, ParticipantIdentity, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StudioOperationKind {
    Select,
    Deselect,
    Add,
    Delete,
    Move,
    Rotate,
    Scale,
    Lock,
    Unlock,
    Duplicate,
    ChangeSkybox,
}

impl StudioOperationKind {
    /// Edits the transform set of its meshes
    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            StudioOperationKind::Move | StudioOperationKind::Rotate | StudioOperationKind::Scale
        )
    }
}

/// Operation data. Which fields are set depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioPayload {
    /// Affected meshes; for duplicate, the copies
    #[serde(default)]
    pub meshes: Vec<MeshId>,
    /// Duplicate sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<MeshId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub old_transforms: Vec<Transform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_transforms: Vec<Transform>,
    /// Added asset, or new skybox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetId>,
    /// Skybox being replaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_asset: Option<AssetId>,
}

impl StudioPayload {
    pub fn meshes(meshes: impl IntoIterator<Item = MeshId>) -> Self {
        Self {
            meshes: meshes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn transforms(meshes: Vec<MeshId>, old: Vec<Transform>, new: Vec<Transform>) -> Self {
        Self {
            meshes,
            old_transforms: old,
            new_transforms: new,
            ..Self::default()
        }
    }
}

/// One recorded studio operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioSavedState {
    pub uid: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub operation: StudioOperationKind,
    pub payload: StudioPayload,
    /// Uid of the entry this one undoes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverts: Option<String>,
}

impl StudioSavedState {
    pub fn new(operation: StudioOperationKind, payload: StudioPayload) -> Self {
        Self {
            uid: new_uid(),
            timestamp: now_millis(),
            operation,
            payload,
            reverts: None,
        }
    }

    /// The operation that undoes this one
    pub fn inverse(&self) -> StudioSavedState {
        use StudioOperationKind::*;

        let p = &self.payload;
        let (operation, payload) = match self.operation {
            Select => (Deselect, p.clone()),
            Deselect => (Select, p.clone()),
            Add => (Delete, p.clone()),
            Delete => (Add, p.clone()),
            Lock => (Unlock, p.clone()),
            Unlock => (Lock, p.clone()),
            Move | Rotate | Scale => (
                self.operation,
                StudioPayload {
                    old_transforms: p.new_transforms.clone(),
                    new_transforms: p.old_transforms.clone(),
                    ..p.clone()
                },
            ),
            Duplicate => (Delete, StudioPayload::meshes(p.meshes.iter().copied())),
            ChangeSkybox => (
                ChangeSkybox,
                StudioPayload {
                    asset: p.previous_asset.clone(),
                    previous_asset: p.asset.clone(),
                    ..StudioPayload::default()
                },
            ),
        };

        StudioSavedState {
            reverts: Some(self.uid.clone()),
            ..StudioSavedState::new(operation, payload)
        }
    }
}

fn new_uid() -> String {
    format!("{:016x}", rand::random::<u64>())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-participant operation logs, insertion ordered
#[derive(Debug, Clone, Default)]
pub struct StudioHistory {
    entries: BTreeMap<ParticipantIdentity, Vec<StudioSavedState>>,
}

impl StudioHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, owner: &ParticipantIdentity, state: StudioSavedState) {
        self.entries.entry(owner.clone()).or_default().push(state);
    }

    pub fn history(&self, owner: &ParticipantIdentity) -> &[StudioSavedState] {
        self.entries.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append and return the inverse of `owner`'s latest unreverted operation
    pub fn undo(&mut self, owner: &ParticipantIdentity) -> Option<StudioSavedState> {
        let log = self.entries.get_mut(owner)?;
        let reverted: HashSet<&str> = log.iter().filter_map(|e| e.reverts.as_deref()).collect();

        let target = log
            .iter()
            .rev()
            .find(|e| e.reverts.is_none() && !reverted.contains(e.uid.as_str()))?;
        let inverse = target.inverse();

        log.push(inverse.clone());
        Some(inverse)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantIdentity> {
        self.entries.keys()
    }
}
