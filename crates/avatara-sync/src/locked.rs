//! Locked-objects set

use std::collections::BTreeSet;

use avatara_core::MeshId;

use crate::OutlineColor;

/// Meshes that may not be edited. Changed only by lock/unlock operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedObjects {
    meshes: BTreeSet<MeshId>,
}

impl LockedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if newly locked
    pub fn lock(&mut self, mesh: MeshId) -> bool {
        self.meshes.insert(mesh)
    }

    pub fn unlock(&mut self, mesh: MeshId) -> bool {
        self.meshes.remove(&mesh)
    }

    pub fn is_locked(&self, mesh: MeshId) -> bool {
        self.meshes.contains(&mesh)
    }

    pub fn can_edit(&self, mesh: MeshId) -> bool {
        !self.is_locked(mesh)
    }

    pub fn outline_color(&self, mesh: MeshId) -> OutlineColor {
        if self.is_locked(mesh) {
            OutlineColor::Locked
        } else {
            OutlineColor::Unlocked
        }
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes.iter().copied()
    }
}
