//! Selection outline
//!
//! Composite objects carry no surface of their own, so outlines go on their
//! leaf sub-meshes. Every mesh that is not part of the current selection is
//! excluded from the outline pass, and that set is rebuilt on each call so an
//! object behind a selected one never picks up the glow. Colors come from the
//! lock set at the moment the outline is applied.

use std::collections::HashSet;
use std::sync::Arc;

use avatara_core::MeshId;

use crate::{LockedObjects, OutlineColor, Scene};

/// Nesting limit when walking composite objects
const MAX_DEPTH: usize = 16;

/// What one show/hide call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightPass {
    pub outlined: Vec<(MeshId, OutlineColor)>,
    pub excluded: Vec<MeshId>,
}

pub struct Highlighter {
    scene: Arc<dyn Scene>,
    targets: Vec<MeshId>,
    outlined: Vec<MeshId>,
}

impl Highlighter {
    pub fn new(scene: Arc<dyn Scene>) -> Self {
        Self {
            scene,
            targets: Vec::new(),
            outlined: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[MeshId] {
        &self.targets
    }

    /// Outline `targets`, replacing any previous selection
    pub fn show(&mut self, targets: &[MeshId], locked: &LockedObjects) -> HighlightPass {
        self.clear_outlines();

        self.targets.clear();
        for target in targets {
            if !self.targets.contains(target) {
                self.targets.push(*target);
            }
        }

        let mut outlined = Vec::new();
        for &target in &self.targets {
            let color = locked.outline_color(target);
            for leaf in self.leaves(target) {
                self.scene.add_outline(leaf, color);
                outlined.push((leaf, color));
            }
        }
        self.outlined = outlined.iter().map(|(mesh, _)| *mesh).collect();

        HighlightPass {
            excluded: self.rebuild_exclusions(),
            outlined,
        }
    }

    pub fn hide(&mut self) -> HighlightPass {
        self.clear_outlines();
        self.targets.clear();
        HighlightPass {
            outlined: Vec::new(),
            excluded: self.rebuild_exclusions(),
        }
    }

    /// Re-apply the current selection, e.g. after a lock change
    pub fn refresh(&mut self, locked: &LockedObjects) -> HighlightPass {
        let targets = self.targets.clone();
        self.show(&targets, locked)
    }

    fn clear_outlines(&mut self) {
        for mesh in self.outlined.drain(..) {
            self.scene.remove_outline(mesh);
        }
    }

    fn leaves(&self, root: MeshId) -> Vec<MeshId> {
        let mut leaves = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, 0usize)];

        while let Some((mesh, depth)) = stack.pop() {
            if !seen.insert(mesh) {
                continue;
            }
            let children = self.scene.children(mesh);
            if children.is_empty() || depth >= MAX_DEPTH {
                leaves.push(mesh);
                continue;
            }
            // Reverse so leaves come out in child order
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
        leaves
    }

    fn rebuild_exclusions(&self) -> Vec<MeshId> {
        let keep: HashSet<MeshId> = self
            .outlined
            .iter()
            .chain(self.targets.iter())
            .copied()
            .collect();

        let mut excluded = Vec::new();
        for mesh in self.scene.meshes() {
            if keep.contains(&mesh) {
                self.scene.include_in_outline(mesh);
            } else {
                self.scene.exclude_from_outline(mesh);
                excluded.push(mesh);
            }
        }
        excluded
    }
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("targets", &self.targets)
            .field("outlined", &self.outlined)
            .finish()
    }
}
