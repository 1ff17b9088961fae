//! Scene capability consumed by placement and highlight

use avatara_core::{AvataraResult, MaterialId, MeshId, Transform};

use crate::AssetRecord;

/// Selection outline color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutlineColor {
    Unlocked,
    Locked,
}

/// Rendering engine surface. Scene objects are owned by the engine; the
/// sync layer only holds handles.
pub trait Scene: Send + Sync {
    /// Semi-transparent placeholder for an asset
    fn create_ghost(&self, asset: &AssetRecord) -> AvataraResult<(MeshId, MaterialId)>;

    /// Instantiate the real object
    fn spawn_object(&self, asset: &AssetRecord, transform: &Transform) -> AvataraResult<MeshId>;

    fn set_transform(&self, mesh: MeshId, transform: &Transform);

    fn dispose_mesh(&self, mesh: MeshId);

    fn dispose_material(&self, material: MaterialId);

    /// Direct sub-meshes of a composite object
    fn children(&self, mesh: MeshId) -> Vec<MeshId>;

    /// Every selectable mesh, children included
    fn meshes(&self) -> Vec<MeshId>;

    fn add_outline(&self, mesh: MeshId, color: OutlineColor);

    fn remove_outline(&self, mesh: MeshId);

    fn exclude_from_outline(&self, mesh: MeshId);

    fn include_in_outline(&self, mesh: MeshId);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;

    use avatara_core::AvataraError;

    use super::*;

    /// In-memory scene recording every call
    #[derive(Default)]
    pub struct MockScene {
        next: AtomicU64,
        pub alive: Mutex<BTreeSet<MeshId>>,
        pub materials: Mutex<HashSet<MaterialId>>,
        pub children: Mutex<HashMap<MeshId, Vec<MeshId>>>,
        pub transforms: Mutex<HashMap<MeshId, Transform>>,
        pub outlines: Mutex<HashMap<MeshId, OutlineColor>>,
        pub excluded: Mutex<BTreeSet<MeshId>>,
    }

    impl MockScene {
        fn allocate(&self) -> u64 {
            self.next.fetch_add(1, Ordering::SeqCst) + 1
        }

        pub fn add_mesh(&self) -> MeshId {
            let mesh = MeshId::new(self.allocate());
            self.alive.lock().insert(mesh);
            mesh
        }

        pub fn add_composite(&self, parts: usize) -> (MeshId, Vec<MeshId>) {
            let parent = self.add_mesh();
            let kids: Vec<MeshId> = (0..parts).map(|_| self.add_mesh()).collect();
            self.children.lock().insert(parent, kids.clone());
            (parent, kids)
        }
    }

    impl Scene for MockScene {
        fn create_ghost(&self, asset: &AssetRecord) -> AvataraResult<(MeshId, MaterialId)> {
            if asset.path.is_empty() {
                return Err(AvataraError::Scene("asset has no path".into()));
            }
            let mesh = self.add_mesh();
            let material = MaterialId::new(self.allocate());
            self.materials.lock().insert(material);
            Ok((mesh, material))
        }

        fn spawn_object(&self, _asset: &AssetRecord, transform: &Transform) -> AvataraResult<MeshId> {
            let mesh = self.add_mesh();
            self.transforms.lock().insert(mesh, *transform);
            Ok(mesh)
        }

        fn set_transform(&self, mesh: MeshId, transform: &Transform) {
            self.transforms.lock().insert(mesh, *transform);
        }

        fn dispose_mesh(&self, mesh: MeshId) {
            self.alive.lock().remove(&mesh);
        }

        fn dispose_material(&self, material: MaterialId) {
            self.materials.lock().remove(&material);
        }

        fn children(&self, mesh: MeshId) -> Vec<MeshId> {
            self.children.lock().get(&mesh).cloned().unwrap_or_default()
        }

        fn meshes(&self) -> Vec<MeshId> {
            self.alive.lock().iter().copied().collect()
        }

        fn add_outline(&self, mesh: MeshId, color: OutlineColor) {
            self.outlines.lock().insert(mesh, color);
        }

        fn remove_outline(&self, mesh: MeshId) {
            self.outlines.lock().remove(&mesh);
        }

        fn exclude_from_outline(&self, mesh: MeshId) {
            self.excluded.lock().insert(mesh);
        }

        fn include_in_outline(&self, mesh: MeshId) {
            self.excluded.lock().remove(&mesh);
        }
    }
}
