//! Recording scene
//!
//! Keeps just enough scene-graph state to assert on placement and
//! highlight behaviour, plus an ordered log of every call.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use parking_lot::Mutex;

use avatara_core::{AssetId, AvataraError, AvataraResult, MaterialId, MeshId, Transform};
use avatara_sync::{AssetRecord, OutlineColor, Scene};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    CreateGhost(AssetId),
    Spawn(AssetId, Transform),
    SetTransform(MeshId, Transform),
    DisposeMesh(MeshId),
    DisposeMaterial(MaterialId),
    Outline(MeshId, OutlineColor),
    RemoveOutline(MeshId),
    Exclude(MeshId),
    Include(MeshId),
}

#[derive(Default)]
struct SceneGraph {
    next_id: u64,
    alive: BTreeSet<MeshId>,
    materials: HashSet<MaterialId>,
    children: BTreeMap<MeshId, Vec<MeshId>>,
    transforms: BTreeMap<MeshId, Transform>,
    outlines: BTreeMap<MeshId, OutlineColor>,
    excluded: BTreeSet<MeshId>,
    calls: Vec<SceneCall>,
}

impl SceneGraph {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_mesh(&mut self) -> MeshId {
        let mesh = MeshId::new(self.allocate());
        self.alive.insert(mesh);
        mesh
    }
}

#[derive(Default)]
pub struct RecordingScene {
    graph: Mutex<SceneGraph>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&self) -> MeshId {
        self.graph.lock().add_mesh()
    }

    /// A parent node with `parts` renderable children
    pub fn add_composite(&self, parts: usize) -> (MeshId, Vec<MeshId>) {
        let mut graph = self.graph.lock();
        let parent = graph.add_mesh();
        let kids: Vec<MeshId> = (0..parts).map(|_| graph.add_mesh()).collect();
        graph.children.insert(parent, kids.clone());
        (parent, kids)
    }

    pub fn is_alive(&self, mesh: MeshId) -> bool {
        self.graph.lock().alive.contains(&mesh)
    }

    pub fn mesh_count(&self) -> usize {
        self.graph.lock().alive.len()
    }

    pub fn material_count(&self) -> usize {
        self.graph.lock().materials.len()
    }

    pub fn transform_of(&self, mesh: MeshId) -> Option<Transform> {
        self.graph.lock().transforms.get(&mesh).copied()
    }

    pub fn outline_of(&self, mesh: MeshId) -> Option<OutlineColor> {
        self.graph.lock().outlines.get(&mesh).copied()
    }

    pub fn outlined(&self) -> Vec<MeshId> {
        self.graph.lock().outlines.keys().copied().collect()
    }

    pub fn is_excluded(&self, mesh: MeshId) -> bool {
        self.graph.lock().excluded.contains(&mesh)
    }

    pub fn calls(&self) -> Vec<SceneCall> {
        self.graph.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.graph.lock().calls.clear();
    }
}

impl Scene for RecordingScene {
    fn create_ghost(&self, asset: &AssetRecord) -> AvataraResult<(MeshId, MaterialId)> {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::CreateGhost(asset.id.clone()));
        if asset.path.is_empty() {
            return Err(AvataraError::Scene(format!("{} has no model path", asset.id)));
        }
        let mesh = graph.add_mesh();
        let material = MaterialId::new(graph.allocate());
        graph.materials.insert(material);
        Ok((mesh, material))
    }

    fn spawn_object(&self, asset: &AssetRecord, transform: &Transform) -> AvataraResult<MeshId> {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::Spawn(asset.id.clone(), *transform));
        let mesh = graph.add_mesh();
        graph.transforms.insert(mesh, *transform);
        Ok(mesh)
    }

    fn set_transform(&self, mesh: MeshId, transform: &Transform) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::SetTransform(mesh, *transform));
        graph.transforms.insert(mesh, *transform);
    }

    fn dispose_mesh(&self, mesh: MeshId) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::DisposeMesh(mesh));
        graph.alive.remove(&mesh);
        graph.transforms.remove(&mesh);
        graph.outlines.remove(&mesh);
    }

    fn dispose_material(&self, material: MaterialId) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::DisposeMaterial(material));
        graph.materials.remove(&material);
    }

    fn children(&self, mesh: MeshId) -> Vec<MeshId> {
        self.graph.lock().children.get(&mesh).cloned().unwrap_or_default()
    }

    fn meshes(&self) -> Vec<MeshId> {
        self.graph.lock().alive.iter().copied().collect()
    }

    fn add_outline(&self, mesh: MeshId, color: OutlineColor) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::Outline(mesh, color));
        graph.outlines.insert(mesh, color);
    }

    fn remove_outline(&self, mesh: MeshId) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::RemoveOutline(mesh));
        graph.outlines.remove(&mesh);
    }

    fn exclude_from_outline(&self, mesh: MeshId) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::Exclude(mesh));
        graph.excluded.insert(mesh);
    }

    fn include_in_outline(&self, mesh: MeshId) {
        let mut graph = self.graph.lock();
        graph.calls.push(SceneCall::Include(mesh));
        graph.excluded.remove(&mesh);
    }
}
