//! 测试用宿主

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;

use super::*;

#[derive(Clone, Debug)]
struct MockNode {
    parent: Option<String>,
    local: NodeTransform,
}

#[derive(Default)]
struct MockActor {
    info: ActorInfo,
    nodes: HashMap<String, MockNode>,
    geometry: HashMap<(String, String), SkinnedGeometry>,
}

/// 内存中的骨骼层级 + 几何
#[derive(Default)]
pub(crate) struct MockHost {
    actors: HashMap<ActorHandle, MockActor>,
    pub extractions: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actor(&mut self, actor: ActorHandle, persistent_id: Option<&str>) {
        self.actors.insert(actor, MockActor {
            info: ActorInfo {
                name: format!("actor-{}", actor.0),
                persistent_id: persistent_id.map(str::to_string),
                race: None,
                weight: 0.0,
            },
            ..Default::default()
        });
    }

    pub fn set_weight(&mut self, actor: ActorHandle, weight: f32) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.info.weight = weight;
        }
    }

    pub fn remove_actor(&mut self, actor: ActorHandle) {
        self.actors.remove(&actor);
    }

    pub fn add_node(&mut self, actor: ActorHandle, node: &str, parent: Option<&str>, local: NodeTransform) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.nodes.insert(node.to_string(), MockNode {
                parent: parent.map(str::to_string),
                local,
            });
        }
    }

    pub fn remove_node(&mut self, actor: ActorHandle, node: &str) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.nodes.remove(node);
        }
    }

    /// 直接修改节点局部变换（模拟动画）
    pub fn move_node(&mut self, actor: ActorHandle, node: &str, local: NodeTransform) {
        self.set_node_local(actor, node, local);
    }

    pub fn set_geometry(&mut self, actor: ActorHandle, node: &str, shape: &str, geometry: SkinnedGeometry) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.geometry.insert((node.to_string(), shape.to_string()), geometry);
        }
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::Relaxed)
    }

    /// 角色根 + 躯干 + 左右胸，典型的测试骨架
    pub fn add_standard_actor(&mut self, actor: ActorHandle) {
        self.add_actor(actor, Some("Skyrim.esm|00000014"));
        self.add_node(actor, "NPC Root", None, NodeTransform::IDENTITY);
        self.add_node(actor, "NPC Spine2", Some("NPC Root"), NodeTransform::from_translation(Vec3::new(0.0, 0.0, 100.0)));
        self.add_node(actor, "NPC L Breast", Some("NPC Spine2"), NodeTransform::from_translation(Vec3::new(-5.0, 8.0, 0.0)));
        self.add_node(actor, "NPC R Breast", Some("NPC Spine2"), NodeTransform::from_translation(Vec3::new(5.0, 8.0, 0.0)));
    }
}

/// n×n 网格，左半边顶点权重 1，右半边 0
pub(crate) fn grid_geometry(n: u32) -> SkinnedGeometry {
    let mut positions = Vec::new();
    let mut weights = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
            weights.push(if x * 2 <= n { 1.0 } else { 0.0 });
        }
    }
    let row = n + 1;
    let mut indices = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * row + x;
            indices.extend_from_slice(&[i, i + 1, i + row]);
            indices.extend_from_slice(&[i + 1, i + row + 1, i + row]);
        }
    }
    SkinnedGeometry { positions, indices, weights }
}

impl SkeletonProvider for MockHost {
    fn loaded_actors(&self) -> Vec<ActorHandle> {
        let mut v: Vec<_> = self.actors.keys().copied().collect();
        v.sort();
        v
    }

    fn actor_info(&self, actor: ActorHandle) -> Option<ActorInfo> {
        self.actors.get(&actor).map(|a| a.info.clone())
    }

    fn node_world(&self, actor: ActorHandle, node: &str) -> Option<NodeTransform> {
        let a = self.actors.get(&actor)?;
        let n = a.nodes.get(node)?;
        match &n.parent {
            Some(p) => Some(self.node_world(actor, p)?.mul_transform(&n.local)),
            None => Some(n.local),
        }
    }

    fn node_local(&self, actor: ActorHandle, node: &str) -> Option<NodeTransform> {
        self.actors.get(&actor)?.nodes.get(node).map(|n| n.local)
    }

    fn node_parent(&self, actor: ActorHandle, node: &str) -> Option<String> {
        self.actors.get(&actor)?.nodes.get(node)?.parent.clone()
    }

    fn set_node_local(&mut self, actor: ActorHandle, node: &str, local: NodeTransform) -> bool {
        match self.actors.get_mut(&actor).and_then(|a| a.nodes.get_mut(node)) {
            Some(n) => {
                n.local = local;
                true
            }
            None => false,
        }
    }
}

impl GeometryProvider for MockHost {
    fn skinned_geometry(&self, actor: ActorHandle, node: &str, shape: &str) -> Option<SkinnedGeometry> {
        self.extractions.fetch_add(1, Ordering::Relaxed);
        self.actors
            .get(&actor)?
            .geometry
            .get(&(node.to_string(), shape.to_string()))
            .cloned()
    }
}
