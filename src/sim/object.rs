//! 每角色组件表

use std::collections::{BTreeSet, HashMap};

use glam::Vec3;

use crate::bonecast::BoneCastService;
use crate::collision::ContactBody;
use crate::config::{ConfigStore, GlobalConfig};
use crate::host::{ActorHandle, ActorInfo, GeometryProvider, SceneHost, SkeletonProvider};
use crate::{JiggleError, Result};

use super::{NodePlan, SimComponent};

/// 骨骼链深度上限，防止宿主层级成环
const MAX_DEPTH: usize = 256;

/// 解析角色要模拟的节点（只保留启用运动或碰撞的节点）
pub fn plan_actor(store: &ConfigStore, actor: ActorHandle, info: Option<&ActorInfo>) -> Vec<NodePlan> {
    let physics = store.resolve_physics(actor, info);
    let nodes = store.resolve_nodes(actor, info);

    store
        .node_map()
        .iter()
        .filter_map(|(node, group)| {
            let node_conf = nodes.get(node)?;
            if !node_conf.enabled() {
                return None;
            }
            Some(NodePlan {
                node: node.clone(),
                group: group.clone(),
                group_id: store.group_id(group),
                physics: physics.get(group)?.clone(),
                node_conf: node_conf.clone(),
            })
        })
        .collect()
}

/// 单个角色的全部模拟组件
///
/// 组件按骨骼深度排序，父节点总在子节点之前更新。
pub struct SimObject {
    actor: ActorHandle,
    name: String,
    persistent_id: Option<String>,
    weight: f32,

    components: Vec<SimComponent>,
    index: HashMap<String, usize>,
    /// 直接父节点也是组件时记录其下标
    parents: Vec<Option<usize>>,
    /// 构建时计划中的节点（包括骨架中不存在的）
    planned: BTreeSet<String>,

    bc_generation: u64,
}

impl SimObject {
    pub fn build<H: SceneHost + ?Sized>(
        actor: ActorHandle,
        info: &ActorInfo,
        plans: &[NodePlan],
        host: &H,
        bonecast: &BoneCastService,
        global: &GlobalConfig,
    ) -> Self {
        let mut placed: Vec<(usize, SimComponent)> = plans
            .iter()
            .filter_map(|plan| {
                let Some(local) = host.node_local(actor, &plan.node) else {
                    log::debug!("[Sim] {}: 节点 '{}' 不存在，跳过", actor, plan.node);
                    return None;
                };
                let parent = host.node_parent(actor, &plan.node);
                let depth = node_depth(host, actor, &plan.node);
                let c = SimComponent::new(actor, plan, local, parent, global.gravity_dir, info.weight);
                Some((depth, c))
            })
            .collect();
        placed.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.node().cmp(b.node())));

        let mut object = Self {
            actor,
            name: info.name.clone(),
            persistent_id: info.persistent_id.clone(),
            weight: info.weight,
            components: placed.into_iter().map(|(_, c)| c).collect(),
            index: HashMap::new(),
            parents: Vec::new(),
            planned: plans.iter().map(|p| p.node.clone()).collect(),
            bc_generation: bonecast.generation(),
        };
        object.reindex();
        object.read_transforms(host, 0.0);
        object.update_colliders(host, bonecast);

        log::debug!("[Sim] {} '{}': {} 个组件", actor, object.name, object.components.len());
        object
    }

    fn reindex(&mut self) {
        self.index = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.node().to_string(), i))
            .collect();
        self.parents = self
            .components
            .iter()
            .map(|c| c.parent_node().and_then(|p| self.index.get(p).copied()))
            .collect();
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn actor(&self) -> ActorHandle {
        self.actor
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[inline]
    pub fn components(&self) -> &[SimComponent] {
        &self.components
    }

    pub fn component(&self, node: &str) -> Option<&SimComponent> {
        self.index.get(node).map(|&i| &self.components[i])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// 当前节点集合与计划是否一致
    pub fn matches_plan(&self, plans: &[NodePlan]) -> bool {
        plans.len() == self.planned.len() && plans.iter().all(|p| self.planned.contains(&p.node))
    }

    // ========================================
    // 帧
    // ========================================

    pub fn read_transforms<H: SkeletonProvider + ?Sized>(&mut self, host: &H, frame_dt: f32) {
        for c in &mut self.components {
            c.read_transforms(host);
            c.update_velocity(frame_dt);
        }
    }

    /// 推进一个子步；父组件的本步输出作为子组件的父世界变换
    pub fn update_motion(&mut self, dt: f32) {
        for i in 0..self.components.len() {
            if let Some(p) = self.parents[i] {
                let parent_world = self.components[p].output_world();
                self.components[i].set_parent_world(parent_world);
            }
            self.components[i].update_motion(dt);
        }
    }

    pub fn write_transforms<H: SkeletonProvider + ?Sized>(&self, host: &mut H) {
        for c in self.components.iter().filter(|c| c.is_valid()) {
            c.write_transforms(host);
        }
    }

    /// 把所有节点写回创建时的局部变换
    pub fn release<H: SkeletonProvider + ?Sized>(&self, host: &mut H) {
        for c in &self.components {
            c.restore(host);
        }
    }

    // ========================================
    // 配置
    // ========================================

    /// 用新计划更新已有组件
    ///
    /// 节点集合变化时返回 false，由调用方重建整个对象。
    pub fn update_config(&mut self, plans: &[NodePlan]) -> bool {
        if !self.matches_plan(plans) {
            return false;
        }
        for plan in plans {
            if let Some(&i) = self.index.get(&plan.node) {
                self.components[i].update_config(plan, self.weight);
            }
        }
        true
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
        for c in &mut self.components {
            c.set_weight(weight);
        }
    }

    pub fn set_gravity_dir(&mut self, gravity_dir: Vec3) {
        for c in &mut self.components {
            c.set_gravity_dir(gravity_dir);
        }
    }

    pub fn reset(&mut self) {
        for c in &mut self.components {
            c.reset();
        }
    }

    /// 对节点名或配置组名匹配的组件施加冲量，返回命中数
    pub fn apply_force(&mut self, component: &str, steps: u32, force: Vec3) -> Result<usize> {
        let mut hits = 0;
        for c in self.components.iter_mut().filter(|c| c.node() == component || c.config_group() == component) {
            c.apply_force(steps, force);
            hits += 1;
        }
        if hits == 0 {
            return Err(JiggleError::UnknownComponent {
                actor: self.actor,
                component: component.to_string(),
            });
        }
        Ok(hits)
    }

    // ========================================
    // 校验
    // ========================================

    /// 检查节点是否仍存在且父节点未变，返回失效数
    pub fn validate_nodes<H: SkeletonProvider + ?Sized>(&mut self, host: &H) -> usize {
        let mut invalid = 0;
        for c in &mut self.components {
            let present = host.node_local(self.actor, c.node()).is_some();
            if !present || host.node_parent(self.actor, c.node()).as_deref() != c.parent_node() {
                c.mark_invalid();
            }
            if !c.is_valid() {
                invalid += 1;
            }
        }
        invalid
    }

    /// 移除失效组件，同时丢弃它们的 BoneCast 条目，返回移除数
    pub fn remove_invalid_nodes(&mut self, bonecast: &BoneCastService) -> usize {
        let before = self.components.len();
        let persistent_id = self.persistent_id.as_deref();
        self.components.retain(|c| {
            if c.is_valid() {
                return true;
            }
            log::debug!("[Sim] {}: 移除组件 '{}'", c.actor(), c.node());
            if c.needs_bone_cast() {
                bonecast.invalidate(c.actor(), persistent_id, c.node());
            }
            false
        });
        let removed = before - self.components.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    // ========================================
    // 碰撞
    // ========================================

    /// 重建需要更新的碰撞体：配置变化，或 BoneCast 条目已被新构建替换
    pub fn update_colliders<G: GeometryProvider + ?Sized>(&mut self, geometry: &G, bonecast: &BoneCastService) {
        for c in &mut self.components {
            // 条目被淘汰（None）不算过期：碰撞体仍持有共享的网格数据
            let stale_mesh = c.needs_bone_cast()
                && matches!(bonecast.current_update_id(self.actor, c.node()), Some(id) if Some(id) != c.bc_update_id());
            if !(c.collider_dirty() || stale_mesh) {
                continue;
            }
            let bone_cast = if c.needs_bone_cast() {
                match bonecast.get(geometry, self.actor, self.persistent_id.as_deref(), c.node(), c.node_config()) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        log::debug!("[BoneCast] {}:{} {}", self.actor, c.node(), e);
                        None
                    }
                }
            } else {
                None
            };
            c.rebuild_collider(bone_cast.as_ref());
        }
        self.bc_generation = bonecast.generation();
    }

    /// 丢弃所有网格节点的 BoneCast 条目（内存与磁盘），返回处理的节点数
    pub fn invalidate_bone_casts(&self, bonecast: &BoneCastService) -> usize {
        let persistent_id = self.persistent_id.as_deref();
        self.components
            .iter()
            .filter(|c| c.needs_bone_cast())
            .map(|c| bonecast.invalidate(self.actor, persistent_id, c.node()))
            .count()
    }

    /// BoneCast 缓存有变化时才检查
    pub fn refresh_bone_casts<G: GeometryProvider + ?Sized>(&mut self, geometry: &G, bonecast: &BoneCastService) {
        let dirty = self.components.iter().any(SimComponent::collider_dirty);
        if dirty || bonecast.generation() != self.bc_generation {
            self.update_colliders(geometry, bonecast);
        }
    }

    pub fn contact_bodies(&self) -> impl Iterator<Item = (usize, ContactBody)> + '_ {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.node_config().collisions)
            .filter_map(|(i, c)| c.contact_body().map(|b| (i, b)))
    }

    pub fn set_contact_velocity(&mut self, index: usize, velocity: Vec3) {
        if let Some(c) = self.components.get_mut(index) {
            c.set_contact_velocity(velocity);
        }
    }
}

fn node_depth<H: SkeletonProvider + ?Sized>(host: &H, actor: ActorHandle, node: &str) -> usize {
    let mut depth = 0;
    let mut current = host.node_parent(actor, node);
    while let Some(p) = current {
        depth += 1;
        if depth >= MAX_DEPTH {
            break;
        }
        current = host.node_parent(actor, &p);
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeMap;
    use crate::host::mock::MockHost;
    use crate::host::NodeTransform;

    fn chain_store() -> ConfigStore {
        let map: NodeMap = [("NPC L Breast01", "Breast"), ("NPC L Breast", "Breast"), ("NPC R Breast", "Breast")]
            .into_iter()
            .map(|(n, g)| (n.to_string(), g.to_string()))
            .collect();
        ConfigStore::with_node_map(map)
    }

    fn setup() -> (MockHost, ActorHandle, ConfigStore, BoneCastService) {
        let actor = ActorHandle(7);
        let mut host = MockHost::new();
        host.add_standard_actor(actor);
        host.add_node(
            actor,
            "NPC L Breast01",
            Some("NPC L Breast"),
            NodeTransform::from_translation(Vec3::new(0.0, 3.0, 0.0)),
        );
        (host, actor, chain_store(), BoneCastService::new(usize::MAX, None))
    }

    fn build(host: &MockHost, actor: ActorHandle, store: &ConfigStore, bonecast: &BoneCastService) -> SimObject {
        let info = host.actor_info(actor).unwrap();
        let plans = plan_actor(store, actor, Some(&info));
        SimObject::build(actor, &info, &plans, host, bonecast, store.global())
    }

    #[test]
    fn test_parents_sorted_first() {
        let (host, actor, store, bc) = setup();
        let object = build(&host, actor, &store, &bc);

        let names: Vec<_> = object.components().iter().map(SimComponent::node).collect();
        assert_eq!(names, ["NPC L Breast", "NPC R Breast", "NPC L Breast01"]);
        assert_eq!(object.parents, [None, None, Some(0)]);
    }

    #[test]
    fn test_child_uses_parent_output() {
        let (host, actor, store, bc) = setup();
        let mut object = build(&host, actor, &store, &bc);
        object.apply_force("NPC L Breast", 5, Vec3::new(0.0, 0.0, 50.0)).unwrap();
        for _ in 0..5 {
            object.update_motion(1.0 / 60.0);
        }

        let parent = object.component("NPC L Breast").unwrap();
        let child = object.component("NPC L Breast01").unwrap();
        assert_eq!(child.parent_world(), parent.output_world());
        assert!(parent.output_local().translation.z > 0.0);
    }

    #[test]
    fn test_apply_force_by_group() {
        let (host, actor, store, bc) = setup();
        let mut object = build(&host, actor, &store, &bc);
        assert_eq!(object.apply_force("Breast", 2, Vec3::Z).unwrap(), 3);
        assert_eq!(object.apply_force("NPC R Breast", 2, Vec3::Z).unwrap(), 1);

        let err = object.apply_force("Belly", 2, Vec3::Z).unwrap_err();
        assert!(matches!(err, JiggleError::UnknownComponent { .. }));
    }

    #[test]
    fn test_disabled_node_not_planned() {
        let (host, actor, mut store, bc) = setup();
        let off = crate::config::NodeConfig { motion: false, collisions: false, ..Default::default() };
        store.set_global_node("NPC R Breast", off).unwrap();
        let object = build(&host, actor, &store, &bc);
        assert!(object.component("NPC R Breast").is_none());
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn test_remove_invalid_nodes() {
        let (mut host, actor, store, bc) = setup();
        let mut object = build(&host, actor, &store, &bc);

        host.remove_node(actor, "NPC L Breast01");
        assert_eq!(object.validate_nodes(&host), 1);
        assert_eq!(object.remove_invalid_nodes(&bc), 1);
        assert_eq!(object.len(), 2);
        assert!(object.component("NPC L Breast01").is_none());
        assert_eq!(object.parents, [None, None]);
    }

    #[test]
    fn test_release_restores_initial_locals() {
        let (mut host, actor, store, bc) = setup();
        let mut object = build(&host, actor, &store, &bc);
        let initial = host.node_local(actor, "NPC L Breast").unwrap();

        object.apply_force("NPC L Breast", 3, Vec3::new(0.0, 0.0, 100.0)).unwrap();
        object.update_motion(1.0 / 60.0);
        object.write_transforms(&mut host);
        assert_ne!(host.node_local(actor, "NPC L Breast").unwrap(), initial);

        object.release(&mut host);
        assert_eq!(host.node_local(actor, "NPC L Breast").unwrap(), initial);
    }

    #[test]
    fn test_update_config_detects_structure_change() {
        let (host, actor, mut store, bc) = setup();
        let mut object = build(&host, actor, &store, &bc);
        let info = host.actor_info(actor).unwrap();

        let stiff = crate::config::PhysicsConfig { stiffness: 50.0, ..Default::default() };
        store.set_actor_physics(actor, "Breast", stiff).unwrap();
        assert!(object.update_config(&plan_actor(&store, actor, Some(&info))));
        assert_eq!(object.component("NPC L Breast").unwrap().config().stiffness, 50.0);

        store.remove_node("NPC R Breast").unwrap();
        assert!(!object.update_config(&plan_actor(&store, actor, Some(&info))));
    }

    fn mesh_setup() -> (MockHost, ActorHandle, ConfigStore, BoneCastService) {
        let (mut host, actor, mut store, bc) = setup();
        host.set_geometry(actor, "NPC L Breast", "", crate::host::mock::grid_geometry(8));
        let mesh = crate::config::NodeConfig { bone_cast: true, ..Default::default() };
        store.set_global_node("NPC L Breast", mesh).unwrap();
        let conf = crate::config::PhysicsConfig { col_shape: crate::config::ShapeKind::Mesh, ..Default::default() };
        store.set_actor_physics(actor, "Breast", conf).unwrap();
        (host, actor, store, bc)
    }

    #[test]
    fn test_evicted_entry_is_not_stale() {
        let (host, actor, store, bc) = mesh_setup();
        let mut object = build(&host, actor, &store, &bc);
        assert_eq!(host.extraction_count(), 1);
        assert_eq!(object.component("NPC L Breast").unwrap().collider().kind(), Some(crate::config::ShapeKind::Mesh));

        // 上限缩到 0，条目被淘汰；碰撞体仍持有网格
        bc.set_max_size(0);
        assert!(bc.current_update_id(actor, "NPC L Breast").is_none());
        for _ in 0..3 {
            object.update_colliders(&host, &bc);
        }
        assert_eq!(host.extraction_count(), 1);
        assert_eq!(object.component("NPC L Breast").unwrap().collider().kind(), Some(crate::config::ShapeKind::Mesh));
    }

    #[test]
    fn test_newer_entry_is_picked_up() {
        let (mut host, actor, store, bc) = mesh_setup();
        let mut object = build(&host, actor, &store, &bc);
        let before = object.component("NPC L Breast").unwrap().bc_update_id();

        host.set_geometry(actor, "NPC L Breast", "", crate::host::mock::grid_geometry(4));
        let conf = object.component("NPC L Breast").unwrap().node_config().clone();
        bc.update(&host, actor, None, "NPC L Breast", &conf).unwrap();
        object.refresh_bone_casts(&host, &bc);

        let after = object.component("NPC L Breast").unwrap().bc_update_id();
        assert_ne!(before, after);
        assert_eq!(after, bc.current_update_id(actor, "NPC L Breast"));
        assert_eq!(host.extraction_count(), 2);
    }

    #[test]
    fn test_removed_node_drops_bone_cast() {
        let (mut host, actor, store, bc) = mesh_setup();
        let mut object = build(&host, actor, &store, &bc);
        assert!(bc.current_update_id(actor, "NPC L Breast").is_some());

        host.remove_node(actor, "NPC L Breast01");
        host.remove_node(actor, "NPC L Breast");
        object.validate_nodes(&host);
        assert_eq!(object.remove_invalid_nodes(&bc), 2);
        assert!(bc.current_update_id(actor, "NPC L Breast").is_none());
        assert_eq!(bc.cache_size(), 0);
    }
}
