//! 单骨骼弹簧-阻尼模拟
//!
//! 速度在世界空间积分，位移在父节点局部空间求解和约束。
//! 虚拟点的世界位置跨子步保留，父节点移动时自然产生惯性。

use std::collections::VecDeque;

use glam::{Mat3, Quat, Vec3};

use crate::bonecast::{BoneResult, UpdateId};
use crate::collision::{Collider, ColliderPose, ContactBody};
use crate::config::{rotation_from_degrees, ColliderParams, MotionConstraints, NodeConfig, PhysicsConfig};
use crate::host::{ActorHandle, NodeTransform, SkeletonProvider};

use super::NodePlan;

/// 排队中的冲量
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impulse {
    pub force: Vec3,
    pub steps_left: u32,
}

pub struct SimComponent {
    // ========== 标识 ==========
    actor: ActorHandle,
    node: String,
    config_group: String,
    group_id: u64,
    /// 宿主中的直接父节点
    parent_node: Option<String>,

    // ========== 配置快照 ==========
    conf: PhysicsConfig,
    node_conf: NodeConfig,
    constraint_basis: Mat3,
    gravity_dir: Vec3,
    weight: f32,

    // ========== 运动状态 ==========
    velocity: Vec3,
    virtual_world: Option<Vec3>,
    displacement: Vec3,
    old_world_pos: Option<Vec3>,
    impulses: VecDeque<Impulse>,

    // ========== 变换 ==========
    /// 创建时的局部变换，释放时写回
    initial_local: NodeTransform,
    /// 叠加节点覆盖后的静止局部变换
    rest_local: NodeTransform,
    parent_world: NodeTransform,
    output_local: NodeTransform,
    valid: bool,

    collider: Collider,
    collider_dirty: bool,
}

impl SimComponent {
    pub fn new(
        actor: ActorHandle,
        plan: &NodePlan,
        initial_local: NodeTransform,
        parent_node: Option<String>,
        gravity_dir: Vec3,
        weight: f32,
    ) -> Self {
        let rest_local = rest_transform(&initial_local, &plan.node_conf);
        Self {
            actor,
            node: plan.node.clone(),
            config_group: plan.group.clone(),
            group_id: plan.group_id,
            parent_node,
            constraint_basis: Mat3::from_quat(rotation_from_degrees(plan.physics.constraint_rot)),
            conf: plan.physics.clone(),
            node_conf: plan.node_conf.clone(),
            gravity_dir,
            weight,
            velocity: Vec3::ZERO,
            virtual_world: None,
            displacement: Vec3::ZERO,
            old_world_pos: None,
            impulses: VecDeque::new(),
            initial_local,
            rest_local,
            parent_world: NodeTransform::IDENTITY,
            output_local: rest_local,
            valid: true,
            collider: Collider::new(),
            collider_dirty: true,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn actor(&self) -> ActorHandle {
        self.actor
    }

    #[inline]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[inline]
    pub fn config_group(&self) -> &str {
        &self.config_group
    }

    #[inline]
    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    #[inline]
    pub fn parent_node(&self) -> Option<&str> {
        self.parent_node.as_deref()
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.conf
    }

    #[inline]
    pub fn node_config(&self) -> &NodeConfig {
        &self.node_conf
    }

    #[inline]
    pub fn has_motion(&self) -> bool {
        self.node_conf.motion
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// 父节点局部空间中相对平衡点的位移
    #[inline]
    pub fn displacement(&self) -> Vec3 {
        self.displacement
    }

    #[inline]
    pub fn parent_world(&self) -> NodeTransform {
        self.parent_world
    }

    #[inline]
    pub fn output_local(&self) -> NodeTransform {
        self.output_local
    }

    /// 模拟后的世界变换
    #[inline]
    pub fn output_world(&self) -> NodeTransform {
        self.parent_world.mul_transform(&self.output_local)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn collider(&self) -> &Collider {
        &self.collider
    }

    pub fn pending_impulses(&self) -> &VecDeque<Impulse> {
        &self.impulses
    }

    /// 同一角色、同一非零配置组
    #[inline]
    pub fn is_same_group(&self, other: &SimComponent) -> bool {
        self.actor == other.actor && self.group_id != 0 && self.group_id == other.group_id
    }

    // ========================================
    // 帧边界
    // ========================================

    /// 读取父节点世界变换；节点或父节点消失时标记失效
    pub fn read_transforms<H: SkeletonProvider + ?Sized>(&mut self, host: &H) {
        if host.node_local(self.actor, &self.node).is_none() {
            self.valid = false;
            return;
        }
        self.parent_world = match &self.parent_node {
            Some(parent) => match host.node_world(self.actor, parent) {
                Some(t) => t,
                None => {
                    self.valid = false;
                    return;
                }
            },
            None => NodeTransform::IDENTITY,
        };
    }

    /// 父节点也是模拟组件时，用其本子步的输出替换
    #[inline]
    pub(crate) fn set_parent_world(&mut self, parent_world: NodeTransform) {
        self.parent_world = parent_world;
    }

    pub fn write_transforms<H: SkeletonProvider + ?Sized>(&self, host: &mut H) -> bool {
        host.set_node_local(self.actor, &self.node, self.output_local)
    }

    /// 写回创建时的局部变换
    pub fn restore<H: SkeletonProvider + ?Sized>(&self, host: &mut H) {
        host.set_node_local(self.actor, &self.node, self.initial_local);
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    // ========================================
    // 积分
    // ========================================

    /// 平衡点（父节点局部空间）
    fn target_local(&self) -> Vec3 {
        let up_local = self.parent_world.rotation.inverse() * -self.gravity_dir;
        self.rest_local.translation
            + self.rest_local.rotation * self.conf.cog_offset
            + up_local * self.conf.gravity_correction
    }

    /// 松弛区：|d| 不超过 offset 时弹簧不出力，之后在 mag 宽度内线性增加到满力
    fn slack_factor(&self, dist: f32) -> f32 {
        let offset = self.conf.spring_slack_offset;
        if dist <= offset {
            return if offset > 0.0 { 0.0 } else { 1.0 };
        }
        let mag = self.conf.spring_slack_mag;
        if mag > 0.0 {
            ((dist - offset) / mag).min(1.0)
        } else {
            1.0
        }
    }

    /// 推进一个子步
    pub fn update_motion(&mut self, dt: f32) {
        if !self.node_conf.motion {
            self.output_local = self.rest_local;
            self.update_collider();
            return;
        }

        let pw = self.parent_world;
        let mass = self.conf.mass;
        let target = self.target_local();
        let mut world = self.virtual_world.unwrap_or_else(|| pw.transform_point(target));

        let d = pw.inverse_transform_point(world) - target;
        let spring = -(d * self.conf.stiffness + d * d.abs() * self.conf.stiffness2) * self.slack_factor(d.length());
        let force = pw.rotation * spring + self.gravity_dir * (self.conf.gravity_bias * mass);

        self.velocity += force * (dt / mass);

        if let Some(imp) = self.impulses.front_mut() {
            self.velocity += imp.force / mass;
            imp.steps_left -= 1;
            if imp.steps_left == 0 {
                self.impulses.pop_front();
            }
        }

        self.velocity *= (1.0 - self.conf.damping * dt).max(0.0);
        if self.conf.resistance > 0.0 {
            self.velocity *= 1.0 / (1.0 + self.conf.resistance * self.velocity.length() * dt);
        }
        self.velocity = self.velocity.clamp_length_max(self.conf.max_velocity);

        world += self.velocity * dt;

        let free = pw.inverse_transform_point(world) - target;
        let constrained = self.constrain_motion(free);
        if constrained != free {
            world = pw.transform_point(target + constrained);
            // 去掉指向约束外侧的速度分量
            if let Some(n) = (pw.rotation * (constrained - free)).try_normalize() {
                let vn = self.velocity.dot(n);
                if vn < 0.0 {
                    self.velocity -= n * vn;
                }
            }
        }

        self.virtual_world = Some(world);
        self.displacement = constrained;
        self.update_output();
        self.update_collider();
    }

    fn constrain_motion(&self, d: Vec3) -> Vec3 {
        let mut d = d;
        if self.conf.motion_constraints.contains(MotionConstraints::BOX) {
            d = self.constrain_motion_box(d);
        }
        if self.conf.motion_constraints.contains(MotionConstraints::SPHERE) {
            d = self.constrain_motion_sphere(d);
        }
        d
    }

    /// 约束体坐标系下逐轴夹紧
    pub fn constrain_motion_box(&self, d: Vec3) -> Vec3 {
        let q = self.constraint_basis.transpose() * d;
        self.constraint_basis * q.clamp(self.conf.box_min, self.conf.box_max)
    }

    /// 约束体坐标系下把到球心的距离夹到 [rmin, rmax]
    pub fn constrain_motion_sphere(&self, d: Vec3) -> Vec3 {
        let center = self.conf.sphere_center;
        let q = self.constraint_basis.transpose() * d - center;
        let len = q.length();
        let (rmin, rmax) = (self.conf.sphere_radius_min, self.conf.sphere_radius_max);
        if len >= rmin && len <= rmax {
            return d;
        }
        let dir = if len > 1e-6 { q / len } else { Vec3::Z };
        self.constraint_basis * (dir * len.clamp(rmin, rmax) + center)
    }

    fn update_output(&mut self) {
        let d = self.displacement;
        let mut out = self.rest_local;
        out.translation = self.rest_local.translation + d * self.conf.linear;

        if self.conf.rotational != Vec3::ZERO || self.conf.rot_gravity_correction != 0.0 {
            let up_local = self.parent_world.rotation.inverse() * -self.gravity_dir;
            let from = self.rest_local.rotation * self.conf.cog_offset;
            let to = from + d * self.conf.rotational + up_local * self.conf.rot_gravity_correction;
            let axis = from.cross(to);
            if axis.length_squared() > 1e-12 {
                let swing = Quat::from_axis_angle(axis.normalize(), from.angle_between(to));
                out.rotation = (swing * self.rest_local.rotation).normalize();
            }
        }

        self.output_local = out;
    }

    /// 非运动节点：按世界位置差分求速度（每帧一次）
    pub fn update_velocity(&mut self, dt: f32) {
        if self.node_conf.motion {
            return;
        }
        let pos = self.output_world().translation;
        self.velocity = match self.old_world_pos {
            Some(old) if dt > 0.0 => (pos - old) / dt,
            _ => Vec3::ZERO,
        };
        self.old_world_pos = Some(pos);
    }

    /// 运动状态清零，保留对象与碰撞体
    pub fn reset(&mut self) {
        self.velocity = Vec3::ZERO;
        self.virtual_world = None;
        self.displacement = Vec3::ZERO;
        self.old_world_pos = None;
        self.impulses.clear();
        self.output_local = self.rest_local;
    }

    /// 在接下来 steps 个子步里每步施加一次 force
    pub fn apply_force(&mut self, steps: u32, force: Vec3) {
        if steps == 0 || !force.is_finite() {
            return;
        }
        self.impulses.push_back(Impulse { force, steps_left: steps });
    }

    // ========================================
    // 配置
    // ========================================

    /// 替换配置快照；形状种类或碰撞开关变化时需要重建碰撞体
    pub fn update_config(&mut self, plan: &NodePlan, weight: f32) {
        let shape_changed = plan.physics.col_shape != self.conf.col_shape
            || plan.physics.col_fallback_shape != self.conf.col_fallback_shape
            || plan.node_conf.collisions != self.node_conf.collisions
            || plan.node_conf.bone_cast != self.node_conf.bone_cast
            || plan.node_conf.bc_shape != self.node_conf.bc_shape
            || BoneCastKey::of(&plan.node_conf) != BoneCastKey::of(&self.node_conf);

        if plan.node_conf.motion != self.node_conf.motion {
            self.reset();
        }

        self.conf = plan.physics.clone();
        self.node_conf = plan.node_conf.clone();
        self.config_group = plan.group.clone();
        self.group_id = plan.group_id;
        self.weight = weight;
        self.constraint_basis = Mat3::from_quat(rotation_from_degrees(self.conf.constraint_rot));
        self.rest_local = rest_transform(&self.initial_local, &self.node_conf);

        if shape_changed {
            self.collider_dirty = true;
        } else {
            let params = self.collider_params();
            self.collider.configure(&self.conf, &params);
        }
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
        let params = self.collider_params();
        self.collider.configure(&self.conf, &params);
    }

    pub fn set_gravity_dir(&mut self, gravity_dir: Vec3) {
        self.gravity_dir = gravity_dir;
    }

    /// 体重插值后的碰撞体参数，叠加节点偏移
    pub fn collider_params(&self) -> ColliderParams {
        let mut params = self.conf.weighted_collider(self.weight);
        let t = (self.weight / 100.0).clamp(0.0, 1.0);
        params.offset += self.node_conf.col_offset_min.lerp(self.node_conf.col_offset_max, t);
        params
    }

    // ========================================
    // 碰撞体
    // ========================================

    /// 是否需要 BoneCast 网格
    pub fn needs_bone_cast(&self) -> bool {
        self.node_conf.collisions && self.node_conf.bone_cast && self.conf.col_shape.requires_bone_cast()
    }

    #[inline]
    pub fn collider_dirty(&self) -> bool {
        self.collider_dirty
    }

    pub fn bc_update_id(&self) -> Option<UpdateId> {
        self.collider.bc_update_id()
    }

    /// 重建碰撞体；网格形状失败时退回配置的图元
    pub fn rebuild_collider(&mut self, bone_cast: Option<&BoneResult>) {
        self.collider_dirty = false;
        if !self.node_conf.collisions {
            self.collider.destroy();
            return;
        }

        let params = self.collider_params();
        self.collider.set_should_process(true);
        if let Err(e) = self.collider.create(self.conf.col_shape, &params, bone_cast) {
            log::debug!(
                "[Collider] {}:{} {:?} 不可用 ({})，改用 {:?}",
                self.actor,
                self.node,
                self.conf.col_shape,
                e,
                self.conf.col_fallback_shape
            );
            if let Err(e) = self.collider.create(self.conf.col_fallback_shape, &params, None) {
                log::warn!("[Collider] {}:{} 备用形状创建失败: {}", self.actor, self.node, e);
                self.collider.destroy();
                return;
            }
        }
        self.collider.configure(&self.conf, &params);
        self.update_collider();
    }

    pub fn update_collider(&mut self) {
        let pose = ColliderPose {
            world: self.output_world(),
            rest: self.parent_world.mul_transform(&self.rest_local),
            parent: Some(self.parent_world),
        };
        if let Err(e) = self.collider.update(&pose) {
            log::warn!("[Collider] {}:{} 更新失败: {}", self.actor, self.node, e);
        }
    }

    pub fn contact_body(&self) -> Option<ContactBody> {
        let inv_mass = if self.node_conf.motion { 1.0 / self.conf.mass } else { 0.0 };
        ContactBody::from_collider(&self.collider, self.actor, self.group_id, self.velocity, inv_mass)
    }

    /// 接触求解后的速度写回（只影响运动节点）
    pub fn set_contact_velocity(&mut self, velocity: Vec3) {
        if self.node_conf.motion && velocity.is_finite() {
            self.velocity = velocity.clamp_length_max(self.conf.max_velocity);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_displacement(&mut self, d: Vec3) {
        let target = self.target_local();
        self.virtual_world = Some(self.parent_world.transform_point(target + d));
        self.displacement = d;
    }
}

/// 决定网格构建结果的节点参数
#[derive(PartialEq)]
struct BoneCastKey(f32, f32, f32);

impl BoneCastKey {
    fn of(conf: &NodeConfig) -> Self {
        Self(conf.bc_weight_threshold, conf.bc_simplify_target, conf.bc_simplify_target_error)
    }
}

fn rest_transform(initial: &NodeTransform, conf: &NodeConfig) -> NodeTransform {
    let mut t = *initial;
    if conf.override_position {
        t.translation += conf.node_offset;
    }
    if conf.override_rotation {
        t.rotation = (initial.rotation * rotation_from_degrees(conf.node_rot)).normalize();
    }
    if conf.override_scale {
        t.scale = conf.node_scale;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShapeKind;
    use crate::host::mock::MockHost;

    const DT: f32 = 1.0 / 60.0;

    fn plan(physics: PhysicsConfig) -> NodePlan {
        NodePlan {
            node: "NPC L Breast".to_string(),
            group: "Breast".to_string(),
            group_id: 1,
            physics,
            node_conf: NodeConfig::default(),
        }
    }

    fn component(physics: PhysicsConfig) -> SimComponent {
        SimComponent::new(ActorHandle(1), &plan(physics), NodeTransform::IDENTITY, None, Vec3::NEG_Z, 0.0)
    }

    fn wide_box() -> PhysicsConfig {
        PhysicsConfig {
            box_min: Vec3::splat(-1000.0),
            box_max: Vec3::splat(1000.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_spring_equilibrium() {
        let mut c = component(PhysicsConfig {
            stiffness: 10.0,
            stiffness2: 0.0,
            damping: 0.95,
            mass: 1.0,
            cog_offset: Vec3::ZERO,
            ..Default::default()
        });
        c.set_displacement(Vec3::new(1.0, 0.0, 0.0));

        for _ in 0..2000 {
            c.update_motion(DT);
        }
        assert!(c.displacement().length() < 1e-3);
    }

    #[test]
    fn test_velocity_clamped_every_step() {
        let mut c = component(PhysicsConfig { max_velocity: 5.0, ..wide_box() });
        c.apply_force(10, Vec3::new(0.0, 1000.0, 0.0));
        for _ in 0..100 {
            c.update_motion(DT);
            assert!(c.velocity().length() <= 5.0 + 1e-4);
        }
    }

    #[test]
    fn test_box_containment() {
        let mut c = component(PhysicsConfig {
            box_min: Vec3::splat(-2.0),
            box_max: Vec3::new(2.0, 3.0, 2.0),
            ..Default::default()
        });
        c.apply_force(20, Vec3::new(200.0, 200.0, -200.0));
        for _ in 0..60 {
            c.update_motion(DT);
            let d = c.displacement();
            assert!(d.x <= 2.0 + 1e-4 && d.y <= 3.0 + 1e-4 && d.z >= -2.0 - 1e-4);
        }
    }

    #[test]
    fn test_rotated_box_containment() {
        let mut c = component(PhysicsConfig {
            box_min: Vec3::splat(-1.0),
            box_max: Vec3::splat(1.0),
            constraint_rot: Vec3::new(0.0, 0.0, 45.0),
            ..Default::default()
        });
        c.apply_force(20, Vec3::new(300.0, 0.0, 0.0));
        let basis = Mat3::from_quat(rotation_from_degrees(Vec3::new(0.0, 0.0, 45.0)));
        for _ in 0..60 {
            c.update_motion(DT);
            let q = basis.transpose() * c.displacement();
            assert!(q.abs().max_element() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_sphere_containment() {
        let mut c = component(PhysicsConfig {
            motion_constraints: MotionConstraints::SPHERE,
            sphere_center: Vec3::new(0.0, 1.0, 0.0),
            sphere_radius_min: 0.0,
            sphere_radius_max: 3.0,
            ..Default::default()
        });
        c.apply_force(30, Vec3::new(0.0, 0.0, 300.0));
        for _ in 0..90 {
            c.update_motion(DT);
            assert!((c.displacement() - Vec3::new(0.0, 1.0, 0.0)).length() <= 3.0 + 1e-4);
        }
    }

    #[test]
    fn test_sphere_inner_radius_holds() {
        // 弹簧把点拉向原点，原点在内球之内
        let center = Vec3::new(0.0, 1.0, 0.0);
        let mut c = component(PhysicsConfig {
            motion_constraints: MotionConstraints::SPHERE,
            sphere_center: center,
            sphere_radius_min: 2.0,
            sphere_radius_max: 5.0,
            stiffness: 20.0,
            gravity_bias: 0.0,
            ..Default::default()
        });
        c.apply_force(5, Vec3::new(40.0, 0.0, 20.0));
        for _ in 0..600 {
            c.update_motion(DT);
            let r = (c.displacement() - center).length();
            assert!(r >= 2.0 - 1e-4, "inside inner radius: {}", r);
            assert!(r <= 5.0 + 1e-4, "outside outer radius: {}", r);
        }
        // 最终贴在内球面上
        assert!(((c.displacement() - center).length() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_impulse_drains_in_exact_steps() {
        let mut c = component(wide_box());
        c.apply_force(3, Vec3::new(0.0, 0.0, 10.0));
        for remaining in [2, 1] {
            c.update_motion(DT);
            assert_eq!(c.pending_impulses().front().map(|i| i.steps_left), Some(remaining));
        }
        c.update_motion(DT);
        assert!(c.pending_impulses().is_empty());
    }

    #[test]
    fn test_force_scenario() {
        let mut c = component(wide_box());
        c.apply_force(5, Vec3::new(0.0, 0.0, 100.0));

        let mut vz = Vec::new();
        for _ in 0..6 {
            c.update_motion(DT);
            vz.push(c.velocity().z);
        }

        assert!((vz[0] - 100.0 * (1.0 - 0.95 * DT)).abs() < 1e-3);
        for w in vz[..5].windows(2) {
            assert!(w[1] > w[0]);
        }
        // 冲量用完后只剩弹簧和阻尼
        assert!(vz[5] < vz[4]);
        assert!(c.pending_impulses().is_empty());
    }

    #[test]
    fn test_non_motion_velocity_from_world_delta() {
        let actor = ActorHandle(1);
        let mut host = MockHost::new();
        host.add_actor(actor, None);
        host.add_node(actor, "Root", None, NodeTransform::IDENTITY);
        host.add_node(actor, "Bone", Some("Root"), NodeTransform::IDENTITY);

        let mut p = plan(PhysicsConfig::default());
        p.node = "Bone".to_string();
        p.node_conf.motion = false;
        let mut c = SimComponent::new(actor, &p, NodeTransform::IDENTITY, Some("Root".to_string()), Vec3::NEG_Z, 0.0);

        c.read_transforms(&host);
        c.update_velocity(0.1);
        assert_eq!(c.velocity(), Vec3::ZERO);

        host.move_node(actor, "Root", NodeTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        c.read_transforms(&host);
        c.update_velocity(0.1);
        assert!((c.velocity() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);

        // 非运动节点不积分
        c.update_motion(DT);
        assert_eq!(c.output_local(), NodeTransform::IDENTITY);
    }

    #[test]
    fn test_parent_motion_creates_lag() {
        let actor = ActorHandle(1);
        let mut host = MockHost::new();
        host.add_actor(actor, None);
        host.add_node(actor, "Root", None, NodeTransform::IDENTITY);
        host.add_node(actor, "Bone", Some("Root"), NodeTransform::IDENTITY);

        let mut p = plan(wide_box());
        p.node = "Bone".to_string();
        let mut c = SimComponent::new(actor, &p, NodeTransform::IDENTITY, Some("Root".to_string()), Vec3::NEG_Z, 0.0);
        c.read_transforms(&host);
        c.update_motion(DT);

        host.move_node(actor, "Root", NodeTransform::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        c.read_transforms(&host);
        c.update_motion(DT);
        // 父节点上移，虚拟点落后 → 局部位移向下
        assert!(c.displacement().z < 0.0);
    }

    #[test]
    fn test_missing_node_marks_invalid() {
        let actor = ActorHandle(1);
        let mut host = MockHost::new();
        host.add_actor(actor, None);
        let mut c = component(PhysicsConfig::default());
        c.read_transforms(&host);
        assert!(!c.is_valid());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut c = component(wide_box());
        c.apply_force(10, Vec3::new(0.0, 0.0, 100.0));
        c.update_motion(DT);
        assert!(c.velocity().length() > 0.0);

        c.reset();
        assert_eq!(c.velocity(), Vec3::ZERO);
        assert_eq!(c.displacement(), Vec3::ZERO);
        assert!(c.pending_impulses().is_empty());
        assert_eq!(c.output_local(), NodeTransform::IDENTITY);
    }

    #[test]
    fn test_rotation_from_motion() {
        let mut c = component(PhysicsConfig { rotational: Vec3::ONE, ..wide_box() });
        c.apply_force(1, Vec3::new(100.0, 0.0, 0.0));
        c.update_motion(DT);
        assert!(c.output_local().rotation.angle_between(Quat::IDENTITY) > 1e-3);
    }

    #[test]
    fn test_mesh_collider_falls_back_to_primitive() {
        let mut c = component(PhysicsConfig { col_shape: ShapeKind::Mesh, ..Default::default() });
        c.rebuild_collider(None);
        assert_eq!(c.collider().kind(), Some(ShapeKind::Sphere));
        assert!(c.collider().is_active());
    }

    #[test]
    fn test_same_group() {
        let a = component(PhysicsConfig::default());
        let mut p = plan(PhysicsConfig::default());
        p.node = "NPC R Breast".to_string();
        let b = SimComponent::new(ActorHandle(1), &p, NodeTransform::IDENTITY, None, Vec3::NEG_Z, 0.0);
        let other = SimComponent::new(ActorHandle(2), &p, NodeTransform::IDENTITY, None, Vec3::NEG_Z, 0.0);
        assert!(a.is_same_group(&b));
        assert!(!a.is_same_group(&other));
    }
}
