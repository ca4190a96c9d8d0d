//! 碰撞体生命周期
//!
//! 状态：未初始化 → 已创建 → 激活 ⇄ 未激活 → 销毁（回到未初始化）。
//! 激活必须以已创建为前提。

use bitflags::bitflags;
use glam::{Mat3, Quat, Vec3};
use rapier3d::na::{Isometry3, Point3};
use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::parry::shape::SharedShape;

use crate::bonecast::{BoneResult, UpdateId};
use crate::config::{rotation_from_degrees, ColliderParams, PhysicsConfig, ShapeKind};
use crate::host::NodeTransform;
use crate::Result;

use super::shape::CollisionShape;
use super::to_isometry;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ColliderFlags: u8 {
        const CREATED = 1 << 0;
        const ACTIVE  = 1 << 1;
        /// 期望参与处理（创建后据此激活）
        const PROCESS = 1 << 2;
    }
}

/// 接触材质
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactMaterial {
    pub restitution: f32,
    pub friction: f32,
    pub pen_bias: f32,
    pub pen_mass: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self { restitution: 0.25, friction: 0.0, pen_bias: 1.0, pen_mass: 1.0 }
    }
}

/// 更新碰撞体位姿所需的节点变换
#[derive(Clone, Copy, Debug)]
pub struct ColliderPose {
    /// 模拟后的世界变换
    pub world: NodeTransform,
    /// 动画给出的静止世界变换
    pub rest: NodeTransform,
    /// 父节点世界变换
    pub parent: Option<NodeTransform>,
}

impl ColliderPose {
    pub fn at(world: NodeTransform) -> Self {
        Self { world, rest: world, parent: None }
    }
}

#[derive(Clone)]
pub struct Collider {
    flags: ColliderFlags,
    shape: Option<CollisionShape>,
    built: Option<SharedShape>,
    dirty: bool,
    recreate_count: u32,

    node_scale: f32,
    body_offset: Vec3,
    rotation: Quat,
    position_scale: f32,
    rotation_scale: f32,
    offset_parent: bool,
    material: ContactMaterial,

    bc_update_id: Option<UpdateId>,

    /// 形状局部包围盒（中心, 半尺寸），已乘节点缩放
    local_center: Vec3,
    local_half: Vec3,

    position: Vec3,
    orientation: Quat,
}

impl Default for Collider {
    fn default() -> Self {
        Self::new()
    }
}

impl Collider {
    pub fn new() -> Self {
        Self {
            flags: ColliderFlags::empty(),
            shape: None,
            built: None,
            dirty: false,
            recreate_count: 0,
            node_scale: 1.0,
            body_offset: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            position_scale: 1.0,
            rotation_scale: 1.0,
            offset_parent: false,
            material: ContactMaterial::default(),
            bc_update_id: None,
            local_center: Vec3::ZERO,
            local_half: Vec3::ZERO,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }

    // ========================================
    // 生命周期
    // ========================================

    /// 创建形状；网格类没有 BoneCast 数据时失败，状态不变
    pub fn create(&mut self, kind: ShapeKind, params: &ColliderParams, bone_cast: Option<&BoneResult>) -> Result<()> {
        let shape = match bone_cast {
            Some(bc) if kind.requires_bone_cast() => {
                CollisionShape::with_bone_cast(kind, bc.data.clone(), params)?
            }
            _ => CollisionShape::primitive(kind, params)?,
        };
        let built = shape.to_shared_shape(self.node_scale)?;

        self.bc_update_id = bone_cast.filter(|_| kind.requires_bone_cast()).map(|bc| bc.update_id);
        self.shape = Some(shape);
        self.built = Some(built);
        self.dirty = false;
        self.recreate_count += 1;
        self.refresh_local_bounds();
        self.flags.insert(ColliderFlags::CREATED);
        if self.flags.contains(ColliderFlags::PROCESS) {
            self.flags.insert(ColliderFlags::ACTIVE);
        }
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.flags.remove(ColliderFlags::CREATED | ColliderFlags::ACTIVE);
        self.shape = None;
        self.built = None;
        self.bc_update_id = None;
        self.dirty = false;
        self.refresh_local_bounds();
    }

    pub fn set_should_process(&mut self, process: bool) {
        self.flags.set(ColliderFlags::PROCESS, process);
        let active = process && self.flags.contains(ColliderFlags::CREATED);
        self.flags.set(ColliderFlags::ACTIVE, active);
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        self.flags.contains(ColliderFlags::CREATED)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags.contains(ColliderFlags::ACTIVE)
    }

    #[inline]
    pub fn should_process(&self) -> bool {
        self.flags.contains(ColliderFlags::PROCESS)
    }

    #[inline]
    pub fn flags(&self) -> ColliderFlags {
        self.flags
    }

    pub fn kind(&self) -> Option<ShapeKind> {
        self.shape.as_ref().map(CollisionShape::kind)
    }

    pub fn bc_update_id(&self) -> Option<UpdateId> {
        self.bc_update_id
    }

    /// 形状实际重建次数
    pub fn recreate_count(&self) -> u32 {
        self.recreate_count
    }

    // ========================================
    // 参数
    // ========================================

    pub fn set_radius(&mut self, radius: f32) {
        if let Some(shape) = self.shape.as_mut() {
            self.dirty |= shape.set_radius(radius);
        }
    }

    pub fn set_height(&mut self, height: f32) {
        if let Some(shape) = self.shape.as_mut() {
            self.dirty |= shape.set_height(height);
        }
    }

    pub fn set_extent(&mut self, extent: Vec3) {
        if let Some(shape) = self.shape.as_mut() {
            self.dirty |= shape.set_extent(extent);
        }
    }

    pub fn set_node_scale(&mut self, scale: f32) {
        if self.node_scale != scale {
            self.node_scale = scale;
            self.dirty |= self.shape.is_some();
        }
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.body_offset = offset;
    }

    /// 角度，ZYX 欧拉
    pub fn set_rotation(&mut self, degrees: Vec3) {
        self.rotation = rotation_from_degrees(degrees);
    }

    /// 应用组配置与体重插值后的尺寸
    pub fn configure(&mut self, conf: &PhysicsConfig, params: &ColliderParams) {
        self.set_radius(params.radius);
        self.set_height(params.height);
        self.set_extent(params.extent);
        self.set_offset(params.offset);
        self.set_rotation(conf.col_rot);
        self.position_scale = conf.col_position_scale;
        self.rotation_scale = conf.col_rotation_scale;
        self.offset_parent = conf.col_offset_parent;
        self.material = ContactMaterial {
            restitution: conf.col_restitution,
            friction: conf.col_friction,
            pen_bias: conf.col_pen_bias,
            pen_mass: conf.col_pen_mass,
        };
    }

    #[inline]
    pub fn material(&self) -> &ContactMaterial {
        &self.material
    }

    // ========================================
    // 位姿
    // ========================================

    /// 推送最新世界变换；尺寸变化时在这里重建形状
    pub fn update(&mut self, pose: &ColliderPose) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        self.set_node_scale(pose.world.scale);
        let rebuilt = self.dirty;
        if self.dirty {
            if let Some(shape) = self.shape.as_ref() {
                let built = shape.to_shared_shape(self.node_scale)?;
                self.built = Some(built);
                self.recreate_count += 1;
            }
            self.dirty = false;
        }
        // 网格的包围盒跟随数据与 extent，每次更新重新推导
        let is_mesh = self.shape.as_ref().is_some_and(|s| s.bone_cast().is_some());
        if rebuilt || is_mesh {
            self.refresh_local_bounds();
        }

        let base = pose.rest.translation.lerp(pose.world.translation, self.position_scale);
        let rot = pose.rest.rotation.slerp(pose.world.rotation, self.rotation_scale);
        let frame = match (self.offset_parent, pose.parent) {
            (true, Some(parent)) => parent.rotation,
            _ => rot,
        };

        self.position = base + frame * (self.body_offset * pose.world.scale);
        self.orientation = (rot * self.rotation).normalize();
        Ok(())
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn isometry(&self) -> Isometry3<f32> {
        to_isometry(self.position, self.orientation)
    }

    pub fn shared_shape(&self) -> Option<&SharedShape> {
        self.built.as_ref()
    }

    pub fn shape(&self) -> Option<&CollisionShape> {
        self.shape.as_ref()
    }

    fn refresh_local_bounds(&mut self) {
        (self.local_center, self.local_half) = self
            .shape
            .as_ref()
            .map(|s| s.local_bounds(self.node_scale))
            .unwrap_or((Vec3::ZERO, Vec3::ZERO));
    }

    /// 局部包围盒半尺寸
    #[inline]
    pub fn local_half_extent(&self) -> Vec3 {
        self.local_half
    }

    /// 局部包围盒中心（相对碰撞体位置）
    #[inline]
    pub fn local_center(&self) -> Vec3 {
        self.local_center
    }

    /// 世界空间包围盒：局部盒按当前朝向旋转后取外包
    pub fn aabb(&self) -> Option<Aabb> {
        self.built.as_ref()?;
        let center = self.position + self.orientation * self.local_center;
        let half = Mat3::from_quat(self.orientation).abs() * self.local_half;
        let (lo, hi) = (center - half, center + half);
        Some(Aabb::new(Point3::new(lo.x, lo.y, lo.z), Point3::new(hi.x, hi.y, hi.z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonecast::{BuildParams, ColliderData};
    use crate::JiggleError;
    use std::sync::Arc;

    fn params() -> ColliderParams {
        PhysicsConfig::default().weighted_collider(0.0)
    }

    #[test]
    fn test_state_machine() {
        let mut c = Collider::new();
        c.set_should_process(true);
        assert!(!c.is_active());

        c.create(ShapeKind::Sphere, &params(), None).unwrap();
        assert!(c.is_created() && c.is_active());

        c.set_should_process(false);
        assert!(c.is_created() && !c.is_active());
        c.set_should_process(true);
        assert!(c.is_active());

        c.destroy();
        assert!(!c.is_created() && !c.is_active());
        // 销毁后请求处理也不会激活
        c.set_should_process(true);
        assert!(!c.is_active());
    }

    #[test]
    fn test_mesh_without_payload_falls_back() {
        let mut c = Collider::new();
        c.set_should_process(true);
        let err = c.create(ShapeKind::Mesh, &params(), None).unwrap_err();
        assert!(matches!(err, JiggleError::MissingBoneCast(ShapeKind::Mesh)));
        assert!(!c.is_created());

        c.create(ShapeKind::Sphere, &params(), None).unwrap();
        assert_eq!(c.kind(), Some(ShapeKind::Sphere));
    }

    #[test]
    fn test_mesh_with_payload() {
        let data = Arc::new(ColliderData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            BuildParams::default(),
        ));
        let bc = BoneResult { data, update_id: UpdateId { id: 3, timestamp: 0 } };
        let mut c = Collider::new();
        c.create(ShapeKind::Mesh, &params(), Some(&bc)).unwrap();
        assert_eq!(c.kind(), Some(ShapeKind::Mesh));
        assert_eq!(c.bc_update_id().map(|u| u.id), Some(3));
    }

    #[test]
    fn test_setters_are_idempotent() {
        let mut c = Collider::new();
        c.set_should_process(true);
        c.create(ShapeKind::Sphere, &params(), None).unwrap();
        let pose = ColliderPose::at(NodeTransform::IDENTITY);
        c.update(&pose).unwrap();
        let n = c.recreate_count();

        c.set_radius(params().radius);
        c.update(&pose).unwrap();
        assert_eq!(c.recreate_count(), n);

        c.set_radius(params().radius + 1.0);
        c.update(&pose).unwrap();
        assert_eq!(c.recreate_count(), n + 1);
    }

    #[test]
    fn test_pose_follows_node_with_offset() {
        let mut c = Collider::new();
        c.set_should_process(true);
        c.create(ShapeKind::Sphere, &params(), None).unwrap();
        c.set_offset(Vec3::new(0.0, 1.0, 0.0));

        let world = NodeTransform::new(
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            2.0,
        );
        c.update(&ColliderPose::at(world)).unwrap();
        // 偏移 (0,1,0) 绕 Z 转 90° → (-1,0,0)，再乘缩放 2
        assert!((c.position() - Vec3::new(8.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_position_scale_blends_toward_rest() {
        let mut c = Collider::new();
        c.set_should_process(true);
        c.create(ShapeKind::Sphere, &params(), None).unwrap();
        c.configure(
            &PhysicsConfig { col_position_scale: 0.5, ..Default::default() },
            &params(),
        );

        let pose = ColliderPose {
            world: NodeTransform::from_translation(Vec3::new(4.0, 0.0, 0.0)),
            rest: NodeTransform::IDENTITY,
            parent: None,
        };
        c.update(&pose).unwrap();
        assert!((c.position() - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_aabb_matches_rotated_box() {
        let mut c = Collider::new();
        c.set_should_process(true);
        let p = ColliderParams { extent: Vec3::new(1.0, 2.0, 3.0), ..params() };
        c.create(ShapeKind::Box, &p, None).unwrap();
        let world = NodeTransform::new(
            Vec3::new(5.0, -1.0, 2.0),
            Quat::from_euler(glam::EulerRot::ZYX, 0.4, 0.7, 0.2),
            1.5,
        );
        c.update(&ColliderPose::at(world)).unwrap();

        let ours = c.aabb().unwrap();
        let exact = c.shared_shape().unwrap().compute_aabb(&c.isometry());
        for k in 0..3 {
            assert!((ours.mins[k] - exact.mins[k]).abs() < 1e-4);
            assert!((ours.maxs[k] - exact.maxs[k]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_mesh_bounds_rederived_on_update() {
        let data = Arc::new(ColliderData::new(
            vec![Vec3::new(2.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 0.0)],
            vec![0, 1, 2],
            BuildParams::default(),
        ));
        let bc = BoneResult { data, update_id: UpdateId { id: 1, timestamp: 0 } };
        let mut c = Collider::new();
        c.set_should_process(true);
        let p = ColliderParams { extent: Vec3::ONE, ..params() };
        c.create(ShapeKind::Mesh, &p, Some(&bc)).unwrap();
        c.update(&ColliderPose::at(NodeTransform::IDENTITY)).unwrap();
        assert!((c.local_center() - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5);

        c.set_extent(Vec3::splat(2.0));
        let world = NodeTransform::from_translation(Vec3::new(0.0, 0.0, 10.0));
        c.update(&ColliderPose::at(world)).unwrap();
        assert!((c.local_center() - Vec3::new(6.0, 2.0, 0.0)).length() < 1e-5);
        assert!((c.local_half_extent() - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-5);

        let aabb = c.aabb().unwrap();
        assert!((aabb.mins.x - 4.0).abs() < 1e-5 && (aabb.maxs.x - 8.0).abs() < 1e-5);
        assert!((aabb.mins.z - 10.0).abs() < 1e-5);
    }
}
