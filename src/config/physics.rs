//! 物理组配置与节点配置
//!
//! PhysicsConfig 按配置组（如 "Breast"）共享，NodeConfig 按节点名。
//! 组件创建时按值拷贝，运行中的积分永远不会与配置编辑竞争。

use bitflags::bitflags;
use glam::{EulerRot, Quat, Vec3};

// ============================================================================
// 枚举 / 标志
// ============================================================================

/// 碰撞形状种类
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    #[default]
    Sphere,
    Box,
    Capsule,
    Cone,
    Cylinder,
    Tetrahedron,
    Mesh,
    ConvexHull,
}

impl ShapeKind {
    /// 是否需要 BoneCast 网格
    #[inline]
    pub fn requires_bone_cast(self) -> bool {
        matches!(self, ShapeKind::Mesh | ShapeKind::ConvexHull)
    }
}

bitflags! {
    /// 运动约束
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MotionConstraints: u32 {
        /// 按轴夹紧
        const BOX = 1 << 0;
        /// 按半径夹紧
        const SPHERE = 1 << 1;
    }
}

impl Default for MotionConstraints {
    fn default() -> Self {
        MotionConstraints::BOX
    }
}

// ============================================================================
// 物理组配置
// ============================================================================

/// 物理组配置
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    // ========== 弹簧 ==========
    /// 线性刚度
    pub stiffness: f32,
    /// 二次刚度（位移越大回拉越强）
    pub stiffness2: f32,
    /// 松弛区半径，区内弹簧不出力
    pub spring_slack_offset: f32,
    /// 松弛区外的过渡宽度，0 表示立即满力
    pub spring_slack_mag: f32,
    /// 阻尼（每秒速度衰减比例）
    pub damping: f32,
    /// 质量
    pub mass: f32,
    /// 最大速度
    pub max_velocity: f32,
    /// 二次速度阻力
    pub resistance: f32,

    // ========== 重力 ==========
    /// 沿重力方向的恒定力
    pub gravity_bias: f32,
    /// 目标点逆重力方向的抬升量
    pub gravity_correction: f32,
    /// 旋转目标的逆重力抬升量
    pub rot_gravity_correction: f32,

    // ========== 输出 ==========
    /// 重心偏移（节点局部）
    pub cog_offset: Vec3,
    /// 写回位移的逐轴倍率
    pub linear: Vec3,
    /// 运动驱动旋转的逐轴倍率，全 0 关闭
    pub rotational: Vec3,

    // ========== 运动约束 ==========
    pub motion_constraints: MotionConstraints,
    /// 约束体旋转（角度，ZYX 欧拉）
    pub constraint_rot: Vec3,
    /// 盒约束下限
    pub box_min: Vec3,
    /// 盒约束上限
    pub box_max: Vec3,
    /// 球约束中心
    pub sphere_center: Vec3,
    pub sphere_radius_min: f32,
    pub sphere_radius_max: f32,

    // ========== 碰撞体 ==========
    pub col_shape: ShapeKind,
    /// BoneCast 构建失败时使用的图元
    pub col_fallback_shape: ShapeKind,
    /// 半径（按角色体重在 min/max 之间插值，下同）
    pub col_sphere_rad_min: f32,
    pub col_sphere_rad_max: f32,
    pub col_height_min: f32,
    pub col_height_max: f32,
    pub col_extent_min: Vec3,
    pub col_extent_max: Vec3,
    pub col_offset_min: Vec3,
    pub col_offset_max: Vec3,
    /// 碰撞体旋转（角度，ZYX 欧拉）
    pub col_rot: Vec3,
    pub col_restitution: f32,
    /// 穿透修正系数
    pub col_pen_bias: f32,
    /// 穿透修正时的质量
    pub col_pen_mass: f32,
    pub col_friction: f32,
    /// 碰撞体位移跟随比例（1 = 完全跟随）
    pub col_position_scale: f32,
    /// 碰撞体旋转跟随比例
    pub col_rotation_scale: f32,
    /// 偏移以父节点为基准
    pub col_offset_parent: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            stiffness: 10.0,
            stiffness2: 10.0,
            spring_slack_offset: 0.0,
            spring_slack_mag: 0.0,
            damping: 0.95,
            mass: 1.0,
            max_velocity: 4000.0,
            resistance: 0.0,

            gravity_bias: 0.0,
            gravity_correction: 0.0,
            rot_gravity_correction: 0.0,

            cog_offset: Vec3::new(0.0, 5.0, 0.0),
            linear: Vec3::new(0.275, 0.1, 0.275),
            rotational: Vec3::ZERO,

            motion_constraints: MotionConstraints::BOX,
            constraint_rot: Vec3::ZERO,
            box_min: Vec3::splat(-20.0),
            box_max: Vec3::splat(20.0),
            sphere_center: Vec3::ZERO,
            sphere_radius_min: 0.0,
            sphere_radius_max: 20.0,

            col_shape: ShapeKind::Sphere,
            col_fallback_shape: ShapeKind::Sphere,
            col_sphere_rad_min: 4.0,
            col_sphere_rad_max: 4.0,
            col_height_min: 0.001,
            col_height_max: 0.001,
            col_extent_min: Vec3::ONE,
            col_extent_max: Vec3::ONE,
            col_offset_min: Vec3::ZERO,
            col_offset_max: Vec3::ZERO,
            col_rot: Vec3::ZERO,
            col_restitution: 0.25,
            col_pen_bias: 1.0,
            col_pen_mass: 1.0,
            col_friction: 0.0,
            col_position_scale: 1.0,
            col_rotation_scale: 1.0,
            col_offset_parent: false,
        }
    }
}

/// 角度制 ZYX 欧拉角 → 四元数（x/y/z 分量分别是绕对应轴的角度）
#[inline]
pub fn rotation_from_degrees(deg: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        deg.z.to_radians(),
        deg.y.to_radians(),
        deg.x.to_radians(),
    )
}

#[inline]
fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

#[inline]
fn finite_vec_or(v: Vec3, fallback: Vec3) -> Vec3 {
    if v.is_finite() { v } else { fallback }
}

impl PhysicsConfig {
    /// 修正退化输入，积分器假定拿到的配置都经过这里
    pub fn sanitized(mut self) -> Self {
        let d = PhysicsConfig::default();

        self.stiffness = finite_or(self.stiffness, d.stiffness).max(0.0);
        self.stiffness2 = finite_or(self.stiffness2, d.stiffness2).max(0.0);
        self.spring_slack_offset = finite_or(self.spring_slack_offset, 0.0).max(0.0);
        self.spring_slack_mag = finite_or(self.spring_slack_mag, 0.0).max(0.0);
        self.damping = finite_or(self.damping, d.damping).max(0.0);
        self.mass = finite_or(self.mass, d.mass).max(0.001);
        self.max_velocity = finite_or(self.max_velocity, d.max_velocity).max(0.0);
        self.resistance = finite_or(self.resistance, 0.0).max(0.0);
        self.gravity_bias = finite_or(self.gravity_bias, 0.0);
        self.gravity_correction = finite_or(self.gravity_correction, 0.0);
        self.rot_gravity_correction = finite_or(self.rot_gravity_correction, 0.0);

        self.cog_offset = finite_vec_or(self.cog_offset, d.cog_offset);
        self.linear = finite_vec_or(self.linear, d.linear);
        self.rotational = finite_vec_or(self.rotational, Vec3::ZERO);

        self.constraint_rot = finite_vec_or(self.constraint_rot, Vec3::ZERO);
        let (bmin, bmax) = (
            finite_vec_or(self.box_min, d.box_min),
            finite_vec_or(self.box_max, d.box_max),
        );
        self.box_min = bmin.min(bmax);
        self.box_max = bmin.max(bmax);
        self.sphere_center = finite_vec_or(self.sphere_center, Vec3::ZERO);
        let rmin = finite_or(self.sphere_radius_min, 0.0).max(0.0);
        let rmax = finite_or(self.sphere_radius_max, d.sphere_radius_max).max(0.0);
        self.sphere_radius_min = rmin.min(rmax);
        self.sphere_radius_max = rmin.max(rmax);

        self.col_sphere_rad_min = finite_or(self.col_sphere_rad_min, d.col_sphere_rad_min).max(0.001);
        self.col_sphere_rad_max = finite_or(self.col_sphere_rad_max, d.col_sphere_rad_max).max(0.001);
        self.col_height_min = finite_or(self.col_height_min, d.col_height_min).max(0.001);
        self.col_height_max = finite_or(self.col_height_max, d.col_height_max).max(0.001);
        self.col_extent_min = finite_vec_or(self.col_extent_min, Vec3::ONE).max(Vec3::splat(0.001));
        self.col_extent_max = finite_vec_or(self.col_extent_max, Vec3::ONE).max(Vec3::splat(0.001));
        self.col_offset_min = finite_vec_or(self.col_offset_min, Vec3::ZERO);
        self.col_offset_max = finite_vec_or(self.col_offset_max, Vec3::ZERO);
        self.col_rot = finite_vec_or(self.col_rot, Vec3::ZERO);
        self.col_restitution = finite_or(self.col_restitution, d.col_restitution).clamp(0.0, 1.0);
        self.col_pen_bias = finite_or(self.col_pen_bias, d.col_pen_bias).max(0.0);
        self.col_pen_mass = finite_or(self.col_pen_mass, d.col_pen_mass).max(0.001);
        self.col_friction = finite_or(self.col_friction, 0.0).clamp(0.0, 1.0);
        self.col_position_scale = finite_or(self.col_position_scale, 1.0).max(0.0);
        self.col_rotation_scale = finite_or(self.col_rotation_scale, 1.0).max(0.0);

        if self.col_fallback_shape.requires_bone_cast() {
            self.col_fallback_shape = ShapeKind::Sphere;
        }
        self
    }

    /// 按角色体重（0..=100）插值碰撞体参数
    pub fn weighted_collider(&self, weight: f32) -> ColliderParams {
        let t = (weight / 100.0).clamp(0.0, 1.0);
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        ColliderParams {
            radius: lerp(self.col_sphere_rad_min, self.col_sphere_rad_max),
            height: lerp(self.col_height_min, self.col_height_max),
            extent: self.col_extent_min.lerp(self.col_extent_max, t),
            offset: self.col_offset_min.lerp(self.col_offset_max, t),
        }
    }
}

/// 体重插值后的碰撞体尺寸
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderParams {
    pub radius: f32,
    pub height: f32,
    pub extent: Vec3,
    pub offset: Vec3,
}

// ============================================================================
// 节点配置
// ============================================================================

/// 节点配置
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// 是否弹簧驱动
    pub motion: bool,
    /// 是否参与碰撞
    pub collisions: bool,

    // ========== 节点覆盖 ==========
    pub override_position: bool,
    pub node_offset: Vec3,
    pub override_rotation: bool,
    /// 角度，ZYX 欧拉
    pub node_rot: Vec3,
    pub override_scale: bool,
    pub node_scale: f32,

    /// 叠加在组配置之上的碰撞体偏移
    pub col_offset_min: Vec3,
    pub col_offset_max: Vec3,

    // ========== BoneCast ==========
    pub bone_cast: bool,
    /// 取几何的网格名，空字符串表示全部
    pub bc_shape: String,
    /// 低于此权重的顶点被丢弃
    pub bc_weight_threshold: f32,
    /// 目标三角形比例（1 = 不简化）
    pub bc_simplify_target: f32,
    /// 简化允许误差（相对包围盒对角线）
    pub bc_simplify_target_error: f32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            motion: true,
            collisions: true,
            override_position: false,
            node_offset: Vec3::ZERO,
            override_rotation: false,
            node_rot: Vec3::ZERO,
            override_scale: false,
            node_scale: 1.0,
            col_offset_min: Vec3::ZERO,
            col_offset_max: Vec3::ZERO,
            bone_cast: false,
            bc_shape: String::new(),
            bc_weight_threshold: 0.0,
            bc_simplify_target: 1.0,
            bc_simplify_target_error: 0.02,
        }
    }
}

impl NodeConfig {
    /// 节点是否需要组件
    #[inline]
    pub fn enabled(&self) -> bool {
        self.motion || self.collisions
    }

    pub fn sanitized(mut self) -> Self {
        self.node_offset = finite_vec_or(self.node_offset, Vec3::ZERO);
        self.node_rot = finite_vec_or(self.node_rot, Vec3::ZERO);
        self.node_scale = finite_or(self.node_scale, 1.0).max(0.0);
        self.col_offset_min = finite_vec_or(self.col_offset_min, Vec3::ZERO);
        self.col_offset_max = finite_vec_or(self.col_offset_max, Vec3::ZERO);
        self.bc_weight_threshold = finite_or(self.bc_weight_threshold, 0.0).clamp(0.0, 1.0);
        self.bc_simplify_target = finite_or(self.bc_simplify_target, 1.0).clamp(0.0, 1.0);
        self.bc_simplify_target_error = finite_or(self.bc_simplify_target_error, 0.02).max(0.0);
        self
    }
}
