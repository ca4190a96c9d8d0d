//! 宿主接口
//!
//! 场景图 / 变换系统、蒙皮几何都由宿主提供，这里只定义契约：
//! - SkeletonProvider: 角色集合、节点世界/局部变换、写回局部变换
//! - GeometryProvider: 指定节点的蒙皮顶点、三角形与权重

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use glam::{Mat4, Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 角色句柄（宿主运行时句柄，非持久）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorHandle(pub u64);

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// 节点变换（统一缩放，与宿主节点变换一致）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NodeTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: 1.0,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self { translation, rotation, scale }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.translation)
    }

    /// 局部点 → 世界点：R * (p * s) + t
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * (p * self.scale) + self.translation
    }

    /// 世界点 → 局部点
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        let s = if self.scale.abs() > f32::EPSILON { self.scale } else { 1.0 };
        (self.rotation.inverse() * (p - self.translation)) / s
    }

    /// 父变换 ∘ 局部变换 = 子节点世界变换
    #[inline]
    pub fn mul_transform(&self, local: &NodeTransform) -> NodeTransform {
        NodeTransform {
            translation: self.transform_point(local.translation),
            rotation: (self.rotation * local.rotation).normalize(),
            scale: self.scale * local.scale,
        }
    }
}

/// 角色信息
#[derive(Clone, Debug, Default)]
pub struct ActorInfo {
    pub name: String,
    /// 跨会话稳定的标识（用于磁盘缓存键），没有则不走磁盘
    pub persistent_id: Option<String>,
    /// 种族（配置作用域）
    pub race: Option<u32>,
    /// 体重 0..=100，用于碰撞体尺寸插值
    pub weight: f32,
}

/// 蒙皮几何：三角形列表 + 每顶点到目标节点的权重
#[derive(Clone, Debug, Default)]
pub struct SkinnedGeometry {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

// ============================================================================
// 宿主契约
// ============================================================================

/// 骨骼 / 变换提供者
///
/// 在 Phase 1 查询时必须反映同一帧的姿势。
pub trait SkeletonProvider {
    /// 当前已加载且可参与模拟的角色
    fn loaded_actors(&self) -> Vec<ActorHandle>;

    fn actor_info(&self, actor: ActorHandle) -> Option<ActorInfo>;

    fn node_world(&self, actor: ActorHandle, node: &str) -> Option<NodeTransform>;

    fn node_local(&self, actor: ActorHandle, node: &str) -> Option<NodeTransform>;

    /// 父节点名称
    fn node_parent(&self, actor: ActorHandle, node: &str) -> Option<String>;

    /// 写回局部变换，节点不存在时返回 false
    fn set_node_local(&mut self, actor: ActorHandle, node: &str, local: NodeTransform) -> bool;
}

/// 蒙皮几何提供者
pub trait GeometryProvider {
    /// shape 为空字符串时表示合并角色全部网格
    fn skinned_geometry(&self, actor: ActorHandle, node: &str, shape: &str) -> Option<SkinnedGeometry>;
}

/// 控制器所需的完整宿主
pub trait SceneHost: SkeletonProvider + GeometryProvider {}

impl<T: SkeletonProvider + GeometryProvider> SceneHost for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_round_trip_point() {
        let t = NodeTransform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            2.0,
        );
        let p = Vec3::new(0.5, -1.0, 4.0);
        let back = t.inverse_transform_point(t.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }

    #[test]
    fn test_compose_matches_matrix() {
        let parent = NodeTransform::new(Vec3::new(0.0, 0.0, 10.0), Quat::from_rotation_x(0.3), 1.5);
        let local = NodeTransform::new(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_y(0.7), 1.0);
        let composed = parent.mul_transform(&local);
        let m = parent.to_matrix() * local.to_matrix();
        let p = Vec3::new(0.2, 0.3, -0.4);
        assert!((composed.transform_point(p) - m.transform_point3(p)).length() < 1e-4);
    }
}
