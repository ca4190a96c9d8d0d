//! 碰撞：形状、碰撞体生命周期、接触求解
//!
//! 几何部分使用 rapier3d 重新导出的 parry。

mod collider;
mod contact;
mod shape;

pub use collider::{Collider, ColliderFlags, ColliderPose, ContactMaterial};
pub use contact::{resolve_contacts, ContactBody};
pub use shape::CollisionShape;

use glam::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion};

/// glam 位姿 → nalgebra 等距变换
pub(crate) fn to_isometry(position: Vec3, rotation: Quat) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(position.x, position.y, position.z),
        UnitQuaternion::from_quaternion(Quaternion::new(rotation.w, rotation.x, rotation.y, rotation.z)),
    )
}
