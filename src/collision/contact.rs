//! 接触求解
//!
//! 每个子步对所有激活碰撞体做一次两两检测（先比 AABB），
//! 穿透时按速度冲量分离：恢复系数 + 穿透修正 + 摩擦。

use glam::Vec3;
use rapier3d::na::Isometry3;
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::query;
use rapier3d::parry::shape::SharedShape;

use crate::host::ActorHandle;

use super::collider::{Collider, ContactMaterial};

/// 参与接触求解的刚体快照
#[derive(Clone)]
pub struct ContactBody {
    pub actor: ActorHandle,
    /// 配置组 ID，0 表示无组
    pub group_id: u64,
    pub shape: SharedShape,
    pub isometry: Isometry3<f32>,
    pub aabb: Aabb,
    pub material: ContactMaterial,
    /// 世界空间速度
    pub velocity: Vec3,
    /// 0 表示不可推动（非运动节点）
    pub inv_mass: f32,
}

impl ContactBody {
    /// 碰撞体未激活时返回 None
    pub fn from_collider(collider: &Collider, actor: ActorHandle, group_id: u64, velocity: Vec3, inv_mass: f32) -> Option<Self> {
        if !collider.is_active() {
            return None;
        }
        let shape = collider.shared_shape()?.clone();
        let isometry = collider.isometry();
        let aabb = collider.aabb()?;
        Some(Self {
            actor,
            group_id,
            shape,
            isometry,
            aabb,
            material: *collider.material(),
            velocity,
            inv_mass,
        })
    }

    /// 同一角色的同一配置组（例如左右对称节点）之间不碰撞
    #[inline]
    pub fn is_same_group(&self, other: &ContactBody) -> bool {
        self.actor == other.actor && self.group_id != 0 && self.group_id == other.group_id
    }
}

/// 求解所有接触，直接修改 bodies 的速度，返回接触数
pub fn resolve_contacts(bodies: &mut [ContactBody], dt: f32) -> usize {
    let dt = dt.max(1e-6);
    let mut contacts = 0;

    for i in 0..bodies.len() {
        let (head, tail) = bodies.split_at_mut(i + 1);
        let a = &mut head[i];
        for b in tail.iter_mut() {
            if a.inv_mass + b.inv_mass <= 0.0 || a.is_same_group(b) || !a.aabb.intersects(&b.aabb) {
                continue;
            }
            let contact = match query::contact(&a.isometry, &*a.shape, &b.isometry, &*b.shape, 0.0) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                // 不支持的形状组合（如网格对网格）
                Err(_) => continue,
            };
            let n = Vec3::new(contact.normal1.x, contact.normal1.y, contact.normal1.z);
            if !n.is_finite() {
                continue;
            }
            apply_impulse(a, b, n, (-contact.dist).max(0.0), dt);
            contacts += 1;
        }
    }

    contacts
}

/// n 从 a 指向 b
fn apply_impulse(a: &mut ContactBody, b: &mut ContactBody, n: Vec3, depth: f32, dt: f32) {
    let inv_sum = a.inv_mass + b.inv_mass;
    let restitution = (a.material.restitution + b.material.restitution) * 0.5;
    let friction = (a.material.friction + b.material.friction) * 0.5;
    let pen_bias = (a.material.pen_bias + b.material.pen_bias) * 0.5;
    let pen_mass = (a.material.pen_mass + b.material.pen_mass) * 0.5;

    let rel = b.velocity - a.velocity;
    let vn = rel.dot(n);

    let approach = -(1.0 + restitution) * vn.min(0.0);
    let separation = pen_bias * depth / dt / pen_mass;
    let j = (approach + separation) / inv_sum;
    if j <= 0.0 {
        return;
    }

    a.velocity -= n * (j * a.inv_mass);
    b.velocity += n * (j * b.inv_mass);

    if friction > 0.0 {
        let rel = b.velocity - a.velocity;
        let tangent = rel - n * rel.dot(n);
        let speed = tangent.length();
        if speed > 1e-6 {
            let t = tangent / speed;
            let jt = (speed / inv_sum).min(friction * j);
            a.velocity += t * (jt * a.inv_mass);
            b.velocity -= t * (jt * b.inv_mass);
        }
    }
}
