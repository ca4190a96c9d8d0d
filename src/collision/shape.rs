//! 碰撞形状
//!
//! 封闭枚举，所有种类共用一条重建路径（to_shared_shape）。

use std::sync::Arc;

use glam::Vec3;
use rapier3d::na::Point3;
use rapier3d::parry::shape::SharedShape;

use crate::bonecast::ColliderData;
use crate::config::{ColliderParams, ShapeKind};
use crate::{JiggleError, Result};

#[derive(Clone, Debug)]
pub enum CollisionShape {
    Sphere { radius: f32 },
    Box { extent: Vec3 },
    Capsule { radius: f32, height: f32 },
    Cone { radius: f32, height: f32 },
    Cylinder { radius: f32, height: f32 },
    Tetrahedron { extent: Vec3 },
    Mesh { data: Arc<ColliderData>, extent: Vec3 },
    ConvexHull { data: Arc<ColliderData>, extent: Vec3 },
}

impl CollisionShape {
    /// 图元形状；网格类需要 BoneCast 数据
    pub fn primitive(kind: ShapeKind, params: &ColliderParams) -> Result<Self> {
        let ColliderParams { radius, height, extent, .. } = *params;
        Ok(match kind {
            ShapeKind::Sphere => Self::Sphere { radius },
            ShapeKind::Box => Self::Box { extent },
            ShapeKind::Capsule => Self::Capsule { radius, height },
            ShapeKind::Cone => Self::Cone { radius, height },
            ShapeKind::Cylinder => Self::Cylinder { radius, height },
            ShapeKind::Tetrahedron => Self::Tetrahedron { extent },
            ShapeKind::Mesh | ShapeKind::ConvexHull => return Err(JiggleError::MissingBoneCast(kind)),
        })
    }

    pub fn with_bone_cast(kind: ShapeKind, data: Arc<ColliderData>, params: &ColliderParams) -> Result<Self> {
        let extent = params.extent;
        match kind {
            ShapeKind::Mesh => Ok(Self::Mesh { data, extent }),
            ShapeKind::ConvexHull => Ok(Self::ConvexHull { data, extent }),
            _ => Self::primitive(kind, params),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Box { .. } => ShapeKind::Box,
            Self::Capsule { .. } => ShapeKind::Capsule,
            Self::Cone { .. } => ShapeKind::Cone,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::Tetrahedron { .. } => ShapeKind::Tetrahedron,
            Self::Mesh { .. } => ShapeKind::Mesh,
            Self::ConvexHull { .. } => ShapeKind::ConvexHull,
        }
    }

    pub fn bone_cast(&self) -> Option<&Arc<ColliderData>> {
        match self {
            Self::Mesh { data, .. } | Self::ConvexHull { data, .. } => Some(data),
            _ => None,
        }
    }

    // ========================================
    // 尺寸设置，返回值表示是否真的变了
    // ========================================

    pub fn set_radius(&mut self, value: f32) -> bool {
        match self {
            Self::Sphere { radius }
            | Self::Capsule { radius, .. }
            | Self::Cone { radius, .. }
            | Self::Cylinder { radius, .. } => replace_if_changed(radius, value),
            _ => false,
        }
    }

    pub fn set_height(&mut self, value: f32) -> bool {
        match self {
            Self::Capsule { height, .. } | Self::Cone { height, .. } | Self::Cylinder { height, .. } => {
                replace_if_changed(height, value)
            }
            _ => false,
        }
    }

    pub fn set_extent(&mut self, value: Vec3) -> bool {
        match self {
            Self::Box { extent }
            | Self::Tetrahedron { extent }
            | Self::Mesh { extent, .. }
            | Self::ConvexHull { extent, .. } => {
                if *extent != value {
                    *extent = value;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// 局部包围盒（中心, 半尺寸），已乘节点缩放
    ///
    /// 网格类的包围盒来自 BoneCast 数据，中心不一定在节点原点。
    pub fn local_bounds(&self, scale: f32) -> (Vec3, Vec3) {
        let (center, half) = match self {
            Self::Sphere { radius } => (Vec3::ZERO, Vec3::splat(*radius)),
            Self::Box { extent } | Self::Tetrahedron { extent } => (Vec3::ZERO, *extent),
            Self::Capsule { radius, height } => (Vec3::ZERO, Vec3::new(*radius, height * 0.5 + radius, *radius)),
            Self::Cone { radius, height } | Self::Cylinder { radius, height } => {
                (Vec3::ZERO, Vec3::new(*radius, height * 0.5, *radius))
            }
            Self::Mesh { data, extent } | Self::ConvexHull { data, extent } => {
                let center = (data.bounds_min + data.bounds_max) * 0.5 * *extent;
                (center, data.half_extent() * extent.abs())
            }
        };
        (center * scale, half * scale.abs())
    }

    /// 构建 parry 形状，scale 为节点缩放
    pub fn to_shared_shape(&self, scale: f32) -> Result<SharedShape> {
        let s = scale.max(1e-4);
        match self {
            Self::Sphere { radius } => Ok(SharedShape::ball(radius * s)),
            Self::Box { extent } => {
                let e = *extent * s;
                Ok(SharedShape::cuboid(e.x, e.y, e.z))
            }
            Self::Capsule { radius, height } => Ok(SharedShape::capsule_y(height * 0.5 * s, radius * s)),
            Self::Cone { radius, height } => Ok(SharedShape::cone(height * 0.5 * s, radius * s)),
            Self::Cylinder { radius, height } => Ok(SharedShape::cylinder(height * 0.5 * s, radius * s)),
            Self::Tetrahedron { extent } => {
                let p = |x: f32, y: f32, z: f32| {
                    let v = Vec3::new(x, y, z) * *extent * s;
                    Point3::new(v.x, v.y, v.z)
                };
                let corners = [p(1.0, 1.0, 1.0), p(1.0, -1.0, -1.0), p(-1.0, 1.0, -1.0), p(-1.0, -1.0, 1.0)];
                SharedShape::convex_hull(&corners)
                    .ok_or_else(|| JiggleError::ShapeBuild("degenerate tetrahedron".to_string()))
            }
            Self::Mesh { data, extent } => {
                if data.is_empty() {
                    return Err(JiggleError::ShapeBuild("empty mesh".to_string()));
                }
                let points = scaled_points(data, *extent * s);
                Ok(SharedShape::trimesh(points, data.triangles().collect()))
            }
            Self::ConvexHull { data, extent } => {
                let points = scaled_points(data, *extent * s);
                SharedShape::convex_hull(&points)
                    .ok_or_else(|| JiggleError::ShapeBuild("degenerate convex hull".to_string()))
            }
        }
    }
}

fn replace_if_changed(slot: &mut f32, value: f32) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

fn scaled_points(data: &ColliderData, scale: Vec3) -> Vec<Point3<f32>> {
    data.vertices
        .iter()
        .map(|v| {
            let p = *v * scale;
            Point3::new(p.x, p.y, p.z)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonecast::BuildParams;

    fn params() -> ColliderParams {
        ColliderParams { radius: 2.0, height: 4.0, extent: Vec3::ONE, offset: Vec3::ZERO }
    }

    #[test]
    fn test_mesh_requires_payload() {
        let err = CollisionShape::primitive(ShapeKind::Mesh, &params()).unwrap_err();
        assert!(matches!(err, JiggleError::MissingBoneCast(ShapeKind::Mesh)));
    }

    #[test]
    fn test_setters_report_change() {
        let mut shape = CollisionShape::primitive(ShapeKind::Capsule, &params()).unwrap();
        assert!(!shape.set_radius(2.0));
        assert!(shape.set_radius(3.0));
        assert!(!shape.set_extent(Vec3::splat(5.0)));
        assert!(shape.set_height(1.0));
    }

    #[test]
    fn test_sphere_scaled_by_node() {
        let shape = CollisionShape::primitive(ShapeKind::Sphere, &params()).unwrap();
        let built = shape.to_shared_shape(2.0).unwrap();
        assert!((built.as_ball().unwrap().radius - 4.0).abs() < 1e-6);
        assert_eq!(shape.local_bounds(2.0), (Vec3::ZERO, Vec3::splat(4.0)));
    }

    #[test]
    fn test_convex_hull_from_bone_cast() {
        let data = Arc::new(ColliderData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3],
            BuildParams::default(),
        ));
        let shape = CollisionShape::with_bone_cast(ShapeKind::ConvexHull, data, &params()).unwrap();
        assert_eq!(shape.kind(), ShapeKind::ConvexHull);
        assert!(shape.to_shared_shape(1.0).is_ok());
    }

    #[test]
    fn test_every_primitive_builds() {
        let kinds = [
            ShapeKind::Sphere,
            ShapeKind::Box,
            ShapeKind::Capsule,
            ShapeKind::Cone,
            ShapeKind::Cylinder,
            ShapeKind::Tetrahedron,
        ];
        for kind in kinds {
            let shape = CollisionShape::primitive(kind, &params()).unwrap();
            let built = shape.to_shared_shape(1.5);
            assert!(built.is_ok(), "{:?} failed to build", kind);
        }
    }

    #[test]
    fn test_tetrahedron_spans_extent() {
        let shape = CollisionShape::primitive(ShapeKind::Tetrahedron, &params()).unwrap();
        let built = shape.to_shared_shape(2.0).unwrap();
        let aabb = built.compute_local_aabb();
        assert!((aabb.maxs.x - 2.0).abs() < 1e-5);
        assert!((aabb.mins.y + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_mesh_bounds_follow_data() {
        // 数据偏在 +X 一侧，中心不在原点
        let data = Arc::new(ColliderData::new(
            vec![Vec3::new(2.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 0.0)],
            vec![0, 1, 2],
            BuildParams::default(),
        ));
        let shape = CollisionShape::with_bone_cast(ShapeKind::Mesh, data, &params()).unwrap();
        let (center, half) = shape.local_bounds(2.0);
        assert!((center - Vec3::new(6.0, 2.0, 0.0)).length() < 1e-5);
        assert!((half - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-5);
        assert!(shape.to_shared_shape(2.0).is_ok());
    }
}
