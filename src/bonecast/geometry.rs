//! 蒙皮几何提取与碰撞网格数据类型

use glam::Vec3;

use crate::host::{ActorHandle, GeometryProvider};
use crate::{JiggleError, Result};

use super::builder::BuildParams;

/// 提取出的原始几何（未过滤、未简化）
///
/// 缓存同时保留它，参数变化时无需重新向宿主取几何。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColliderDataStorage {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// 每顶点到目标节点的权重，已夹到 0..=1
    pub weights: Vec<f32>,
}

impl ColliderDataStorage {
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn byte_size(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<Vec3>()
            + self.indices.len() * std::mem::size_of::<u32>()
            + self.weights.len() * std::mem::size_of::<f32>()
    }
}

/// 构建完成的碰撞网格，创建后不再修改
#[derive(Clone, Debug, PartialEq)]
pub struct ColliderData {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// 每顶点骨骼权重（去重 / 简化后合并的顶点取合并结果）
    pub weights: Vec<f32>,
    /// 构建时使用的参数
    pub params: BuildParams,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl ColliderData {
    /// 权重全部为 1
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>, params: BuildParams) -> Self {
        let weights = vec![1.0; vertices.len()];
        Self::with_weights(vertices, indices, weights, params)
    }

    pub fn with_weights(vertices: Vec<Vec3>, indices: Vec<u32>, weights: Vec<f32>, params: BuildParams) -> Self {
        debug_assert_eq!(vertices.len(), weights.len());
        let (bounds_min, bounds_max) = bounds(&vertices);
        Self { vertices, indices, weights, params, bounds_min, bounds_max }
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// 包围盒半尺寸
    #[inline]
    pub fn half_extent(&self) -> Vec3 {
        (self.bounds_max - self.bounds_min) * 0.5
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    pub fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.vertices.len() * std::mem::size_of::<Vec3>()
            + self.indices.len() * std::mem::size_of::<u32>()
            + self.weights.len() * std::mem::size_of::<f32>()
    }

    /// 权重最小值，空网格为 None
    pub fn min_weight(&self) -> Option<f32> {
        self.weights.iter().copied().reduce(f32::min)
    }
}

pub(crate) fn bounds(vertices: &[Vec3]) -> (Vec3, Vec3) {
    if vertices.is_empty() {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    vertices
        .iter()
        .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

/// 从宿主提取节点的蒙皮几何并校验
///
/// 顶点位置为节点局部空间。
pub fn extract_geometry<G: GeometryProvider + ?Sized>(
    provider: &G,
    actor: ActorHandle,
    node: &str,
    shape: &str,
) -> Result<ColliderDataStorage> {
    let geometry = provider
        .skinned_geometry(actor, node, shape)
        .ok_or_else(|| JiggleError::NoGeometry { node: node.to_string() })?;

    if geometry.indices.len() % 3 != 0 {
        return Err(JiggleError::MalformedGeometry(format!(
            "index count {} is not a multiple of 3",
            geometry.indices.len()
        )));
    }
    if geometry.weights.len() != geometry.positions.len() {
        return Err(JiggleError::MalformedGeometry(format!(
            "{} weights for {} vertices",
            geometry.weights.len(),
            geometry.positions.len()
        )));
    }
    let vertex_count = geometry.positions.len();
    if let Some(&bad) = geometry.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(JiggleError::MalformedGeometry(format!(
            "index {} out of range ({} vertices)",
            bad, vertex_count
        )));
    }
    if geometry.positions.iter().any(|p| !p.is_finite()) {
        return Err(JiggleError::MalformedGeometry("non-finite vertex position".to_string()));
    }
    if geometry.indices.is_empty() {
        return Err(JiggleError::NoGeometry { node: node.to_string() });
    }

    let weights = geometry
        .weights
        .iter()
        .map(|&w| if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 })
        .collect();

    Ok(ColliderDataStorage {
        vertices: geometry.positions,
        indices: geometry.indices,
        weights,
    })
}
