//! BoneCast 网格构建
//!
//! 原始蒙皮几何 → 权重过滤 → 顶点去重 → 去退化 → 去未引用顶点 → QEM 边折叠简化

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use glam::{DVec3, Vec3};

use crate::config::NodeConfig;
use crate::{JiggleError, Result};

use super::geometry::{bounds, ColliderData, ColliderDataStorage};
use super::quadric::Quadric;

/// 去重时的位置量化步长
const WELD_EPSILON: f32 = 1e-4;

/// 构建参数，缓存命中时逐项比较
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildParams {
    pub weight_threshold: f32,
    pub simplify_target: f32,
    pub simplify_target_error: f32,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            weight_threshold: 0.0,
            simplify_target: 1.0,
            simplify_target_error: 0.02,
        }
    }
}

impl BuildParams {
    pub fn from_node(conf: &NodeConfig) -> Self {
        Self {
            weight_threshold: conf.bc_weight_threshold,
            simplify_target: conf.bc_simplify_target,
            simplify_target_error: conf.bc_simplify_target_error,
        }
    }
}

/// 从原始几何构建碰撞网格
pub fn build_collider_data(node: &str, raw: &ColliderDataStorage, params: &BuildParams) -> Result<ColliderData> {
    let indices = filter_by_weight(raw, params.weight_threshold);
    if indices.is_empty() {
        return Err(JiggleError::EmptyMesh { node: node.to_string() });
    }

    let (vertices, weights, indices) = weld_vertices(&raw.vertices, &raw.weights, &indices);
    let indices = remove_degenerate(&indices);
    if indices.is_empty() {
        return Err(JiggleError::EmptyMesh { node: node.to_string() });
    }
    let (vertices, weights, indices) = remove_unreferenced(&vertices, &weights, &indices);

    let (vertices, weights, indices) = if params.simplify_target < 1.0 {
        let (lo, hi) = bounds(&vertices);
        let diag = f64::from((hi - lo).length());
        let max_error = (f64::from(params.simplify_target_error) * diag).powi(2);
        let target = ((indices.len() / 3) as f64 * f64::from(params.simplify_target)).ceil() as usize;
        decimate(&vertices, &weights, &indices, target.max(1), max_error)
    } else {
        (vertices, weights, indices)
    };

    if indices.is_empty() {
        return Err(JiggleError::EmptyMesh { node: node.to_string() });
    }

    let data = ColliderData::with_weights(vertices, indices, weights, *params);
    log::debug!(
        "[BoneCast] '{}': {} -> {} 个三角形, {} 个顶点, 最小权重 {:.3}",
        node,
        raw.triangle_count(),
        data.triangle_count(),
        data.vertices.len(),
        data.min_weight().unwrap_or(0.0)
    );
    Ok(data)
}

// ============================================================================
// 预处理
// ============================================================================

/// 只保留三个顶点都受该骨骼影响且权重达标的三角形
fn filter_by_weight(raw: &ColliderDataStorage, threshold: f32) -> Vec<u32> {
    let keep = |i: u32| {
        let w = raw.weights[i as usize];
        w > 0.0 && w >= threshold
    };
    raw.indices
        .chunks_exact(3)
        .filter(|t| t.iter().all(|&i| keep(i)))
        .flatten()
        .copied()
        .collect()
}

/// 合并重合顶点（按量化坐标），同时丢掉未引用的顶点；合并后的权重取最大值
fn weld_vertices(vertices: &[Vec3], weights: &[f32], indices: &[u32]) -> (Vec<Vec3>, Vec<f32>, Vec<u32>) {
    let quantize = |v: Vec3| {
        let q = (v / WELD_EPSILON).round();
        [q.x as i64, q.y as i64, q.z as i64]
    };

    let mut lookup: HashMap<[i64; 3], u32> = HashMap::new();
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut out = Vec::new();
    let mut out_weights: Vec<f32> = Vec::new();

    let indices = indices
        .iter()
        .map(|&i| {
            *remap.entry(i).or_insert_with(|| {
                let v = vertices[i as usize];
                let w = weights[i as usize];
                let slot = *lookup.entry(quantize(v)).or_insert_with(|| {
                    out.push(v);
                    out_weights.push(w);
                    (out.len() - 1) as u32
                });
                let merged = &mut out_weights[slot as usize];
                *merged = merged.max(w);
                slot
            })
        })
        .collect();

    (out, out_weights, indices)
}

fn remove_degenerate(indices: &[u32]) -> Vec<u32> {
    indices
        .chunks_exact(3)
        .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
        .flatten()
        .copied()
        .collect()
}

/// 压缩顶点表，按首次引用顺序重新编号
fn remove_unreferenced(vertices: &[Vec3], weights: &[f32], indices: &[u32]) -> (Vec<Vec3>, Vec<f32>, Vec<u32>) {
    let mut remap = vec![u32::MAX; vertices.len()];
    let mut out = Vec::new();
    let mut out_weights = Vec::new();
    let indices = indices
        .iter()
        .map(|&i| {
            let slot = &mut remap[i as usize];
            if *slot == u32::MAX {
                out.push(vertices[i as usize]);
                out_weights.push(weights[i as usize]);
                *slot = (out.len() - 1) as u32;
            }
            *slot
        })
        .collect();
    (out, out_weights, indices)
}

// ============================================================================
// QEM 边折叠
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCollapse {
    v1: u32,
    v2: u32,
    cost: f64,
    target: DVec3,
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    // 反向比较，BinaryHeap 变成最小堆
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

struct Decimator {
    positions: Vec<DVec3>,
    weights: Vec<f32>,
    alive: Vec<bool>,
    /// 被折叠顶点 → 保留顶点
    merged_into: Vec<u32>,
    quadrics: Vec<Quadric>,
    faces: Vec<Option<[u32; 3]>>,
    vertex_faces: Vec<Vec<usize>>,
    active_faces: usize,
}

impl Decimator {
    fn new(vertices: &[Vec3], weights: &[f32], indices: &[u32]) -> Self {
        let positions: Vec<DVec3> = vertices.iter().map(|v| v.as_dvec3()).collect();
        let n = positions.len();
        let mut quadrics = vec![Quadric::default(); n];
        let mut vertex_faces = vec![Vec::new(); n];
        let mut faces = Vec::with_capacity(indices.len() / 3);

        for (fi, t) in indices.chunks_exact(3).enumerate() {
            let face = [t[0], t[1], t[2]];
            if let Some(q) = Quadric::from_triangle(
                positions[face[0] as usize],
                positions[face[1] as usize],
                positions[face[2] as usize],
            ) {
                for &v in &face {
                    quadrics[v as usize] += q;
                }
            }
            for &v in &face {
                vertex_faces[v as usize].push(fi);
            }
            faces.push(Some(face));
        }

        Self {
            positions,
            weights: weights.to_vec(),
            alive: vec![true; n],
            merged_into: (0..n as u32).collect(),
            quadrics,
            active_faces: faces.len(),
            faces,
            vertex_faces,
        }
    }

    fn resolve(&self, mut v: u32) -> u32 {
        while self.merged_into[v as usize] != v {
            v = self.merged_into[v as usize];
        }
        v
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.vertex_faces[v as usize]
            .iter()
            .filter_map(|&fi| self.faces[fi])
            .flatten()
            .filter(|&n| n != v)
            .collect()
    }

    fn candidate(&self, v1: u32, v2: u32) -> EdgeCollapse {
        let mut q = self.quadrics[v1 as usize];
        q += self.quadrics[v2 as usize];
        let midpoint = (self.positions[v1 as usize] + self.positions[v2 as usize]) * 0.5;
        let target = q.optimal_point().unwrap_or(midpoint);
        EdgeCollapse { v1, v2, cost: q.evaluate(target).max(0.0), target }
    }

    /// 两端点共享邻居超过 2 个时折叠会产生非流形
    fn is_collapse_valid(&self, v1: u32, v2: u32) -> bool {
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        n1.intersection(&n2).filter(|&&n| n != v1 && n != v2).count() <= 2
    }

    /// 折叠 v1-v2 会消失的面数（两端点共享的面）
    fn faces_removed(&self, v1: u32, v2: u32) -> usize {
        self.vertex_faces[v2 as usize]
            .iter()
            .filter_map(|&fi| self.faces[fi])
            .filter(|face| face.contains(&v1))
            .count()
    }

    /// v2 并入 v1
    fn collapse(&mut self, c: &EdgeCollapse) {
        let (v1, v2) = (c.v1, c.v2);
        self.positions[v1 as usize] = c.target;
        self.weights[v1 as usize] = (self.weights[v1 as usize] + self.weights[v2 as usize]) * 0.5;
        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize] += q2;
        self.alive[v2 as usize] = false;
        self.merged_into[v2 as usize] = v1;

        let moved = std::mem::take(&mut self.vertex_faces[v2 as usize]);
        for fi in moved {
            let Some(face) = self.faces[fi].as_mut() else {
                continue;
            };
            for idx in face.iter_mut() {
                if *idx == v2 {
                    *idx = v1;
                }
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                self.faces[fi] = None;
                self.active_faces -= 1;
            } else {
                self.vertex_faces[v1 as usize].push(fi);
            }
        }
        let faces = &self.faces;
        self.vertex_faces[v1 as usize].retain(|&fi| faces[fi].is_some());
    }

    fn finish(self) -> (Vec<Vec3>, Vec<f32>, Vec<u32>) {
        let vertices: Vec<Vec3> = self.positions.iter().map(|p| p.as_vec3()).collect();
        let indices: Vec<u32> = self.faces.iter().flatten().flatten().copied().collect();
        remove_unreferenced(&vertices, &self.weights, &indices)
    }
}

/// 折叠到 target 个三角形或无合法折叠为止
///
/// 误差超过 max_error 的折叠被拒绝，会让面数低于 target（至少 1）的折叠也被拒绝。
fn decimate(
    vertices: &[Vec3],
    weights: &[f32],
    indices: &[u32],
    target: usize,
    max_error: f64,
) -> (Vec<Vec3>, Vec<f32>, Vec<u32>) {
    let target = target.max(1);
    let mut dec = Decimator::new(vertices, weights, indices);
    if dec.active_faces <= target {
        return (vertices.to_vec(), weights.to_vec(), indices.to_vec());
    }

    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in dec.faces.iter().flatten() {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            if seen.insert((a.min(b), a.max(b))) {
                heap.push(dec.candidate(a, b));
            }
        }
    }

    let mut rejected = 0usize;
    while dec.active_faces > target {
        let Some(c) = heap.pop() else {
            break;
        };
        let v1 = dec.resolve(c.v1);
        let v2 = dec.resolve(c.v2);
        if v1 == v2 || !dec.alive[v1 as usize] || !dec.alive[v2 as usize] {
            continue;
        }
        // 队列里的代价可能已过期，按当前二次型重算
        let c = dec.candidate(v1, v2);
        let remaining = dec.active_faces.saturating_sub(dec.faces_removed(v1, v2));
        if c.cost > max_error || remaining < target || !dec.is_collapse_valid(v1, v2) {
            rejected += 1;
            continue;
        }

        dec.collapse(&c);
        for n in dec.neighbors(v1) {
            heap.push(dec.candidate(v1, n));
        }
    }

    log::trace!("[BoneCast] 简化: 剩余 {} 个面, 拒绝 {} 次坍缩", dec.active_faces, rejected);
    dec.finish()
}
