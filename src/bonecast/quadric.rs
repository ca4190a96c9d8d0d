//! 二次误差度量（QEM）
//!
//! 对称 4x4 矩阵只存上三角 10 个值。

use std::ops::AddAssign;

use glam::{DMat3, DVec3};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Quadric {
    // [a b c d]
    // [  e f g]
    // [    h i]
    // [      j]
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    i: f64,
    j: f64,
}

impl Quadric {
    /// 平面 n·p + d = 0，n 需已归一化
    pub fn from_plane(n: DVec3, d: f64) -> Self {
        Self {
            a: n.x * n.x,
            b: n.x * n.y,
            c: n.x * n.z,
            d: n.x * d,
            e: n.y * n.y,
            f: n.y * n.z,
            g: n.y * d,
            h: n.z * n.z,
            i: n.z * d,
            j: d * d,
        }
    }

    /// 三角形所在平面，退化三角形返回 None
    pub fn from_triangle(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<Self> {
        let n = (p1 - p0).cross(p2 - p0).try_normalize()?;
        Some(Self::from_plane(n, -n.dot(p0)))
    }

    /// 点到各平面距离平方和
    pub fn evaluate(&self, p: DVec3) -> f64 {
        let DVec3 { x, y, z } = p;
        x * (self.a * x + 2.0 * (self.b * y + self.c * z + self.d))
            + y * (self.e * y + 2.0 * (self.f * z + self.g))
            + z * (self.h * z + 2.0 * self.i)
            + self.j
    }

    /// 误差最小点，矩阵奇异时返回 None
    pub fn optimal_point(&self) -> Option<DVec3> {
        let m = DMat3::from_cols(
            DVec3::new(self.a, self.b, self.c),
            DVec3::new(self.b, self.e, self.f),
            DVec3::new(self.c, self.f, self.h),
        );
        if m.determinant().abs() < 1e-10 {
            return None;
        }
        Some(m.inverse() * -DVec3::new(self.d, self.g, self.i))
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, o: Self) {
        self.a += o.a;
        self.b += o.b;
        self.c += o.c;
        self.d += o.d;
        self.e += o.e;
        self.f += o.f;
        self.g += o.g;
        self.h += o.h;
        self.i += o.i;
        self.j += o.j;
    }
}
