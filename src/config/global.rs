//! 全局配置
//!
//! 参数扁平化，默认值直接写在 Default 中。

use std::path::PathBuf;
use std::time::Duration;

use glam::Vec3;

/// 全局配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // ========== 模拟参数 ==========
    /// 子步时长（秒），默认 1/60
    pub time_tick: f32,
    /// 每帧最大子步数，默认 5
    pub max_substeps: u32,
    /// 是否启用碰撞，默认 true
    pub collisions: bool,
    /// 重力方向（世界空间，单位向量），默认 -Z
    pub gravity_dir: Vec3,
    /// 是否在子步内按角色并行积分，默认 true
    pub parallel: bool,

    // ========== BoneCast 缓存 ==========
    /// 缓存总字节上限，默认 64 MiB
    pub bonecast_cache_max_size: usize,
    /// 磁盘缓存目录，None 表示不持久化
    pub bonecast_cache_dir: Option<PathBuf>,

    // ========== 调试 ==========
    /// 是否周期性输出控制器统计，默认 false
    pub controller_stats: bool,
    /// 统计周期，默认 1 秒
    pub stats_interval: Duration,
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            // ====== 模拟参数 ======
            // 子步越短越稳定，但每帧成本越高
            time_tick: 1.0 / 60.0,

            // 帧时间尖峰时限制单帧最坏成本
            max_substeps: 5,

            collisions: true,

            // 宿主是 Z 轴向上
            gravity_dir: Vec3::NEG_Z,

            parallel: true,

            // ====== BoneCast 缓存 ======
            bonecast_cache_max_size: 64 * 1024 * 1024,
            bonecast_cache_dir: None,

            // ====== 调试 ======
            controller_stats: false,
            stats_interval: Duration::from_secs(1),
            debug_log: false,
        }
    }
}

impl GlobalConfig {
    /// 修正明显无效的值
    pub fn sanitized(mut self) -> Self {
        if !self.time_tick.is_finite() || self.time_tick <= 0.0 {
            self.time_tick = 1.0 / 60.0;
        }
        self.max_substeps = self.max_substeps.max(1);
        self.gravity_dir = self.gravity_dir.try_normalize().unwrap_or(Vec3::NEG_Z);
        self
    }
}
