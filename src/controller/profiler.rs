//! 控制器统计（滚动平均）

use std::time::{Duration, Instant};

/// 单帧数据
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame_time: Duration,
    pub substeps: u32,
    /// 超过子步上限被丢弃的步数
    pub dropped_steps: u32,
    pub actors: usize,
    pub components: usize,
    pub contacts: usize,
}

/// 一个统计周期内的平均值
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProfilerStats {
    pub frames: u32,
    pub avg_frame_time: Duration,
    pub avg_substeps: f32,
    pub avg_actors: f32,
    pub avg_components: f32,
    pub avg_contacts: f32,
    pub dropped_steps: u64,
}

#[derive(Debug)]
pub struct Profiler {
    interval: Duration,
    period_start: Instant,

    frames: u32,
    frame_time: Duration,
    substeps: u64,
    actors: u64,
    components: u64,
    contacts: u64,
    dropped_steps: u64,

    last_frame: FrameStats,
    current: ProfilerStats,
    last_error: Option<String>,
}

impl Profiler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            period_start: Instant::now(),
            frames: 0,
            frame_time: Duration::ZERO,
            substeps: 0,
            actors: 0,
            components: 0,
            contacts: 0,
            dropped_steps: 0,
            last_frame: FrameStats::default(),
            current: ProfilerStats::default(),
            last_error: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// 记录一帧；周期结束时刷新平均值并返回 true
    pub fn record(&mut self, frame: FrameStats) -> bool {
        self.last_frame = frame;
        self.frames += 1;
        self.frame_time += frame.frame_time;
        self.substeps += u64::from(frame.substeps);
        self.actors += frame.actors as u64;
        self.components += frame.components as u64;
        self.contacts += frame.contacts as u64;
        self.dropped_steps += u64::from(frame.dropped_steps);

        if self.period_start.elapsed() < self.interval {
            return false;
        }

        let n = self.frames as f32;
        self.current = ProfilerStats {
            frames: self.frames,
            avg_frame_time: self.frame_time / self.frames,
            avg_substeps: self.substeps as f32 / n,
            avg_actors: self.actors as f32 / n,
            avg_components: self.components as f32 / n,
            avg_contacts: self.contacts as f32 / n,
            dropped_steps: self.dropped_steps,
        };

        self.period_start = Instant::now();
        self.frames = 0;
        self.frame_time = Duration::ZERO;
        self.substeps = 0;
        self.actors = 0;
        self.components = 0;
        self.contacts = 0;
        self.dropped_steps = 0;
        true
    }

    #[inline]
    pub fn last_frame(&self) -> &FrameStats {
        &self.last_frame
    }

    /// 上一个完整周期的平均值
    #[inline]
    pub fn stats(&self) -> &ProfilerStats {
        &self.current
    }

    pub fn set_last_error(&mut self, error: String) {
        self.last_error = Some(error);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_last_error(&mut self) {
        self.last_error = None;
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
