//! 回环统计模块
//!
//! 在 IO 回调中收集统计信息，全部是 relaxed 原子计数，无锁无分配。
//! 水位采用降频采样策略减少开销。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 水位采样间隔：每 N 次读取周期才采样一次
const SAMPLE_INTERVAL: u64 = 16;

/// 回环统计收集器
///
/// 每次 IO 会话开始时由设备重置
pub struct LoopbackStats {
    write_cycles: AtomicU64,
    read_cycles: AtomicU64,

    frames_stored: AtomicU64,
    frames_dropped: AtomicU64,
    frames_muted: AtomicU64,
    frames_fetched: AtomicU64,
    frames_padded: AtomicU64,

    overrun_count: AtomicU64,
    underrun_count: AtomicU64,

    // 水位（帧），降频采样
    water_min: AtomicUsize,
    water_max: AtomicUsize,
}

impl LoopbackStats {
    pub fn new() -> Self {
        Self {
            write_cycles: AtomicU64::new(0),
            read_cycles: AtomicU64::new(0),
            frames_stored: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_muted: AtomicU64::new(0),
            frames_fetched: AtomicU64::new(0),
            frames_padded: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            water_min: AtomicUsize::new(usize::MAX),
            water_max: AtomicUsize::new(0),
        }
    }

    /// 输出流写入一次后调用
    ///
    /// `requested` 是客户端提供的帧数，`stored` 是实际写入 ring buffer 的帧数
    #[inline]
    pub fn on_store(&self, requested: usize, stored: usize) {
        self.write_cycles.fetch_add(1, Ordering::Relaxed);
        self.frames_stored.fetch_add(stored as u64, Ordering::Relaxed);
        if stored < requested {
            self.frames_dropped
                .fetch_add((requested - stored) as u64, Ordering::Relaxed);
            self.overrun_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 输出流写入被静音/零音量丢弃
    #[inline]
    pub fn on_muted(&self, frames: usize) {
        self.write_cycles.fetch_add(1, Ordering::Relaxed);
        self.frames_muted.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// 输入流读取一次后调用
    ///
    /// `available_after` 是读取后剩余的帧数，用于水位采样
    #[inline]
    pub fn on_fetch(&self, requested: usize, fetched: usize, available_after: usize) {
        let count = self.read_cycles.fetch_add(1, Ordering::Relaxed);
        self.frames_fetched.fetch_add(fetched as u64, Ordering::Relaxed);
        if fetched < requested {
            self.frames_padded
                .fetch_add((requested - fetched) as u64, Ordering::Relaxed);
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }

        if count.is_multiple_of(SAMPLE_INTERVAL) {
            self.water_min.fetch_min(available_after, Ordering::Relaxed);
            self.water_max.fetch_max(available_after, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_stored(&self) -> u64 {
        self.frames_stored.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_fetched(&self) -> u64 {
        self.frames_fetched.load(Ordering::Relaxed)
    }

    /// 生成报告
    pub fn report(&self) -> StatsReport {
        let water_min = self.water_min.load(Ordering::Relaxed);
        let water_max = self.water_max.load(Ordering::Relaxed);

        StatsReport {
            write_cycles: self.write_cycles.load(Ordering::Relaxed),
            read_cycles: self.read_cycles.load(Ordering::Relaxed),
            frames_stored: self.frames_stored.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_muted: self.frames_muted.load(Ordering::Relaxed),
            frames_fetched: self.frames_fetched.load(Ordering::Relaxed),
            frames_padded: self.frames_padded.load(Ordering::Relaxed),
            overrun_count: self.overrun_count.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            sample_interval: SAMPLE_INTERVAL,
            water_stats: if water_min == usize::MAX {
                WaterLevelStats { min: 0, max: 0 }
            } else {
                WaterLevelStats {
                    min: water_min,
                    max: water_max,
                }
            },
        }
    }

    /// 重置统计
    pub fn reset(&self) {
        for counter in [
            &self.write_cycles,
            &self.read_cycles,
            &self.frames_stored,
            &self.frames_dropped,
            &self.frames_muted,
            &self.frames_fetched,
            &self.frames_padded,
            &self.overrun_count,
            &self.underrun_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.water_min.store(usize::MAX, Ordering::Relaxed);
        self.water_max.store(0, Ordering::Relaxed);
    }
}

impl Default for LoopbackStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub write_cycles: u64,
    pub read_cycles: u64,
    pub frames_stored: u64,
    pub frames_dropped: u64,
    pub frames_muted: u64,
    pub frames_fetched: u64,
    pub frames_padded: u64,
    pub overrun_count: u64,
    pub underrun_count: u64,
    pub sample_interval: u64,
    pub water_stats: WaterLevelStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterLevelStats {
    pub min: usize,
    pub max: usize,
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Loopback Statistics")?;
        writeln!(f, "===================")?;
        writeln!(f, "Write cycles: {}", self.write_cycles)?;
        writeln!(f, "Read cycles:  {}", self.read_cycles)?;
        writeln!(f)?;

        writeln!(f, "Output side:")?;
        writeln!(f, "  Stored:  {} frames", self.frames_stored)?;
        writeln!(f, "  Dropped: {} frames", self.frames_dropped)?;
        writeln!(f, "  Muted:   {} frames", self.frames_muted)?;
        writeln!(f)?;

        writeln!(f, "Input side:")?;
        writeln!(f, "  Fetched: {} frames", self.frames_fetched)?;
        writeln!(f, "  Padded:  {} frames", self.frames_padded)?;
        writeln!(f)?;

        writeln!(
            f,
            "Ring Buffer Water Level (every {} reads):",
            self.sample_interval
        )?;
        writeln!(f, "  Min: {} frames", self.water_stats.min)?;
        writeln!(f, "  Max: {} frames", self.water_stats.max)?;
        writeln!(f)?;

        writeln!(f, "Overruns:  {}", self.overrun_count)?;
        writeln!(f, "Underruns: {}", self.underrun_count)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_accounting() {
        let stats = LoopbackStats::new();
        stats.on_store(480, 480);
        stats.on_store(480, 100);
        stats.on_muted(480);

        let report = stats.report();
        assert_eq!(report.write_cycles, 3);
        assert_eq!(report.frames_stored, 580);
        assert_eq!(report.frames_dropped, 380);
        assert_eq!(report.frames_muted, 480);
        assert_eq!(report.overrun_count, 1);
    }

    #[test]
    fn test_fetch_accounting_and_water_level() {
        let stats = LoopbackStats::new();
        // 第 0 次采样水位
        stats.on_fetch(480, 480, 960);
        stats.on_fetch(480, 0, 0);

        let report = stats.report();
        assert_eq!(report.read_cycles, 2);
        assert_eq!(report.frames_fetched, 480);
        assert_eq!(report.frames_padded, 480);
        assert_eq!(report.underrun_count, 1);
        assert_eq!(report.water_stats, WaterLevelStats { min: 960, max: 960 });
    }

    #[test]
    fn test_reset() {
        let stats = LoopbackStats::new();
        stats.on_store(10, 5);
        stats.on_fetch(10, 5, 0);
        stats.reset();

        let report = stats.report();
        assert_eq!(report, LoopbackStats::new().report());
        assert_eq!(report.water_stats, WaterLevelStats { min: 0, max: 0 });
        assert!(report.to_string().contains("Overruns:  0"));
    }
}
