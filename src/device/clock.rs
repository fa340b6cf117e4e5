//! 零时间戳
//!
//! 宿主每个 IO 周期询问一次 (采样位置, 宿主时间) 对应关系。
//! 从锚点开始经过的时间换算成采样数，再向下量化到整周期。

use crate::audio::timing::HostClock;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// IO 会话锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockAnchor {
    /// 会话开始时的宿主时间（ticks）
    pub host_time: u64,
    /// 会话开始时的采样位置（总是 0）
    pub sample_time: u64,
}

/// 零时间戳
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroTimestamp {
    pub sample_time: f64,
    pub host_time: u64,
    pub seed: u64,
}

/// 计算 `now` 时刻的零时间戳
///
/// `now` 早于锚点时（理论上不会发生）按 0 处理，结果就是锚点本身。
pub fn zero_timestamp(
    clock: &dyn HostClock,
    now: u64,
    anchor: ClockAnchor,
    sample_rate: f64,
    frames_per_period: u32,
    seed: u64,
) -> ZeroTimestamp {
    let period = frames_per_period.max(1) as u64;

    let elapsed_ns = clock.ticks_to_nanos(now.saturating_sub(anchor.host_time));
    let elapsed_samples = elapsed_ns as f64 * sample_rate / NANOS_PER_SEC;
    let periods = (elapsed_samples / period as f64).floor() as u64;
    let quantized = periods.saturating_mul(period);

    let offset_ns = (quantized as f64 / sample_rate * NANOS_PER_SEC).round() as u64;

    ZeroTimestamp {
        sample_time: anchor.sample_time.saturating_add(quantized) as f64,
        host_time: anchor
            .host_time
            .saturating_add(clock.nanos_to_ticks(offset_ns)),
        seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::{ManualClock, TimebaseInfo};

    fn anchor(host_time: u64) -> ClockAnchor {
        ClockAnchor {
            host_time,
            sample_time: 0,
        }
    }

    #[test]
    fn test_quantized_to_period() {
        let clock = ManualClock::new(1000);
        // 25ms @ 48k = 1200 采样 → 2 个完整周期
        let now = 1000 + 25_000_000;
        let ts = zero_timestamp(&clock, now, anchor(1000), 48000.0, 480, 7);
        assert_eq!(ts.sample_time, 960.0);
        assert_eq!(ts.host_time, 1000 + 20_000_000);
        assert_eq!(ts.seed, 7);
    }

    #[test]
    fn test_within_first_period() {
        let clock = ManualClock::new(0);
        // 10ms @ 44.1k = 441 采样，不足一个周期
        let ts = zero_timestamp(&clock, 10_000_000, anchor(0), 44100.0, 480, 1);
        assert_eq!(ts.sample_time, 0.0);
        assert_eq!(ts.host_time, 0);
    }

    #[test]
    fn test_exact_boundary() {
        let clock = ManualClock::new(0);
        let ts = zero_timestamp(&clock, 20_000_000, anchor(0), 48000.0, 480, 1);
        assert_eq!(ts.sample_time, 960.0);
        assert_eq!(ts.host_time, 20_000_000);
    }

    #[test]
    fn test_now_before_anchor_saturates() {
        let clock = ManualClock::new(0);
        let ts = zero_timestamp(&clock, 10, anchor(500), 48000.0, 480, 3);
        assert_eq!(ts.sample_time, 0.0);
        assert_eq!(ts.host_time, 500);
    }

    #[test]
    fn test_non_identity_timebase() {
        // 125/3：1 tick ≈ 41.67ns，24 ticks = 1000ns
        let tb = TimebaseInfo { numer: 125, denom: 3 };
        let clock = ManualClock::with_timebase(0, tb);
        // 1 秒 = 24_000_000 ticks → 48000 采样 = 100 个周期
        let ts = zero_timestamp(&clock, 24_000_000, anchor(0), 48000.0, 480, 1);
        assert_eq!(ts.sample_time, 48000.0);
        assert_eq!(ts.host_time, 24_000_000);
    }
}
