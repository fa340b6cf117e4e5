//! Mach 时间相关函数
//!
//! 提供 mach ticks 与纳秒之间的转换，以及设备零时间戳使用的宿主时钟抽象。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

#[cfg(target_os = "macos")]
mod mach {
    #[repr(C)]
    pub struct mach_timebase_info_t {
        pub numer: u32,
        pub denom: u32,
    }

    extern "C" {
        pub fn mach_absolute_time() -> u64;
        pub fn mach_timebase_info(info: *mut mach_timebase_info_t) -> i32;
    }
}

/// Mach timebase 信息（全局缓存，只初始化一次）
static TIMEBASE: OnceLock<TimebaseInfo> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimebaseInfo {
    pub numer: u32,
    pub denom: u32,
}

impl TimebaseInfo {
    /// 1 tick = 1 ns
    pub const IDENTITY: Self = Self { numer: 1, denom: 1 };

    #[cfg(target_os = "macos")]
    pub fn get() -> Self {
        *TIMEBASE.get_or_init(|| {
            let mut info = mach::mach_timebase_info_t { numer: 0, denom: 0 };
            let status = unsafe { mach::mach_timebase_info(&mut info) };
            if status != 0 || info.numer == 0 || info.denom == 0 {
                log::warn!("mach_timebase_info failed ({}), assuming 1/1", status);
                return Self::IDENTITY;
            }
            TimebaseInfo {
                numer: info.numer,
                denom: info.denom,
            }
        })
    }

    #[cfg(not(target_os = "macos"))]
    pub fn get() -> Self {
        *TIMEBASE.get_or_init(|| Self::IDENTITY)
    }

    /// ticks → ns，中间结果用 u128 避免溢出
    #[inline]
    pub fn ticks_to_nanos(self, ticks: u64) -> u64 {
        (ticks as u128 * self.numer as u128 / self.denom as u128) as u64
    }

    /// ns → ticks
    #[inline]
    pub fn nanos_to_ticks(self, nanos: u64) -> u64 {
        (nanos as u128 * self.denom as u128 / self.numer as u128) as u64
    }
}

/// 将 mach ticks 转换为纳秒
///
/// Intel Mac 上 timebase 通常是 1/1，Apple Silicon 上通常是 125/3 (约 41.67ns/tick)
#[inline]
pub fn mach_ticks_to_ns(ticks: u64) -> u64 {
    TimebaseInfo::get().ticks_to_nanos(ticks)
}

/// 将纳秒转换为 mach ticks
#[inline]
pub fn ns_to_mach_ticks(ns: u64) -> u64 {
    TimebaseInfo::get().nanos_to_ticks(ns)
}

/// 获取当前时间（mach ticks）
#[cfg(target_os = "macos")]
#[inline]
pub fn now_ticks() -> u64 {
    unsafe { mach::mach_absolute_time() }
}

/// 非 macOS：以进程内单调时钟的纳秒数充当 ticks（timebase 1/1）
#[cfg(not(target_os = "macos"))]
#[inline]
pub fn now_ticks() -> u64 {
    use std::time::Instant;
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}

/// 获取当前时间（纳秒）
#[inline]
pub fn now_ns() -> u64 {
    mach_ticks_to_ns(now_ticks())
}

/// 设备使用的单调宿主时钟
///
/// 零时间戳的锚点和当前时间都来自这里；测试里用 `ManualClock` 固定时间。
pub trait HostClock: Send + Sync {
    /// 当前时间（宿主 ticks）
    fn now(&self) -> u64;

    /// ticks ↔ ns 的换算比例
    fn timebase(&self) -> TimebaseInfo;

    fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        self.timebase().ticks_to_nanos(ticks)
    }

    fn nanos_to_ticks(&self, nanos: u64) -> u64 {
        self.timebase().nanos_to_ticks(nanos)
    }
}

/// 真实硬件时钟：`mach_absolute_time`
#[derive(Clone, Copy, Debug, Default)]
pub struct MachClock;

impl HostClock for MachClock {
    #[inline]
    fn now(&self) -> u64 {
        now_ticks()
    }

    #[inline]
    fn timebase(&self) -> TimebaseInfo {
        TimebaseInfo::get()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
    timebase: TimebaseInfo,
}

impl ManualClock {
    /// 1 tick = 1 ns
    pub fn new(start_ticks: u64) -> Self {
        Self::with_timebase(start_ticks, TimebaseInfo::IDENTITY)
    }

    pub fn with_timebase(start_ticks: u64, timebase: TimebaseInfo) -> Self {
        Self {
            ticks: AtomicU64::new(start_ticks),
            timebase,
        }
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn advance_nanos(&self, nanos: u64) {
        self.advance(self.timebase.nanos_to_ticks(nanos));
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn timebase(&self) -> TimebaseInfo {
        self.timebase
    }
}

impl<C: HostClock + ?Sized> HostClock for std::sync::Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn timebase(&self) -> TimebaseInfo {
        (**self).timebase()
    }
}
