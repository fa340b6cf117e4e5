//! 音量控制
//!
//! 标量 [0,1] 与分贝 [-96, 0] 互为反函数；标量 0 约定为 -96 dB（静音），而不是 -∞。
//! 状态用原子量保存，IO 线程无锁读取，控制线程写入。

use std::sync::atomic::{AtomicBool, Ordering};

use atomic_float::AtomicF32;

use crate::error::HalError;

/// 分贝下限，小于等于它视为静音
pub const MIN_DB: f32 = -96.0;

/// 分贝上限
pub const MAX_DB: f32 = 0.0;

/// 标量 → 分贝
#[inline]
pub fn scalar_to_db(scalar: f32) -> f32 {
    if scalar <= 0.0 {
        MIN_DB
    } else {
        20.0 * scalar.log10()
    }
}

/// 分贝 → 标量，结果限制在 [0,1]
#[inline]
pub fn db_to_scalar(db: f32) -> f32 {
    if db <= MIN_DB {
        0.0
    } else {
        10f32.powf(db / 20.0).clamp(0.0, 1.0)
    }
}

/// 输出侧主音量 + 静音
#[derive(Debug)]
pub struct VolumeControl {
    scalar: AtomicF32,
    muted: AtomicBool,
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeControl {
    /// 初始：音量 1.0，未静音
    pub fn new() -> Self {
        Self {
            scalar: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn scalar(&self) -> f32 {
        self.scalar.load(Ordering::Relaxed)
    }

    /// 当前分贝值（由标量推导）
    #[inline]
    pub fn decibels(&self) -> f32 {
        scalar_to_db(self.scalar())
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// 设置标量音量，限制到 [0,1]，返回实际生效值
    pub fn set_scalar(&self, value: f32) -> Result<f32, HalError> {
        if value.is_nan() {
            return Err(HalError::IllegalOperation);
        }
        let clamped = value.clamp(0.0, 1.0);
        self.scalar.store(clamped, Ordering::Relaxed);
        Ok(clamped)
    }

    /// 以分贝设置音量，返回实际生效的标量
    pub fn set_decibels(&self, db: f32) -> Result<f32, HalError> {
        if db.is_nan() {
            return Err(HalError::IllegalOperation);
        }
        let scalar = db_to_scalar(db);
        self.scalar.store(scalar, Ordering::Relaxed);
        Ok(scalar)
    }

    /// 静音与标量音量互相独立
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// IO 线程调用：把音量应用到交织样本上
    ///
    /// 返回 false 表示静音或音量为 0，这一块数据应当直接丢弃。
    /// 音量为 1 时不修改样本。
    #[inline]
    pub fn apply(&self, samples: &mut [f32]) -> bool {
        if self.is_muted() {
            return false;
        }
        let gain = self.scalar();
        if gain <= 0.0 {
            return false;
        }
        if gain < 1.0 {
            for s in samples.iter_mut() {
                *s *= gain;
            }
        }
        true
    }
}
