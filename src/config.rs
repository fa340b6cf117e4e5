//! 设备配置

use crate::audio::format::{
    supported_sample_rate, DEFAULT_SAMPLE_RATE, FRAMES_PER_PERIOD, RING_BUFFER_FRAMES,
};
use crate::error::ConfigError;

/// 回环设备配置
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// 初始标称采样率
    pub initial_sample_rate: f64,
    /// Ring buffer 容量（帧）
    pub ring_capacity_frames: usize,
    /// 零时间戳周期（帧）
    pub frames_per_period: u32,
    /// 是否 mlock 样本存储
    pub lock_memory: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            initial_sample_rate: DEFAULT_SAMPLE_RATE,
            ring_capacity_frames: RING_BUFFER_FRAMES,
            frames_per_period: FRAMES_PER_PERIOD,
            lock_memory: true,
        }
    }
}

impl DeviceConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if supported_sample_rate(self.initial_sample_rate).is_none() {
            return Err(ConfigError::UnsupportedSampleRate(self.initial_sample_rate));
        }
        if self.ring_capacity_frames == 0 {
            return Err(ConfigError::EmptyRingBuffer);
        }
        if self.frames_per_period == 0 {
            return Err(ConfigError::EmptyPeriod);
        }
        Ok(())
    }

    /// 一个周期的时长（毫秒）
    pub fn period_ms(&self) -> f64 {
        self.frames_per_period as f64 * 1000.0 / self.initial_sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DeviceConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.ring_capacity_frames, 48000);
        assert_eq!(config.frames_per_period, 480);
        assert!((config.period_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects() {
        let bad_rate = DeviceConfig {
            initial_sample_rate: 22050.0,
            ..Default::default()
        };
        assert_eq!(
            bad_rate.validate(),
            Err(ConfigError::UnsupportedSampleRate(22050.0))
        );

        let empty = DeviceConfig {
            ring_capacity_frames: 0,
            ..Default::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyRingBuffer));

        let no_period = DeviceConfig {
            frames_per_period: 0,
            ..Default::default()
        };
        assert_eq!(no_period.validate(), Err(ConfigError::EmptyPeriod));
    }
}
