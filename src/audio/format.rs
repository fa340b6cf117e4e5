//! 流格式与固定常量
//!
//! 设备拓扑和格式是固定的：
//! - 2 声道、32-bit float、packed、交织，每帧 8 字节
//! - 采样率 44100 / 48000，默认 48000
//! - IO 周期 480 帧（48kHz 下 10ms）
//! - Ring buffer 容量 48000 帧（默认采样率下 1 秒）

/// 支持的标称采样率
pub const SUPPORTED_SAMPLE_RATES: [f64; 2] = [44100.0, 48000.0];

/// 默认采样率
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// 采样率匹配容差
pub const SAMPLE_RATE_EPSILON: f64 = 0.1;

/// 声道数
pub const CHANNELS: usize = 2;

/// 每声道位深
pub const BITS_PER_CHANNEL: u32 = 32;

/// 每样本字节数
pub const BYTES_PER_SAMPLE: u32 = BITS_PER_CHANNEL / 8;

/// 每帧字节数
pub const BYTES_PER_FRAME: u32 = CHANNELS as u32 * BYTES_PER_SAMPLE;

/// IO 周期（帧），零时间戳按此量化
pub const FRAMES_PER_PERIOD: u32 = 480;

/// Ring buffer 容量（帧）
pub const RING_BUFFER_FRAMES: usize = 48000;

/// 延迟常量（帧）
pub const DEVICE_LATENCY_FRAMES: u32 = 0;
pub const STREAM_LATENCY_FRAMES: u32 = 0;
pub const SAFETY_OFFSET_FRAMES: u32 = 0;

const K_AUDIO_FORMAT_LINEAR_PCM: u32 = 0x6C70636D; // 'lpcm'
const K_AUDIO_FORMAT_FLAG_IS_FLOAT: u32 = 1 << 0;
const K_AUDIO_FORMAT_FLAG_IS_PACKED: u32 = 1 << 3;

/// 查找与 `rate` 匹配的支持采样率（容差内）
pub fn supported_sample_rate(rate: f64) -> Option<f64> {
    SUPPORTED_SAMPLE_RATES
        .iter()
        .copied()
        .find(|supported| (rate - supported).abs() < SAMPLE_RATE_EPSILON)
}

/// 数值范围（对应 AudioValueRange）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub minimum: f64,
    pub maximum: f64,
}

impl ValueRange {
    /// 单点范围
    pub const fn point(value: f64) -> Self {
        Self {
            minimum: value,
            maximum: value,
        }
    }
}

/// 流格式描述（对应 AudioStreamBasicDescription）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl StreamFormat {
    /// 设备唯一支持的格式：交织 packed float32
    pub fn float32_packed(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            format_id: K_AUDIO_FORMAT_LINEAR_PCM,
            format_flags: K_AUDIO_FORMAT_FLAG_IS_FLOAT | K_AUDIO_FORMAT_FLAG_IS_PACKED,
            bytes_per_packet: BYTES_PER_FRAME,
            frames_per_packet: 1,
            bytes_per_frame: BYTES_PER_FRAME,
            channels_per_frame: CHANNELS as u32,
            bits_per_channel: BITS_PER_CHANNEL,
        }
    }
}

/// 带采样率范围的格式（对应 AudioStreamRangedDescription）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangedFormat {
    pub format: StreamFormat,
    pub sample_rate_range: ValueRange,
}

/// 每个支持采样率一个描述
pub fn available_formats() -> Vec<RangedFormat> {
    SUPPORTED_SAMPLE_RATES
        .iter()
        .map(|&rate| RangedFormat {
            format: StreamFormat::float32_packed(rate),
            sample_rate_range: ValueRange::point(rate),
        })
        .collect()
}

/// 每个支持采样率一个单点范围
pub fn available_sample_rates() -> Vec<ValueRange> {
    SUPPORTED_SAMPLE_RATES
        .iter()
        .map(|&rate| ValueRange::point(rate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let format = StreamFormat::float32_packed(DEFAULT_SAMPLE_RATE);
        assert_eq!(format.bytes_per_frame, 8);
        assert_eq!(format.bytes_per_packet, format.bytes_per_frame);
        assert_eq!(format.channels_per_frame, 2);
        assert_ne!(format.format_flags & K_AUDIO_FORMAT_FLAG_IS_FLOAT, 0);
        assert_eq!(format.format_id.to_be_bytes(), *b"lpcm");
    }

    #[test]
    fn test_supported_sample_rate() {
        assert_eq!(supported_sample_rate(44100.0), Some(44100.0));
        assert_eq!(supported_sample_rate(48000.05), Some(48000.0));
        assert_eq!(supported_sample_rate(22050.0), None);
        assert_eq!(supported_sample_rate(48000.5), None);
    }

    #[test]
    fn test_available_formats_cover_rates() {
        let formats = available_formats();
        assert_eq!(formats.len(), SUPPORTED_SAMPLE_RATES.len());
        for (ranged, rate) in formats.iter().zip(SUPPORTED_SAMPLE_RATES) {
            assert_eq!(ranged.format.sample_rate, rate);
            assert_eq!(ranged.sample_rate_range, ValueRange::point(rate));
        }
    }
}
