//! 音频核心模块
//!
//! 包含：
//! - Ring Buffer: 输出流到输入流的 lock-free 帧传递
//! - Format: 固定流格式和采样率
//! - Timing: Mach 时间与宿主时钟
//! - Volume: 音量/静音
//! - Stats: 回环统计

pub mod format;
pub mod ring_buffer;
pub mod stats;
pub mod timing;
pub mod volume;

pub use format::{RangedFormat, StreamFormat, ValueRange};
pub use ring_buffer::FrameRingBuffer;
pub use stats::{LoopbackStats, StatsReport};
pub use timing::{HostClock, MachClock, ManualClock};
pub use volume::VolumeControl;
