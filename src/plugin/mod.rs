//! 宿主适配层
//!
//! coreaudiod 通过 AudioServerPlugIn 驱动接口（COM 风格的函数表）调用插件。
//! 这一层只做指针检查、编组和转发，设备语义全部在 `device` 里。
//!
//! - `marshal`：属性值与 C 布局之间的转换（与平台无关，可单独测试）
//! - `driver`：函数表、工厂函数、引用计数、宿主通知（仅 macOS）

pub mod marshal;

#[cfg(target_os = "macos")]
mod driver;

#[cfg(target_os = "macos")]
pub use driver::PulseAudio_Create;

/// 插件日志子系统
pub const LOG_SUBSYSTEM: &str = "com.pulse.audio.driver";
