//! 系统音频边界
//!
//! 辅助命令行需要的操作系统查询：默认输出设备、设备列表、聚合设备的创建与销毁。
//! `AudioSystem` 把这些调用抽象出来，捕获流程 (`capture`) 只依赖这个 trait，
//! 测试用假实现驱动。

pub mod capture;

#[cfg(target_os = "macos")]
pub mod coreaudio;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::device::objects::DEVICE_UID;
use crate::device::selectors::FourCc;

/// 回环设备 UID
pub const LOOPBACK_UID: &str = DEVICE_UID;
/// 屏幕共享用的聚合设备
pub const AGGREGATE_UID: &str = "com.pulse.aggregate.screenshare";
pub const AGGREGATE_NAME: &str = "Pulse Screen Share";

/// 系统边界错误
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("{op} failed: OSStatus {status}")]
    Status { op: &'static str, status: i32 },

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Default output is {actual}, wanted {wanted}")]
    DefaultNotApplied { wanted: u32, actual: u32 },

    #[error("Core Audio is not available on this platform")]
    Unsupported,
}

/// 设备概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: u32,
    pub uid: String,
    pub name: String,
    pub output_streams: u32,
    pub input_streams: u32,
    /// 传输类型 four-char code
    pub transport: u32,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}  uid={}  out={} in={}  transport='{}'",
            self.id,
            self.name,
            self.uid,
            self.output_streams,
            self.input_streams,
            FourCc(self.transport)
        )
    }
}

/// 聚合设备描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub uid: String,
    pub name: String,
    /// 子设备 UID，按顺序
    pub sub_devices: Vec<String>,
    /// 时钟源子设备
    pub main_sub_device: String,
}

impl AggregateSpec {
    /// 真实输出 + 回环设备的多输出聚合，时钟跟随真实输出
    pub fn screen_share(real_uid: &str) -> Self {
        Self {
            uid: AGGREGATE_UID.to_string(),
            name: AGGREGATE_NAME.to_string(),
            sub_devices: vec![real_uid.to_string(), LOOPBACK_UID.to_string()],
            main_sub_device: real_uid.to_string(),
        }
    }
}

/// 操作系统音频查询
pub trait AudioSystem {
    /// 所有设备
    fn devices(&self) -> Result<Vec<DeviceSummary>, SystemError>;

    /// 当前默认输出设备 ID
    fn default_output_id(&self) -> Result<u32, SystemError>;

    /// 单个设备的概要
    fn device(&self, id: u32) -> Result<DeviceSummary, SystemError>;

    /// 设置默认输出（不等待、不校验）
    fn set_default_output_id(&self, id: u32) -> Result<(), SystemError>;

    /// 创建聚合设备，返回设备 ID
    fn create_aggregate(&self, spec: &AggregateSpec) -> Result<u32, SystemError>;

    fn destroy_aggregate(&self, id: u32) -> Result<(), SystemError>;

    /// 等待系统处理完上一次变更
    fn settle(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// 按 UID 查找设备
    fn find_by_uid(&self, uid: &str) -> Result<Option<u32>, SystemError> {
        Ok(self
            .devices()?
            .into_iter()
            .find(|d| d.uid == uid)
            .map(|d| d.id))
    }
}

/// 当前平台的实现
#[cfg(target_os = "macos")]
pub fn native() -> Result<Box<dyn AudioSystem>, SystemError> {
    Ok(Box::new(coreaudio::CoreAudioSystem::new()))
}

#[cfg(not(target_os = "macos"))]
pub fn native() -> Result<Box<dyn AudioSystem>, SystemError> {
    Err(SystemError::Unsupported)
}
