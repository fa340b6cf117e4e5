//! 错误类型
//!
//! - `HalError`: 设备/属性层返回给宿主的结果，和 Core Audio 的 OSStatus 一一对应
//! - `ConfigError`: 设备配置校验失败

use thiserror::Error;

/// Core Audio 的 OSStatus
pub type OSStatus = i32;

/// kAudioHardwareNoError
pub const NO_ERR: OSStatus = 0;

const K_AUDIO_HARDWARE_UNKNOWN_PROPERTY_ERROR: OSStatus = 0x77686F3F; // 'who?'
const K_AUDIO_HARDWARE_ILLEGAL_OPERATION_ERROR: OSStatus = 0x6E6F7065; // 'nope'
const K_AUDIO_HARDWARE_NOT_RUNNING_ERROR: OSStatus = 0x73746F70; // 'stop'
const K_AUDIO_HARDWARE_BAD_OBJECT_ERROR: OSStatus = 0x216F626A; // '!obj'
const K_AUDIO_HARDWARE_BAD_PROPERTY_SIZE_ERROR: OSStatus = 0x2173697A; // '!siz'

/// kAudioHardwareUnspecifiedError，仅用于 FFI 边界拦截到 panic 的情况
pub const K_AUDIO_HARDWARE_UNSPECIFIED_ERROR: OSStatus = 0x77686174; // 'what'

/// 设备层错误
///
/// 属性查询/设置显式返回这些结果，IO 数据路径永远不会产生错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HalError {
    /// 未知属性（选择器不在该对象的属性表里）
    #[error("unknown property")]
    UnknownProperty,
    /// 非法操作（例如不支持的采样率、只读属性）
    #[error("illegal operation")]
    IllegalOperation,
    /// 没有匹配 start 的 stop
    #[error("IO is not running")]
    NotRunning,
    /// 对象不存在（或设备尚未初始化）
    #[error("bad object")]
    BadObject,
    /// 调用方提供的缓冲区小于属性大小（仅由编组层产生）
    #[error("bad property size")]
    BadPropertySize,
}

impl HalError {
    /// 转换为 Core Audio OSStatus
    pub fn status(self) -> OSStatus {
        match self {
            Self::UnknownProperty => K_AUDIO_HARDWARE_UNKNOWN_PROPERTY_ERROR,
            Self::IllegalOperation => K_AUDIO_HARDWARE_ILLEGAL_OPERATION_ERROR,
            Self::NotRunning => K_AUDIO_HARDWARE_NOT_RUNNING_ERROR,
            Self::BadObject => K_AUDIO_HARDWARE_BAD_OBJECT_ERROR,
            Self::BadPropertySize => K_AUDIO_HARDWARE_BAD_PROPERTY_SIZE_ERROR,
        }
    }

    /// 从 OSStatus 还原（未知状态码返回 None）
    pub fn from_status(status: OSStatus) -> Option<Self> {
        match status {
            K_AUDIO_HARDWARE_UNKNOWN_PROPERTY_ERROR => Some(Self::UnknownProperty),
            K_AUDIO_HARDWARE_ILLEGAL_OPERATION_ERROR => Some(Self::IllegalOperation),
            K_AUDIO_HARDWARE_NOT_RUNNING_ERROR => Some(Self::NotRunning),
            K_AUDIO_HARDWARE_BAD_OBJECT_ERROR => Some(Self::BadObject),
            K_AUDIO_HARDWARE_BAD_PROPERTY_SIZE_ERROR => Some(Self::BadPropertySize),
            _ => None,
        }
    }
}

/// 把 `Result` 折叠成宿主需要的 OSStatus
pub fn to_status<T>(result: Result<T, HalError>) -> OSStatus {
    match result {
        Ok(_) => NO_ERR,
        Err(e) => e.status(),
    }
}

/// 设备配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz is not supported")]
    UnsupportedSampleRate(f64),
    #[error("ring buffer capacity must be at least one frame")]
    EmptyRingBuffer,
    #[error("frames per period must be non-zero")]
    EmptyPeriod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for err in [
            HalError::UnknownProperty,
            HalError::IllegalOperation,
            HalError::NotRunning,
            HalError::BadObject,
            HalError::BadPropertySize,
        ] {
            assert_eq!(HalError::from_status(err.status()), Some(err));
        }
        assert_eq!(HalError::from_status(NO_ERR), None);
    }

    #[test]
    fn test_four_char_codes() {
        assert_eq!(HalError::NotRunning.status().to_be_bytes(), *b"stop");
        assert_eq!(HalError::UnknownProperty.status().to_be_bytes(), *b"who?");
        assert_eq!(HalError::BadObject.status().to_be_bytes(), *b"!obj");
    }

    #[test]
    fn test_to_status() {
        assert_eq!(to_status(Ok::<(), HalError>(())), NO_ERR);
        assert_eq!(
            to_status::<()>(Err(HalError::IllegalOperation)),
            HalError::IllegalOperation.status()
        );
    }
}
