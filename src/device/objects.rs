//! 固定对象拓扑
//!
//! 一个插件、一个设备、一个输出流、一个输入流、一个音量控制，ID 静态分配。

use super::selectors::{SCOPE_INPUT, SCOPE_OUTPUT, TERMINAL_LINE, TERMINAL_MICROPHONE};

/// kAudioObjectUnknown
pub const OBJECT_UNKNOWN: u32 = 0;
/// kAudioObjectPlugInObject
pub const PLUGIN_ID: u32 = 1;
pub const DEVICE_ID: u32 = 2;
pub const OUTPUT_STREAM_ID: u32 = 3;
pub const INPUT_STREAM_ID: u32 = 4;
pub const VOLUME_CONTROL_ID: u32 = 5;

pub const DEVICE_NAME: &str = "Pulse Audio";
pub const MANUFACTURER: &str = "Pulse";
pub const DEVICE_UID: &str = "com.pulse.audio.device";
pub const DEVICE_MODEL_UID: &str = "com.pulse.audio.device.model";
pub const VOLUME_ELEMENT_NAME: &str = "Volume";

/// 可寻址对象的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    PlugIn,
    Device,
    Stream(StreamDirection),
    VolumeControl,
}

impl ObjectKind {
    /// 根据对象 ID 查找，未知 ID 返回 None
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            PLUGIN_ID => Some(Self::PlugIn),
            DEVICE_ID => Some(Self::Device),
            OUTPUT_STREAM_ID => Some(Self::Stream(StreamDirection::Output)),
            INPUT_STREAM_ID => Some(Self::Stream(StreamDirection::Input)),
            VOLUME_CONTROL_ID => Some(Self::VolumeControl),
            _ => None,
        }
    }
}

/// 流方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// 客户端 → 设备
    Output,
    /// 设备 → 客户端
    Input,
}

impl StreamDirection {
    pub fn stream_id(self) -> u32 {
        match self {
            Self::Output => OUTPUT_STREAM_ID,
            Self::Input => INPUT_STREAM_ID,
        }
    }

    /// kAudioStreamPropertyDirection 的取值：0 输出，1 输入
    pub fn direction_value(self) -> u32 {
        match self {
            Self::Output => 0,
            Self::Input => 1,
        }
    }

    pub fn terminal_type(self) -> u32 {
        match self {
            Self::Output => TERMINAL_LINE,
            Self::Input => TERMINAL_MICROPHONE,
        }
    }

    pub fn scope(self) -> u32 {
        match self {
            Self::Output => SCOPE_OUTPUT,
            Self::Input => SCOPE_INPUT,
        }
    }
}

/// 按作用域列出设备的流：global 两个都有，output/input 各自一个
pub fn streams_for_scope(scope: u32) -> Vec<u32> {
    match scope {
        SCOPE_OUTPUT => vec![OUTPUT_STREAM_ID],
        SCOPE_INPUT => vec![INPUT_STREAM_ID],
        _ => vec![OUTPUT_STREAM_ID, INPUT_STREAM_ID],
    }
}

/// 设备拥有的全部对象
pub fn device_owned_objects() -> Vec<u32> {
    vec![OUTPUT_STREAM_ID, INPUT_STREAM_ID, VOLUME_CONTROL_ID]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::selectors::SCOPE_GLOBAL;

    #[test]
    fn test_from_id() {
        assert_eq!(ObjectKind::from_id(2), Some(ObjectKind::Device));
        assert_eq!(
            ObjectKind::from_id(4),
            Some(ObjectKind::Stream(StreamDirection::Input))
        );
        assert_eq!(ObjectKind::from_id(0), None);
        assert_eq!(ObjectKind::from_id(6), None);
    }

    #[test]
    fn test_streams_for_scope() {
        assert_eq!(streams_for_scope(SCOPE_GLOBAL), vec![3, 4]);
        assert_eq!(streams_for_scope(SCOPE_OUTPUT), vec![3]);
        assert_eq!(streams_for_scope(SCOPE_INPUT), vec![4]);
    }
}
