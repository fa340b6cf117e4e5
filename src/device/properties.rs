//! 属性表
//!
//! 每种对象一张固定的表：选择器 → { getter, 可选 setter }。
//! 存在性、可设置性、大小、取值、设置都从同一张表派生，
//! 大小由 getter 的取值计算，两者不会不一致。

use crate::audio::format::{
    available_formats, available_sample_rates, RangedFormat, StreamFormat, ValueRange,
    DEVICE_LATENCY_FRAMES, SAFETY_OFFSET_FRAMES, STREAM_LATENCY_FRAMES,
};
use crate::audio::volume::{MAX_DB, MIN_DB};
use crate::error::HalError;

use super::objects::{
    self, ObjectKind, StreamDirection, DEVICE_ID, OBJECT_UNKNOWN, PLUGIN_ID, VOLUME_CONTROL_ID,
};
use super::selectors::*;
use super::{LoopbackDevice, RateChange};

/// 属性值
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    U32(u32),
    F32(f32),
    F64(f64),
    ObjectList(Vec<u32>),
    /// 交给宿主时转成 CFString
    String(&'static str),
    ValueRange(ValueRange),
    ValueRanges(Vec<ValueRange>),
    Format(StreamFormat),
    RangedFormats(Vec<RangedFormat>),
    /// 空引用（例如没有图标的 CFURL）
    NullRef,
}

/// AudioValueRange
const VALUE_RANGE_SIZE: u32 = 16;
/// AudioStreamBasicDescription
const STREAM_FORMAT_SIZE: u32 = 40;
/// AudioStreamRangedDescription
const RANGED_FORMAT_SIZE: u32 = 56;
const POINTER_SIZE: u32 = std::mem::size_of::<*const ()>() as u32;

impl PropertyValue {
    /// 编组后的字节数
    pub fn byte_size(&self) -> u32 {
        match self {
            Self::U32(_) | Self::F32(_) => 4,
            Self::F64(_) => 8,
            Self::ObjectList(ids) => 4 * ids.len() as u32,
            Self::String(_) | Self::NullRef => POINTER_SIZE,
            Self::ValueRange(_) => VALUE_RANGE_SIZE,
            Self::ValueRanges(ranges) => VALUE_RANGE_SIZE * ranges.len() as u32,
            Self::Format(_) => STREAM_FORMAT_SIZE,
            Self::RangedFormats(formats) => RANGED_FORMAT_SIZE * formats.len() as u32,
        }
    }
}

/// 一次属性访问
#[derive(Debug, Clone, Copy)]
pub struct PropertyQuery<'a> {
    pub object: u32,
    pub address: PropertyAddress,
    /// 限定符（目前只有 TranslateUIDToDevice 使用，内容是 UID）
    pub qualifier: Option<&'a str>,
}

impl<'a> PropertyQuery<'a> {
    pub fn new(object: u32, address: PropertyAddress) -> Self {
        Self {
            object,
            address,
            qualifier: None,
        }
    }

    pub fn global(object: u32, selector: u32) -> Self {
        Self::new(object, PropertyAddress::global(selector))
    }

    pub fn with_qualifier(mut self, qualifier: &'a str) -> Self {
        self.qualifier = Some(qualifier);
        self
    }
}

/// 设置成功后需要通知宿主的属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChange {
    pub object: u32,
    pub address: PropertyAddress,
}

impl PropertyChange {
    pub const fn global(object: u32, selector: u32) -> Self {
        Self {
            object,
            address: PropertyAddress::global(selector),
        }
    }
}

type Getter = fn(&LoopbackDevice, &PropertyQuery<'_>) -> PropertyValue;
type Setter = fn(&LoopbackDevice, PropertyValue) -> Result<Vec<PropertyChange>, HalError>;

/// 属性表条目
pub struct PropertyEntry {
    pub selector: u32,
    pub get: Getter,
    pub set: Option<Setter>,
}

const fn ro(selector: u32, get: Getter) -> PropertyEntry {
    PropertyEntry {
        selector,
        get,
        set: None,
    }
}

const fn rw(selector: u32, get: Getter, set: Setter) -> PropertyEntry {
    PropertyEntry {
        selector,
        get,
        set: Some(set),
    }
}

fn string(value: &'static str) -> PropertyValue {
    PropertyValue::String(value)
}

fn flag(value: bool) -> PropertyValue {
    PropertyValue::U32(value as u32)
}

fn stream_direction(query: &PropertyQuery<'_>) -> StreamDirection {
    match ObjectKind::from_id(query.object) {
        Some(ObjectKind::Stream(direction)) => direction,
        _ => StreamDirection::Output,
    }
}

// ============================================================================
// PlugIn (ID 1)
// ============================================================================

static PLUGIN_PROPERTIES: [PropertyEntry; 8] = [
    ro(BASE_CLASS, |_, _| PropertyValue::U32(CLASS_OBJECT)),
    ro(CLASS, |_, _| PropertyValue::U32(CLASS_PLUGIN)),
    ro(OWNER, |_, _| PropertyValue::U32(OBJECT_UNKNOWN)),
    ro(MANUFACTURER, |_, _| string(objects::MANUFACTURER)),
    ro(OWNED_OBJECTS, |_, _| PropertyValue::ObjectList(vec![DEVICE_ID])),
    ro(PLUGIN_DEVICE_LIST, |_, _| PropertyValue::ObjectList(vec![DEVICE_ID])),
    ro(PLUGIN_RESOURCE_BUNDLE, |_, _| string("")),
    ro(PLUGIN_TRANSLATE_UID_TO_DEVICE, |_, query| {
        let id = match query.qualifier {
            Some(uid) if uid == objects::DEVICE_UID => DEVICE_ID,
            _ => OBJECT_UNKNOWN,
        };
        PropertyValue::U32(id)
    }),
];

// ============================================================================
// Device (ID 2)
// ============================================================================

static DEVICE_PROPERTIES: [PropertyEntry; 24] = [
    ro(BASE_CLASS, |_, _| PropertyValue::U32(CLASS_OBJECT)),
    ro(CLASS, |_, _| PropertyValue::U32(CLASS_DEVICE)),
    ro(OWNER, |_, _| PropertyValue::U32(PLUGIN_ID)),
    ro(NAME, |_, _| string(objects::DEVICE_NAME)),
    ro(MANUFACTURER, |_, _| string(objects::MANUFACTURER)),
    ro(OWNED_OBJECTS, |_, query| {
        let mut owned = objects::streams_for_scope(query.address.scope);
        if query.address.scope != SCOPE_INPUT {
            owned.push(VOLUME_CONTROL_ID);
        }
        PropertyValue::ObjectList(owned)
    }),
    ro(DEVICE_UID, |_, _| string(objects::DEVICE_UID)),
    ro(DEVICE_MODEL_UID, |_, _| string(objects::DEVICE_MODEL_UID)),
    ro(DEVICE_TRANSPORT_TYPE, |_, _| PropertyValue::U32(TRANSPORT_VIRTUAL)),
    ro(DEVICE_RELATED_DEVICES, |_, _| PropertyValue::ObjectList(vec![DEVICE_ID])),
    ro(DEVICE_CLOCK_DOMAIN, |_, _| PropertyValue::U32(0)),
    ro(DEVICE_IS_ALIVE, |_, _| flag(true)),
    ro(DEVICE_IS_RUNNING, |device, _| flag(device.is_running())),
    ro(DEVICE_CAN_BE_DEFAULT, |_, _| flag(true)),
    ro(DEVICE_CAN_BE_DEFAULT_SYSTEM, |_, _| flag(false)),
    ro(DEVICE_LATENCY, |_, _| PropertyValue::U32(DEVICE_LATENCY_FRAMES)),
    ro(DEVICE_STREAMS, |_, query| {
        PropertyValue::ObjectList(objects::streams_for_scope(query.address.scope))
    }),
    ro(CONTROL_LIST, |_, _| PropertyValue::ObjectList(vec![VOLUME_CONTROL_ID])),
    ro(DEVICE_SAFETY_OFFSET, |_, _| PropertyValue::U32(SAFETY_OFFSET_FRAMES)),
    rw(
        DEVICE_NOMINAL_SAMPLE_RATE,
        |device, _| PropertyValue::F64(device.sample_rate()),
        set_nominal_sample_rate,
    ),
    ro(DEVICE_AVAILABLE_SAMPLE_RATES, |_, _| {
        PropertyValue::ValueRanges(available_sample_rates())
    }),
    ro(DEVICE_ZERO_TIMESTAMP_PERIOD, |device, _| {
        PropertyValue::U32(device.config().frames_per_period)
    }),
    ro(DEVICE_ICON, |_, _| PropertyValue::NullRef),
    ro(DEVICE_IS_HIDDEN, |_, _| flag(false)),
];

fn set_nominal_sample_rate(
    device: &LoopbackDevice,
    value: PropertyValue,
) -> Result<Vec<PropertyChange>, HalError> {
    let PropertyValue::F64(rate) = value else {
        return Err(HalError::IllegalOperation);
    };
    match device.set_sample_rate(rate)? {
        RateChange::Applied => Ok(sample_rate_changes()),
        // 挂起的切换在 perform_configuration_change 时通知
        RateChange::Unchanged | RateChange::Deferred => Ok(Vec::new()),
    }
}

/// 采样率生效后需要通知的属性：标称采样率和两个流的格式
pub(crate) fn sample_rate_changes() -> Vec<PropertyChange> {
    let mut changes = vec![PropertyChange::global(DEVICE_ID, DEVICE_NOMINAL_SAMPLE_RATE)];
    for direction in [StreamDirection::Output, StreamDirection::Input] {
        for selector in [STREAM_VIRTUAL_FORMAT, STREAM_PHYSICAL_FORMAT] {
            changes.push(PropertyChange::global(direction.stream_id(), selector));
        }
    }
    changes
}

// ============================================================================
// Stream (ID 3 输出, ID 4 输入)
// ============================================================================

static STREAM_PROPERTIES: [PropertyEntry; 13] = [
    ro(BASE_CLASS, |_, _| PropertyValue::U32(CLASS_OBJECT)),
    ro(CLASS, |_, _| PropertyValue::U32(CLASS_STREAM)),
    ro(OWNER, |_, _| PropertyValue::U32(DEVICE_ID)),
    ro(OWNED_OBJECTS, |_, _| PropertyValue::ObjectList(Vec::new())),
    ro(STREAM_IS_ACTIVE, |_, _| flag(true)),
    ro(STREAM_DIRECTION, |_, query| {
        PropertyValue::U32(stream_direction(query).direction_value())
    }),
    ro(STREAM_TERMINAL_TYPE, |_, query| {
        PropertyValue::U32(stream_direction(query).terminal_type())
    }),
    ro(STREAM_STARTING_CHANNEL, |_, _| PropertyValue::U32(1)),
    ro(STREAM_LATENCY, |_, _| PropertyValue::U32(STREAM_LATENCY_FRAMES)),
    ro(STREAM_VIRTUAL_FORMAT, |device, _| PropertyValue::Format(device.stream_format())),
    ro(STREAM_PHYSICAL_FORMAT, |device, _| PropertyValue::Format(device.stream_format())),
    ro(STREAM_AVAILABLE_VIRTUAL_FORMATS, |_, _| {
        PropertyValue::RangedFormats(available_formats())
    }),
    ro(STREAM_AVAILABLE_PHYSICAL_FORMATS, |_, _| {
        PropertyValue::RangedFormats(available_formats())
    }),
];

// ============================================================================
// Volume control (ID 5)
// ============================================================================

static VOLUME_PROPERTIES: [PropertyEntry; 11] = [
    ro(BASE_CLASS, |_, _| PropertyValue::U32(CLASS_LEVEL_CONTROL)),
    ro(CLASS, |_, _| PropertyValue::U32(CLASS_VOLUME_CONTROL)),
    ro(OWNER, |_, _| PropertyValue::U32(DEVICE_ID)),
    ro(OWNED_OBJECTS, |_, _| PropertyValue::ObjectList(Vec::new())),
    ro(ELEMENT_NAME, |_, _| string(objects::VOLUME_ELEMENT_NAME)),
    ro(CONTROL_SCOPE, |_, _| PropertyValue::U32(SCOPE_OUTPUT)),
    ro(CONTROL_ELEMENT, |_, _| PropertyValue::U32(ELEMENT_MAIN)),
    rw(
        LEVEL_SCALAR_VALUE,
        |device, _| PropertyValue::F32(device.volume().scalar()),
        |device, value| {
            let PropertyValue::F32(scalar) = value else {
                return Err(HalError::IllegalOperation);
            };
            let applied = device.volume().set_scalar(scalar)?;
            log::debug!("Volume scalar set to {:.3}", applied);
            Ok(volume_changes())
        },
    ),
    rw(
        LEVEL_DECIBEL_VALUE,
        |device, _| PropertyValue::F32(device.volume().decibels()),
        |device, value| {
            let PropertyValue::F32(db) = value else {
                return Err(HalError::IllegalOperation);
            };
            let applied = device.volume().set_decibels(db)?;
            log::debug!("Volume set to {:.1} dB (scalar {:.3})", db, applied);
            Ok(volume_changes())
        },
    ),
    ro(LEVEL_DECIBEL_RANGE, |_, _| {
        PropertyValue::ValueRange(ValueRange {
            minimum: MIN_DB as f64,
            maximum: MAX_DB as f64,
        })
    }),
    rw(
        BOOLEAN_VALUE,
        |device, _| flag(device.volume().is_muted()),
        |device, value| {
            let PropertyValue::U32(muted) = value else {
                return Err(HalError::IllegalOperation);
            };
            device.volume().set_muted(muted != 0);
            log::debug!("Mute set to {}", muted != 0);
            Ok(vec![PropertyChange::global(VOLUME_CONTROL_ID, BOOLEAN_VALUE)])
        },
    ),
];

fn volume_changes() -> Vec<PropertyChange> {
    vec![
        PropertyChange::global(VOLUME_CONTROL_ID, LEVEL_SCALAR_VALUE),
        PropertyChange::global(VOLUME_CONTROL_ID, LEVEL_DECIBEL_VALUE),
    ]
}

/// 对象的属性表
pub fn table(kind: ObjectKind) -> &'static [PropertyEntry] {
    match kind {
        ObjectKind::PlugIn => &PLUGIN_PROPERTIES,
        ObjectKind::Device => &DEVICE_PROPERTIES,
        ObjectKind::Stream(_) => &STREAM_PROPERTIES,
        ObjectKind::VolumeControl => &VOLUME_PROPERTIES,
    }
}

/// 查找属性
///
/// 未知对象和不在该对象表里的选择器都是 `UnknownProperty`
pub fn find(object: u32, selector: u32) -> Result<&'static PropertyEntry, HalError> {
    let kind = ObjectKind::from_id(object).ok_or(HalError::UnknownProperty)?;
    table(kind)
        .iter()
        .find(|entry| entry.selector == selector)
        .ok_or(HalError::UnknownProperty)
}
