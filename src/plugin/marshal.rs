//! 属性值编组
//!
//! 把 `PropertyValue` 按 Core Audio 的 C 布局写进宿主提供的缓冲区，
//! 以及把宿主传入的原始字节解析成 `PropertyValue`。数值一律按本机字节序。
//!
//! 布局：
//! - `AudioValueRange`：两个 f64（16 字节）
//! - `AudioStreamBasicDescription`：f64 + 8 个 u32（含保留字段，40 字节）
//! - `AudioStreamRangedDescription`：ASBD + AudioValueRange（56 字节）
//! - CFString / CFURL：一个指针
//!
//! 数组属性按宿主缓冲区能放下的元素个数截断，标量属性缓冲区不足时报错。

use std::ffi::c_void;
use std::ptr;

use crate::audio::format::{StreamFormat, ValueRange};
use crate::device::selectors::{
    BOOLEAN_VALUE, DEVICE_NOMINAL_SAMPLE_RATE, LEVEL_DECIBEL_VALUE, LEVEL_SCALAR_VALUE,
};
use crate::device::{LoopbackDevice, PropertyQuery, PropertyValue};
use crate::error::HalError;

const OBJECT_ID_SIZE: usize = 4;
const VALUE_RANGE_SIZE: usize = 16;
const RANGED_FORMAT_SIZE: usize = 56;

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.bytes(&v.to_ne_bytes());
    }

    fn pointer(&mut self, p: *const c_void) {
        self.bytes(&(p as usize).to_ne_bytes());
    }

    fn range(&mut self, r: &ValueRange) {
        self.f64(r.minimum);
        self.f64(r.maximum);
    }

    fn format(&mut self, f: &StreamFormat) {
        self.f64(f.sample_rate);
        self.u32(f.format_id);
        self.u32(f.format_flags);
        self.u32(f.bytes_per_packet);
        self.u32(f.frames_per_packet);
        self.u32(f.bytes_per_frame);
        self.u32(f.channels_per_frame);
        self.u32(f.bits_per_channel);
        // mReserved
        self.u32(0);
    }
}

/// 写入能放下的前若干个元素，返回写入的字节数
fn write_array<T>(out: &mut [u8], items: &[T], item_size: usize, put: impl Fn(&mut Writer<'_>, &T)) -> u32 {
    let count = items.len().min(out.len() / item_size);
    let mut w = Writer { buf: out, pos: 0 };
    for item in &items[..count] {
        put(&mut w, item);
    }
    w.pos as u32
}

/// 把属性值写入 `out`，返回写入的字节数
///
/// 标量缓冲区小于属性大小时返回 `BadPropertySize`，此时不会调用 `new_string`。
/// `new_string` 负责创建字符串对象，所有权交给宿主。
pub fn encode<F>(value: &PropertyValue, out: &mut [u8], mut new_string: F) -> Result<u32, HalError>
where
    F: FnMut(&'static str) -> *const c_void,
{
    match value {
        PropertyValue::ObjectList(ids) => {
            return Ok(write_array(out, ids, OBJECT_ID_SIZE, |w, id| w.u32(*id)));
        }
        PropertyValue::ValueRanges(ranges) => {
            return Ok(write_array(out, ranges, VALUE_RANGE_SIZE, |w, r| w.range(r)));
        }
        PropertyValue::RangedFormats(formats) => {
            return Ok(write_array(out, formats, RANGED_FORMAT_SIZE, |w, f| {
                w.format(&f.format);
                w.range(&f.sample_rate_range);
            }));
        }
        _ => {}
    }

    let size = value.byte_size();
    if out.len() < size as usize {
        return Err(HalError::BadPropertySize);
    }

    let mut w = Writer { buf: out, pos: 0 };
    match value {
        PropertyValue::U32(v) => w.u32(*v),
        PropertyValue::F32(v) => w.f32(*v),
        PropertyValue::F64(v) => w.f64(*v),
        PropertyValue::String(s) => w.pointer(new_string(s)),
        PropertyValue::NullRef => w.pointer(ptr::null()),
        PropertyValue::ValueRange(r) => w.range(r),
        PropertyValue::Format(f) => w.format(f),
        PropertyValue::ObjectList(_)
        | PropertyValue::ValueRanges(_)
        | PropertyValue::RangedFormats(_) => {}
    }

    debug_assert_eq!(w.pos, size as usize);
    Ok(size)
}

fn read_array<const N: usize>(data: &[u8]) -> Result<[u8; N], HalError> {
    data.get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(HalError::BadPropertySize)
}

/// 按选择器解析宿主传入的设置值
///
/// 不可设置的选择器解析为 `NullRef`，交给设备返回相应错误。
pub fn decode(selector: u32, data: &[u8]) -> Result<PropertyValue, HalError> {
    match selector {
        DEVICE_NOMINAL_SAMPLE_RATE => Ok(PropertyValue::F64(f64::from_ne_bytes(read_array(data)?))),
        LEVEL_SCALAR_VALUE | LEVEL_DECIBEL_VALUE => {
            Ok(PropertyValue::F32(f32::from_ne_bytes(read_array(data)?)))
        }
        BOOLEAN_VALUE => Ok(PropertyValue::U32(u32::from_ne_bytes(read_array(data)?))),
        _ => Ok(PropertyValue::NullRef),
    }
}

/// 解析宿主的设置请求
///
/// 先确认对象和选择器可设置，再检查数据大小，
/// 对不可设置的属性总是返回 `UnknownProperty`。
pub fn decode_setting(
    device: &LoopbackDevice,
    query: &PropertyQuery<'_>,
    data: &[u8],
) -> Result<PropertyValue, HalError> {
    device.check_settable(query)?;
    decode(query.address.selector, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{available_formats, available_sample_rates, RangedFormat};
    use crate::config::DeviceConfig;
    use crate::device::objects::{DEVICE_ID, OUTPUT_STREAM_ID, PLUGIN_ID};
    use crate::device::selectors::CLASS;

    fn no_strings(_: &'static str) -> *const c_void {
        panic!("unexpected string");
    }

    #[test]
    fn test_encode_scalars() {
        let mut buf = [0u8; 8];
        assert_eq!(encode(&PropertyValue::U32(7), &mut buf, no_strings), Ok(4));
        assert_eq!(u32::from_ne_bytes(buf[..4].try_into().unwrap()), 7);

        assert_eq!(encode(&PropertyValue::F64(48000.0), &mut buf, no_strings), Ok(8));
        assert_eq!(f64::from_ne_bytes(buf), 48000.0);
    }

    #[test]
    fn test_encode_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode(&PropertyValue::F64(1.0), &mut buf, no_strings),
            Err(HalError::BadPropertySize)
        );
        assert_eq!(
            encode(&PropertyValue::ObjectList(vec![3, 4]), &mut buf, no_strings),
            Ok(4)
        );
    }

    #[test]
    fn test_encode_truncates_arrays() {
        let mut buf = [0u8; 10];
        assert_eq!(
            encode(&PropertyValue::ObjectList(vec![3, 4, 5]), &mut buf, no_strings),
            Ok(8)
        );
        assert_eq!(u32::from_ne_bytes(buf[4..8].try_into().unwrap()), 4);

        let formats = available_formats();
        let mut buf = vec![0u8; 60];
        assert_eq!(
            encode(&PropertyValue::RangedFormats(formats.clone()), &mut buf, no_strings),
            Ok(56)
        );
        assert_eq!(
            f64::from_ne_bytes(buf[..8].try_into().unwrap()),
            formats[0].format.sample_rate
        );

        let mut empty: [u8; 0] = [];
        assert_eq!(
            encode(&PropertyValue::ValueRanges(available_sample_rates()), &mut empty, no_strings),
            Ok(0)
        );
    }

    #[test]
    fn test_encode_object_list() {
        let mut buf = [0u8; 16];
        let n = encode(&PropertyValue::ObjectList(vec![3, 4, 5]), &mut buf, no_strings).unwrap();
        assert_eq!(n, 12);
        let ids: Vec<u32> = buf[..12]
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_encode_empty_list() {
        let mut buf: [u8; 0] = [];
        assert_eq!(
            encode(&PropertyValue::ObjectList(vec![]), &mut buf, no_strings),
            Ok(0)
        );
    }

    #[test]
    fn test_encode_string_uses_factory() {
        let mut buf = [0u8; 8];
        let mut seen = Vec::new();
        let marker = 0x1234usize as *const c_void;
        let n = encode(&PropertyValue::String("Pulse Audio"), &mut buf, |s| {
            seen.push(s);
            marker
        })
        .unwrap();
        assert_eq!(n as usize, std::mem::size_of::<usize>());
        assert_eq!(seen, vec!["Pulse Audio"]);
        let mut raw = [0u8; std::mem::size_of::<usize>()];
        let raw_len = raw.len();
        raw.copy_from_slice(&buf[..raw_len]);
        assert_eq!(usize::from_ne_bytes(raw), 0x1234);
    }

    #[test]
    fn test_encode_null_ref() {
        let mut buf = [0xFFu8; 8];
        encode(&PropertyValue::NullRef, &mut buf, no_strings).unwrap();
        let len = std::mem::size_of::<usize>();
        assert!(buf[..len].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_ranged_formats_layout() {
        let formats: Vec<RangedFormat> = available_formats();
        let mut buf = vec![0u8; 56 * formats.len()];
        let n = encode(&PropertyValue::RangedFormats(formats.clone()), &mut buf, no_strings).unwrap();
        assert_eq!(n as usize, buf.len());

        // 第二个描述符的采样率
        let second = &buf[56..];
        assert_eq!(
            f64::from_ne_bytes(second[..8].try_into().unwrap()),
            formats[1].format.sample_rate
        );
        // 声道数在偏移 28
        assert_eq!(u32::from_ne_bytes(second[28..32].try_into().unwrap()), 2);
        // 采样率范围在偏移 40
        assert_eq!(
            f64::from_ne_bytes(second[40..48].try_into().unwrap()),
            formats[1].sample_rate_range.minimum
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            decode(DEVICE_NOMINAL_SAMPLE_RATE, &44100.0f64.to_ne_bytes()),
            Ok(PropertyValue::F64(44100.0))
        );
        assert_eq!(
            decode(LEVEL_SCALAR_VALUE, &0.5f32.to_ne_bytes()),
            Ok(PropertyValue::F32(0.5))
        );
        assert_eq!(
            decode(BOOLEAN_VALUE, &1u32.to_ne_bytes()),
            Ok(PropertyValue::U32(1))
        );
        assert_eq!(
            decode(DEVICE_NOMINAL_SAMPLE_RATE, &[0u8; 4]),
            Err(HalError::BadPropertySize)
        );
        assert_eq!(decode(0x6E616D65, &[]), Ok(PropertyValue::NullRef));
    }

    #[test]
    fn test_decode_setting_checks_property_first() {
        let device = LoopbackDevice::new(DeviceConfig {
            lock_memory: false,
            ..Default::default()
        })
        .unwrap();
        let short = [0u8; 2];
        let rate = |object| PropertyQuery::global(object, DEVICE_NOMINAL_SAMPLE_RATE);

        // 不可设置的对象：数据大小不影响结果
        assert_eq!(
            decode_setting(&device, &rate(PLUGIN_ID), &short),
            Err(HalError::UnknownProperty)
        );
        assert_eq!(
            decode_setting(&device, &rate(OUTPUT_STREAM_ID), &short),
            Err(HalError::UnknownProperty)
        );
        assert_eq!(
            decode_setting(&device, &PropertyQuery::global(DEVICE_ID, CLASS), &short),
            Err(HalError::UnknownProperty)
        );

        assert_eq!(
            decode_setting(&device, &rate(DEVICE_ID), &short),
            Err(HalError::BadPropertySize)
        );
        assert_eq!(
            decode_setting(&device, &rate(DEVICE_ID), &44100.0f64.to_ne_bytes()),
            Ok(PropertyValue::F64(44100.0))
        );
    }
}
