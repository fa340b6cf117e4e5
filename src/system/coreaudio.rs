//! Core Audio 实现（macOS）
//!
//! 设备查询走 HAL 属性接口：先取大小再取数据，字符串属性返回 CFString，
//! 所有权按 create rule 交给调用方。

use std::ffi::c_void;
use std::ptr;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::{
    kAudioDevicePropertyDeviceUID, kAudioDevicePropertyStreams,
    kAudioDevicePropertyTransportType, kAudioHardwarePropertyDefaultOutputDevice,
    kAudioHardwarePropertyDevices, kAudioObjectPropertyElementMain, kAudioObjectPropertyName,
    kAudioObjectPropertyScopeGlobal, kAudioObjectPropertyScopeInput,
    kAudioObjectPropertyScopeOutput, kAudioObjectSystemObject, kAudioObjectUnknown,
    AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize, AudioObjectID,
    AudioObjectPropertyAddress, AudioObjectSetPropertyData,
};

use super::{AggregateSpec, AudioSystem, DeviceSummary, SystemError};

// 聚合设备描述字典的键（AudioHardware.h）
const AGGREGATE_UID_KEY: &str = "uid";
const AGGREGATE_NAME_KEY: &str = "name";
const AGGREGATE_SUB_DEVICE_LIST_KEY: &str = "subdevices";
const AGGREGATE_MAIN_SUB_DEVICE_KEY: &str = "master";
const AGGREGATE_IS_STACKED_KEY: &str = "stacked";
const SUB_DEVICE_UID_KEY: &str = "uid";

#[link(name = "CoreAudio", kind = "framework")]
extern "C" {
    fn AudioHardwareCreateAggregateDevice(
        in_description: CFDictionaryRef,
        out_device_id: *mut AudioObjectID,
    ) -> i32;
    fn AudioHardwareDestroyAggregateDevice(in_device_id: AudioObjectID) -> i32;
}

fn address(selector: u32, scope: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMain,
    }
}

fn check(op: &'static str, status: i32) -> Result<(), SystemError> {
    if status == 0 {
        Ok(())
    } else {
        Err(SystemError::Status { op, status })
    }
}

fn get_u32(object: AudioObjectID, selector: u32, op: &'static str) -> Result<u32, SystemError> {
    let addr = address(selector, kAudioObjectPropertyScopeGlobal);
    let mut value: u32 = 0;
    let mut size = std::mem::size_of::<u32>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            &addr,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut _ as *mut c_void,
        )
    };
    check(op, status)?;
    Ok(value)
}

fn get_string(object: AudioObjectID, selector: u32, op: &'static str) -> Result<String, SystemError> {
    let addr = address(selector, kAudioObjectPropertyScopeGlobal);
    let mut size = std::mem::size_of::<*const c_void>() as u32;
    let mut cf_string_ref: *const c_void = ptr::null();
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            &addr,
            0,
            ptr::null(),
            &mut size,
            &mut cf_string_ref as *mut _ as *mut c_void,
        )
    };
    check(op, status)?;
    if cf_string_ref.is_null() {
        return Ok(String::new());
    }

    // create rule：由我们负责释放
    let cf_string = unsafe { CFString::wrap_under_create_rule(cf_string_ref as CFStringRef) };
    Ok(cf_string.to_string())
}

/// 数组属性的元素个数（按 AudioObjectID 计）
fn count_objects(object: AudioObjectID, selector: u32, scope: u32) -> u32 {
    let addr = address(selector, scope);
    let mut size: u32 = 0;
    let status =
        unsafe { AudioObjectGetPropertyDataSize(object, &addr, 0, ptr::null(), &mut size) };
    if status != 0 {
        return 0;
    }
    size / std::mem::size_of::<AudioObjectID>() as u32
}

fn device_ids() -> Result<Vec<AudioObjectID>, SystemError> {
    let addr = address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal);

    let mut size: u32 = 0;
    let status = unsafe {
        AudioObjectGetPropertyDataSize(kAudioObjectSystemObject, &addr, 0, ptr::null(), &mut size)
    };
    check("get device list size", status)?;

    let count = size as usize / std::mem::size_of::<AudioObjectID>();
    if count == 0 {
        return Ok(vec![]);
    }

    let mut ids = vec![0 as AudioObjectID; count];
    let status = unsafe {
        AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &addr,
            0,
            ptr::null(),
            &mut size,
            ids.as_mut_ptr() as *mut c_void,
        )
    };
    check("get device list", status)?;

    // 两次调用之间设备可能减少
    ids.truncate(size as usize / std::mem::size_of::<AudioObjectID>());
    Ok(ids)
}

fn build_description(spec: &AggregateSpec) -> CFDictionary<CFString, CFType> {
    let sub_devices: Vec<CFDictionary<CFString, CFType>> = spec
        .sub_devices
        .iter()
        .map(|uid| {
            CFDictionary::from_CFType_pairs(&[(
                CFString::from_static_string(SUB_DEVICE_UID_KEY),
                CFString::new(uid).as_CFType(),
            )])
        })
        .collect();
    let sub_device_list = CFArray::from_CFTypes(&sub_devices);

    // 多输出模式：不堆叠，所有子设备同时输出
    CFDictionary::from_CFType_pairs(&[
        (
            CFString::from_static_string(AGGREGATE_UID_KEY),
            CFString::new(&spec.uid).as_CFType(),
        ),
        (
            CFString::from_static_string(AGGREGATE_NAME_KEY),
            CFString::new(&spec.name).as_CFType(),
        ),
        (
            CFString::from_static_string(AGGREGATE_SUB_DEVICE_LIST_KEY),
            sub_device_list.as_CFType(),
        ),
        (
            CFString::from_static_string(AGGREGATE_MAIN_SUB_DEVICE_KEY),
            CFString::new(&spec.main_sub_device).as_CFType(),
        ),
        (
            CFString::from_static_string(AGGREGATE_IS_STACKED_KEY),
            CFNumber::from(0i32).as_CFType(),
        ),
    ])
}

/// 基于 HAL 属性接口的系统实现
#[derive(Debug, Default)]
pub struct CoreAudioSystem;

impl CoreAudioSystem {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSystem for CoreAudioSystem {
    fn devices(&self) -> Result<Vec<DeviceSummary>, SystemError> {
        let mut devices = Vec::new();
        for id in device_ids()? {
            match self.device(id) {
                Ok(d) => devices.push(d),
                // 枚举过程中消失的设备直接跳过
                Err(e) => log::debug!("Skipping device {}: {}", id, e),
            }
        }
        Ok(devices)
    }

    fn default_output_id(&self) -> Result<u32, SystemError> {
        let id = get_u32(
            kAudioObjectSystemObject,
            kAudioHardwarePropertyDefaultOutputDevice,
            "get default output device",
        )?;
        if id == kAudioObjectUnknown {
            return Err(SystemError::NotFound("default output device".to_string()));
        }
        Ok(id)
    }

    fn device(&self, id: u32) -> Result<DeviceSummary, SystemError> {
        let uid = get_string(id, kAudioDevicePropertyDeviceUID, "get device UID")?;
        // 名字拿不到时 UID 已足够
        let name = get_string(id, kAudioObjectPropertyName, "get device name").unwrap_or_default();
        let transport =
            get_u32(id, kAudioDevicePropertyTransportType, "get transport type").unwrap_or(0);

        Ok(DeviceSummary {
            id,
            uid,
            name,
            output_streams: count_objects(
                id,
                kAudioDevicePropertyStreams,
                kAudioObjectPropertyScopeOutput,
            ),
            input_streams: count_objects(
                id,
                kAudioDevicePropertyStreams,
                kAudioObjectPropertyScopeInput,
            ),
            transport,
        })
    }

    fn set_default_output_id(&self, id: u32) -> Result<(), SystemError> {
        let addr = address(
            kAudioHardwarePropertyDefaultOutputDevice,
            kAudioObjectPropertyScopeGlobal,
        );
        let value: AudioObjectID = id;
        let status = unsafe {
            AudioObjectSetPropertyData(
                kAudioObjectSystemObject,
                &addr,
                0,
                ptr::null(),
                std::mem::size_of::<AudioObjectID>() as u32,
                &value as *const _ as *const c_void,
            )
        };
        check("set default output device", status)
    }

    fn create_aggregate(&self, spec: &AggregateSpec) -> Result<u32, SystemError> {
        let description = build_description(spec);
        let mut id: AudioObjectID = kAudioObjectUnknown;
        let status = unsafe {
            AudioHardwareCreateAggregateDevice(description.as_concrete_TypeRef(), &mut id)
        };
        check("create aggregate device", status)?;
        if id == kAudioObjectUnknown {
            return Err(SystemError::NotFound(spec.uid.clone()));
        }
        Ok(id)
    }

    fn destroy_aggregate(&self, id: u32) -> Result<(), SystemError> {
        let status = unsafe { AudioHardwareDestroyAggregateDevice(id) };
        check("destroy aggregate device", status)
    }
}
