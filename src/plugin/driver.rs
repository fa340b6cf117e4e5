//! AudioServerPlugIn 驱动接口
//!
//! 整个插件只暴露一个符号：工厂函数 `PulseAudio_Create`（名字写在 bundle 的
//! Info.plist 里）。工厂返回指向静态函数表的指针，之后宿主的所有调用都经过这张表。
//!
//! 设备在 `initialize` 中创建，最后一次 `release` 时销毁。
//! 控制路径的回调用 `catch_unwind` 拦截 panic；IO 路径不记录日志、不加锁。

use std::ffi::c_void;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::OnceLock;

use core_foundation::base::TCFType;
use core_foundation::string::CFString;
use coreaudio_sys::*;
use oslog::OsLogger;

use crate::audio::format::CHANNELS;
use crate::config::DeviceConfig;
use crate::device::objects::DEVICE_ID;
use crate::device::selectors::{DEVICE_IS_RUNNING, DEVICE_NOMINAL_SAMPLE_RATE};
use crate::device::{
    IoOperation, LoopbackDevice, PropertyAddress, PropertyChange, PropertyQuery,
};
use crate::error::{to_status, HalError, K_AUDIO_HARDWARE_UNSPECIFIED_ERROR, NO_ERR};

use super::marshal;
use super::LOG_SUBSYSTEM;

// 让链接器带上 CoreFoundation（coreaudio_sys 里的部分符号需要）
#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {}

/// 生成的函数表含裸指针，不是 Sync，包一层才能放进 static
#[repr(transparent)]
struct AlwaysSync<T>(T);

unsafe impl<T> Sync for AlwaysSync<T> {}

static DRIVER_INTERFACE: AlwaysSync<AudioServerPlugInDriverInterface> =
    AlwaysSync(AudioServerPlugInDriverInterface {
        _reserved: ptr::null_mut(),
        QueryInterface: Some(query_interface),
        AddRef: Some(add_ref),
        Release: Some(release),
        Initialize: Some(initialize),
        CreateDevice: Some(create_device),
        DestroyDevice: Some(destroy_device),
        AddDeviceClient: Some(add_device_client),
        RemoveDeviceClient: Some(remove_device_client),
        PerformDeviceConfigurationChange: Some(perform_device_configuration_change),
        AbortDeviceConfigurationChange: Some(abort_device_configuration_change),
        HasProperty: Some(has_property),
        IsPropertySettable: Some(is_property_settable),
        GetPropertyDataSize: Some(get_property_data_size),
        GetPropertyData: Some(get_property_data),
        SetPropertyData: Some(set_property_data),
        StartIO: Some(start_io),
        StopIO: Some(stop_io),
        GetZeroTimeStamp: Some(get_zero_timestamp),
        WillDoIOOperation: Some(will_do_io_operation),
        BeginIOOperation: Some(begin_io_operation),
        DoIOOperation: Some(do_io_operation),
        EndIOOperation: Some(end_io_operation),
    });

/// 宿主拿到的 driver ref 是"指向函数表指针的指针"
static DRIVER_OBJECT: &AlwaysSync<AudioServerPlugInDriverInterface> = &DRIVER_INTERFACE;

/// 必须保存宿主给的指针本身，不能复制它指向的内容
static HOST: OnceLock<&'static AudioServerPlugInHostInterface> = OnceLock::new();

static REF_COUNT: AtomicU32 = AtomicU32::new(0);

static DEVICE: AtomicPtr<LoopbackDevice> = AtomicPtr::new(ptr::null_mut());

// kAudioServerPlugInTypeUUID
const AUDIO_SERVER_PLUGIN_TYPE_UUID: [u8; 16] = [
    0x44, 0x3A, 0xBA, 0xB8, 0xE7, 0xB3, 0x49, 0x1A, 0xB9, 0x85, 0xBE, 0xB9, 0x18, 0x70, 0x30, 0xDB,
];

// IUnknownUUID
const I_UNKNOWN_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
];

// kAudioServerPlugInDriverInterfaceUUID
const DRIVER_INTERFACE_UUID: [u8; 16] = [
    0xEE, 0xA5, 0x77, 0x3D, 0xCC, 0x43, 0x49, 0xF1, 0x8E, 0x00, 0x8F, 0x96, 0xE7, 0xD2, 0x3B, 0x17,
];

const E_NOINTERFACE: HRESULT = 0x80000004u32 as i32;

#[inline(always)]
fn raw_driver_ptr() -> AudioServerPlugInDriverRef {
    ptr::addr_of!(DRIVER_OBJECT).cast_mut().cast()
}

#[inline(always)]
fn eq_driver_ptr(driver: *const c_void) -> bool {
    ptr::eq(driver, raw_driver_ptr().cast::<c_void>())
}

#[inline(always)]
const fn cfuuid_as_bytes(b: CFUUIDBytes) -> [u8; 16] {
    [
        b.byte0, b.byte1, b.byte2, b.byte3, b.byte4, b.byte5, b.byte6, b.byte7, b.byte8, b.byte9,
        b.byte10, b.byte11, b.byte12, b.byte13, b.byte14, b.byte15,
    ]
}

macro_rules! check_driver_ptr_or_else {
    ($driver:expr, $msg:literal, $action:expr) => {
        if !eq_driver_ptr($driver.cast()) {
            log::warn!($msg);
            $action;
        }
    };
}

macro_rules! check_driver_ptr_or_bad_obj {
    ($driver:expr, $msg:literal) => {
        check_driver_ptr_or_else!($driver, $msg, return HalError::BadObject.status())
    };
}

fn device() -> Result<&'static LoopbackDevice, HalError> {
    // SAFETY: 指针只在 initialize 中发布、在最后一次 release 中回收，
    // 宿主不会在这两者之外调用设备
    unsafe { DEVICE.load(Ordering::Acquire).as_ref() }.ok_or(HalError::BadObject)
}

fn check_device_id(id: AudioObjectID) -> Result<&'static LoopbackDevice, HalError> {
    if id != DEVICE_ID {
        return Err(HalError::BadObject);
    }
    device()
}

/// 控制路径回调的统一出口：panic 转成 'what'
fn guarded<F>(name: &str, f: F) -> OSStatus
where
    F: FnOnce() -> Result<(), HalError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => {
            if let Err(e) = result {
                log::debug!("{}: {}", name, e);
            }
            to_status(result)
        }
        Err(_) => {
            log::error!("{}: internal function panicked", name);
            K_AUDIO_HARDWARE_UNSPECIFIED_ERROR
        }
    }
}

/// 通知宿主属性已变化
fn notify(changes: &[PropertyChange]) {
    let Some(&host) = HOST.get() else {
        return;
    };
    let Some(properties_changed) = host.PropertiesChanged else {
        return;
    };

    for change in changes {
        let addr = AudioObjectPropertyAddress {
            mSelector: change.address.selector,
            mScope: change.address.scope,
            mElement: change.address.element,
        };
        log::debug!("Property changed: {} @ {}", change.object, change.address);
        unsafe { properties_changed(host, change.object, 1, &addr) };
    }
}

/// 请求宿主停止 IO 后回调 PerformDeviceConfigurationChange
fn request_configuration_change() -> Result<(), HalError> {
    let Some(&host) = HOST.get() else {
        return Err(HalError::BadObject);
    };
    let Some(request) = host.RequestDeviceConfigurationChange else {
        return Err(HalError::IllegalOperation);
    };

    log::debug!("Requesting device configuration change");
    let status = unsafe { request(host, DEVICE_ID, 0, ptr::null_mut()) };
    if status == NO_ERR {
        Ok(())
    } else {
        log::error!("RequestDeviceConfigurationChange failed: {}", status);
        Err(HalError::from_status(status).unwrap_or(HalError::IllegalOperation))
    }
}

fn property_address(addr: &AudioObjectPropertyAddress) -> PropertyAddress {
    PropertyAddress::new(addr.mSelector, addr.mScope, addr.mElement)
}

/// 读取 CFString 限定符（TranslateUIDToDevice）
unsafe fn qualifier_string(qual_size: UInt32, qual_data: *const c_void) -> Option<String> {
    if qual_data.is_null() || (qual_size as usize) < mem::size_of::<*const c_void>() {
        return None;
    }
    let raw = qual_data
        .cast::<core_foundation::string::CFStringRef>()
        .read_unaligned();
    if raw.is_null() {
        return None;
    }
    Some(CFString::wrap_under_get_rule(raw).to_string())
}

/// 创建 CFString，所有权交给宿主
fn new_cf_string(s: &'static str) -> *const c_void {
    let string = CFString::new(s);
    let raw = string.as_concrete_TypeRef();
    mem::forget(string);
    raw.cast()
}

// ============================================================================
// 工厂
// ============================================================================

/// CFPlugIn 工厂函数
///
/// 请求的类型是 AudioServerPlugIn 时返回驱动引用，否则返回空指针。
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn PulseAudio_Create(
    _allocator: CFAllocatorRef,
    requested_type_uuid: CFUUIDRef,
) -> *mut c_void {
    // 日志装不上也无能为力
    let _ = OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(log::LevelFilter::Info)
        .category_level_filter("driver", log::LevelFilter::Debug)
        .init();

    if requested_type_uuid.is_null() {
        return ptr::null_mut();
    }

    let requested = cfuuid_as_bytes(CFUUIDGetUUIDBytes(requested_type_uuid));
    if requested != AUDIO_SERVER_PLUGIN_TYPE_UUID {
        log::debug!("Factory: unsupported type {:?}", requested);
        return ptr::null_mut();
    }

    REF_COUNT.store(1, Ordering::Relaxed);
    log::info!("Factory: AudioServerPlugIn requested");
    raw_driver_ptr().cast()
}

// ============================================================================
// IUnknown
// ============================================================================

unsafe extern "C" fn query_interface(
    driver: *mut c_void,
    in_uuid: REFIID,
    interface: *mut LPVOID,
) -> HRESULT {
    check_driver_ptr_or_else!(
        driver,
        "query_interface: bad driver reference",
        return HalError::BadObject.status()
    );

    let Some(interface) = NonNull::new(interface) else {
        log::warn!("query_interface: no place to store the returned interface");
        return HalError::IllegalOperation.status();
    };

    let requested = cfuuid_as_bytes(in_uuid);
    if [I_UNKNOWN_UUID, DRIVER_INTERFACE_UUID].contains(&requested) {
        REF_COUNT.fetch_add(1, Ordering::Relaxed);
        interface.as_ptr().write(raw_driver_ptr().cast());
        NO_ERR
    } else {
        interface.as_ptr().write(ptr::null_mut());
        E_NOINTERFACE
    }
}

unsafe extern "C" fn add_ref(driver: *mut c_void) -> ULONG {
    check_driver_ptr_or_else!(driver, "add_ref: bad driver reference", return 0);

    let count = REF_COUNT.fetch_add(1, Ordering::Relaxed).saturating_add(1);
    log::trace!("AddRef: {} refs", count);
    count
}

unsafe extern "C" fn release(driver: *mut c_void) -> ULONG {
    check_driver_ptr_or_else!(driver, "release: bad driver reference", return 0);

    let previous = REF_COUNT
        .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1))
        .unwrap_or(0);
    let count = previous.saturating_sub(1);
    log::trace!("Release: {} refs", count);

    if previous == 1 {
        let old = DEVICE.swap(ptr::null_mut(), Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: 指针来自 initialize 中的 Box::into_raw，且已从 DEVICE 摘下
            drop(Box::from_raw(old));
        }
    }
    count
}

// ============================================================================
// 生命周期
// ============================================================================

unsafe extern "C" fn initialize(
    driver: AudioServerPlugInDriverRef,
    host: AudioServerPlugInHostRef,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "initialize: bad driver reference");
    log::info!("Initialize");

    // SAFETY: 宿主保证 host 在插件整个生命周期内有效
    if let Some(host) = host.as_ref() {
        let _ = HOST.set(host);
    }

    guarded("initialize", || {
        if !DEVICE.load(Ordering::Acquire).is_null() {
            return Ok(());
        }
        let device = LoopbackDevice::new(DeviceConfig::default()).map_err(|e| {
            log::error!("Device creation failed: {}", e);
            HalError::IllegalOperation
        })?;
        let raw = Box::into_raw(Box::new(device));
        if DEVICE
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // SAFETY: raw 没有发布出去
            drop(unsafe { Box::from_raw(raw) });
        }
        Ok(())
    })
}

unsafe extern "C" fn create_device(
    driver: AudioServerPlugInDriverRef,
    _description: CFDictionaryRef,
    _client_info: *const AudioServerPlugInClientInfo,
    _device_object_id: *mut AudioObjectID,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "create_device: bad driver reference");
    // 不是 transport manager
    kAudioHardwareUnsupportedOperationError as OSStatus
}

unsafe extern "C" fn destroy_device(
    driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "destroy_device: bad driver reference");
    kAudioHardwareUnsupportedOperationError as OSStatus
}

unsafe extern "C" fn add_device_client(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_info: *const AudioServerPlugInClientInfo,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "add_device_client: bad driver reference");
    to_status(check_device_id(device_id))
}

unsafe extern "C" fn remove_device_client(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_info: *const AudioServerPlugInClientInfo,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "remove_device_client: bad driver reference");
    to_status(check_device_id(device_id))
}

unsafe extern "C" fn perform_device_configuration_change(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _change_action: UInt64,
    _change_info: *mut c_void,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(
        driver,
        "perform_device_configuration_change: bad driver reference"
    );
    guarded("perform_device_configuration_change", || {
        // 宿主此时已停止 IO
        let changes = check_device_id(device_id)?.perform_configuration_change();
        notify(&changes);
        Ok(())
    })
}

unsafe extern "C" fn abort_device_configuration_change(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _change_action: UInt64,
    _change_info: *mut c_void,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(
        driver,
        "abort_device_configuration_change: bad driver reference"
    );
    guarded("abort_device_configuration_change", || {
        check_device_id(device_id)?.abort_configuration_change();
        Ok(())
    })
}

// ============================================================================
// 属性
// ============================================================================

unsafe extern "C" fn has_property(
    driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: pid_t,
    addr: *const AudioObjectPropertyAddress,
) -> Boolean {
    check_driver_ptr_or_else!(
        driver,
        "has_property: bad driver reference",
        return Boolean::from(false)
    );
    let Some(addr) = addr.as_ref() else {
        return Boolean::from(false);
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let Ok(device) = device() else {
            return false;
        };
        device.has_property(&PropertyQuery::new(object_id, property_address(addr)))
    }));

    match result {
        Ok(has) => Boolean::from(has),
        Err(_) => {
            log::error!("has_property: internal function panicked");
            Boolean::from(false)
        }
    }
}

unsafe extern "C" fn is_property_settable(
    driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: pid_t,
    addr: *const AudioObjectPropertyAddress,
    is_settable: *mut Boolean,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "is_property_settable: bad driver reference");
    let Some(addr) = addr.as_ref() else {
        return HalError::IllegalOperation.status();
    };
    let Some(is_settable) = NonNull::new(is_settable) else {
        return HalError::IllegalOperation.status();
    };

    guarded("is_property_settable", || {
        let query = PropertyQuery::new(object_id, property_address(addr));
        let settable = device()?.is_property_settable(&query)?;
        // SAFETY: 宿主提供的输出指针
        unsafe { is_settable.as_ptr().write(Boolean::from(settable)) };
        Ok(())
    })
}

unsafe extern "C" fn get_property_data_size(
    driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: pid_t,
    addr: *const AudioObjectPropertyAddress,
    qual_size: UInt32,
    qual_data: *const c_void,
    data_size: *mut UInt32,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "get_property_data_size: bad driver reference");
    let Some(addr) = addr.as_ref() else {
        return HalError::IllegalOperation.status();
    };
    let Some(data_size) = NonNull::new(data_size) else {
        return HalError::IllegalOperation.status();
    };

    let qualifier = qualifier_string(qual_size, qual_data);
    guarded("get_property_data_size", || {
        let mut query = PropertyQuery::new(object_id, property_address(addr));
        if let Some(q) = qualifier.as_deref() {
            query = query.with_qualifier(q);
        }
        let size = device()?.get_property_data_size(&query)?;
        unsafe { data_size.as_ptr().write(size) };
        Ok(())
    })
}

unsafe extern "C" fn get_property_data(
    driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: pid_t,
    addr: *const AudioObjectPropertyAddress,
    qual_size: UInt32,
    qual_data: *const c_void,
    data_size: UInt32,
    written_data_size: *mut UInt32,
    out_data: *mut c_void,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "get_property_data: bad driver reference");
    let Some(addr) = addr.as_ref() else {
        return HalError::IllegalOperation.status();
    };
    let Some(written_data_size) = NonNull::new(written_data_size) else {
        return HalError::IllegalOperation.status();
    };
    if out_data.is_null() {
        return HalError::IllegalOperation.status();
    }

    let qualifier = qualifier_string(qual_size, qual_data);
    guarded("get_property_data", || {
        let mut query = PropertyQuery::new(object_id, property_address(addr));
        if let Some(q) = qualifier.as_deref() {
            query = query.with_qualifier(q);
        }
        let value = device()?.get_property_data(&query)?;

        // SAFETY: 宿主保证 out_data 至少有 data_size 字节
        let out = unsafe { slice::from_raw_parts_mut(out_data.cast::<u8>(), data_size as usize) };
        let written = marshal::encode(&value, out, new_cf_string)?;
        unsafe { written_data_size.as_ptr().write(written) };
        Ok(())
    })
}

unsafe extern "C" fn set_property_data(
    driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: pid_t,
    addr: *const AudioObjectPropertyAddress,
    _qual_size: UInt32,
    _qual_data: *const c_void,
    data_size: UInt32,
    data: *const c_void,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "set_property_data: bad driver reference");
    let Some(addr) = addr.as_ref() else {
        return HalError::IllegalOperation.status();
    };
    if data.is_null() {
        return HalError::IllegalOperation.status();
    }

    guarded("set_property_data", || {
        let device = device()?;
        let query = PropertyQuery::new(object_id, property_address(addr));
        // SAFETY: 宿主保证 data 至少有 data_size 字节
        let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), data_size as usize) };
        let value = marshal::decode_setting(device, &query, bytes)?;
        let changes = device.set_property_data(&query, value)?;
        notify(&changes);

        // IO 运行中的采样率切换要等宿主停止 IO
        if addr.mSelector == DEVICE_NOMINAL_SAMPLE_RATE && device.has_pending_configuration_change() {
            if let Err(e) = request_configuration_change() {
                device.abort_configuration_change();
                return Err(e);
            }
        }
        Ok(())
    })
}

// ============================================================================
// IO
// ============================================================================

unsafe extern "C" fn start_io(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "start_io: bad driver reference");

    guarded("start_io", || {
        if check_device_id(device_id)?.start_io()? {
            notify(&[PropertyChange::global(DEVICE_ID, DEVICE_IS_RUNNING)]);
        }
        Ok(())
    })
}

unsafe extern "C" fn stop_io(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "stop_io: bad driver reference");

    guarded("stop_io", || {
        if check_device_id(device_id)?.stop_io()? {
            notify(&[PropertyChange::global(DEVICE_ID, DEVICE_IS_RUNNING)]);
        }
        Ok(())
    })
}

unsafe extern "C" fn get_zero_timestamp(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
    sample_time: *mut Float64,
    host_time: *mut UInt64,
    seed: *mut UInt64,
) -> OSStatus {
    if !eq_driver_ptr(driver.cast()) {
        return HalError::BadObject.status();
    }
    let device = match check_device_id(device_id) {
        Ok(device) => device,
        Err(e) => return e.status(),
    };
    if sample_time.is_null() || host_time.is_null() || seed.is_null() {
        return HalError::IllegalOperation.status();
    }

    let ts = device.get_zero_timestamp();
    sample_time.write(ts.sample_time);
    host_time.write(ts.host_time);
    seed.write(ts.seed);
    NO_ERR
}

unsafe extern "C" fn will_do_io_operation(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
    operation_id: UInt32,
    will_do: *mut Boolean,
    will_do_in_place: *mut Boolean,
) -> OSStatus {
    check_driver_ptr_or_bad_obj!(driver, "will_do_io_operation: bad driver reference");
    let device = match check_device_id(device_id) {
        Ok(device) => device,
        Err(e) => return e.status(),
    };

    let (will, in_place) = device.will_do_io_operation(IoOperation::from(operation_id));
    if let Some(will_do) = NonNull::new(will_do) {
        will_do.as_ptr().write(Boolean::from(will));
    }
    if let Some(will_do_in_place) = NonNull::new(will_do_in_place) {
        will_do_in_place.as_ptr().write(Boolean::from(in_place));
    }
    NO_ERR
}

unsafe extern "C" fn begin_io_operation(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
    _operation_id: UInt32,
    _io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
) -> OSStatus {
    if !eq_driver_ptr(driver.cast()) {
        return HalError::BadObject.status();
    }
    to_status(check_device_id(device_id))
}

unsafe extern "C" fn do_io_operation(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    stream_id: AudioObjectID,
    _client_id: UInt32,
    operation_id: UInt32,
    io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
    io_main_buffer: *mut c_void,
    _io_secondary_buffer: *mut c_void,
) -> OSStatus {
    if !eq_driver_ptr(driver.cast()) {
        return HalError::BadObject.status();
    }
    let device = match check_device_id(device_id) {
        Ok(device) => device,
        Err(e) => return e.status(),
    };

    let frames = io_buffer_frame_size as usize;
    let buffer = if io_main_buffer.is_null() {
        None
    } else {
        // SAFETY: 主缓冲区是交错的 f32，容量为 io_buffer_frame_size 帧
        Some(slice::from_raw_parts_mut(
            io_main_buffer.cast::<f32>(),
            frames * CHANNELS,
        ))
    };

    device.do_io_operation(stream_id, IoOperation::from(operation_id), frames, buffer);
    NO_ERR
}

unsafe extern "C" fn end_io_operation(
    driver: AudioServerPlugInDriverRef,
    device_id: AudioObjectID,
    _client_id: UInt32,
    _operation_id: UInt32,
    _io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
) -> OSStatus {
    if !eq_driver_ptr(driver.cast()) {
        return HalError::BadObject.status();
    }
    to_status(check_device_id(device_id))
}
