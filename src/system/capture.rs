//! 屏幕共享捕获流程
//!
//! 把系统默认输出换成"真实输出 + 回环设备"的多输出聚合设备，
//! 播放的声音同时进入回环设备，停止时恢复原来的默认输出。

use std::time::Duration;

use super::{AggregateSpec, AudioSystem, DeviceSummary, SystemError, AGGREGATE_UID, LOOPBACK_UID};

/// 设置默认输出后等待的时间
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);
/// 创建聚合设备后等待的时间
pub const AGGREGATE_SETTLE: Duration = Duration::from_millis(500);
/// 销毁聚合设备后等待的时间
pub const CLEANUP_SETTLE: Duration = Duration::from_millis(200);

/// 一次捕获会话：恢复时需要的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    pub saved_id: u32,
    pub saved_name: String,
    pub aggregate_id: u32,
}

/// 回环设备是否已加载
pub fn detect(sys: &dyn AudioSystem) -> Result<bool, SystemError> {
    Ok(sys.find_by_uid(LOOPBACK_UID)?.is_some())
}

/// 当前默认输出设备
pub fn default_output(sys: &dyn AudioSystem) -> Result<DeviceSummary, SystemError> {
    let id = sys.default_output_id()?;
    sys.device(id)
}

/// 设置默认输出并回读校验
pub fn set_default_output(sys: &dyn AudioSystem, id: u32) -> Result<(), SystemError> {
    sys.set_default_output_id(id)?;
    sys.settle(DEFAULT_SETTLE);

    let actual = sys.default_output_id()?;
    if actual != id {
        return Err(SystemError::DefaultNotApplied { wanted: id, actual });
    }
    log::info!("Default output set to {}", id);
    Ok(())
}

/// 创建屏幕共享聚合设备，返回 (ID, UID)
pub fn create_aggregate(sys: &dyn AudioSystem, real_uid: &str) -> Result<(u32, String), SystemError> {
    let spec = AggregateSpec::screen_share(real_uid);
    let id = sys.create_aggregate(&spec)?;
    sys.settle(AGGREGATE_SETTLE);
    log::info!("Created aggregate device {} over {}", id, real_uid);

    let uid = match sys.device(id) {
        Ok(d) => d.uid,
        Err(e) => {
            log::warn!("Could not read aggregate UID: {}", e);
            String::new()
        }
    };
    Ok((id, uid))
}

/// 按 UID 销毁聚合设备
///
/// 设备不存在也算成功，返回 false。
pub fn destroy_aggregate(sys: &dyn AudioSystem) -> Result<bool, SystemError> {
    match sys.find_by_uid(AGGREGATE_UID)? {
        Some(id) => {
            sys.destroy_aggregate(id)?;
            log::info!("Destroyed aggregate device {}", id);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// 开始捕获
///
/// 聚合设备设为默认失败时会销毁刚创建的聚合设备再返回错误。
pub fn start_capture(sys: &dyn AudioSystem) -> Result<CaptureSession, SystemError> {
    let current = default_output(sys)?;
    log::info!(
        "Current default: {} ({}, ID {})",
        current.name,
        current.uid,
        current.id
    );

    if let Err(e) = destroy_aggregate(sys) {
        log::warn!("Leftover aggregate cleanup failed: {}", e);
    }
    sys.settle(CLEANUP_SETTLE);

    // 销毁旧聚合设备后默认输出可能已变
    let saved = default_output(sys)?;

    let (aggregate_id, _) = create_aggregate(sys, &saved.uid)?;

    if let Err(e) = set_default_output(sys, aggregate_id) {
        log::error!("Failed to set aggregate as default output, cleaning up: {}", e);
        if let Err(cleanup) = sys.destroy_aggregate(aggregate_id) {
            log::warn!("Aggregate cleanup failed: {}", cleanup);
        }
        return Err(e);
    }

    Ok(CaptureSession {
        saved_id: saved.id,
        saved_name: saved.name,
        aggregate_id,
    })
}

/// 停止捕获
///
/// 原默认输出恢复失败只记警告，系统会自己回落到某个默认设备。
pub fn stop_capture(sys: &dyn AudioSystem, saved_id: u32) -> Result<(), SystemError> {
    log::info!("Restoring default output to device {}", saved_id);

    if let Err(e) = destroy_aggregate(sys) {
        log::warn!("Aggregate destroy failed: {}", e);
    }
    sys.settle(CLEANUP_SETTLE);

    if saved_id > 0 {
        if let Err(e) = set_default_output(sys, saved_id) {
            log::warn!(
                "Could not restore saved device {} (ID may have changed): {}",
                saved_id,
                e
            );
        }
    }
    Ok(())
}

/// 设备列表与默认输出 ID
pub fn list_devices(sys: &dyn AudioSystem) -> Result<(Vec<DeviceSummary>, u32), SystemError> {
    let devices = sys.devices()?;
    let default_id = sys.default_output_id()?;
    Ok((devices, default_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const NOT_FOUND: i32 = 0x216F626A; // '!obj'

    struct FakeState {
        devices: Vec<DeviceSummary>,
        default_id: u32,
        next_id: u32,
        settles: Vec<Duration>,
        last_spec: Option<AggregateSpec>,
        /// 模拟"调用成功但默认输出没变"
        ignore_set_default: bool,
    }

    struct FakeSystem {
        state: RefCell<FakeState>,
    }

    fn summary(id: u32, uid: &str, name: &str) -> DeviceSummary {
        DeviceSummary {
            id,
            uid: uid.to_string(),
            name: name.to_string(),
            output_streams: 1,
            input_streams: 0,
            transport: 0,
        }
    }

    impl FakeSystem {
        fn new(with_loopback: bool) -> Self {
            let mut devices = vec![summary(10, "BuiltInSpeakerDevice", "Speakers")];
            if with_loopback {
                devices.push(summary(20, LOOPBACK_UID, "Pulse Audio"));
            }
            Self {
                state: RefCell::new(FakeState {
                    devices,
                    default_id: 10,
                    next_id: 100,
                    settles: Vec::new(),
                    last_spec: None,
                    ignore_set_default: false,
                }),
            }
        }

        fn has_uid(&self, uid: &str) -> bool {
            self.state.borrow().devices.iter().any(|d| d.uid == uid)
        }
    }

    impl AudioSystem for FakeSystem {
        fn devices(&self) -> Result<Vec<DeviceSummary>, SystemError> {
            Ok(self.state.borrow().devices.clone())
        }

        fn default_output_id(&self) -> Result<u32, SystemError> {
            Ok(self.state.borrow().default_id)
        }

        fn device(&self, id: u32) -> Result<DeviceSummary, SystemError> {
            self.state
                .borrow()
                .devices
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| SystemError::NotFound(id.to_string()))
        }

        fn set_default_output_id(&self, id: u32) -> Result<(), SystemError> {
            let mut state = self.state.borrow_mut();
            if !state.devices.iter().any(|d| d.id == id) {
                return Err(SystemError::Status {
                    op: "set default output",
                    status: NOT_FOUND,
                });
            }
            if !state.ignore_set_default {
                state.default_id = id;
            }
            Ok(())
        }

        fn create_aggregate(&self, spec: &AggregateSpec) -> Result<u32, SystemError> {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.devices.push(summary(id, &spec.uid, &spec.name));
            state.last_spec = Some(spec.clone());
            Ok(id)
        }

        fn destroy_aggregate(&self, id: u32) -> Result<(), SystemError> {
            let mut state = self.state.borrow_mut();
            state.devices.retain(|d| d.id != id);
            if state.default_id == id {
                state.default_id = state.devices.first().map(|d| d.id).unwrap_or(0);
            }
            Ok(())
        }

        fn settle(&self, duration: Duration) {
            self.state.borrow_mut().settles.push(duration);
        }
    }

    #[test]
    fn test_detect() {
        assert!(detect(&FakeSystem::new(true)).unwrap());
        assert!(!detect(&FakeSystem::new(false)).unwrap());
    }

    #[test]
    fn test_default_output() {
        let sys = FakeSystem::new(true);
        let d = default_output(&sys).unwrap();
        assert_eq!(d.id, 10);
        assert_eq!(d.uid, "BuiltInSpeakerDevice");
        assert_eq!(d.name, "Speakers");
    }

    #[test]
    fn test_set_default_verifies() {
        let sys = FakeSystem::new(true);
        set_default_output(&sys, 20).unwrap();
        assert_eq!(sys.default_output_id().unwrap(), 20);
        assert_eq!(sys.state.borrow().settles, vec![DEFAULT_SETTLE]);
    }

    #[test]
    fn test_set_default_not_applied() {
        let sys = FakeSystem::new(true);
        sys.state.borrow_mut().ignore_set_default = true;
        let err = set_default_output(&sys, 20).unwrap_err();
        assert!(matches!(
            err,
            SystemError::DefaultNotApplied {
                wanted: 20,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_create_aggregate() {
        let sys = FakeSystem::new(true);
        let (id, uid) = create_aggregate(&sys, "BuiltInSpeakerDevice").unwrap();
        assert_eq!(id, 100);
        assert_eq!(uid, AGGREGATE_UID);
        assert_eq!(sys.state.borrow().settles, vec![AGGREGATE_SETTLE]);

        let spec = sys.state.borrow().last_spec.clone().unwrap();
        assert_eq!(spec.sub_devices[0], "BuiltInSpeakerDevice");
        assert_eq!(spec.sub_devices[1], LOOPBACK_UID);
        assert_eq!(spec.main_sub_device, "BuiltInSpeakerDevice");
    }

    #[test]
    fn test_destroy_absent_is_ok() {
        let sys = FakeSystem::new(true);
        assert!(!destroy_aggregate(&sys).unwrap());

        create_aggregate(&sys, "BuiltInSpeakerDevice").unwrap();
        assert!(destroy_aggregate(&sys).unwrap());
        assert!(!sys.has_uid(AGGREGATE_UID));
    }

    #[test]
    fn test_start_and_stop_capture() {
        let sys = FakeSystem::new(true);

        let session = start_capture(&sys).unwrap();
        assert_eq!(session.saved_id, 10);
        assert_eq!(session.saved_name, "Speakers");
        assert_eq!(sys.default_output_id().unwrap(), session.aggregate_id);
        assert!(sys.has_uid(AGGREGATE_UID));
        assert_eq!(
            sys.state.borrow().settles,
            vec![CLEANUP_SETTLE, AGGREGATE_SETTLE, DEFAULT_SETTLE]
        );

        stop_capture(&sys, session.saved_id).unwrap();
        assert!(!sys.has_uid(AGGREGATE_UID));
        assert_eq!(sys.default_output_id().unwrap(), 10);
    }

    #[test]
    fn test_start_capture_replaces_leftover() {
        let sys = FakeSystem::new(true);
        let (old, _) = create_aggregate(&sys, "BuiltInSpeakerDevice").unwrap();
        sys.state.borrow_mut().default_id = old;

        let session = start_capture(&sys).unwrap();
        // 旧聚合设备被销毁后重新读取的默认输出才是要保存的
        assert_eq!(session.saved_id, 10);
        assert_ne!(session.aggregate_id, old);

        let aggregates = sys
            .devices()
            .unwrap()
            .into_iter()
            .filter(|d| d.uid == AGGREGATE_UID)
            .count();
        assert_eq!(aggregates, 1);
    }

    #[test]
    fn test_start_capture_cleans_up_on_failure() {
        let sys = FakeSystem::new(true);
        sys.state.borrow_mut().ignore_set_default = true;

        assert!(start_capture(&sys).is_err());
        assert!(!sys.has_uid(AGGREGATE_UID));
        assert_eq!(sys.default_output_id().unwrap(), 10);
    }

    #[test]
    fn test_stop_capture_restore_failure_is_warning() {
        let sys = FakeSystem::new(true);
        start_capture(&sys).unwrap();

        // 保存的 ID 已不存在
        assert!(stop_capture(&sys, 999).is_ok());
        assert!(!sys.has_uid(AGGREGATE_UID));
    }

    #[test]
    fn test_list_devices() {
        let sys = FakeSystem::new(true);
        let (devices, default_id) = list_devices(&sys).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(default_id, 10);
    }
}
