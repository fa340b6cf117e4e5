//! 回环设备
//!
//! 持有全部可变设备状态：
//! - 控制状态（采样率、IO 引用计数、锚点、seed）在一把 Mutex 后面，只由控制线程访问
//! - 音量/静音是原子量，IO 线程无锁读取
//! - Ring buffer 连接输出流（生产者）和输入流（消费者）
//!
//! IO 数据路径（`do_io_operation`）绝不加锁、分配或记录日志。

pub mod clock;
pub mod objects;
pub mod properties;
pub mod selectors;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio::format::{supported_sample_rate, StreamFormat, CHANNELS};
use crate::audio::timing::{HostClock, MachClock};
use crate::audio::{FrameRingBuffer, LoopbackStats, StatsReport, VolumeControl};
use crate::config::DeviceConfig;
use crate::error::{ConfigError, HalError};

use clock::{ClockAnchor, ZeroTimestamp};
use objects::{INPUT_STREAM_ID, OUTPUT_STREAM_ID};
use selectors::{IO_OPERATION_READ_INPUT, IO_OPERATION_WRITE_MIX};

pub use objects::{ObjectKind, StreamDirection};
pub use properties::{PropertyChange, PropertyQuery, PropertyValue};
pub use selectors::PropertyAddress;

/// IO 操作种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    /// 客户端混音结果写入输出流
    WriteMix,
    /// 从输入流读取
    ReadInput,
    /// 其它操作，设备不处理
    Other(u32),
}

impl From<u32> for IoOperation {
    fn from(id: u32) -> Self {
        match id {
            IO_OPERATION_WRITE_MIX => Self::WriteMix,
            IO_OPERATION_READ_INPUT => Self::ReadInput,
            other => Self::Other(other),
        }
    }
}

/// 采样率切换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChange {
    /// 与当前采样率相同
    Unchanged,
    /// 已经生效
    Applied,
    /// IO 运行中，等 `perform_configuration_change` 时生效
    Deferred,
}

/// 由设备锁保护的控制状态
#[derive(Debug)]
struct ControlState {
    sample_rate: f64,
    /// IO 运行期间请求、尚未生效的采样率
    pending_rate: Option<f64>,
    run_count: u32,
    anchor: ClockAnchor,
    seed: u64,
}

/// 回环设备
pub struct LoopbackDevice {
    config: DeviceConfig,
    control: Mutex<ControlState>,
    volume: VolumeControl,
    ring: FrameRingBuffer,
    stats: LoopbackStats,
    clock: Box<dyn HostClock>,
}

impl LoopbackDevice {
    /// 使用硬件时钟创建设备
    pub fn new(config: DeviceConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Box::new(MachClock))
    }

    /// 使用指定时钟创建设备
    pub fn with_clock(config: DeviceConfig, clock: Box<dyn HostClock>) -> Result<Self, ConfigError> {
        config.validate()?;

        let ring = FrameRingBuffer::new(config.ring_capacity_frames, CHANNELS);
        if config.lock_memory {
            ring.lock_memory();
        }

        log::info!(
            "Loopback device created: {} Hz, ring {} frames, period {} frames",
            config.initial_sample_rate,
            config.ring_capacity_frames,
            config.frames_per_period
        );

        Ok(Self {
            control: Mutex::new(ControlState {
                sample_rate: config.initial_sample_rate,
                pending_rate: None,
                run_count: 0,
                anchor: ClockAnchor::default(),
                seed: 0,
            }),
            volume: VolumeControl::new(),
            ring,
            stats: LoopbackStats::new(),
            clock,
            config,
        })
    }

    fn control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.control().sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.control().run_count > 0
    }

    /// 当前 IO 会话的 seed
    pub fn timestamp_seed(&self) -> u64 {
        self.control().seed
    }

    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    pub fn ring_buffer(&self) -> &FrameRingBuffer {
        &self.ring
    }

    pub fn stats(&self) -> StatsReport {
        self.stats.report()
    }

    /// 当前流格式（两个流相同，采样率跟随设备）
    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::float32_packed(self.sample_rate())
    }

    /// 切换标称采样率
    ///
    /// 只接受支持的采样率，不影响 IO 运行状态。
    /// IO 停止时立即生效并清空 ring buffer（旧采样率的数据没有意义）；
    /// IO 运行时 store/fetch 可能正在进行，不能清空，只记录为挂起，
    /// 由 `perform_configuration_change` 在 IO 静止时应用。
    pub fn set_sample_rate(&self, rate: f64) -> Result<RateChange, HalError> {
        let Some(rate) = supported_sample_rate(rate) else {
            log::warn!("Rejected unsupported sample rate: {} Hz", rate);
            return Err(HalError::IllegalOperation);
        };

        let mut control = self.control();

        if control.run_count > 0 {
            if control.sample_rate == rate {
                control.pending_rate = None;
                return Ok(RateChange::Unchanged);
            }
            control.pending_rate = Some(rate);
            log::info!("Sample rate change to {} Hz deferred until IO is idle", rate);
            return Ok(RateChange::Deferred);
        }

        control.pending_rate = None;
        let changed = control.sample_rate != rate;
        control.sample_rate = rate;
        // run_count 为 0，IO 线程不会访问 ring buffer
        self.ring.reset();
        drop(control);

        if changed {
            log::info!("Nominal sample rate changed to {} Hz", rate);
            Ok(RateChange::Applied)
        } else {
            Ok(RateChange::Unchanged)
        }
    }

    /// 是否有等待应用的采样率
    pub fn has_pending_configuration_change(&self) -> bool {
        self.control().pending_rate.is_some()
    }

    /// 应用挂起的采样率，返回需要通知宿主的属性变化
    ///
    /// 调用方保证没有 store/fetch 在进行：宿主在 PerformDeviceConfigurationChange
    /// 之前停止 IO，进程内调用者在 IO 线程退出之后调用。
    pub fn perform_configuration_change(&self) -> Vec<PropertyChange> {
        let mut control = self.control();
        let Some(rate) = control.pending_rate.take() else {
            return Vec::new();
        };
        control.sample_rate = rate;
        self.ring.reset();
        drop(control);

        log::info!("Nominal sample rate changed to {} Hz", rate);
        properties::sample_rate_changes()
    }

    /// 丢弃挂起的采样率
    pub fn abort_configuration_change(&self) {
        if let Some(rate) = self.control().pending_rate.take() {
            log::warn!("Sample rate change to {} Hz aborted", rate);
        }
    }

    /// 开始 IO（可重入）
    ///
    /// 只有 0 → 1 时才真正开始会话：记录锚点、seed 加一、清空 ring buffer。
    /// 返回这次调用是否开始了新会话。
    pub fn start_io(&self) -> Result<bool, HalError> {
        let mut control = self.control();

        if control.run_count > 0 {
            control.run_count = control
                .run_count
                .checked_add(1)
                .ok_or(HalError::IllegalOperation)?;
            log::debug!("StartIO: run count {}", control.run_count);
            return Ok(false);
        }

        control.run_count = 1;
        control.anchor = ClockAnchor {
            host_time: self.clock.now(),
            sample_time: 0,
        };
        control.seed = control.seed.wrapping_add(1);
        self.ring.reset();
        self.stats.reset();

        log::info!(
            "IO started (seed {}, anchor {})",
            control.seed,
            control.anchor.host_time
        );
        Ok(true)
    }

    /// 停止 IO（可重入）
    ///
    /// 计数为 0 时返回 `NotRunning`。返回这次调用是否结束了会话。
    /// Ring buffer 和锚点保留到下一次开始。
    pub fn stop_io(&self) -> Result<bool, HalError> {
        let mut control = self.control();

        if control.run_count == 0 {
            log::warn!("StopIO without matching StartIO");
            return Err(HalError::NotRunning);
        }

        control.run_count -= 1;
        if control.run_count == 0 {
            log::info!("IO stopped (seed {})", control.seed);
            Ok(true)
        } else {
            log::debug!("StopIO: run count {}", control.run_count);
            Ok(false)
        }
    }

    /// 当前零时间戳
    pub fn get_zero_timestamp(&self) -> ZeroTimestamp {
        let control = self.control();
        clock::zero_timestamp(
            self.clock.as_ref(),
            self.clock.now(),
            control.anchor,
            control.sample_rate,
            self.config.frames_per_period,
            control.seed,
        )
    }

    /// 设备是否执行某个 IO 操作，返回 (will_do, in_place)
    pub fn will_do_io_operation(&self, operation: IoOperation) -> (bool, bool) {
        match operation {
            IoOperation::WriteMix | IoOperation::ReadInput => (true, true),
            IoOperation::Other(_) => (false, false),
        }
    }

    /// IO 数据路径
    ///
    /// - WriteMix + 输出流：按音量处理后写入 ring buffer（静音/零音量直接丢弃）
    /// - ReadInput + 输入流：从 ring buffer 读取，不足部分补静音
    /// - 其它组合、空缓冲区：什么都不做
    #[inline]
    pub fn do_io_operation(
        &self,
        stream: u32,
        operation: IoOperation,
        frames: usize,
        buffer: Option<&mut [f32]>,
    ) {
        let Some(buffer) = buffer else {
            return;
        };
        let samples = frames.saturating_mul(CHANNELS).min(buffer.len());
        if samples == 0 {
            return;
        }
        let buffer = &mut buffer[..samples];
        let frames = samples / CHANNELS;

        match (operation, stream) {
            (IoOperation::WriteMix, OUTPUT_STREAM_ID) => {
                if self.volume.apply(buffer) {
                    let stored = self.ring.store(buffer, frames);
                    self.stats.on_store(frames, stored);
                } else {
                    self.stats.on_muted(frames);
                }
            }
            (IoOperation::ReadInput, INPUT_STREAM_ID) => {
                let fetched = self.ring.fetch(buffer, frames);
                self.stats
                    .on_fetch(frames, fetched, self.ring.available_frames());
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // 属性
    // ------------------------------------------------------------------

    /// 属性是否存在（未知对象返回 false，从不失败）
    pub fn has_property(&self, query: &PropertyQuery<'_>) -> bool {
        properties::find(query.object, query.address.selector).is_ok()
    }

    pub fn is_property_settable(&self, query: &PropertyQuery<'_>) -> Result<bool, HalError> {
        properties::find(query.object, query.address.selector).map(|entry| entry.set.is_some())
    }

    /// 确认属性存在且可设置，否则返回 `UnknownProperty`
    ///
    /// 在解析设置值之前调用，保证错误分类不受数据大小影响。
    pub fn check_settable(&self, query: &PropertyQuery<'_>) -> Result<(), HalError> {
        if self.is_property_settable(query)? {
            Ok(())
        } else {
            log::warn!(
                "Attempt to set read-only property {} on object {}",
                query.address,
                query.object
            );
            Err(HalError::UnknownProperty)
        }
    }

    /// 属性数据大小（字节），由 getter 的取值推导
    pub fn get_property_data_size(&self, query: &PropertyQuery<'_>) -> Result<u32, HalError> {
        self.get_property_data(query).map(|value| value.byte_size())
    }

    pub fn get_property_data(&self, query: &PropertyQuery<'_>) -> Result<PropertyValue, HalError> {
        let entry = properties::find(query.object, query.address.selector)?;
        Ok((entry.get)(self, query))
    }

    /// 设置属性，返回需要通知宿主的属性变化
    pub fn set_property_data(
        &self,
        query: &PropertyQuery<'_>,
        value: PropertyValue,
    ) -> Result<Vec<PropertyChange>, HalError> {
        self.check_settable(query)?;
        let entry = properties::find(query.object, query.address.selector)?;
        entry
            .set
            .map_or(Err(HalError::UnknownProperty), |set| set(self, value))
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        log::info!("Loopback device destroyed");
    }
}
