//! 回环自检引擎
//!
//! 在进程内模拟宿主：一个写线程按 IO 周期把测试音写入输出流，
//! 一个读线程按同样的节奏从输入流读取，两者只通过设备的 lock-free ring buffer 连接。
//! 用于 `selftest` 命令，在没有音频守护进程的环境下验证数据通路。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use atomic_float::AtomicF32;
use thiserror::Error;

use crate::audio::format::CHANNELS;
use crate::audio::StatsReport;
use crate::config::DeviceConfig;
use crate::device::clock::ZeroTimestamp;
use crate::device::objects::{INPUT_STREAM_ID, OUTPUT_STREAM_ID};
use crate::device::{IoOperation, LoopbackDevice};
use crate::error::{ConfigError, HalError};

/// 自检配置
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub device: DeviceConfig,
    /// 测试音频率
    pub tone_hz: f32,
    /// 测试音幅度
    pub amplitude: f32,
    /// 设备音量（标量）
    pub volume: f32,
    pub muted: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            tone_hz: 440.0,
            amplitude: 0.5,
            volume: 1.0,
            muted: false,
        }
    }
}

/// 引擎错误
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid device configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("device error: {0}")]
    Device(#[from] HalError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// 两个 IO 线程共享的状态
struct IoState {
    running: AtomicBool,
    /// 读线程看到的峰值
    peak: AtomicF32,
    /// 读线程收到的非静音帧
    audible_frames: AtomicU64,
}

/// 自检报告
#[derive(Debug, Clone)]
pub struct HarnessReport {
    pub stats: StatsReport,
    pub peak: f32,
    pub audible_frames: u64,
    pub zero_timestamp: ZeroTimestamp,
    pub elapsed: Duration,
}

impl std::fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stats)?;
        writeln!(f)?;
        writeln!(f, "Elapsed: {:.2} s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Peak received: {:.3}", self.peak)?;
        writeln!(f, "Audible frames received: {}", self.audible_frames)?;
        writeln!(
            f,
            "Zero timestamp: sample {} / host {} / seed {}",
            self.zero_timestamp.sample_time, self.zero_timestamp.host_time, self.zero_timestamp.seed
        )
    }
}

/// 进程内回环
pub struct LoopbackHarness {
    config: HarnessConfig,
    device: Arc<LoopbackDevice>,
    io_state: Arc<IoState>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl LoopbackHarness {
    /// 创建设备并应用音量设置
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        let device = Arc::new(LoopbackDevice::new(config.device.clone())?);
        device.volume().set_scalar(config.volume)?;
        device.volume().set_muted(config.muted);

        Ok(Self {
            config,
            device,
            io_state: Arc::new(IoState {
                running: AtomicBool::new(false),
                peak: AtomicF32::new(0.0),
                audible_frames: AtomicU64::new(0),
            }),
            writer: None,
            reader: None,
            started_at: None,
        })
    }

    pub fn device(&self) -> &Arc<LoopbackDevice> {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.io_state.running.load(Ordering::Acquire)
    }

    /// 开始 IO 并启动读写线程
    pub fn start(&mut self) -> Result<(), HarnessError> {
        if self.is_running() {
            return Ok(());
        }

        self.device.start_io()?;
        self.io_state.peak.store(0.0, Ordering::Relaxed);
        self.io_state.audible_frames.store(0, Ordering::Relaxed);
        self.io_state.running.store(true, Ordering::Release);
        self.started_at = Some(Instant::now());

        let period_frames = self.config.device.frames_per_period as usize;
        let period = Duration::from_secs_f64(period_frames as f64 / self.device.sample_rate());

        let writer = {
            let device = Arc::clone(&self.device);
            let state = Arc::clone(&self.io_state);
            let tone = Tone::new(self.config.tone_hz, self.config.amplitude, self.device.sample_rate());
            thread::Builder::new()
                .name("loopback-writer".to_string())
                .spawn(move || Self::writer_main(device, state, tone, period_frames, period))
        };
        match writer {
            Ok(handle) => self.writer = Some(handle),
            Err(source) => {
                self.abort_start();
                return Err(HarnessError::Spawn {
                    name: "writer",
                    source,
                });
            }
        }

        let reader = {
            let device = Arc::clone(&self.device);
            let state = Arc::clone(&self.io_state);
            thread::Builder::new()
                .name("loopback-reader".to_string())
                .spawn(move || Self::reader_main(device, state, period_frames, period))
        };
        match reader {
            Ok(handle) => self.reader = Some(handle),
            Err(source) => {
                self.abort_start();
                return Err(HarnessError::Spawn {
                    name: "reader",
                    source,
                });
            }
        }

        log::info!(
            "Loopback harness started: {} frames per period ({:.1} ms)",
            period_frames,
            period.as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn abort_start(&mut self) {
        self.io_state.running.store(false, Ordering::Release);
        self.join_threads();
        let _ = self.device.stop_io();
    }

    fn join_threads(&mut self) {
        for handle in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            if handle.join().is_err() {
                log::error!("Loopback IO thread panicked");
            }
        }
    }

    /// 停止线程并结束 IO
    pub fn stop(&mut self) -> Result<(), HarnessError> {
        if !self.is_running() {
            return Ok(());
        }
        self.io_state.running.store(false, Ordering::Release);
        self.join_threads();
        self.device.stop_io()?;
        log::info!("Loopback harness stopped");
        Ok(())
    }

    /// 当前报告
    pub fn report(&self) -> HarnessReport {
        HarnessReport {
            stats: self.device.stats(),
            peak: self.io_state.peak.load(Ordering::Relaxed),
            audible_frames: self.io_state.audible_frames.load(Ordering::Relaxed),
            zero_timestamp: self.device.get_zero_timestamp(),
            elapsed: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    /// 运行 `duration` 或直到 `keep_running` 变为 false
    pub fn run_for(
        &mut self,
        duration: Duration,
        keep_running: &AtomicBool,
    ) -> Result<HarnessReport, HarnessError> {
        self.start()?;
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline && keep_running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
        }
        let report = self.report();
        self.stop()?;
        Ok(report)
    }

    /// 写线程：每个周期生成一块测试音写入输出流
    fn writer_main(
        device: Arc<LoopbackDevice>,
        state: Arc<IoState>,
        mut tone: Tone,
        period_frames: usize,
        period: Duration,
    ) {
        set_io_thread_priority(period);

        let mut buffer = vec![0.0f32; period_frames * CHANNELS];
        let mut next = Instant::now();

        while state.running.load(Ordering::Acquire) {
            tone.fill(&mut buffer);
            device.do_io_operation(
                OUTPUT_STREAM_ID,
                IoOperation::WriteMix,
                period_frames,
                Some(buffer.as_mut_slice()),
            );
            next += period;
            sleep_until(next);
        }
    }

    /// 读线程：每个周期从输入流读取并记录峰值
    fn reader_main(
        device: Arc<LoopbackDevice>,
        state: Arc<IoState>,
        period_frames: usize,
        period: Duration,
    ) {
        set_io_thread_priority(period);

        let mut buffer = vec![0.0f32; period_frames * CHANNELS];
        let mut next = Instant::now();
        let mut peak = 0.0f32;

        while state.running.load(Ordering::Acquire) {
            device.do_io_operation(
                INPUT_STREAM_ID,
                IoOperation::ReadInput,
                period_frames,
                Some(buffer.as_mut_slice()),
            );

            let mut audible = 0u64;
            for frame in buffer.chunks_exact(CHANNELS) {
                let frame_peak = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
                if frame_peak > 0.0 {
                    audible += 1;
                }
                peak = peak.max(frame_peak);
            }
            state.peak.store(peak, Ordering::Relaxed);
            state.audible_frames.fetch_add(audible, Ordering::Relaxed);

            next += period;
            sleep_until(next);
        }
    }
}

impl Drop for LoopbackHarness {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// 正弦测试音
struct Tone {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl Tone {
    fn new(freq: f32, amplitude: f32, sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU * freq / sample_rate as f32,
            amplitude,
        }
    }

    fn fill(&mut self, interleaved: &mut [f32]) {
        for frame in interleaved.chunks_exact_mut(CHANNELS) {
            let value = self.amplitude * self.phase.sin();
            frame.fill(value);
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
    }
}

/// 睡到 `deadline`；已经错过就立即返回
fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

/// 设置 IO 线程优先级
///
/// 1. QoS 标记为 User Interactive（总是成功）
/// 2. Mach THREAD_TIME_CONSTRAINT_POLICY，周期取 IO 周期（不需要 root）
fn set_io_thread_priority(period: Duration) {
    #[cfg(target_os = "macos")]
    {
        set_qos_class();
        set_realtime_priority(period);
    }
    #[cfg(not(target_os = "macos"))]
    let _ = period;
}

#[cfg(target_os = "macos")]
fn set_qos_class() {
    // QOS_CLASS_USER_INTERACTIVE = 0x21
    const QOS_CLASS_USER_INTERACTIVE: u32 = 0x21;

    extern "C" {
        fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
    }

    let result = unsafe { pthread_set_qos_class_self_np(QOS_CLASS_USER_INTERACTIVE, 0) };
    if result != 0 {
        log::debug!("Failed to set QoS class (errno: {})", result);
    }
}

/// 使用 timing::ns_to_mach_ticks 转换纳秒到 Mach ticks
/// （Apple Silicon 上 1 tick ≈ 41.67ns，不等于 1ns）
#[cfg(target_os = "macos")]
fn set_realtime_priority(period: Duration) {
    use crate::audio::timing::ns_to_mach_ticks;

    #[repr(C)]
    struct ThreadTimeConstraintPolicy {
        period: u32,
        computation: u32,
        constraint: u32,
        preemptible: u32,
    }

    const THREAD_TIME_CONSTRAINT_POLICY: u32 = 2;

    extern "C" {
        fn pthread_mach_thread_np(thread: libc::pthread_t) -> u32;
        fn thread_policy_set(
            thread: u32,
            flavor: u32,
            policy_info: *const std::ffi::c_void,
            count: u32,
        ) -> i32;
    }

    // 不低于 1ms
    let period_ns = (period.as_nanos() as u64).max(1_000_000);
    let computation_ns = period_ns / 4;

    let policy = ThreadTimeConstraintPolicy {
        period: ns_to_mach_ticks(period_ns) as u32,
        computation: ns_to_mach_ticks(computation_ns) as u32,
        constraint: ns_to_mach_ticks(period_ns) as u32,
        preemptible: 1,
    };

    let result = unsafe {
        thread_policy_set(
            pthread_mach_thread_np(libc::pthread_self()),
            THREAD_TIME_CONSTRAINT_POLICY,
            &policy as *const _ as *const std::ffi::c_void,
            4,
        )
    };

    if result == 0 {
        log::debug!("Realtime priority set: period={}µs", period_ns / 1000);
    } else {
        log::debug!(
            "Failed to set realtime priority (kern_return: {}), using default scheduling",
            result
        );
    }
}
