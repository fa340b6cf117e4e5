//! Pulse Loopback 辅助命令行
//!
//! 管理系统音频设备（默认输出、屏幕共享聚合设备），以及在进程内自检回环通路。
//! 结果以单行 `|` 分隔文本写到 stdout，诊断信息走日志/stderr，退出码 0 成功 1 失败。

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pulse_loopback::config::DeviceConfig;
use pulse_loopback::device::selectors::FourCc;
use pulse_loopback::engine::{HarnessConfig, LoopbackHarness};
use pulse_loopback::system::{self, capture, AudioSystem};

/// Pulse Loopback - virtual loopback device helper
#[derive(Parser)]
#[command(name = "pulse-loopback")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    System(SystemCommand),

    /// Run the loopback device in-process with a writer and a reader thread
    Selftest {
        /// Run time in seconds
        #[arg(short, long, default_value = "2")]
        seconds: f64,

        /// Nominal sample rate
        #[arg(short, long, default_value = "48000")]
        rate: f64,

        /// Device volume scalar (0.0 - 1.0)
        #[arg(long, default_value = "1.0")]
        volume: f32,

        /// Mute the device
        #[arg(long)]
        mute: bool,

        /// Test tone frequency in Hz
        #[arg(long, default_value = "440")]
        tone: f32,

        /// Do not lock the ring buffer in memory
        #[arg(long)]
        no_mlock: bool,
    },
}

/// 需要系统音频服务的命令
#[derive(Subcommand)]
enum SystemCommand {
    /// Exit 0 if the loopback device is installed, 1 otherwise
    Detect,

    /// Print "id|uid|name" of the default output device
    GetDefault,

    /// Set the default output device
    SetDefault {
        /// Audio object ID
        id: u32,
    },

    /// Create the screen share aggregate over a real output, print "id|uid"
    CreateAggregate {
        /// UID of the real output device
        real_uid: String,
    },

    /// Destroy the screen share aggregate (absent counts as success)
    DestroyAggregate,

    /// Route system output through the aggregate, print "savedId|savedName"
    StartCapture,

    /// Destroy the aggregate and restore the saved default output
    StopCapture {
        /// Device ID printed by start-capture
        saved_id: u32,
    },

    /// List all audio devices
    ListDevices,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help / --version 不算失败
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // 初始化日志
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// 执行命令，返回是否成功
fn run(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Selftest {
            seconds,
            rate,
            volume,
            mute,
            tone,
            no_mlock,
        } => selftest(seconds, rate, volume, mute, tone, !no_mlock),
        Commands::System(command) => {
            let sys = system::native()?;
            run_system(sys.as_ref(), command)
        }
    }
}

fn run_system(sys: &dyn AudioSystem, command: SystemCommand) -> anyhow::Result<bool> {
    match command {
        SystemCommand::Detect => {
            let found = capture::detect(sys)?;
            log::info!(
                "Loopback device {}",
                if found { "found" } else { "not found" }
            );
            Ok(found)
        }
        SystemCommand::GetDefault => {
            let d = capture::default_output(sys).context("Failed to get default output device")?;
            println!("{}|{}|{}", d.id, d.uid, d.name);
            Ok(true)
        }
        SystemCommand::SetDefault { id } => {
            capture::set_default_output(sys, id)?;
            Ok(true)
        }
        SystemCommand::CreateAggregate { real_uid } => {
            let (id, uid) = capture::create_aggregate(sys, &real_uid)
                .context("Failed to create aggregate device")?;
            println!("{}|{}", id, uid);
            Ok(true)
        }
        SystemCommand::DestroyAggregate => {
            capture::destroy_aggregate(sys)?;
            Ok(true)
        }
        SystemCommand::StartCapture => {
            let session = capture::start_capture(sys)?;
            println!("{}|{}", session.saved_id, session.saved_name);
            Ok(true)
        }
        SystemCommand::StopCapture { saved_id } => {
            capture::stop_capture(sys, saved_id)?;
            Ok(true)
        }
        SystemCommand::ListDevices => {
            let (devices, default_id) = capture::list_devices(sys)?;
            println!("Found {} audio devices:", devices.len());
            for d in &devices {
                println!("  {}", d);
            }
            println!("Default output device ID: {}", default_id);
            Ok(true)
        }
    }
}

/// 进程内自检
fn selftest(
    seconds: f64,
    rate: f64,
    volume: f32,
    mute: bool,
    tone: f32,
    lock_memory: bool,
) -> anyhow::Result<bool> {
    let config = HarnessConfig {
        device: DeviceConfig {
            initial_sample_rate: rate,
            lock_memory,
            ..DeviceConfig::default()
        },
        tone_hz: tone,
        volume,
        muted: mute,
        ..HarnessConfig::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let duration = Duration::try_from_secs_f64(seconds).context("Invalid --seconds")?;

    let mut harness = LoopbackHarness::new(config)?;
    println!(
        "Loopback selftest: {} Hz, {:.1} s (Ctrl+C to stop)",
        harness.device().sample_rate(),
        duration.as_secs_f64()
    );

    let report = harness.run_for(duration, &running)?;
    print!("{}", report);

    // 静音或零音量时不应收到任何有声帧
    let expect_audible = !mute && volume > 0.0;
    let passed = (report.audible_frames > 0) == expect_audible;
    println!(
        "selftest|{}|audible={}|overruns={}|underruns={}",
        if passed { "pass" } else { "fail" },
        report.audible_frames,
        report.stats.overrun_count,
        report.stats.underrun_count
    );
    log::debug!(
        "Stream format: '{}'",
        FourCc(harness.device().stream_format().format_id)
    );
    Ok(passed)
}
