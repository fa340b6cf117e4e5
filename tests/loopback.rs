//! 回环设备端到端测试（只用公开 API）

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pulse_loopback::audio::ManualClock;
use pulse_loopback::device::objects::{
    DEVICE_ID, INPUT_STREAM_ID, OUTPUT_STREAM_ID, PLUGIN_ID, VOLUME_CONTROL_ID,
};
use pulse_loopback::device::selectors::{
    BOOLEAN_VALUE, DEVICE_IS_RUNNING, DEVICE_NOMINAL_SAMPLE_RATE, LEVEL_SCALAR_VALUE,
    STREAM_VIRTUAL_FORMAT,
};
use pulse_loopback::device::{IoOperation, PropertyAddress, PropertyQuery, PropertyValue};
use pulse_loopback::{DeviceConfig, HalError, LoopbackDevice};

const CHANNELS: usize = 2;

fn config(ring_frames: usize) -> DeviceConfig {
    DeviceConfig {
        ring_capacity_frames: ring_frames,
        lock_memory: false,
        ..DeviceConfig::default()
    }
}

fn query(object: u32, selector: u32) -> PropertyQuery<'static> {
    PropertyQuery::new(object, PropertyAddress::global(selector))
}

/// 帧 i 的两个声道都写 `start + i`
fn ramp(start: usize, frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| [(start + i) as f32; CHANNELS])
        .collect()
}

#[test]
fn test_output_comes_back_on_input() {
    let device = LoopbackDevice::new(config(4096)).unwrap();
    device.start_io().unwrap();

    let mut out = ramp(1, 256);
    device.do_io_operation(OUTPUT_STREAM_ID, IoOperation::WriteMix, 256, Some(out.as_mut_slice()));

    let mut input = vec![0.0f32; 256 * CHANNELS];
    device.do_io_operation(INPUT_STREAM_ID, IoOperation::ReadInput, 256, Some(input.as_mut_slice()));
    assert_eq!(input, ramp(1, 256));

    // 已经读空，再读得到静音
    device.do_io_operation(INPUT_STREAM_ID, IoOperation::ReadInput, 256, Some(input.as_mut_slice()));
    assert!(input.iter().all(|s| *s == 0.0));

    let stats = device.stats();
    assert_eq!(stats.frames_stored, 256);
    assert_eq!(stats.frames_fetched, 256);
    assert_eq!(stats.frames_padded, 256);

    device.stop_io().unwrap();
}

#[test]
fn test_concurrent_writer_and_reader_keep_order() {
    const CHUNK: usize = 64;
    const TOTAL_CHUNKS: usize = 2000;

    // 小容量，保证会发生溢出
    let device = Arc::new(LoopbackDevice::new(config(1024)).unwrap());
    device.start_io().unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let device = Arc::clone(&device);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for n in 0..TOTAL_CHUNKS {
                let mut buf = ramp(1 + n * CHUNK, CHUNK);
                device.do_io_operation(
                    OUTPUT_STREAM_ID,
                    IoOperation::WriteMix,
                    CHUNK,
                    Some(buf.as_mut_slice()),
                );
                if n % 32 == 0 {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let reader = {
        let device = Arc::clone(&device);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last = 0.0f32;
            let mut received = 0usize;
            let mut buf = vec![0.0f32; CHUNK * CHANNELS];
            loop {
                let finished = done.load(Ordering::Acquire);
                device.do_io_operation(INPUT_STREAM_ID, IoOperation::ReadInput, CHUNK, Some(buf.as_mut_slice()));
                for frame in buf.chunks_exact(CHANNELS) {
                    assert_eq!(frame[0], frame[1], "channels diverged");
                    if frame[0] != 0.0 {
                        assert!(frame[0] > last, "{} after {}", frame[0], last);
                        last = frame[0];
                        received += 1;
                    }
                }
                if finished && device.ring_buffer().available_frames() == 0 {
                    break;
                }
            }
            received
        })
    };

    writer.join().unwrap();
    let received = reader.join().unwrap();

    let stats = device.stats();
    assert_eq!(received as u64, stats.frames_stored);
    assert_eq!(
        stats.frames_stored + stats.frames_dropped,
        (TOTAL_CHUNKS * CHUNK) as u64
    );
}

#[test]
fn test_io_sessions_are_reference_counted() {
    let device = LoopbackDevice::new(config(1024)).unwrap();

    assert_eq!(device.stop_io(), Err(HalError::NotRunning));

    assert_eq!(device.start_io(), Ok(true));
    assert_eq!(device.start_io(), Ok(false));
    assert_eq!(
        device.get_property_data(&query(DEVICE_ID, DEVICE_IS_RUNNING)),
        Ok(PropertyValue::U32(1))
    );

    assert_eq!(device.stop_io(), Ok(false));
    assert!(device.is_running());
    assert_eq!(device.stop_io(), Ok(true));
    assert!(!device.is_running());
    assert_eq!(
        device.get_property_data(&query(DEVICE_ID, DEVICE_IS_RUNNING)),
        Ok(PropertyValue::U32(0))
    );
}

#[test]
fn test_zero_timestamp_advances_in_whole_periods() {
    let clock = Arc::new(ManualClock::new(5_000));
    let device = LoopbackDevice::with_clock(config(1024), Box::new(Arc::clone(&clock))).unwrap();
    device.start_io().unwrap();

    let first = device.get_zero_timestamp();
    assert_eq!(first.sample_time, 0.0);
    assert_eq!(first.host_time, 5_000);
    assert_eq!(first.seed, 1);

    // 48 kHz 下 480 帧 = 10 ms
    clock.advance_nanos(9_999_999);
    assert_eq!(device.get_zero_timestamp().sample_time, 0.0);

    clock.advance_nanos(1);
    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 480.0);
    assert_eq!(ts.host_time, 5_000 + 10_000_000);

    // 45 ms = 2160 帧，向下取整到 4 个周期
    clock.advance_nanos(35_000_000);
    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 1920.0);
    assert_eq!(ts.host_time, 5_000 + 40_000_000);

    // 新会话重新锚定，seed 加一
    device.stop_io().unwrap();
    device.start_io().unwrap();
    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 0.0);
    assert_eq!(ts.host_time, 5_000 + 45_000_000);
    assert_eq!(ts.seed, 2);
}

#[test]
fn test_sample_rate_change_updates_formats() {
    let device = LoopbackDevice::new(config(1024)).unwrap();

    let changes = device
        .set_property_data(
            &query(DEVICE_ID, DEVICE_NOMINAL_SAMPLE_RATE),
            PropertyValue::F64(44100.0),
        )
        .unwrap();
    assert!(!changes.is_empty());
    assert_eq!(device.sample_rate(), 44100.0);

    match device.get_property_data(&query(OUTPUT_STREAM_ID, STREAM_VIRTUAL_FORMAT)) {
        Ok(PropertyValue::Format(format)) => {
            assert_eq!(format.sample_rate, 44100.0);
            assert_eq!(format.channels_per_frame, 2);
        }
        other => panic!("unexpected format value: {:?}", other),
    }

    assert_eq!(
        device.set_property_data(
            &query(DEVICE_ID, DEVICE_NOMINAL_SAMPLE_RATE),
            PropertyValue::F64(22050.0),
        ),
        Err(HalError::IllegalOperation)
    );
    assert_eq!(device.sample_rate(), 44100.0);
}

#[test]
fn test_rate_change_during_io_keeps_ring_consistent() {
    const CHUNK: usize = 480;
    const CAPACITY: usize = 960;
    const SWITCHES: usize = 20_000;

    let device = Arc::new(LoopbackDevice::new(config(CAPACITY)).unwrap());
    device.start_io().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let device = Arc::clone(&device);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut buf = vec![0.25f32; CHUNK * CHANNELS];
            while !done.load(Ordering::Acquire) {
                device.do_io_operation(
                    OUTPUT_STREAM_ID,
                    IoOperation::WriteMix,
                    CHUNK,
                    Some(buf.as_mut_slice()),
                );
                thread::yield_now();
            }
        })
    };

    let reader = {
        let device = Arc::clone(&device);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut buf = vec![0.0f32; CHUNK * CHANNELS];
            let mut violations = 0usize;
            while !done.load(Ordering::Acquire) {
                device.do_io_operation(
                    INPUT_STREAM_ID,
                    IoOperation::ReadInput,
                    CHUNK,
                    Some(buf.as_mut_slice()),
                );
                // 只有读线程推进 read，先读 read 再读 write
                let r = device.ring_buffer().read_count();
                let w = device.ring_buffer().write_count();
                if r > w || w - r > CAPACITY as u64 {
                    violations += 1;
                }
                thread::yield_now();
            }
            violations
        })
    };

    for i in 0..=SWITCHES {
        let rate = if i % 2 == 0 { 44100.0 } else { 48000.0 };
        device.set_sample_rate(rate).unwrap();
    }

    done.store(true, Ordering::Release);
    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), 0);

    // 运行中只记录，不生效
    assert_eq!(device.sample_rate(), 48000.0);
    assert!(device.has_pending_configuration_change());

    device.stop_io().unwrap();
    let changes = device.perform_configuration_change();
    assert!(!changes.is_empty());
    assert_eq!(device.sample_rate(), 44100.0);
    assert_eq!(device.ring_buffer().available_frames(), 0);
}

#[test]
fn test_mute_property_silences_loopback() {
    let device = LoopbackDevice::new(config(1024)).unwrap();
    device.start_io().unwrap();

    device
        .set_property_data(&query(VOLUME_CONTROL_ID, BOOLEAN_VALUE), PropertyValue::U32(1))
        .unwrap();

    let mut out = ramp(1, 128);
    device.do_io_operation(OUTPUT_STREAM_ID, IoOperation::WriteMix, 128, Some(out.as_mut_slice()));
    assert_eq!(device.ring_buffer().available_frames(), 0);

    device
        .set_property_data(&query(VOLUME_CONTROL_ID, BOOLEAN_VALUE), PropertyValue::U32(0))
        .unwrap();
    device
        .set_property_data(&query(VOLUME_CONTROL_ID, LEVEL_SCALAR_VALUE), PropertyValue::F32(0.5))
        .unwrap();

    let mut out = vec![1.0f32; 128 * CHANNELS];
    device.do_io_operation(OUTPUT_STREAM_ID, IoOperation::WriteMix, 128, Some(out.as_mut_slice()));
    let mut input = vec![0.0f32; 128 * CHANNELS];
    device.do_io_operation(INPUT_STREAM_ID, IoOperation::ReadInput, 128, Some(input.as_mut_slice()));
    assert!(input.iter().all(|s| (*s - 0.5).abs() < 1e-6));
}

#[test]
fn test_plugin_properties_are_not_settable() {
    let device = LoopbackDevice::new(config(1024)).unwrap();
    assert_eq!(
        device.set_property_data(
            &query(PLUGIN_ID, DEVICE_NOMINAL_SAMPLE_RATE),
            PropertyValue::F64(44100.0),
        ),
        Err(HalError::UnknownProperty)
    );
}

#[test]
fn test_harness_selftest_roundtrip() {
    use pulse_loopback::engine::{HarnessConfig, LoopbackHarness};

    let mut harness = LoopbackHarness::new(HarnessConfig {
        device: config(48000),
        ..HarnessConfig::default()
    })
    .unwrap();

    let running = AtomicBool::new(true);
    let report = harness
        .run_for(Duration::from_millis(200), &running)
        .unwrap();
    assert!(report.audible_frames > 0);
    assert!(!harness.is_running());
}
