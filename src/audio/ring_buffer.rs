//! Lock-free Single-Producer Single-Consumer Frame Ring Buffer
//!
//! 设计目标：
//! - 零锁：输出流写入（生产者）和输入流读取（消费者）完全无锁
//! - 零分配：样本存储在初始化时预分配
//! - 缓存友好：两个计数器用 `CachePadded` 各占一个 cache line
//! - 内存锁定：可选 mlock 防止 page fault
//!
//! 计数器是单调递增的帧数（u64，永不回绕），位置 = 计数 % 容量。
//! 溢出时丢弃新帧，欠载时补静音，两者都不是错误。

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// 交织 f32 帧的 SPSC 环形缓冲区
///
/// 不变式：`read_count <= write_count` 且 `write_count - read_count <= capacity_frames`
pub struct FrameRingBuffer {
    samples: Box<[UnsafeCell<f32>]>,
    capacity_frames: usize,
    channels: usize,

    write_count: CachePadded<AtomicU64>,
    read_count: CachePadded<AtomicU64>,

    memory_locked: AtomicBool,
}

// 样本区只由生产者写入 [write, write+n) 和消费者读取 [read, read+n)，
// 两段区间由 acquire/release 计数器保证不重叠
unsafe impl Send for FrameRingBuffer {}
unsafe impl Sync for FrameRingBuffer {}

impl FrameRingBuffer {
    /// 创建容量为 `capacity_frames` 帧、`channels` 声道的缓冲区（全零）
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        Self {
            samples: zeroed_store(capacity_frames * channels),
            capacity_frames,
            channels,
            write_count: CachePadded::new(AtomicU64::new(0)),
            read_count: CachePadded::new(AtomicU64::new(0)),
            memory_locked: AtomicBool::new(false),
        }
    }

    /// 重新分配样本存储并清零计数器
    ///
    /// 需要独占访问，不能与 store/fetch 并发
    pub fn initialize(&mut self, capacity_frames: usize, channels: usize) {
        let was_locked = self.is_memory_locked();
        self.unlock_memory();

        self.samples = zeroed_store(capacity_frames * channels);
        self.capacity_frames = capacity_frames;
        self.channels = channels;
        *self.write_count.get_mut() = 0;
        *self.read_count.get_mut() = 0;

        if was_locked {
            self.lock_memory();
        }
    }

    /// 清零样本存储和两个计数器
    ///
    /// 调用方保证此时没有 store/fetch 在进行（IO 会话开始、采样率切换）
    pub fn reset(&self) {
        let base = self.base_ptr();
        unsafe {
            std::ptr::write_bytes(base, 0, self.samples.len());
        }
        self.write_count.store(0, Ordering::Release);
        self.read_count.store(0, Ordering::Release);
    }

    /// 写入帧（生产者调用）
    ///
    /// `src` 为交织样本，`frames` 会被截断到 `src` 实际容纳的帧数。
    /// 返回实际写入的帧数，超出空闲空间的帧被丢弃。
    /// 此函数是 wait-free 的，绝不阻塞
    #[inline]
    pub fn store(&self, src: &[f32], frames: usize) -> usize {
        if self.capacity_frames == 0 || self.channels == 0 {
            return 0;
        }
        let frames = frames.min(src.len() / self.channels);

        let write = self.write_count.load(Ordering::Relaxed);
        let read = self.read_count.load(Ordering::Acquire);

        let used = write.wrapping_sub(read) as usize;
        debug_assert!(used <= self.capacity_frames, "ring buffer invariant violated: used > capacity");

        let free = self.capacity_frames.saturating_sub(used);
        let to_store = frames.min(free);
        if to_store == 0 {
            return 0;
        }

        let start = (write % self.capacity_frames as u64) as usize;
        let first = to_store.min(self.capacity_frames - start);
        let second = to_store - first;
        let ch = self.channels;
        let base = self.base_ptr();

        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(start * ch), first * ch);
            if second > 0 {
                std::ptr::copy_nonoverlapping(src.as_ptr().add(first * ch), base, second * ch);
            }
        }

        self.write_count
            .store(write.wrapping_add(to_store as u64), Ordering::Release);
        to_store
    }

    /// 读取帧（消费者调用）
    ///
    /// 返回实际读取的帧数；请求中未被满足的部分填零（静音）。
    /// 此函数是 wait-free 的，绝不阻塞
    #[inline]
    pub fn fetch(&self, dst: &mut [f32], frames: usize) -> usize {
        if self.capacity_frames == 0 || self.channels == 0 {
            dst.fill(0.0);
            return 0;
        }
        let ch = self.channels;
        let frames = frames.min(dst.len() / ch);

        let read = self.read_count.load(Ordering::Relaxed);
        let write = self.write_count.load(Ordering::Acquire);

        let available = (write.wrapping_sub(read) as usize).min(self.capacity_frames);
        let to_fetch = frames.min(available);

        if to_fetch > 0 {
            let start = (read % self.capacity_frames as u64) as usize;
            let first = to_fetch.min(self.capacity_frames - start);
            let second = to_fetch - first;
            let base = self.base_ptr();

            unsafe {
                std::ptr::copy_nonoverlapping(base.add(start * ch), dst.as_mut_ptr(), first * ch);
                if second > 0 {
                    std::ptr::copy_nonoverlapping(
                        base,
                        dst.as_mut_ptr().add(first * ch),
                        second * ch,
                    );
                }
            }
        }

        // 欠载部分补静音
        dst[to_fetch * ch..frames * ch].fill(0.0);

        self.read_count
            .store(read.wrapping_add(to_fetch as u64), Ordering::Release);
        to_fetch
    }

    /// 当前可读帧数（快照，可与 store/fetch 并发调用）
    #[inline]
    pub fn available_frames(&self) -> usize {
        let read = self.read_count.load(Ordering::Acquire);
        let write = self.write_count.load(Ordering::Acquire);
        (write.wrapping_sub(read) as usize).min(self.capacity_frames)
    }

    /// 当前可写帧数
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.capacity_frames - self.available_frames()
    }

    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 累计写入帧数
    #[inline]
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    /// 累计读取帧数
    #[inline]
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Acquire)
    }

    /// 锁定样本存储，防止被换页
    ///
    /// IO 回调里的 page fault 会导致严重的时序抖动。
    /// 返回是否成功锁定
    pub fn lock_memory(&self) -> bool {
        if self.memory_locked.load(Ordering::Acquire) {
            return true;
        }
        let len = self.store_bytes();
        if len == 0 {
            return false;
        }

        let result = unsafe { libc::mlock(self.base_ptr() as *const libc::c_void, len) };

        if result == 0 {
            self.memory_locked.store(true, Ordering::Release);
            log::debug!("Ring buffer memory locked: {} bytes", len);
            true
        } else {
            log::warn!(
                "Failed to lock ring buffer memory: {}",
                std::io::Error::last_os_error()
            );
            false
        }
    }

    /// 解锁样本存储
    pub fn unlock_memory(&self) {
        if !self.memory_locked.swap(false, Ordering::AcqRel) {
            return;
        }
        unsafe {
            libc::munlock(self.base_ptr() as *const libc::c_void, self.store_bytes());
        }
        log::debug!("Ring buffer memory unlocked");
    }

    pub fn is_memory_locked(&self) -> bool {
        self.memory_locked.load(Ordering::Acquire)
    }

    #[inline]
    fn base_ptr(&self) -> *mut f32 {
        // UnsafeCell<f32> 与 f32 布局相同
        self.samples.as_ptr() as *mut f32
    }

    fn store_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl Drop for FrameRingBuffer {
    fn drop(&mut self) {
        self.unlock_memory();
    }
}

fn zeroed_store(len: usize) -> Box<[UnsafeCell<f32>]> {
    (0..len).map(|_| UnsafeCell::new(0.0)).collect()
}
