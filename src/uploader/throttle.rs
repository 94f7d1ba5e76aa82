//! 传输进度节流
//!
//! 传输层每读出一块数据就会产生一次进度，直接转发会让执行器频繁加锁更新队列。
//! 这里按时间间隔节流，最后一次进度总是发送

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 默认节流间隔（毫秒）
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;

/// 从未发送过的标记
const NEVER: u64 = u64::MAX;

/// 进度节流器
///
/// 时间以创建时刻为原点，用原子操作记录上次发送时间
#[derive(Debug)]
pub struct ProgressThrottler {
    origin: Instant,
    last_emit_nanos: AtomicU64,
    interval_nanos: u64,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_emit_nanos: AtomicU64::new(NEVER),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// 距离上次发送超过间隔时返回 true 并记录时间
    pub fn should_emit(&self) -> bool {
        let now = self.now_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        let due = last == NEVER || now.saturating_sub(last) >= self.interval_nanos;
        due && self
            .last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// 强制发送（不检查间隔）
    pub fn force_emit(&self) -> bool {
        self.last_emit_nanos.store(self.now_nanos(), Ordering::Relaxed);
        true
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_PROGRESS_INTERVAL_MS)
    }
}

/// 进度发送端：整批已发送字节数
pub type ProgressSender = mpsc::UnboundedSender<u64>;

/// 进度接收端
pub type ProgressReceiver = mpsc::UnboundedReceiver<u64>;

/// 创建进度通道
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// 带节流的进度上报器
///
/// 可以在多个文件流之间共享，字节数累加到同一个计数器上
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: ProgressSender,
    loaded: Arc<AtomicU64>,
    throttler: Arc<ProgressThrottler>,
}

impl ProgressReporter {
    pub fn new(sender: ProgressSender, interval_ms: u64) -> Self {
        Self {
            sender,
            loaded: Arc::new(AtomicU64::new(0)),
            throttler: Arc::new(ProgressThrottler::with_millis(interval_ms)),
        }
    }

    /// 累加已发送字节数，按节流间隔上报
    pub fn add(&self, bytes: u64) -> u64 {
        let loaded = self.loaded.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if self.throttler.should_emit() {
            // 接收端关闭说明执行器已不关心进度
            let _ = self.sender.send(loaded);
        }
        loaded
    }

    /// 立即上报当前字节数
    pub fn flush(&self) -> u64 {
        let loaded = self.loaded.load(Ordering::SeqCst);
        self.throttler.force_emit();
        let _ = self.sender.send(loaded);
        loaded
    }

    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_throttler_basic() {
        let throttler = ProgressThrottler::with_millis(100);
        assert!(throttler.should_emit());
        assert!(!throttler.should_emit());
    }

    #[test]
    fn test_throttler_after_interval() {
        let throttler = ProgressThrottler::with_millis(30);
        assert!(throttler.should_emit());
        thread::sleep(Duration::from_millis(40));
        assert!(throttler.should_emit());
    }

    #[test]
    fn test_reporter_accumulates_and_flushes() {
        let (tx, mut rx) = progress_channel();
        let reporter = ProgressReporter::new(tx, 10_000);

        assert_eq!(reporter.add(10), 10);
        assert_eq!(reporter.add(5), 15);
        assert_eq!(reporter.flush(), 15);

        // 第一次 add 立即发送，第二次被节流，flush 总是发送
        assert_eq!(rx.try_recv().unwrap(), 10);
        assert_eq!(rx.try_recv().unwrap(), 15);
        assert!(rx.try_recv().is_err());
    }
}
