//! 协作式取消令牌
//!
//! 全局"停止"标志的封装。所有循环在每次迭代和每次休眠边界检查该标志。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 休眠切片长度（取消响应的最坏延迟）
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 取消令牌（可克隆，所有副本共享同一标志）
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 置位停止标志
    ///
    /// 返回 `true` 表示本次调用完成了置位（之前未取消）。
    pub fn cancel(&self) -> bool {
        // Release: 置位前的所有写入对看到 true 的线程可见
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        // Acquire: If we see true, we must see all writes made before cancel()
        self.cancelled.load(Ordering::Acquire)
    }

    /// 可取消的休眠
    ///
    /// 以 10ms 为切片休眠，每个切片前检查标志。
    /// 返回 `true` 表示完整休眠，`false` 表示被取消。
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            spin_sleep::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// 休眠到指定时刻（可取消）
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        self.sleep(deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        assert!(token.cancel());
        assert!(clone.is_cancelled());
        // 第二次取消不再报告置位
        assert!(!clone.cancel());
    }

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_returns_early_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_sleep_until_past_deadline() {
        let token = CancellationToken::new();
        assert!(token.sleep_until(Instant::now() - Duration::from_millis(5)));
    }
}
