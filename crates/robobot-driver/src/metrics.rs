//! 总线指标
//!
//! 全部为原子计数器（Relaxed），`snapshot()` 返回一次性拷贝用于日志。

use std::sync::atomic::{AtomicU64, Ordering};

/// 总线客户端指标
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// 成功发布的消息数
    pub sent_total: AtomicU64,
    /// 收到的入站消息数（所有主题）
    pub received_total: AtomicU64,
    /// 发布失败总数
    pub publish_failures_total: AtomicU64,
    /// 当前连续发布失败数（成功时清零）
    pub consecutive_failures: AtomicU64,
    /// 非主控时被拒绝的发送数
    pub rejected_sends: AtomicU64,
    /// 载荷解析失败数
    pub decode_errors: AtomicU64,
    /// 非遥测前缀或未知主题的消息数
    pub ignored_messages: AtomicU64,
    /// 接收超时次数（正常空闲）
    pub rx_timeouts: AtomicU64,
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sent_total: u64,
    pub received_total: u64,
    pub publish_failures_total: u64,
    pub consecutive_failures: u64,
    pub rejected_sends: u64,
    pub decode_errors: u64,
    pub ignored_messages: u64,
    pub rx_timeouts: u64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent_total: self.sent_total.load(Ordering::Relaxed),
            received_total: self.received_total.load(Ordering::Relaxed),
            publish_failures_total: self.publish_failures_total.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            rejected_sends: self.rejected_sends.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
        }
    }
}
