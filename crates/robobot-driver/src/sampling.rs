//! 采样间隔估计
//!
//! 每个传感器维护一个指数滑动平均的采样间隔。前两次更新没有可靠的"上一时间戳"，
//! 因此在此之前间隔保持为传感器自己的占位值。

/// EMA 权重：新间隔 = (旧间隔 * 99 + 原始差值) / 100
const EMA_HISTORY_WEIGHT: f64 = 99.0;
const EMA_TOTAL_WEIGHT: f64 = 100.0;

/// 更新采样间隔
///
/// - `update_count == 2` 时直接返回原始差值（播种）
/// - 其余情况返回 EMA
///
/// 不检测时间戳乱序，负差值会照常进入平均。
pub fn update_sampling_interval(
    current_time: f64,
    previous_time: f64,
    update_count: u64,
    previous_interval: f64,
) -> f64 {
    let raw = current_time - previous_time;
    if update_count == 2 {
        raw
    } else {
        (previous_interval * EMA_HISTORY_WEIGHT + raw) / EMA_TOTAL_WEIGHT
    }
}

/// 带时间戳和采样间隔的传感器样本
///
/// 只由解码层写入，读取方拿到的是副本。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample<T> {
    pub value: T,
    /// 最近一次更新的发送端时间戳（秒）
    pub timestamp: f64,
    /// 采样间隔估计（秒）
    pub sampling_interval: f64,
    /// 已接收的更新次数
    pub update_count: u64,
}

impl<T> TimedSample<T> {
    /// 创建空样本，采样间隔为占位值
    pub fn new(value: T, placeholder_interval: f64) -> Self {
        Self {
            value,
            timestamp: 0.0,
            sampling_interval: placeholder_interval,
            update_count: 0,
        }
    }

    /// 是否收到过数据
    pub fn has_data(&self) -> bool {
        self.update_count > 0
    }

    /// 采样间隔是否已由估计器播种
    pub fn is_interval_trusted(&self) -> bool {
        self.update_count > 2
    }

    /// 记录一次更新
    ///
    /// 估计器只在已有至少两次更新后调用，计数在之后自增。
    pub(crate) fn record(&mut self, value: T, timestamp: f64) {
        if self.update_count >= 2 {
            self.sampling_interval = update_sampling_interval(
                timestamp,
                self.timestamp,
                self.update_count,
                self.sampling_interval,
            );
        }
        self.value = value;
        self.timestamp = timestamp;
        self.update_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seed_returns_raw_delta() {
        assert_eq!(update_sampling_interval(10.5, 10.0, 2, 1.0), 0.5);
    }

    #[test]
    fn test_ema_after_seed() {
        let interval = update_sampling_interval(11.0, 10.0, 3, 0.5);
        assert!((interval - (0.5 * 99.0 + 1.0) / 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_placeholder_held_for_first_two_samples() {
        let mut sample = TimedSample::new([0.0; 3], 1.0);
        assert!(!sample.has_data());

        sample.record([1.0, 2.0, 3.0], 100.0);
        assert_eq!(sample.sampling_interval, 1.0);
        assert_eq!(sample.update_count, 1);

        sample.record([1.0, 2.0, 3.0], 100.01);
        assert_eq!(sample.sampling_interval, 1.0);
        assert!(!sample.is_interval_trusted());

        // 第三次更新：播种为原始差值
        sample.record([1.0, 2.0, 3.0], 100.03);
        assert!((sample.sampling_interval - 0.02).abs() < 1e-9);
        assert!(sample.is_interval_trusted());
        assert_eq!(sample.update_count, 3);
    }

    proptest! {
        /// 播种后 EMA 始终位于旧间隔和原始差值之间
        #[test]
        fn prop_ema_between_previous_and_raw(
            previous in 0.0f64..10.0,
            t0 in 0.0f64..1.0e6,
            delta in 0.0f64..10.0,
            count in 3u64..1_000_000,
        ) {
            let interval = update_sampling_interval(t0 + delta, t0, count, previous);
            let lo = previous.min(delta) - 1e-6;
            let hi = previous.max(delta) + 1e-6;
            prop_assert!(interval >= lo && interval <= hi);
        }

        /// 恒定采样率下间隔收敛到真实值
        #[test]
        fn prop_constant_rate_converges(period in 0.001f64..1.0, placeholder in 0.0f64..1000.0) {
            let mut sample = TimedSample::new(0u8, placeholder);
            for i in 0..50 {
                sample.record(0, i as f64 * period);
            }
            prop_assert!((sample.sampling_interval - period).abs() < period * 1e-6 + 1e-9);
        }
    }
}
