//! 巡线位置估计
//!
//! 把 8 路反射强度换算成线相对车体中心的归一化位置（约 -1..+1，负值表示线在左侧），
//! 并识别横线和路口形状。
//!
//! # 算法
//!
//! ```text
//! avg      = mean(values)
//! v[i]     = values[i] - avg        （只保留 v[i] > 0）
//! position = (Σ (i+1)·v[i] / Σ v[i] - 4.5) / 4
//! ```
//!
//! 强度跨度不足或没有一路超过有效阈值时位置为 NaN。

use robobot_protocol::LINE_SENSOR_COUNT;
use std::time::{Duration, Instant};

/// 单路传感器判定为"在线上"的阈值
pub const ACTIVE_THRESHOLD: u16 = 800;
/// 平均强度超过该值视为横线
pub const CROSSING_THRESHOLD: f64 = 800.0;
/// 最大强度超过该值读数才有效
pub const VALID_THRESHOLD: u16 = 700;
/// 最大最小差不超过该值时无法定位
pub const MIN_SPREAD: u16 = 200;
/// 丢线后仍认为线有效的时间
pub const MAX_TIME_LINE_LOST: Duration = Duration::from_secs(1);

/// 每一路是否在线上
pub type ActiveMask = [bool; LINE_SENSOR_COUNT];

/// 单帧估计结果（无状态）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineEstimate {
    /// 归一化位置，无法定位时为 NaN
    pub position: f64,
    pub active: ActiveMask,
    pub is_crossing: bool,
    pub is_valid: bool,
}

/// 逐路判定是否在线上
pub fn active_sensors(values: &[u16; LINE_SENSOR_COUNT]) -> ActiveMask {
    values.map(|v| v >= ACTIVE_THRESHOLD)
}

/// 从一帧原始强度估计线位置
pub fn estimate(values: &[u16; LINE_SENSOR_COUNT]) -> LineEstimate {
    let avg = values.iter().map(|&v| f64::from(v)).sum::<f64>() / LINE_SENSOR_COUNT as f64;
    let max = values.iter().copied().max().unwrap_or_default();
    let min = values.iter().copied().min().unwrap_or_default();
    let is_valid = max >= VALID_THRESHOLD;

    let position = if max - min > MIN_SPREAD {
        let (sum, weighted) = values
            .iter()
            .enumerate()
            .map(|(i, &raw)| (i, f64::from(raw) - avg))
            .filter(|&(_, v)| v > 0.0)
            .fold((0.0, 0.0), |(sum, weighted), (i, v)| {
                (sum + v, weighted + (i + 1) as f64 * v)
            });

        if sum > 0.0 && is_valid {
            (weighted / sum - 4.5) / 4.0
        } else {
            f64::NAN
        }
    } else {
        f64::NAN
    };

    LineEstimate {
        position,
        active: active_sensors(values),
        is_crossing: avg >= CROSSING_THRESHOLD,
        is_valid,
    }
}

/// 三岔路口：中间两路至少一路离线，左右两侧各有一路在线
// 侧边含索引 2 和 7，比只看 0..2 / 5..7 的判定更宽
pub fn is_intersection(active: &ActiveMask) -> bool {
    let center_open = !active[3] || !active[4];
    let left = active[0..3].iter().any(|&a| a);
    let right = active[5..8].iter().any(|&a| a);
    center_open && left && right
}

/// 直角路口：某一侧三路全部在线
// 侧边范围同 is_intersection（0..3 / 5..8），而非 0..2 / 5..7
pub fn is_90_intersection(active: &ActiveMask) -> bool {
    active[0..3].iter().all(|&a| a) || active[5..8].iter().all(|&a| a)
}

/// 带保持的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineReading {
    pub intensities: [u16; LINE_SENSOR_COUNT],
    /// 最近一次有效读数给出的位置（可能为 NaN）
    pub position: f64,
    pub active: ActiveMask,
    pub is_crossing: bool,
    pub is_valid: bool,
    pub last_valid: Instant,
}

/// 有状态的巡线检测器
///
/// 有效读数刷新保持的位置和时间戳，无效读数保留上一次的值。
#[derive(Debug, Clone)]
pub struct LineDetector {
    position: f64,
    last_valid: Instant,
    max_time_lost: Duration,
}

impl LineDetector {
    pub fn new(now: Instant) -> Self {
        Self {
            position: f64::NAN,
            last_valid: now,
            max_time_lost: MAX_TIME_LINE_LOST,
        }
    }

    pub fn with_max_time_lost(mut self, max_time_lost: Duration) -> Self {
        self.max_time_lost = max_time_lost;
        self
    }

    /// 重新开始计时（不清除保持的位置）
    pub fn reset(&mut self, now: Instant) {
        self.last_valid = now;
    }

    pub fn detect(&mut self, values: &[u16; LINE_SENSOR_COUNT], now: Instant) -> LineReading {
        let estimate = estimate(values);
        if estimate.is_valid {
            self.position = estimate.position;
            self.last_valid = now;
        }

        LineReading {
            intensities: *values,
            position: self.position,
            active: estimate.active,
            is_crossing: estimate.is_crossing,
            is_valid: estimate.is_valid,
            last_valid: self.last_valid,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn time_since_last_valid(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_valid)
    }

    /// 距最近一次有效读数不足 1 秒
    pub fn is_line_still_valid(&self, now: Instant) -> bool {
        self.time_since_last_valid(now) < self.max_time_lost
    }
}
