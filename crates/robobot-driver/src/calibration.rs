//! 加速度计标定
//!
//! 以重力为参考：机器人静止时采样若干次重力轴读数，求得该轴的缩放系数。
//! 解码层对之后的每个加速度样本乘以该系数。

use crate::cancel::CancellationToken;
use crate::error::DriverError;
use crate::state::SensorView;
use std::time::Duration;
use tracing::{info, warn};

/// 标定参数
#[derive(Debug, Clone, PartialEq)]
pub struct AccCalibration {
    /// 与重力对齐的轴（0=x, 1=y, 2=z）
    pub gravity_axis: usize,
    pub samples: usize,
    pub sample_interval: Duration,
    /// 期望重力加速度（m/s²）
    pub expected_gravity: f64,
}

impl Default for AccCalibration {
    fn default() -> Self {
        Self {
            gravity_axis: 2,
            samples: 10,
            sample_interval: Duration::from_millis(10),
            expected_gravity: 9.81,
        }
    }
}

/// 标定加速度计，返回新的缩放系数
///
/// 平均值为零时保持原系数不变并告警。
///
/// # 错误
/// - `DriverError::Cancelled`: 采样期间停止标志被置位
pub fn calibrate_accelerometer(
    view: &SensorView,
    params: &AccCalibration,
    token: &CancellationToken,
) -> Result<[f64; 3], DriverError> {
    let axis = params.gravity_axis.min(2);
    let samples = params.samples.max(1);

    let mut sum = 0.0;
    for _ in 0..samples {
        sum += view.acc().value[axis];
        if !token.sleep(params.sample_interval) {
            return Err(DriverError::Cancelled);
        }
    }
    let average = sum / samples as f64;

    let mut scale = view.acc_scale();
    if average == 0.0 {
        warn!("Accelerometer calibration skipped: zero reading on axis {}", axis);
        return Ok(scale);
    }

    scale[axis] = params.expected_gravity / average.abs();
    view.set_acc_scale(scale);
    info!(
        "Accelerometer calibrated: axis {} average {:.4}, scale {:.4}",
        axis, average, scale[axis]
    );
    Ok(scale)
}
