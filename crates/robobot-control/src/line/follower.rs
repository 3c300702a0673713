//! 巡线 PID 控制器
//!
//! # 算法
//!
//! ```text
//! e        = position_ref - position
//! integral = clamp(integral + e·dt, ±max_integral)
//! d        = α·(e - e_old)/dt + (1-α)·d_old
//! u        = Kp·e + Ki·integral + Kd·d
//! ```
//!
//! 输出先做变化率限制（每次最多 `slew_rate·dt`），再限幅到 `±u_limit`。
//! 前进速度根据线的形状自适应：中间两路都在线时加速，外侧在线越多越慢。

use super::detector::{ActiveMask, LineDetector, LineReading};
use robobot_driver::unix_time;
use robobot_protocol::{ControlCommand, LINE_SENSOR_COUNT};
use std::time::{Duration, Instant};
use tracing::trace;

pub const DEFAULT_KP: f64 = 2.5;
pub const DEFAULT_KI: f64 = 0.035;
pub const DEFAULT_KD: f64 = 1.3;
pub const DEFAULT_U_LIMIT: f64 = 5.0;
pub const DEFAULT_MAX_INTEGRAL: f64 = 2.0;
/// 初始采样周期（秒）
pub const INITIAL_SAMPLING_TIME: f64 = 0.1;
/// 只接受该区间内的实测采样周期（秒）
pub const SAMPLING_TIME_RANGE: (f64, f64) = (0.001, 0.5);
/// 微分低通系数
pub const DERIVATIVE_ALPHA: f64 = 0.2;
/// 输出每秒最大变化量
pub const SLEW_RATE: f64 = 2.0;
/// 直线加速上限（m/s）
pub const MAX_STRAIGHT_VELOCITY: f64 = 0.5;

/// 弯道惩罚权重（外侧更大）
const CURVE_WEIGHTS: [f64; LINE_SENSOR_COUNT] = [3.0, 2.0, 1.0, 0.0, 0.0, 1.0, 2.0, 3.0];
const MAX_CURVE_SEVERITY: f64 = 6.0;
const MIN_VELOCITY_FACTOR: f64 = 0.1;

/// 最近一次计算的 PID 各项（调试用）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub error: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub u: f64,
}

/// 巡线控制器
///
/// # Example
///
/// ```
/// use robobot_control::LineFollower;
/// use std::time::Instant;
///
/// let mut follower = LineFollower::new(Instant::now()).with_gains(2.0, 0.0, 1.0);
/// follower.set_line_control(0.2, 0.0);
/// let command = follower.update(&[0, 0, 0, 1000, 1000, 0, 0, 0], Instant::now());
/// assert!(command.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct LineFollower {
    kp: f64,
    ki: f64,
    kd: f64,
    u_limit: f64,
    max_integral: f64,

    detector: LineDetector,

    position: f64,
    position_ref: f64,
    velocity: f64,
    sampling_time: f64,
    last_update: Option<Instant>,

    error_old: f64,
    integral: f64,
    last_derivative: f64,
    u: f64,
    u_old: f64,
    terms: PidTerms,

    active: ActiveMask,
    is_line_valid: bool,
    is_crossing: bool,
}

impl LineFollower {
    pub fn new(now: Instant) -> Self {
        Self {
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
            u_limit: DEFAULT_U_LIMIT,
            max_integral: DEFAULT_MAX_INTEGRAL,
            detector: LineDetector::new(now),
            position: 0.0,
            position_ref: 0.0,
            velocity: 0.0,
            sampling_time: INITIAL_SAMPLING_TIME,
            last_update: None,
            error_old: 0.0,
            integral: 0.0,
            last_derivative: 0.0,
            u: 0.0,
            u_old: 0.0,
            terms: PidTerms::default(),
            active: [false; LINE_SENSOR_COUNT],
            is_line_valid: false,
            is_crossing: false,
        }
    }

    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    pub fn with_output_limit(mut self, limit: f64) -> Self {
        self.u_limit = limit;
        self
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.max_integral = limit;
        self
    }

    pub fn with_max_time_lost(mut self, max_time_lost: Duration) -> Self {
        self.detector = self.detector.with_max_time_lost(max_time_lost);
        self
    }

    /// 设置巡线速度和参考位置
    ///
    /// 从停止（速度 0）切换到非零速度时先重置控制器。
    pub fn set_line_control(&mut self, velocity: f64, position_ref: f64) {
        if self.velocity == 0.0 && velocity != 0.0 {
            self.reset();
        }
        self.velocity = velocity;
        self.position_ref = position_ref;
    }

    /// 清零位置、参考、速度和 PID 状态
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.position_ref = 0.0;
        self.velocity = 0.0;
        self.sampling_time = INITIAL_SAMPLING_TIME;
        self.last_update = None;
        self.error_old = 0.0;
        self.integral = 0.0;
        self.last_derivative = 0.0;
        self.u = 0.0;
        self.u_old = 0.0;
        self.terms = PidTerms::default();
        self.is_line_valid = false;
        self.is_crossing = false;
    }

    /// 处理一帧巡线数据
    ///
    /// 巡线速度大于 0 时返回运动指令，否则只更新检测状态。
    pub fn update(
        &mut self,
        values: &[u16; LINE_SENSOR_COUNT],
        now: Instant,
    ) -> Option<ControlCommand> {
        if let Some(last) = self.last_update {
            let real_dt = now.saturating_duration_since(last).as_secs_f64();
            if (SAMPLING_TIME_RANGE.0..=SAMPLING_TIME_RANGE.1).contains(&real_dt) {
                self.sampling_time = real_dt;
            }
        }
        self.last_update = Some(now);

        let reading = self.detector.detect(values, now);
        self.apply_reading(&reading);

        (self.velocity > 0.0).then(|| self.follow_line())
    }

    fn apply_reading(&mut self, reading: &LineReading) {
        self.is_line_valid = reading.is_valid;
        self.is_crossing = reading.is_crossing;
        self.active = reading.active;
        if !reading.position.is_nan() {
            self.position = reading.position;
        }
    }

    fn follow_line(&mut self) -> ControlCommand {
        let dt = self.sampling_time;
        let error = self.position_ref - self.position;

        let p = self.kp * error;

        self.integral = (self.integral + error * dt).clamp(-self.max_integral, self.max_integral);
        let i = self.ki * self.integral;

        let derivative = (error - self.error_old) / dt;
        self.last_derivative =
            DERIVATIVE_ALPHA * derivative + (1.0 - DERIVATIVE_ALPHA) * self.last_derivative;
        let d = self.kd * self.last_derivative;

        let mut u = p + i + d;
        let max_change = SLEW_RATE * dt;
        if (u - self.u_old).abs() > max_change {
            u = self.u_old + (u - self.u_old).signum() * max_change;
        }
        self.u = u.clamp(-self.u_limit, self.u_limit);

        self.error_old = error;
        self.u_old = self.u;
        self.terms = PidTerms { error, p, i, d, u: self.u };

        let velocity = self.adaptive_velocity();
        trace!(
            "Line follow: position {:.3}, error {:.3}, u {:.3}, velocity {:.3}",
            self.position, error, self.u, velocity
        );
        ControlCommand::new(velocity, self.u, Some(unix_time()))
    }

    /// 根据在线传感器分布调整前进速度
    pub fn adaptive_velocity(&self) -> f64 {
        if self.active[3] && self.active[4] {
            return (self.velocity * 2.0).min(MAX_STRAIGHT_VELOCITY);
        }

        let severity: f64 = CURVE_WEIGHTS
            .iter()
            .zip(self.active.iter())
            .filter(|(_, active)| **active)
            .map(|(weight, _)| weight)
            .sum();
        let factor = (1.0 - severity / MAX_CURVE_SEVERITY).max(MIN_VELOCITY_FACTOR);
        self.velocity * factor
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn position_ref(&self) -> f64 {
        self.position_ref
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn sampling_time(&self) -> f64 {
        self.sampling_time
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn output(&self) -> f64 {
        self.u
    }

    pub fn terms(&self) -> PidTerms {
        self.terms
    }

    pub fn active_sensors(&self) -> ActiveMask {
        self.active
    }

    pub fn is_line_valid(&self) -> bool {
        self.is_line_valid
    }

    pub fn is_crossing(&self) -> bool {
        self.is_crossing
    }

    pub fn is_line_still_valid(&self, now: Instant) -> bool {
        self.detector.is_line_still_valid(now)
    }

    pub fn time_since_last_valid(&self, now: Instant) -> Duration {
        self.detector.time_since_last_valid(now)
    }

    /// 重新开始丢线计时
    pub fn restart_line_timer(&mut self, now: Instant) {
        self.detector.reset(now);
    }
}
