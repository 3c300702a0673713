//! Pure Pursuit 路径跟踪
//!
//! # 算法
//!
//! ```text
//! lookahead = clamp(k·speed, min, max)
//! α         = atan(dy / (dx + ε)) - heading        （折回 ±π/2）
//! steer     = -atan(2·L·sin α / (lookahead + ε))
//! turn_rate = speed·tan(steer) / L
//! ```
//!
//! 目标点是游标之后离车最近的航点，游标只增不减。到达最后一个航点的前视距离内后
//! 输出零速并保持停止，直到 [`PurePursuit::reset`]。

use crate::error::ControlError;
use robobot_driver::{Pose, WheelPair};
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::{debug, info};

const EPSILON: f64 = 1e-5;

/// Pure Pursuit 参数
#[derive(Debug, Clone, PartialEq)]
pub struct PursuitConfig {
    /// 前视距离 = k · 速度
    pub lookahead_gain: f64,
    pub min_lookahead: f64,
    pub max_lookahead: f64,
    pub max_turn_rate: f64,
    pub max_velocity: f64,
    /// 跟踪时的前进速度
    pub velocity: f64,
    /// 没有目标点时的前进速度
    pub fallback_velocity: f64,
    pub wheel_base: f64,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            lookahead_gain: 0.5,
            min_lookahead: 0.3,
            max_lookahead: 1.5,
            max_turn_rate: 1.0,
            max_velocity: 1.0,
            velocity: 0.2,
            fallback_velocity: 0.2,
            wheel_base: 0.23,
        }
    }
}

/// 地图坐标系下的车辆状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitPose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
}

impl PursuitPose {
    /// 里程计坐标转地图坐标：x = -y_odo，y = x_odo
    pub fn from_odometry(pose: &Pose, wheels: &WheelPair) -> Self {
        Self {
            x: -pose.y,
            y: pose.x,
            heading: pose.heading,
            speed: wheels.left.hypot(wheels.right),
        }
    }
}

/// 把角度折回 ±π/2
fn wrap_half_pi(mut angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    while angle > FRAC_PI_2 {
        angle -= PI;
    }
    while angle < -FRAC_PI_2 {
        angle += PI;
    }
    angle
}

/// Pure Pursuit 跟踪器
#[derive(Debug, Clone)]
pub struct PurePursuit {
    config: PursuitConfig,
    waypoints: Vec<(f64, f64)>,
    /// 最近一次选中的航点，下一次只在它之后搜索
    cursor: Option<usize>,
    stopped: bool,
}

impl PurePursuit {
    pub fn new(waypoints: Vec<(f64, f64)>, config: PursuitConfig) -> Result<Self, ControlError> {
        if waypoints.is_empty() {
            return Err(ControlError::InvalidWaypoints("no waypoints".to_string()));
        }
        if let Some((x, y)) = waypoints.iter().find(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(ControlError::InvalidWaypoints(format!(
                "non-finite waypoint ({}, {})",
                x, y
            )));
        }

        Ok(Self {
            config,
            waypoints,
            cursor: None,
            stopped: false,
        })
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    pub fn set_wheel_base(&mut self, wheel_base: f64) {
        if wheel_base > 0.0 {
            self.config.wheel_base = wheel_base;
        }
    }

    pub fn waypoints(&self) -> &[(f64, f64)] {
        &self.waypoints
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// 清除停止标志并从第一个航点重新开始
    pub fn reset(&mut self) {
        self.stopped = false;
        self.cursor = None;
    }

    pub fn lookahead(&self, speed: f64) -> f64 {
        (self.config.lookahead_gain * speed).clamp(self.config.min_lookahead, self.config.max_lookahead)
    }

    /// 计算一次控制输出 `(velocity, turn_rate)`
    pub fn compute(&mut self, pose: &PursuitPose) -> (f64, f64) {
        if self.stopped {
            return (0.0, 0.0);
        }

        let lookahead = self.lookahead(pose.speed);

        // 终点检查先于目标搜索，游标耗尽后仍然有效
        if let Some(&(gx, gy)) = self.waypoints.last()
            && (gx - pose.x).hypot(gy - pose.y) < lookahead
        {
            info!("Pure pursuit reached the final waypoint, stopping");
            self.stopped = true;
            return (0.0, 0.0);
        }

        let search_from = self.cursor.map_or(0, |c| c + 1);

        let target = self
            .waypoints
            .iter()
            .enumerate()
            .skip(search_from)
            .map(|(i, &(x, y))| (i, (x - pose.x).hypot(y - pose.y)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        let Some(index) = target else {
            return (self.config.fallback_velocity, 0.0);
        };
        self.cursor = Some(index);

        let (tx, ty) = self.waypoints[index];
        let alpha = wrap_half_pi(((ty - pose.y) / (tx - pose.x + EPSILON)).atan() - pose.heading);

        let wheel_base = self.config.wheel_base;
        let steer = -(2.0 * wheel_base * alpha.sin() / (lookahead + EPSILON)).atan();
        let turn_rate = (pose.speed * steer.tan() / wheel_base)
            .clamp(-self.config.max_turn_rate, self.config.max_turn_rate);
        let velocity = self.config.velocity.clamp(-self.config.max_velocity, self.config.max_velocity);

        debug!(
            "Pursuit: target {} ({:.3}, {:.3}), alpha {:.3}, turn {:.3}",
            index, tx, ty, alpha, turn_rate
        );

        (velocity, turn_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pose(x: f64, y: f64, heading: f64, speed: f64) -> PursuitPose {
        PursuitPose {
            x,
            y,
            heading,
            speed,
        }
    }

    #[test]
    fn test_empty_waypoints_rejected() {
        assert!(matches!(
            PurePursuit::new(vec![], PursuitConfig::default()),
            Err(ControlError::InvalidWaypoints(_))
        ));
        assert!(PurePursuit::new(vec![(f64::NAN, 0.0)], PursuitConfig::default()).is_err());
    }

    #[test]
    fn test_odometry_frame_conversion() {
        let p = PursuitPose::from_odometry(
            &Pose {
                x: 1.0,
                y: 2.0,
                heading: 0.5,
                tilt: 0.0,
            },
            &WheelPair {
                left: 0.3,
                right: 0.4,
            },
        );
        assert_eq!((p.x, p.y, p.heading), (-2.0, 1.0, 0.5));
        assert!((p.speed - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stops_near_final_waypoint_and_stays_stopped() {
        let mut pursuit =
            PurePursuit::new(vec![(0.0, 0.0), (0.1, 0.0)], PursuitConfig::default()).unwrap();

        assert_eq!(pursuit.compute(&pose(0.0, 0.0, 0.0, 0.0)), (0.0, 0.0));
        assert!(pursuit.is_stopped());

        // 停止后即使远离终点也不再输出
        assert_eq!(pursuit.compute(&pose(10.0, 10.0, 0.0, 0.5)), (0.0, 0.0));

        pursuit.reset();
        assert!(!pursuit.is_stopped());
        assert_eq!(pursuit.cursor(), None);
    }

    #[test]
    fn test_cursor_only_moves_forward() {
        let waypoints = vec![(1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (10.0, 0.0)];
        let mut pursuit = PurePursuit::new(waypoints, PursuitConfig::default()).unwrap();

        pursuit.compute(&pose(1.9, 0.0, 0.0, 0.2));
        assert_eq!(pursuit.cursor(), Some(1));

        // 回到起点附近也不会选回之前的航点
        pursuit.compute(&pose(0.0, 0.0, 0.0, 0.2));
        assert_eq!(pursuit.cursor(), Some(2));
    }

    #[test]
    fn test_stops_at_final_waypoint_after_cursor_exhausted() {
        let waypoints = vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)];
        let mut pursuit = PurePursuit::new(waypoints, PursuitConfig::default()).unwrap();
        let start = pose(0.0, 0.0, 0.0, 0.2);

        for _ in 0..3 {
            pursuit.compute(&start);
        }
        assert_eq!(pursuit.cursor(), Some(2));

        // 游标耗尽、远离终点：直行
        assert_eq!(pursuit.compute(&start), (0.2, 0.0));
        assert!(!pursuit.is_stopped());

        // 到达终点：停止
        assert_eq!(pursuit.compute(&pose(2.0, 0.0, 0.0, 0.2)), (0.0, 0.0));
        assert!(pursuit.is_stopped());
        assert_eq!(pursuit.compute(&start), (0.0, 0.0));
    }

    #[test]
    fn test_target_to_the_left_turns() {
        let mut pursuit =
            PurePursuit::new(vec![(1.0, 1.0), (5.0, 5.0)], PursuitConfig::default()).unwrap();
        let (velocity, turn_rate) = pursuit.compute(&pose(0.0, 0.0, 0.0, 0.5));
        assert_eq!(velocity, 0.2);
        // α = π/4 > 0，转向角为负，输出负角速度
        assert!(turn_rate < 0.0);
        assert!(turn_rate.abs() <= 1.0);
    }

    proptest! {
        #[test]
        fn prop_lookahead_within_bounds(speed in 0.0f64..100.0) {
            let pursuit = PurePursuit::new(vec![(0.0, 0.0)], PursuitConfig::default()).unwrap();
            let lookahead = pursuit.lookahead(speed);
            prop_assert!((0.3..=1.5).contains(&lookahead));
        }

        #[test]
        fn prop_output_saturated(
            x in -5.0f64..5.0,
            y in -5.0f64..5.0,
            heading in -3.2f64..3.2,
            speed in 0.0f64..5.0,
        ) {
            let waypoints = vec![(1.0, 2.0), (3.0, -1.0), (20.0, 20.0)];
            let mut pursuit = PurePursuit::new(waypoints, PursuitConfig::default()).unwrap();
            let (velocity, turn_rate) = pursuit.compute(&pose(x, y, heading, speed));
            prop_assert!(velocity.abs() <= 1.0);
            prop_assert!(turn_rate.abs() <= 1.0);
        }
    }
}
