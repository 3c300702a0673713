//! 赛道策略
//!
//! 沿线行驶并数路口，按路口表在指定路口执行机动（转向、投篮、过闸门）。
//! 路口表走完后，如果提供了航点则切换到 Pure Pursuit；否则丢线超过 1 秒即完成。
//!
//! 计数规则：计数器从 0.5 开始，每次检测到路口（上升沿）加 0.5；计数为整数 `n`、
//! `0 < n < len` 且当前没有机动时执行 `map[n]`，随后再加 0.5。

use crate::error::report;
use crate::line::{LineFollower, SharedLinePosition, is_90_intersection, is_intersection};
use crate::maneuver::{
    Direction, ManeuverContext, ManeuverRunner, ManeuverStatus, ManeuverStep, ManeuverSteps,
    StepAction, StepEnd,
};
use crate::mission::DriveStrategy;
use crate::pursuit::{PurePursuit, PursuitPose};
use robobot_driver::{CancellationToken, Robot, RobotCommands, SensorView};
use robobot_protocol::{Command, LINE_SENSOR_COUNT};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 赛道策略配置
#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    /// 巡线速度（m/s）
    pub follow_velocity: f64,
    /// 路口表，下标为路口计数
    pub intersection_map: Vec<Direction>,
    /// 每个控制周期内处理巡线数据的时长
    pub slice: Duration,
    /// 等待新巡线数据的轮询周期
    pub poll_period: Duration,
    /// 投篮舵机编号
    pub servo: u8,
    /// 投篮时舵机放下的角度
    pub servo_down_deg: f64,
    /// 投篮后舵机收起的角度
    pub servo_up_deg: f64,
}

impl PathConfig {
    /// 默认赛道的路口表
    pub fn default_map() -> Vec<Direction> {
        let mut map = vec![Direction::Straight, Direction::BigIntersection];
        map.extend([Direction::Straight; 5]);
        map.extend([Direction::Basket, Direction::Right90, Direction::Axe]);
        map
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            follow_velocity: 0.23,
            intersection_map: Self::default_map(),
            slice: Duration::from_millis(90),
            poll_period: Duration::from_millis(5),
            servo: 1,
            servo_down_deg: 0.0,
            servo_up_deg: 90.0,
        }
    }
}

/// 策略阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPhase {
    FollowingLine,
    Maneuver,
    PurePursuit,
    Finished,
}

/// 投篮：右转进入支线，放下舵机顶篮筐，收起后掉头返回并右转回主线
pub fn basket_steps(config: &PathConfig) -> ManeuverSteps {
    let servo = config.servo;
    let mut steps = Direction::Basket.steps();
    steps.extend([
        ManeuverStep::drive(0.0, 0.0, 500),
        ManeuverStep::new(
            StepAction::Servo {
                servo,
                angle_deg: config.servo_down_deg,
            },
            StepEnd::Immediate,
        ),
        ManeuverStep::follow_line(0.1, StepEnd::Elapsed(Duration::from_millis(800))),
        ManeuverStep::wait(500),
        ManeuverStep::new(
            StepAction::Servo {
                servo,
                angle_deg: config.servo_up_deg,
            },
            StepEnd::Immediate,
        ),
        ManeuverStep::wait(500),
        ManeuverStep::new(StepAction::ServoOff { servo }, StepEnd::Immediate),
    ]);
    steps.extend(Direction::Back.steps());
    steps.extend(Direction::Turn180.steps());
    steps.push(ManeuverStep::follow_line(
        0.1,
        StepEnd::Elapsed(Duration::from_millis(800)),
    ));
    steps.extend(Direction::Right90.steps());
    steps
}

/// 过闸门：慢速接近，闸门挡住时停车，放行后加速通过；掉头后再来一次
pub fn axe_steps() -> ManeuverSteps {
    let stop_until_cleared = ManeuverStep::new(
        StepAction::Drive {
            velocity: 0.0,
            turn_rate: 0.0,
        },
        StepEnd::ObstacleCleared,
    );

    let mut steps = Direction::Axe.steps();
    steps.extend([
        ManeuverStep::follow_line(0.07, StepEnd::ObstacleInFront),
        stop_until_cleared,
        ManeuverStep::follow_line(0.3, StepEnd::Elapsed(Duration::from_millis(1000))),
    ]);
    steps.extend(Direction::Turn180.steps());
    steps.extend([
        ManeuverStep::follow_line(0.05, StepEnd::ObstacleInFront),
        stop_until_cleared,
        ManeuverStep::follow_line(0.3, StepEnd::Elapsed(Duration::from_millis(800))),
    ]);
    steps
}

/// 赛道驾驶策略
pub struct PathStrategy {
    commands: RobotCommands,
    sensors: SensorView,
    token: CancellationToken,
    config: PathConfig,
    follower: LineFollower,
    pursuit: Option<PurePursuit>,
    maneuver: Option<ManeuverRunner>,
    phase: PathPhase,
    /// 路口计数 × 2
    half_steps: usize,
    on_intersection: bool,
    /// 当前机动是路口表的最后一项
    map_exhausted: bool,
    last_line_update: u64,
    line_position: SharedLinePosition,
}

impl PathStrategy {
    pub fn new(
        robot: &Robot,
        config: PathConfig,
        follower: LineFollower,
        pursuit: Option<PurePursuit>,
        line_position: SharedLinePosition,
    ) -> Self {
        Self {
            commands: robot.commands.clone(),
            sensors: robot.sensors.clone(),
            token: robot.stopped_token(),
            config,
            follower,
            pursuit,
            maneuver: None,
            phase: PathPhase::FollowingLine,
            half_steps: 1,
            on_intersection: false,
            map_exhausted: false,
            last_line_update: 0,
            line_position,
        }
    }

    pub fn phase(&self) -> PathPhase {
        self.phase
    }

    /// 当前路口计数（0.5 步进）
    pub fn intersection_counter(&self) -> f64 {
        self.half_steps as f64 / 2.0
    }

    pub fn follower(&self) -> &LineFollower {
        &self.follower
    }

    pub fn maneuver(&self) -> Option<&ManeuverRunner> {
        self.maneuver.as_ref()
    }

    /// 回到起点状态
    pub fn reset(&mut self, now: Instant) {
        self.phase = PathPhase::FollowingLine;
        self.half_steps = 1;
        self.on_intersection = false;
        self.map_exhausted = false;
        self.maneuver = None;
        self.follower.reset();
        self.follower.restart_line_timer(now);
        if let Some(pursuit) = self.pursuit.as_mut() {
            pursuit.reset();
        }
        self.last_line_update = self.sensors.line().update_count;
    }

    fn send(&self, command: &Command) {
        report(self.commands.bus().send_cmd(command), command.topic());
    }

    /// 处理一个控制周期内到达的巡线数据
    fn line_slice(&mut self) {
        let deadline = Instant::now() + self.config.slice;

        loop {
            let now = Instant::now();
            let sample = self.sensors.line();
            if sample.update_count != self.last_line_update {
                self.last_line_update = sample.update_count;
                self.on_line_sample(&sample.value, now);
            }

            if self.maneuver.is_some() {
                self.tick_maneuver(now);
            } else if self.phase == PathPhase::FollowingLine
                && !self.follower.is_line_still_valid(now)
            {
                info!(
                    "Line lost for {:.2}s, path finished",
                    self.follower.time_since_last_valid(now).as_secs_f64()
                );
                self.phase = PathPhase::Finished;
            }

            if !matches!(self.phase, PathPhase::FollowingLine | PathPhase::Maneuver) {
                return;
            }
            if now >= deadline || !self.token.sleep(self.config.poll_period) {
                return;
            }
        }
    }

    fn on_line_sample(&mut self, values: &[u16; LINE_SENSOR_COUNT], now: Instant) {
        if let Some(command) = self.follower.update(values, now) {
            self.send(&Command::Drive(command));
        }
        self.line_position.store(self.follower.position());

        if self.phase == PathPhase::FollowingLine {
            self.count_intersections(now);
        }
    }

    fn count_intersections(&mut self, now: Instant) {
        let active = self.follower.active_sensors();
        let detected = is_intersection(&active) || is_90_intersection(&active);
        if detected && !self.on_intersection {
            self.half_steps += 1;
            info!("Intersection detected, counter {:.1}", self.intersection_counter());
        }
        self.on_intersection = detected;

        let map_len = self.config.intersection_map.len();
        let index = self.half_steps / 2;
        if self.half_steps % 2 == 0 && index > 0 && index < map_len {
            let direction = self.config.intersection_map[index];
            self.half_steps += 1;
            self.start_maneuver(direction, index + 1 == map_len, now);
        }
    }

    fn start_maneuver(&mut self, direction: Direction, last: bool, now: Instant) {
        info!("Direction: {}", direction);
        let steps = match direction {
            Direction::Basket => basket_steps(&self.config),
            Direction::Axe => axe_steps(),
            other => other.steps(),
        };
        self.maneuver = Some(ManeuverRunner::new(direction.name(), steps));
        self.map_exhausted = last;
        self.phase = PathPhase::Maneuver;
        self.tick_maneuver(now);
    }

    fn tick_maneuver(&mut self, now: Instant) {
        let Some(runner) = self.maneuver.as_mut() else {
            return;
        };

        let ctx = ManeuverContext {
            now,
            line_active: self.follower.active_sensors(),
            object_in_front: self.sensors.is_object_in_front(),
        };
        let mut out = Vec::new();
        let status = runner.tick(&ctx, &mut self.follower, &mut out);
        let finished = (status == ManeuverStatus::Done).then(|| runner.name().to_string());

        for command in &out {
            self.send(command);
        }

        if let Some(name) = finished {
            self.maneuver = None;
            self.follower.reset();
            self.follower.restart_line_timer(now);
            self.follower.set_line_control(self.config.follow_velocity, 0.0);
            // 仍压在路口上时不重复计数
            self.on_intersection = true;

            if self.map_exhausted && self.pursuit.is_some() {
                info!("Maneuver {} done, switching to pure pursuit", name);
                self.follower.set_line_control(0.0, 0.0);
                self.phase = PathPhase::PurePursuit;
            } else {
                info!("Maneuver {} done, resuming line following", name);
                self.phase = PathPhase::FollowingLine;
            }
        }
    }

    fn pursuit_step(&mut self) {
        let Some(pursuit) = self.pursuit.as_mut() else {
            self.phase = PathPhase::Finished;
            return;
        };

        if let Some(config) = self.sensors.wheel_config() {
            pursuit.set_wheel_base(config.wheel_base);
        }
        let pose = PursuitPose::from_odometry(
            &self.sensors.pose().value,
            &self.sensors.wheel_velocity().value,
        );
        let (velocity, turn_rate) = pursuit.compute(&pose);
        let stopped = pursuit.is_stopped();
        debug!("Pursuit command: {:.3} {:.3}", velocity, turn_rate);

        report(self.commands.set_movement(velocity, turn_rate), "pursuit command");
        if stopped {
            info!("Pure pursuit finished");
            self.phase = PathPhase::Finished;
        }
    }
}

impl DriveStrategy for PathStrategy {
    fn step(&mut self) -> bool {
        match self.phase {
            PathPhase::FollowingLine | PathPhase::Maneuver => self.line_slice(),
            PathPhase::PurePursuit => self.pursuit_step(),
            PathPhase::Finished => {},
        }
        self.phase == PathPhase::Finished
    }

    fn on_start(&mut self) {
        self.reset(Instant::now());
        self.follower.set_line_control(self.config.follow_velocity, 0.0);
    }

    fn on_stop(&mut self) {
        self.maneuver = None;
        self.follower.set_line_control(0.0, 0.0);
    }
}
