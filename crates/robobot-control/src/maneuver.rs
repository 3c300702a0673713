//! 开环机动
//!
//! 路口转向、掉头、倒车等动作由若干步骤组成，每一步有一个动作和一个结束条件。
//! [`ManeuverRunner`] 由控制循环反复推进（非阻塞），停止按钮可以随时打断。

use crate::error::ControlError;
use crate::line::{ActiveMask, LineFollower};
use robobot_driver::unix_time;
use robobot_protocol::{Command, ControlCommand, ServoCommand};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// 步骤数组的内联容量
const INLINE_STEPS: usize = 16;

pub type ManeuverSteps = SmallVec<[ManeuverStep; INLINE_STEPS]>;

/// 步骤动作（进入步骤时执行一次）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction {
    /// 发送 `ti/rc`，同时停止巡线
    Drive { velocity: f64, turn_rate: f64 },
    /// 以给定速度巡线
    FollowLine { velocity: f64 },
    Servo { servo: u8, angle_deg: f64 },
    ServoOff { servo: u8 },
    /// 不发送任何指令，保持当前运动
    Wait,
}

/// 步骤结束条件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepEnd {
    /// 执行动作后立即进入下一步
    Immediate,
    Elapsed(Duration),
    /// 中间两路（3 或 4）任一在线
    LineCentered,
    ObstacleInFront,
    ObstacleCleared,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManeuverStep {
    pub action: StepAction,
    pub end: StepEnd,
}

impl ManeuverStep {
    pub const fn new(action: StepAction, end: StepEnd) -> Self {
        Self { action, end }
    }

    /// 以固定速度行驶一段时间
    pub const fn drive(velocity: f64, turn_rate: f64, millis: u64) -> Self {
        Self::new(
            StepAction::Drive {
                velocity,
                turn_rate,
            },
            StepEnd::Elapsed(Duration::from_millis(millis)),
        )
    }

    pub const fn stop() -> Self {
        Self::new(
            StepAction::Drive {
                velocity: 0.0,
                turn_rate: 0.0,
            },
            StepEnd::Immediate,
        )
    }

    pub const fn follow_line(velocity: f64, end: StepEnd) -> Self {
        Self::new(StepAction::FollowLine { velocity }, end)
    }

    pub const fn wait(millis: u64) -> Self {
        Self::new(StepAction::Wait, StepEnd::Elapsed(Duration::from_millis(millis)))
    }
}

/// 路口处的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 直行（不做任何动作）
    Straight,
    Left,
    Right,
    Left90,
    Right90,
    /// 右转进入篮筐支线
    Basket,
    /// 右转进入闸门支线
    Axe,
    Back,
    Turn180,
    SearchBall,
    ApproachHole,
    TurnToHole,
    BackToLine,
    /// 终点附近的大路口
    BigIntersection,
}

impl Direction {
    pub const ALL: [Direction; 14] = [
        Direction::Straight,
        Direction::Left,
        Direction::Right,
        Direction::Left90,
        Direction::Right90,
        Direction::Basket,
        Direction::Axe,
        Direction::Back,
        Direction::Turn180,
        Direction::SearchBall,
        Direction::ApproachHole,
        Direction::TurnToHole,
        Direction::BackToLine,
        Direction::BigIntersection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::Straight => "straight",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Left90 => "90left",
            Direction::Right90 => "90right",
            Direction::Basket => "basket",
            Direction::Axe => "axe",
            Direction::Back => "back",
            Direction::Turn180 => "180",
            Direction::SearchBall => "search_ball",
            Direction::ApproachHole => "approach_hole",
            Direction::TurnToHole => "turn_to_hole",
            Direction::BackToLine => "back_to_line",
            Direction::BigIntersection => "big_int",
        }
    }

    /// 单个动作的开环步骤表
    pub fn steps(self) -> ManeuverSteps {
        use ManeuverStep as S;

        match self {
            Direction::Straight => ManeuverSteps::new(),
            Direction::Left => smallvec![S::drive(0.1, 1.0, 800)],
            Direction::Right => smallvec![S::drive(0.1, -1.0, 800)],
            Direction::Left90 => smallvec![S::drive(-0.1, 0.0, 500), S::drive(0.0, 1.4, 1100)],
            Direction::Right90 | Direction::Basket | Direction::Axe => {
                smallvec![S::drive(-0.1, 0.0, 500), S::drive(0.0, -1.4, 1100)]
            },
            Direction::Back => smallvec![S::drive(-0.1, 0.0, 2000)],
            Direction::Turn180 => smallvec![S::drive(0.0, -1.7, 1800)],
            Direction::SearchBall => smallvec![S::drive(-0.1, 0.0, 500), S::drive(0.0, 1.3, 1100)],
            Direction::ApproachHole => smallvec![S::stop(), S::drive(0.2, -0.03, 2900)],
            Direction::TurnToHole => smallvec![S::stop(), S::drive(0.0, -1.5, 1500)],
            Direction::BackToLine => smallvec![
                S::new(
                    StepAction::Drive {
                        velocity: 0.2,
                        turn_rate: 0.0,
                    },
                    StepEnd::LineCentered,
                ),
                S::stop(),
                S::new(
                    StepAction::Drive {
                        velocity: 0.0,
                        turn_rate: -0.2,
                    },
                    StepEnd::Immediate,
                ),
            ],
            Direction::BigIntersection => {
                smallvec![S::drive(0.0, 1.5, 1600), S::drive(0.15, 0.0, 1000)]
            },
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.name() == s.trim())
            .ok_or_else(|| ControlError::UnknownDirection(s.to_string()))
    }
}

/// 推进机动所需的输入
#[derive(Debug, Clone, Copy)]
pub struct ManeuverContext {
    pub now: Instant,
    pub line_active: ActiveMask,
    pub object_in_front: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverStatus {
    Running,
    Done,
}

/// 非阻塞机动执行器
#[derive(Debug, Clone)]
pub struct ManeuverRunner {
    name: String,
    steps: ManeuverSteps,
    index: usize,
    step_started: Option<Instant>,
}

impl ManeuverRunner {
    pub fn new(name: impl Into<String>, steps: ManeuverSteps) -> Self {
        Self {
            name: name.into(),
            steps,
            index: 0,
            step_started: None,
        }
    }

    pub fn for_direction(direction: Direction) -> Self {
        Self::new(direction.name(), direction.steps())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_step(&self) -> Option<&ManeuverStep> {
        self.steps.get(self.index)
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.steps.len()
    }

    /// 推进机动
    ///
    /// 进入新步骤时把要发送的指令追加到 `out`；巡线步骤直接调整 `follower`，
    /// 巡线指令由调用方在处理巡线数据时发送。
    pub fn tick(
        &mut self,
        ctx: &ManeuverContext,
        follower: &mut LineFollower,
        out: &mut Vec<Command>,
    ) -> ManeuverStatus {
        while let Some(step) = self.steps.get(self.index).copied() {
            let started = match self.step_started {
                Some(started) => started,
                None => {
                    debug!("Maneuver {}: step {} {:?}", self.name, self.index, step.action);
                    Self::enter(step.action, follower, out);
                    self.step_started = Some(ctx.now);
                    ctx.now
                },
            };

            let finished = match step.end {
                StepEnd::Immediate => true,
                StepEnd::Elapsed(duration) => ctx.now.saturating_duration_since(started) >= duration,
                StepEnd::LineCentered => ctx.line_active[3] || ctx.line_active[4],
                StepEnd::ObstacleInFront => ctx.object_in_front,
                StepEnd::ObstacleCleared => !ctx.object_in_front,
            };
            if !finished {
                return ManeuverStatus::Running;
            }

            self.index += 1;
            self.step_started = None;
        }

        ManeuverStatus::Done
    }

    fn enter(action: StepAction, follower: &mut LineFollower, out: &mut Vec<Command>) {
        match action {
            StepAction::Drive {
                velocity,
                turn_rate,
            } => {
                follower.set_line_control(0.0, 0.0);
                out.push(Command::Drive(ControlCommand::new(
                    velocity,
                    turn_rate,
                    Some(unix_time()),
                )));
            },
            StepAction::FollowLine { velocity } => follower.set_line_control(velocity, 0.0),
            StepAction::Servo { servo, angle_deg } => {
                out.push(Command::Servo(ServoCommand::new(servo, angle_deg)));
            },
            StepAction::ServoOff { servo } => out.push(Command::Servo(ServoCommand::off(servo))),
            StepAction::Wait => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(now: Instant) -> ManeuverContext {
        ManeuverContext {
            now,
            line_active: [false; 8],
            object_in_front: false,
        }
    }

    fn drives(out: &[Command]) -> Vec<(f64, f64)> {
        out.iter()
            .filter_map(|c| match c {
                Command::Drive(cmd) => Some((cmd.velocity, cmd.turn_rate)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_direction_names_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(direction.name().parse::<Direction>().unwrap(), direction);
        }
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(ControlError::UnknownDirection(_))
        ));
    }

    #[test]
    fn test_right_angle_turn_timing() {
        let start = Instant::now();
        let mut follower = LineFollower::new(start);
        follower.set_line_control(0.23, 0.0);
        let mut runner = ManeuverRunner::for_direction(Direction::Right90);
        let mut out = Vec::new();

        assert_eq!(runner.tick(&ctx(start), &mut follower, &mut out), ManeuverStatus::Running);
        assert_eq!(drives(&out), vec![(-0.1, 0.0)]);
        // 机动期间停止巡线
        assert_eq!(follower.velocity(), 0.0);

        out.clear();
        let t = start + Duration::from_millis(499);
        assert_eq!(runner.tick(&ctx(t), &mut follower, &mut out), ManeuverStatus::Running);
        assert!(out.is_empty());

        let t = start + Duration::from_millis(500);
        runner.tick(&ctx(t), &mut follower, &mut out);
        assert_eq!(drives(&out), vec![(0.0, -1.4)]);

        out.clear();
        let t = start + Duration::from_millis(1600);
        assert_eq!(runner.tick(&ctx(t), &mut follower, &mut out), ManeuverStatus::Done);
        assert!(out.is_empty());
        assert!(runner.is_done());
    }

    #[test]
    fn test_straight_is_immediately_done() {
        let start = Instant::now();
        let mut follower = LineFollower::new(start);
        let mut runner = ManeuverRunner::for_direction(Direction::Straight);
        let mut out = Vec::new();
        assert_eq!(runner.tick(&ctx(start), &mut follower, &mut out), ManeuverStatus::Done);
        assert!(out.is_empty());
    }

    #[test]
    fn test_back_to_line_waits_for_center_sensor() {
        let start = Instant::now();
        let mut follower = LineFollower::new(start);
        let mut runner = ManeuverRunner::for_direction(Direction::BackToLine);
        let mut out = Vec::new();

        let mut context = ctx(start);
        assert_eq!(runner.tick(&context, &mut follower, &mut out), ManeuverStatus::Running);
        assert_eq!(drives(&out), vec![(0.2, 0.0)]);

        out.clear();
        context.line_active[4] = true;
        assert_eq!(runner.tick(&context, &mut follower, &mut out), ManeuverStatus::Done);
        assert_eq!(drives(&out), vec![(0.0, 0.0), (0.0, -0.2)]);
    }

    #[test]
    fn test_obstacle_conditions_and_servo() {
        let start = Instant::now();
        let mut follower = LineFollower::new(start);
        let steps: ManeuverSteps = [
            ManeuverStep::follow_line(0.07, StepEnd::ObstacleInFront),
            ManeuverStep::new(
                StepAction::Drive {
                    velocity: 0.0,
                    turn_rate: 0.0,
                },
                StepEnd::ObstacleCleared,
            ),
            ManeuverStep::new(
                StepAction::Servo {
                    servo: 1,
                    angle_deg: 0.0,
                },
                StepEnd::Immediate,
            ),
            ManeuverStep::new(StepAction::ServoOff { servo: 1 }, StepEnd::Immediate),
        ]
        .into_iter()
        .collect();
        let mut runner = ManeuverRunner::new("gate", steps);
        let mut out = Vec::new();

        let mut context = ctx(start);
        runner.tick(&context, &mut follower, &mut out);
        assert_eq!(follower.velocity(), 0.07);
        assert!(out.is_empty());

        context.object_in_front = true;
        assert_eq!(runner.tick(&context, &mut follower, &mut out), ManeuverStatus::Running);
        assert_eq!(drives(&out), vec![(0.0, 0.0)]);
        assert_eq!(follower.velocity(), 0.0);

        out.clear();
        context.object_in_front = false;
        assert_eq!(runner.tick(&context, &mut follower, &mut out), ManeuverStatus::Done);
        assert_eq!(
            out,
            vec![
                Command::Servo(ServoCommand::new(1, 0.0)),
                Command::Servo(ServoCommand::off(1)),
            ]
        );
    }
}
