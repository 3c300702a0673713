//! # Robobot Control
//!
//! 机器人控制层：巡线、开环机动、Pure Pursuit 和任务状态机。
//!
//! ## 模块
//!
//! - `line`: 巡线位置估计（`LineDetector`）与 PID 跟随（`LineFollower`）
//! - `maneuver`: 路口机动步骤表与非阻塞执行器
//! - `pursuit`: 航点跟踪
//! - `path`: 赛道策略（路口计数、投篮、过闸门）
//! - `mission`: WAITING / GOING 状态机与数据日志线程
//!
//! 控制器不做 I/O，时间由调用方传入；指令经 `robobot-driver` 的 `RobotCommands` 发出。

pub mod error;
pub mod line;
pub mod maneuver;
pub mod mission;
pub mod path;
pub mod pursuit;

pub use error::ControlError;
pub use line::{LineDetector, LineFollower, LineReading, SharedLinePosition};
pub use maneuver::{Direction, ManeuverRunner, ManeuverStatus, ManeuverStep, StepAction, StepEnd};
pub use mission::{
    AtomicMissionState, ButtonPanel, DriveStrategy, MaintenanceHooks, MissionConfig, MissionExit,
    MissionLog, MissionState, MissionStateMachine, NoMaintenance,
};
pub use path::{PathConfig, PathPhase, PathStrategy};
pub use pursuit::{PurePursuit, PursuitConfig, PursuitPose};
