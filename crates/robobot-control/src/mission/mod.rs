//! 任务状态机
//!
//! 控制线程以固定周期推进 WAITING → GOING → WAITING，日志线程以 100 Hz 记录
//! GOING 状态下的数据行和状态切换。
//!
//! 按钮、维护动作（更新代码、重启）和数据日志通过 trait 注入，测试中可以替换。

mod machine;
mod state;

pub use machine::{MissionConfig, MissionExit, MissionStateMachine};
pub use state::{AtomicMissionState, MissionState};

use crate::error::ControlError;
use std::io;

/// 按钮面板（控制线程独占）
pub trait ButtonPanel {
    fn is_start_pressed(&mut self) -> bool;
    fn is_stop_pressed(&mut self) -> bool;
    fn is_auto_pull_pressed(&mut self) -> bool;
    fn is_shutdown_pressed(&mut self) -> bool;
}

/// 维护动作
pub trait MaintenanceHooks {
    /// 拉取最新代码
    fn update(&mut self) -> Result<(), ControlError>;
    /// 启动重启脚本（当前进程随后退出）
    fn restart(&mut self) -> Result<(), ControlError>;
}

/// 不执行任何动作的维护实现
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMaintenance;

impl MaintenanceHooks for NoMaintenance {
    fn update(&mut self) -> Result<(), ControlError> {
        Ok(())
    }

    fn restart(&mut self) -> Result<(), ControlError> {
        Ok(())
    }
}

/// 任务数据日志（在日志线程中使用）
pub trait MissionLog: Send {
    /// 写一行数据
    fn write_row(&mut self, state: MissionState) -> io::Result<()>;
    /// 写一行注释
    fn write_comment(&mut self, text: &str) -> io::Result<()>;
}

/// 驾驶策略
///
/// GOING 状态下每个周期调用一次 [`step`](DriveStrategy::step)，返回 `true` 表示任务完成，
/// 状态机随即回到 WAITING。
pub trait DriveStrategy {
    fn step(&mut self) -> bool;

    /// 进入 GOING 时调用
    fn on_start(&mut self) {}

    /// 回到 WAITING 时调用
    fn on_stop(&mut self) {}
}

impl<F> DriveStrategy for F
where
    F: FnMut() -> bool,
{
    fn step(&mut self) -> bool {
        self()
    }
}
