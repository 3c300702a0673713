//! 控制层错误类型

use robobot_driver::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Unknown maneuver: {0:?}")]
    UnknownDirection(String),

    #[error("Invalid waypoints: {0}")]
    InvalidWaypoints(String),

    /// 任务进入 FINISHED 状态（逻辑错误，正常流程不会到达）
    #[error("Mission reached the FINISHED state")]
    MissionFinished,

    #[error("Maintenance action failed: {0}")]
    Maintenance(String),
}

/// 控制循环内的发送失败只记录，不中断循环
pub(crate) fn report(result: Result<(), DriverError>, what: &str) {
    if let Err(e) = result {
        tracing::warn!("Failed to send {}: {}", what, e);
    }
}
