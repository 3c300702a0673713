//! 主控仲裁
//!
//! 同一台机器人上可能有多个客户端。每个客户端在启动时记录自己的启动时间并周期性发送
//! `ti/alive <start_time>`，机器人在 `master` 主题上广播当前主控的启动时间。
//! 与本地启动时间一致即确认主控，不一致即判定为非主控。
//!
//! 状态为原子三态，只能离开 `Pending` 一次，之后保持不变。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 仲裁状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MasterStatus {
    /// 尚未收到 `master` 消息
    #[default]
    Pending = 0,
    /// 已确认为主控
    Confirmed = 1,
    /// 其他客户端是主控
    NotMaster = 2,
}

/// 一次 `master` 消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationOutcome {
    /// 本次消息确认了主控
    Confirmed,
    /// 本次消息判定为非主控
    Rejected,
    /// 状态未改变
    Unchanged,
}

/// 主控仲裁状态
#[derive(Debug)]
pub struct MasterArbitration {
    status: AtomicU8,
    start_time: String,
}

impl MasterArbitration {
    pub fn new(start_time: impl Into<String>) -> Self {
        Self {
            status: AtomicU8::new(MasterStatus::Pending.into()),
            start_time: start_time.into(),
        }
    }

    /// 以当前 UNIX 时间（秒，6 位小数）作为启动时间
    pub fn now() -> Self {
        Self::new(format_start_time(SystemTime::now()))
    }

    /// 本地启动时间（`ti/alive` 载荷）
    pub fn start_time(&self) -> &str {
        &self.start_time
    }

    pub fn status(&self) -> MasterStatus {
        // 只存储过合法值
        MasterStatus::try_from(self.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn is_confirmed_master(&self) -> bool {
        self.status() == MasterStatus::Confirmed
    }

    pub fn is_not_master(&self) -> bool {
        self.status() == MasterStatus::NotMaster
    }

    /// 处理机器人广播的主控启动时间
    pub fn observe(&self, claimed_start_time: &str) -> ArbitrationOutcome {
        let target = if claimed_start_time == self.start_time {
            MasterStatus::Confirmed
        } else {
            MasterStatus::NotMaster
        };

        match self.status.compare_exchange(
            MasterStatus::Pending.into(),
            target.into(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => match target {
                MasterStatus::Confirmed => ArbitrationOutcome::Confirmed,
                _ => ArbitrationOutcome::Rejected,
            },
            Err(_) => ArbitrationOutcome::Unchanged,
        }
    }
}

/// 启动时间格式：UNIX 秒，6 位小数
pub fn format_start_time(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    format!("{:.6}", secs)
}
