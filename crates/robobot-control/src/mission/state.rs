//! 任务状态

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 任务状态
///
/// - **Waiting**: 等待开始按钮（或 `--now`）
/// - **Going**: 每个周期调用一次驾驶策略
/// - **Finished**: 逻辑错误，正常流程不会进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MissionState {
    #[default]
    Waiting = 0,
    Going = 1,
    Finished = 2,
}

impl MissionState {
    /// 从 u8 转换，无效值视为 Waiting
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Going,
            2 => Self::Finished,
            _ => Self::Waiting,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Going => "GOING",
            Self::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 任务状态（原子版本，控制线程写，日志线程读）
#[derive(Debug, Default)]
pub struct AtomicMissionState {
    inner: AtomicU8,
}

impl AtomicMissionState {
    pub fn new(state: MissionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> MissionState {
        // Acquire: 与 set 的 Release 配对
        MissionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: MissionState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }
}
