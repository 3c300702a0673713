//! # Robobot Protocol
//!
//! 机器人 MQTT 总线协议定义（无传输依赖）
//!
//! ## 模块
//!
//! - `topics`: 主题前缀与主题种类（`TopicKind`）
//! - `telemetry`: 入站遥测消息解析（`TelemetryMessage`）
//! - `command`: 出站指令构建（`Command` / `ControlCommand`）
//!
//! ## 载荷格式
//!
//! 所有载荷均为空白分隔的 ASCII 文本，入站消息第一个字段总是发送端时间戳（秒，浮点）。

pub mod command;
pub mod telemetry;
pub mod topics;

pub use command::*;
pub use telemetry::*;
pub use topics::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Too few fields for {topic}: expected at least {expected}, got {actual}")]
    MissingFields {
        topic: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid number in field {index}: {value:?}")]
    InvalidNumber { index: usize, value: String },

    #[error("Topic carries no telemetry: {0}")]
    NotTelemetry(String),
}

/// 解析浮点字段
pub(crate) fn parse_f64(fields: &[&str], index: usize) -> Result<f64, ProtocolError> {
    let raw = fields.get(index).copied().unwrap_or_default();
    raw.parse::<f64>().map_err(|_| ProtocolError::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}

/// 解析整数字段
pub(crate) fn parse_i64(fields: &[&str], index: usize) -> Result<i64, ProtocolError> {
    let raw = fields.get(index).copied().unwrap_or_default();
    raw.parse::<i64>().map_err(|_| ProtocolError::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}
