//! # Robobot Bus Transport Layer
//!
//! 发布/订阅总线的传输抽象，提供统一的收发接口。
//!
//! - `RxTransport`: 接收端（由接收线程独占）
//! - `TxTransport`: 发送端（由总线客户端在锁内使用）
//! - `mqtt`: 基于 rumqttc 的 MQTT 后端（feature `mqtt`）
//! - `mock`: 内存中的 Mock 后端（feature `mock`，测试使用）

use thiserror::Error;

pub use robobot_protocol::{DEFAULT_PORT, DRIVE_FILTER};

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttRx, MqttSettings, MqttTx, connect_mqtt};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 传输层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// 连接建立失败（broker 不可达、被拒绝）
    #[error("Connect failed: {0}")]
    Connect(String),
    /// 接收超时（正常情况，表示暂无消息）
    #[error("Receive timeout")]
    Timeout,
    /// 发布失败
    #[error("Publish failed: {0}")]
    Publish(String),
    /// 连接已建立后的传输错误（底层会尝试重连）
    #[error("Connection error: {0}")]
    Connection(String),
    /// 传输已关闭，不可恢复
    #[error("Transport disconnected")]
    Disconnected,
}

impl BusError {
    /// 是否为不可恢复错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, BusError::Connect(_) | BusError::Disconnected)
    }
}

/// 接收端事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// broker 已确认连接
    Connected,
    /// 入站消息（完整主题 + UTF-8 载荷）
    Message { topic: String, payload: String },
}

/// 接收端 trait
///
/// `receive()` 必须带超时返回，超时以 `BusError::Timeout` 表示，
/// 使接收线程能周期性检查停止标志。
pub trait RxTransport {
    fn receive(&mut self) -> Result<BusEvent, BusError>;
}

/// 发送端 trait
pub trait TxTransport {
    /// 发布一条消息（QoS 0，不保留）
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError>;
}

impl<T: RxTransport + ?Sized> RxTransport for Box<T> {
    fn receive(&mut self) -> Result<BusEvent, BusError> {
        (**self).receive()
    }
}

impl<T: TxTransport + ?Sized> TxTransport for Box<T> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
        (**self).publish(topic, payload)
    }
}
