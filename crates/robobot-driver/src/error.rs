//! 驱动层错误类型定义

use robobot_bus::BusError;
use robobot_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 传输层错误
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 本进程不是主控，发送被拒绝
    #[error("Not the master of this robot, send rejected")]
    NotMaster,

    /// 总线客户端已终止
    #[error("Bus client terminated")]
    Terminated,

    /// 等待被取消（停止标志已置位）
    #[error("Operation cancelled")]
    Cancelled,

    /// 线程错误
    #[error("Thread error: {0}")]
    Thread(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Bus(BusError::Timeout);
        assert!(format!("{}", err).contains("Receive timeout"));

        let err = DriverError::NotMaster;
        assert!(format!("{}", err).contains("Not the master"));

        assert_eq!(format!("{}", DriverError::Terminated), "Bus client terminated");
        assert_eq!(format!("{}", DriverError::Cancelled), "Operation cancelled");

        let err = DriverError::Thread("spawn failed".to_string());
        assert!(format!("{}", err).contains("spawn failed"));
    }

    /// 测试 From<BusError> 转换
    #[test]
    fn test_from_bus_error() {
        let err: DriverError = BusError::Publish("queue full".into()).into();
        match err {
            DriverError::Bus(BusError::Publish(msg)) => assert_eq!(msg, "queue full"),
            other => panic!("Expected Bus variant, got {:?}", other),
        }
    }

    /// 测试 From<ProtocolError> 转换
    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::NotTelemetry("master".into()).into();
        assert!(matches!(err, DriverError::Protocol(ProtocolError::NotTelemetry(_))));
    }
}
