//! 驱动层模块
//!
//! 本模块提供机器人总线客户端和传感器状态同步功能，包括：
//! - 接收线程管理与消息分发
//! - 主控仲裁（原子三态）
//! - 发送健康检查：非主控拒绝、连续失败终止、心跳不对称停止
//! - 状态同步（ArcSwap 无锁读取）与采样间隔估计
//! - 协作式取消（`CancellationToken`）
//!
//! # 使用场景
//!
//! 大多数用户通过 [`RobotBuilder`] 连接机器人，得到 [`Robot`]：
//! `robot.sensors` 读取状态，`robot.commands` 发送指令。

pub mod arbitration;
mod builder;
pub mod calibration;
mod cancel;
mod client;
pub mod commands;
pub mod decoders;
mod error;
pub mod metrics;
pub mod pipeline;
pub mod sampling;
pub mod state;

pub use arbitration::{ArbitrationOutcome, MasterArbitration, MasterStatus};
pub use builder::{Robot, RobotBuilder};
pub use calibration::{AccCalibration, calibrate_accelerometer};
pub use cancel::CancellationToken;
pub use client::{BusClient, TerminationCause};
pub use commands::{BlinkPattern, RobotCommands, unix_time};
pub use decoders::SensorDecoders;
pub use error::DriverError;
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use pipeline::{BusShared, MessageHandler, PipelineConfig, dispatch, rx_loop};
pub use sampling::{TimedSample, update_sampling_interval};
pub use state::*;
