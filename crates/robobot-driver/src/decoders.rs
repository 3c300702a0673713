//! 传感器解码层
//!
//! [`SensorDecoders`] 是遥测状态的唯一写入者，被移动到接收线程中独占使用。
//! 读取方通过 [`SensorView`] 获得副本。

use crate::pipeline::MessageHandler;
use crate::sampling::TimedSample;
use crate::state::{IrReading, OdometryTotals, Pose, SensorCells, SensorView, WheelPair};
use arc_swap::ArcSwap;
use robobot_protocol::TelemetryMessage;
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::{debug, trace};

/// 记录一次更新并发布新样本，返回发布后的副本
fn publish<T: Copy>(cell: &ArcSwap<TimedSample<T>>, value: T, timestamp: f64) -> TimedSample<T> {
    let mut sample = **cell.load();
    sample.record(value, timestamp);
    cell.store(Arc::new(sample));
    sample
}

/// 航向增量限制在 [-2π, 2π]
fn wrap_heading_delta(mut dh: f64) -> f64 {
    if dh > TAU {
        dh -= TAU;
    } else if dh < -TAU {
        dh += TAU;
    }
    dh
}

/// 传感器解码器（单写者，不可克隆）
pub struct SensorDecoders {
    cells: Arc<SensorCells>,
}

impl SensorDecoders {
    /// 创建解码器和对应的只读视图
    pub fn new() -> (Self, SensorView) {
        let cells = Arc::new(SensorCells::new());
        let view = SensorView::new(cells.clone());
        (Self { cells }, view)
    }

    /// 将一条遥测消息写入共享状态
    pub fn decode(&mut self, message: &TelemetryMessage) {
        trace!("Decoding telemetry: {:?}", message);
        let cells = &self.cells;

        match *message {
            TelemetryMessage::Heartbeat { timestamp } => {
                publish(&cells.heartbeat, (), timestamp);
            },
            TelemetryMessage::DeviceName { ref name } => {
                debug!("Robot name: {}", name);
                cells.robot_name.store(Arc::new(name.clone()));
            },
            TelemetryMessage::Gyro { timestamp, rate } => {
                publish(&cells.gyro, rate, timestamp);
            },
            TelemetryMessage::Acc { timestamp, raw } => {
                let scale = **cells.acc_scale.load();
                let scaled = [raw[0] * scale[0], raw[1] * scale[1], raw[2] * scale[2]];
                publish(&cells.acc, scaled, timestamp);
            },
            TelemetryMessage::Ir {
                timestamp,
                side,
                front,
            } => {
                publish(&cells.ir, IrReading { side, front }, timestamp);
            },
            TelemetryMessage::Line { timestamp, values } => {
                publish(&cells.line, values, timestamp);
            },
            TelemetryMessage::WheelVelocity {
                timestamp,
                left,
                right,
            } => {
                let sample = publish(&cells.wheel_velocity, WheelPair { left, right }, timestamp);
                // 占位间隔期间同样积分（与下位机行为一致，存在漂移）
                let ds = (left + right) * sample.sampling_interval / 2.0;
                let totals = **cells.totals.load();
                cells.totals.store(Arc::new(OdometryTotals {
                    distance: totals.distance + ds,
                    heading: totals.heading,
                }));
            },
            TelemetryMessage::MotorVelocity {
                timestamp,
                left,
                right,
            } => {
                publish(&cells.motor_velocity, WheelPair { left, right }, timestamp);
            },
            TelemetryMessage::Pose {
                timestamp,
                x,
                y,
                heading,
                tilt,
            } => {
                let previous = cells.pose.load().value.heading;
                let dh = wrap_heading_delta(heading - previous);
                let totals = **cells.totals.load();
                cells.totals.store(Arc::new(OdometryTotals {
                    distance: totals.distance,
                    heading: totals.heading + dh,
                }));
                publish(
                    &cells.pose,
                    Pose {
                        x,
                        y,
                        heading,
                        tilt,
                    },
                    timestamp,
                );
            },
            TelemetryMessage::Config { config, .. } => {
                debug!("Wheel configuration: {:?}", config);
                cells.wheel_config.store(Arc::new(Some(config)));
            },
            TelemetryMessage::Motor { timestamp, data } => {
                publish(&cells.motor, data, timestamp);
            },
        }
    }
}

impl MessageHandler for SensorDecoders {
    fn handle(&mut self, message: &TelemetryMessage) {
        self.decode(message);
    }
}
