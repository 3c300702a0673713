//! 入站遥测消息
//!
//! 每个遥测主题映射到 [`TelemetryMessage`] 的一个变体。字段数不足或数字非法时返回
//! [`ProtocolError`]，由调用方决定是否忽略（解码层一律静默忽略）。

use crate::topics::TopicKind;
use crate::{ProtocolError, parse_f64, parse_i64};

/// 巡线传感器通道数
pub const LINE_SENSOR_COUNT: usize = 8;

/// 底盘配置（`T0/conf` 反馈）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WheelConfig {
    pub wheel_radius_left: f64,
    pub wheel_radius_right: f64,
    pub gear: f64,
    pub ticks_per_revolution: f64,
    pub wheel_base: f64,
    pub encoder_reversed: bool,
}

/// 入站遥测消息（tagged union）
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelemetryMessage {
    Heartbeat {
        timestamp: f64,
    },
    DeviceName {
        name: String,
    },
    Gyro {
        timestamp: f64,
        rate: [f64; 3],
    },
    /// 原始加速度（未乘标定系数）
    Acc {
        timestamp: f64,
        raw: [f64; 3],
    },
    Ir {
        timestamp: f64,
        side: f64,
        front: f64,
    },
    Line {
        timestamp: f64,
        values: [u16; LINE_SENSOR_COUNT],
    },
    /// 轮速（m/s），字段 1 为下位机时间，忽略
    WheelVelocity {
        timestamp: f64,
        left: f64,
        right: f64,
    },
    /// 电机转速（rad/s）
    MotorVelocity {
        timestamp: f64,
        left: f64,
        right: f64,
    },
    /// 位姿，字段 1 为下位机时间，忽略
    Pose {
        timestamp: f64,
        x: f64,
        y: f64,
        heading: f64,
        tilt: f64,
    },
    Config {
        timestamp: f64,
        config: WheelConfig,
    },
    Motor {
        timestamp: f64,
        data: [f64; 5],
    },
}

impl TelemetryMessage {
    /// 按主题种类解析载荷
    ///
    /// # 错误
    /// - `ProtocolError::NotTelemetry`: 该主题不是遥测主题（`master`/`T0/info`/未知）
    /// - `ProtocolError::MissingFields`: 字段数不足
    /// - `ProtocolError::InvalidNumber`: 数字解析失败
    pub fn parse(kind: TopicKind, payload: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = payload.split_whitespace().collect();

        if matches!(
            kind,
            TopicKind::Master | TopicKind::Info | TopicKind::Unknown
        ) {
            return Err(ProtocolError::NotTelemetry(kind.subtopic().to_string()));
        }

        if fields.len() < kind.min_fields() {
            return Err(ProtocolError::MissingFields {
                topic: kind.subtopic(),
                expected: kind.min_fields(),
                actual: fields.len(),
            });
        }

        let f = |i: usize| parse_f64(&fields, i);

        let message = match kind {
            TopicKind::Heartbeat => TelemetryMessage::Heartbeat { timestamp: f(0)? },
            TopicKind::DeviceName => TelemetryMessage::DeviceName {
                name: fields[1].to_string(),
            },
            TopicKind::Gyro => TelemetryMessage::Gyro {
                timestamp: f(0)?,
                rate: [f(1)?, f(2)?, f(3)?],
            },
            TopicKind::Acc => TelemetryMessage::Acc {
                timestamp: f(0)?,
                raw: [f(1)?, f(2)?, f(3)?],
            },
            TopicKind::Ir => TelemetryMessage::Ir {
                timestamp: f(0)?,
                side: f(1)?,
                front: f(2)?,
            },
            TopicKind::Line => {
                let mut values = [0u16; LINE_SENSOR_COUNT];
                for (i, value) in values.iter_mut().enumerate() {
                    let raw = parse_i64(&fields, i + 1)?;
                    *value = raw.clamp(0, u16::MAX as i64) as u16;
                }
                TelemetryMessage::Line {
                    timestamp: f(0)?,
                    values,
                }
            },
            TopicKind::WheelVelocity => TelemetryMessage::WheelVelocity {
                timestamp: f(0)?,
                left: f(2)?,
                right: f(3)?,
            },
            TopicKind::MotorVelocity => TelemetryMessage::MotorVelocity {
                timestamp: f(0)?,
                left: f(1)?,
                right: f(2)?,
            },
            TopicKind::Pose => TelemetryMessage::Pose {
                timestamp: f(0)?,
                x: f(2)?,
                y: f(3)?,
                heading: f(4)?,
                tilt: f(5)?,
            },
            TopicKind::Config => TelemetryMessage::Config {
                timestamp: f(0)?,
                config: WheelConfig {
                    wheel_radius_left: f(1)?,
                    wheel_radius_right: f(2)?,
                    gear: f(3)?,
                    ticks_per_revolution: f(4)?,
                    wheel_base: f(5)?,
                    encoder_reversed: f(7)? != 0.0,
                },
            },
            TopicKind::Motor => TelemetryMessage::Motor {
                timestamp: f(0)?,
                data: [f(1)?, f(2)?, f(3)?, f(4)?, f(5)?],
            },
            TopicKind::Master | TopicKind::Info | TopicKind::Unknown => {
                return Err(ProtocolError::NotTelemetry(kind.subtopic().to_string()));
            },
        };

        Ok(message)
    }

    /// 消息对应的主题种类
    pub fn kind(&self) -> TopicKind {
        match self {
            TelemetryMessage::Heartbeat { .. } => TopicKind::Heartbeat,
            TelemetryMessage::DeviceName { .. } => TopicKind::DeviceName,
            TelemetryMessage::Gyro { .. } => TopicKind::Gyro,
            TelemetryMessage::Acc { .. } => TopicKind::Acc,
            TelemetryMessage::Ir { .. } => TopicKind::Ir,
            TelemetryMessage::Line { .. } => TopicKind::Line,
            TelemetryMessage::WheelVelocity { .. } => TopicKind::WheelVelocity,
            TelemetryMessage::MotorVelocity { .. } => TopicKind::MotorVelocity,
            TelemetryMessage::Pose { .. } => TopicKind::Pose,
            TelemetryMessage::Config { .. } => TopicKind::Config,
            TelemetryMessage::Motor { .. } => TopicKind::Motor,
        }
    }

    /// 发送端时间戳（设备名消息没有）
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            TelemetryMessage::DeviceName { .. } => None,
            TelemetryMessage::Heartbeat { timestamp }
            | TelemetryMessage::Gyro { timestamp, .. }
            | TelemetryMessage::Acc { timestamp, .. }
            | TelemetryMessage::Ir { timestamp, .. }
            | TelemetryMessage::Line { timestamp, .. }
            | TelemetryMessage::WheelVelocity { timestamp, .. }
            | TelemetryMessage::MotorVelocity { timestamp, .. }
            | TelemetryMessage::Pose { timestamp, .. }
            | TelemetryMessage::Config { timestamp, .. }
            | TelemetryMessage::Motor { timestamp, .. } => Some(*timestamp),
        }
    }
}

/// 提取主控仲裁载荷中的启动时间
///
/// 载荷格式为 `<timestamp> <start_time>`，返回第一个空格之后的全部文本
/// （去掉行尾空白）。没有空格时返回整个载荷。
pub fn master_start_time(payload: &str) -> &str {
    let tail = match payload.find(' ') {
        Some(pos) => &payload[pos + 1..],
        None => payload,
    };
    tail.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gyro() {
        let msg = TelemetryMessage::parse(TopicKind::Gyro, "1000.0 0.1 0.2 0.3").unwrap();
        assert_eq!(
            msg,
            TelemetryMessage::Gyro {
                timestamp: 1000.0,
                rate: [0.1, 0.2, 0.3]
            }
        );
        assert_eq!(msg.kind(), TopicKind::Gyro);
        assert_eq!(msg.timestamp(), Some(1000.0));
    }

    #[test]
    fn test_parse_short_payload_is_rejected() {
        let err = TelemetryMessage::parse(TopicKind::Gyro, "1000.0 0.1").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingFields {
                topic: "T0/gyro",
                expected: 4,
                actual: 2
            }
        );

        assert!(TelemetryMessage::parse(TopicKind::Pose, "1 2 3 4 5").is_err());
        assert!(TelemetryMessage::parse(TopicKind::Line, "1 1000 1000 1000").is_err());
    }

    #[test]
    fn test_parse_garbage_number() {
        let err = TelemetryMessage::parse(TopicKind::Ir, "12.0 abc 0.5").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidNumber { index: 1, .. }));
    }

    #[test]
    fn test_parse_line_clamps_into_u16() {
        let msg =
            TelemetryMessage::parse(TopicKind::Line, "5.0 -3 0 100 700 800 1000 70000 12\n")
                .unwrap();
        match msg {
            TelemetryMessage::Line { timestamp, values } => {
                assert_eq!(timestamp, 5.0);
                assert_eq!(values, [0, 0, 100, 700, 800, 1000, u16::MAX, 12]);
            },
            other => panic!("Expected Line, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_wheel_velocity_skips_teensy_time() {
        let msg = TelemetryMessage::parse(TopicKind::WheelVelocity, "10.0 99.0 0.2 0.4").unwrap();
        assert_eq!(
            msg,
            TelemetryMessage::WheelVelocity {
                timestamp: 10.0,
                left: 0.2,
                right: 0.4
            }
        );
    }

    #[test]
    fn test_parse_pose_and_config() {
        let pose = TelemetryMessage::parse(TopicKind::Pose, "10.0 99.0 1.0 2.0 0.5 0.01").unwrap();
        assert_eq!(
            pose,
            TelemetryMessage::Pose {
                timestamp: 10.0,
                x: 1.0,
                y: 2.0,
                heading: 0.5,
                tilt: 0.01
            }
        );

        let conf =
            TelemetryMessage::parse(TopicKind::Config, "10.0 0.075 0.075 19 68 0.23 0 1").unwrap();
        match conf {
            TelemetryMessage::Config { config, .. } => {
                assert_eq!(config.wheel_base, 0.23);
                assert_eq!(config.gear, 19.0);
                assert!(config.encoder_reversed);
            },
            other => panic!("Expected Config, got {:?}", other),
        }
    }

    #[test]
    fn test_non_telemetry_topics() {
        assert!(matches!(
            TelemetryMessage::parse(TopicKind::Master, "1 2"),
            Err(ProtocolError::NotTelemetry(_))
        ));
        assert!(matches!(
            TelemetryMessage::parse(TopicKind::Unknown, "1 2 3"),
            Err(ProtocolError::NotTelemetry(_))
        ));
    }

    #[test]
    fn test_master_start_time() {
        assert_eq!(master_start_time("1000.5 1700000000.123456"), "1700000000.123456");
        assert_eq!(master_start_time("1000.5 2025-01-01 10:00:00\n"), "2025-01-01 10:00:00");
        assert_eq!(master_start_time("nospace"), "nospace");
    }
}
