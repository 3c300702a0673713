//! 机器人指令辅助
//!
//! 在 [`BusClient`] 之上提供常用指令：运动、LED、舵机、里程计配置和关机。

use crate::client::BusClient;
use crate::error::DriverError;
use robobot_protocol::{Command, ControlCommand, Led, Rgb, ServoCommand, WheelGeometry};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// LED 闪烁模式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkPattern {
    pub color: Rgb,
    /// 亮/灭各持续的时间
    pub period: Duration,
    pub count: u32,
}

impl BlinkPattern {
    pub const PULLING_GIT: BlinkPattern = BlinkPattern {
        color: Rgb::PULLING_GIT,
        period: Duration::from_millis(100),
        count: 4,
    };
    pub const RESTARTING: BlinkPattern = BlinkPattern {
        color: Rgb::RESTARTING,
        period: Duration::from_millis(100),
        count: 3,
    };
    pub const SHUTDOWN: BlinkPattern = BlinkPattern {
        color: Rgb::SHUTDOWN,
        period: Duration::from_millis(200),
        count: 5,
    };
}

/// 当前 UNIX 时间（秒）
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// 指令辅助（可克隆，共享同一个总线客户端）
#[derive(Clone)]
pub struct RobotCommands {
    bus: Arc<BusClient>,
}

impl RobotCommands {
    pub fn new(bus: Arc<BusClient>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<BusClient> {
        &self.bus
    }

    /// 运动指令 `ti/rc`
    pub fn drive(&self, command: ControlCommand) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::Drive(command))
    }

    /// 以给定速度和角速度运动
    pub fn set_movement(&self, velocity: f64, turn_rate: f64) -> Result<(), DriverError> {
        self.drive(ControlCommand::new(velocity, turn_rate, None))
    }

    /// 零速 `ti/rc "0 0"`
    pub fn stop_movement(&self) -> Result<(), DriverError> {
        self.drive(ControlCommand::stop())
    }

    /// 电机原始电压
    pub fn set_motor_voltage(&self, left: f64, right: f64) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::MotorVoltage { left, right })
    }

    /// 存活心跳 `ti/alive <start_time>`
    pub fn send_alive(&self) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::Alive {
            start_time: self.bus.start_time().to_string(),
        })
    }

    pub fn set_led(&self, led: Led, color: Rgb) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::Led { led, color })
    }

    pub fn led_off(&self, led: Led) -> Result<(), DriverError> {
        self.set_led(led, Rgb::OFF)
    }

    /// 阻塞闪烁（亮、等待、灭、等待），停止标志置位时提前结束
    pub fn blink(&self, led: Led, pattern: BlinkPattern) -> Result<(), DriverError> {
        let token = self.bus.stopped_token();
        for _ in 0..pattern.count {
            self.set_led(led, pattern.color)?;
            token.sleep(pattern.period);
            self.led_off(led)?;
            if !token.sleep(pattern.period) {
                break;
            }
        }
        Ok(())
    }

    pub fn mission_led_off(&self) -> Result<(), DriverError> {
        self.led_off(Led::Mission)
    }

    pub fn mission_led_waiting(&self) -> Result<(), DriverError> {
        self.set_led(Led::Mission, Rgb::WAITING)
    }

    pub fn mission_led_running(&self) -> Result<(), DriverError> {
        self.set_led(Led::Mission, Rgb::RUNNING)
    }

    pub fn mission_led_finished(&self) -> Result<(), DriverError> {
        self.set_led(Led::Mission, Rgb::FINISHED)
    }

    pub fn mission_led_pulling_git(&self) -> Result<(), DriverError> {
        self.blink(Led::Mission, BlinkPattern::PULLING_GIT)
    }

    pub fn mission_led_restarting(&self) -> Result<(), DriverError> {
        self.blink(Led::Mission, BlinkPattern::RESTARTING)
    }

    /// 关机：红灯闪烁后发送 `shutdown <time>`
    pub fn shutdown(&self) -> Result<(), DriverError> {
        info!("Sending shutdown signal");
        self.blink(Led::Mission, BlinkPattern::SHUTDOWN)?;
        self.bus.send_cmd(&Command::Shutdown {
            timestamp: unix_time(),
        })
    }

    /// 舵机转到指定角度（±90° 限幅）
    pub fn set_servo(&self, servo: u8, angle_deg: f64) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::Servo(ServoCommand::new(servo, angle_deg)))
    }

    /// 关闭舵机
    pub fn servo_off(&self, servo: u8) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::Servo(ServoCommand::off(servo)))
    }

    /// 里程计初始化：清零、写入几何、编码器反向、请求回读
    pub fn setup_odometry(&self, geometry: WheelGeometry) -> Result<(), DriverError> {
        self.bus.send_cmd(&Command::ResetEncoders)?;
        self.bus.send_cmd(&Command::WheelConfig(geometry))?;
        self.bus.send_cmd(&Command::EncoderReversed(true))?;
        self.bus.send_cmd(&Command::RequestConfig)
    }
}
