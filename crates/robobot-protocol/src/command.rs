//! 出站指令
//!
//! 所有发往执行器的指令都在这里构建，[`Command::topic`] 返回不带 `robobot/cmd/`
//! 前缀的子主题，[`Command::payload`] 返回空白分隔的载荷文本。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 运动指令（`ti/rc`）
///
/// 构造后不可变，每个控制周期新建一个。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlCommand {
    /// 前进速度（m/s）
    pub velocity: f64,
    /// 转向角速度（rad/s，左正）
    pub turn_rate: f64,
    /// 指令时间戳（秒），`None` 时载荷省略该字段
    pub timestamp: Option<f64>,
}

impl ControlCommand {
    pub fn new(velocity: f64, turn_rate: f64, timestamp: Option<f64>) -> Self {
        Self {
            velocity,
            turn_rate,
            timestamp,
        }
    }

    /// 零速指令
    pub fn stop() -> Self {
        Self::new(0.0, 0.0, None)
    }

    pub fn payload(&self) -> String {
        match self.timestamp {
            Some(t) => format!("{} {} {}", self.velocity, self.turn_rate, t),
            None => format!("{} {}", self.velocity, self.turn_rate),
        }
    }
}

/// LED 编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Led {
    Status14 = 14,
    Status15 = 15,
    /// 任务状态指示灯
    Mission = 16,
}

/// RGB 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const WAITING: Rgb = Rgb(255, 0, 255);
    pub const RUNNING: Rgb = Rgb(0, 0, 255);
    pub const FINISHED: Rgb = Rgb(255, 0, 0);
    pub const PULLING_GIT: Rgb = Rgb(241, 76, 40);
    pub const RESTARTING: Rgb = Rgb(255, 255, 255);
    pub const SHUTDOWN: Rgb = Rgb(255, 0, 0);
}

/// 舵机指令（`T0/servo`）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoCommand {
    pub servo: u8,
    /// 目标角度（度），发送前限幅到 ±90
    pub angle_deg: f64,
    pub velocity: u32,
}

impl ServoCommand {
    /// 舵机默认速度
    pub const DEFAULT_VELOCITY: u32 = 200;
    /// 关闭舵机时使用的角度标记（限幅后等同于 +90°）
    pub const OFF_ANGLE: f64 = 9999.0;

    const ANGLE_MIN: f64 = -90.0;
    const ANGLE_MAX: f64 = 90.0;
    const OUT_MIN: f64 = 800.0;
    const OUT_MAX: f64 = -900.0;

    pub fn new(servo: u8, angle_deg: f64) -> Self {
        Self {
            servo,
            angle_deg,
            velocity: Self::DEFAULT_VELOCITY,
        }
    }

    pub fn off(servo: u8) -> Self {
        Self::new(servo, Self::OFF_ANGLE)
    }

    /// 角度到舵机位置的线性映射：-90° → 800，+90° → -900
    pub fn position(&self) -> f64 {
        let angle = self.angle_deg.clamp(Self::ANGLE_MIN, Self::ANGLE_MAX);
        Self::OUT_MIN
            + (angle - Self::ANGLE_MIN) * (Self::OUT_MAX - Self::OUT_MIN)
                / (Self::ANGLE_MAX - Self::ANGLE_MIN)
    }
}

/// 底盘几何参数（`T0/confw`）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WheelGeometry {
    pub radius_left: f64,
    pub radius_right: f64,
    pub gear: f64,
    pub ticks_per_revolution: f64,
    pub wheel_base: f64,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self {
            radius_left: 0.075,
            radius_right: 0.075,
            gear: 19.0,
            ticks_per_revolution: 68.0,
            wheel_base: 0.23,
        }
    }
}

/// 出站指令（封闭枚举）
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 运动控制 `ti/rc`
    Drive(ControlCommand),
    /// LED 颜色 `T0/leds`
    Led { led: Led, color: Rgb },
    /// 舵机 `T0/servo`
    Servo(ServoCommand),
    /// 电机原始电压 `T0/motv`
    MotorVoltage { left: f64, right: f64 },
    /// 下位机停止 `T0/stop`
    Stop,
    /// 存活心跳 `ti/alive`
    Alive { start_time: String },
    /// 接口日志开关 `ti/log`
    InterfaceLog { enabled: bool },
    /// 关机 `shutdown`
    Shutdown { timestamp: f64 },
    /// 编码器/位姿清零 `T0/enc0`
    ResetEncoders,
    /// 写入底盘几何 `T0/confw`
    WheelConfig(WheelGeometry),
    /// 编码器方向 `T0/encrev`
    EncoderReversed(bool),
    /// 请求配置回读 `T0/confi`
    RequestConfig,
}

impl Command {
    /// 子主题（不含 `robobot/cmd/` 前缀）
    pub fn topic(&self) -> &'static str {
        match self {
            Command::Drive(_) => "ti/rc",
            Command::Led { .. } => "T0/leds",
            Command::Servo(_) => "T0/servo",
            Command::MotorVoltage { .. } => "T0/motv",
            Command::Stop => "T0/stop",
            Command::Alive { .. } => "ti/alive",
            Command::InterfaceLog { .. } => "ti/log",
            Command::Shutdown { .. } => "shutdown",
            Command::ResetEncoders => "T0/enc0",
            Command::WheelConfig(_) => "T0/confw",
            Command::EncoderReversed(_) => "T0/encrev",
            Command::RequestConfig => "T0/confi",
        }
    }

    /// 载荷文本（可能为空，空载荷由总线客户端替换为单个空格）
    pub fn payload(&self) -> String {
        match self {
            Command::Drive(cmd) => cmd.payload(),
            Command::Led { led, color } => {
                format!("{} {} {} {}", u8::from(*led), color.0, color.1, color.2)
            },
            Command::Servo(servo) => {
                format!("{} {} {}", servo.servo, servo.position(), servo.velocity)
            },
            Command::MotorVoltage { left, right } => format!("{} {}", left, right),
            Command::Stop | Command::ResetEncoders | Command::RequestConfig => String::new(),
            Command::Alive { start_time } => start_time.clone(),
            Command::InterfaceLog { enabled } => (if *enabled { "1" } else { "0" }).to_string(),
            Command::Shutdown { timestamp } => format!("{}", timestamp),
            Command::WheelConfig(g) => format!(
                "{} {} {} {} {}",
                g.radius_left, g.radius_right, g.gear, g.ticks_per_revolution, g.wheel_base
            ),
            Command::EncoderReversed(reversed) => (if *reversed { "1" } else { "0" }).to_string(),
        }
    }
}

impl From<ControlCommand> for Command {
    fn from(cmd: ControlCommand) -> Self {
        Command::Drive(cmd)
    }
}
