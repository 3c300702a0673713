//! 主题定义
//!
//! 入站遥测位于 `robobot/drive/` 前缀下，出站指令位于 `robobot/cmd/` 前缀下。
//! 主题字符串只在总线边界解析一次，之后统一使用 [`TopicKind`]。

/// 入站遥测主题前缀
pub const DRIVE_PREFIX: &str = "robobot/drive/";

/// 入站订阅过滤器
pub const DRIVE_FILTER: &str = "robobot/drive/#";

/// 出站指令主题前缀
pub const CMD_PREFIX: &str = "robobot/cmd/";

/// 默认 MQTT 端口
pub const DEFAULT_PORT: u16 = 1883;

/// 入站主题种类（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TopicKind {
    /// 心跳 `T0/hbt`
    Heartbeat,
    /// 设备名 `T0/dname`
    DeviceName,
    /// 主控仲裁 `master`
    Master,
    /// 固件信息 `T0/info`
    Info,
    /// 陀螺仪 `T0/gyro`
    Gyro,
    /// 加速度计 `T0/acc`
    Acc,
    /// 红外测距 `T0/ird`
    Ir,
    /// 归一化巡线传感器 `T0/livn`
    Line,
    /// 轮速 `T0/vel`
    WheelVelocity,
    /// 电机转速 `T0/mvel`
    MotorVelocity,
    /// 位姿 `T0/pose`
    Pose,
    /// 底盘配置 `T0/conf`
    Config,
    /// 电机状态 `T0/mot`
    Motor,
    /// 未知子主题（忽略）
    Unknown,
}

impl TopicKind {
    /// 所有已知种类（不含 `Unknown`）
    pub const ALL: [TopicKind; 13] = [
        TopicKind::Heartbeat,
        TopicKind::DeviceName,
        TopicKind::Master,
        TopicKind::Info,
        TopicKind::Gyro,
        TopicKind::Acc,
        TopicKind::Ir,
        TopicKind::Line,
        TopicKind::WheelVelocity,
        TopicKind::MotorVelocity,
        TopicKind::Pose,
        TopicKind::Config,
        TopicKind::Motor,
    ];

    /// 从去掉前缀后的子主题解析
    pub fn from_subtopic(subtopic: &str) -> Self {
        match subtopic {
            "T0/hbt" => TopicKind::Heartbeat,
            "T0/dname" => TopicKind::DeviceName,
            "master" => TopicKind::Master,
            "T0/info" => TopicKind::Info,
            "T0/gyro" => TopicKind::Gyro,
            "T0/acc" => TopicKind::Acc,
            "T0/ird" => TopicKind::Ir,
            "T0/livn" => TopicKind::Line,
            "T0/vel" => TopicKind::WheelVelocity,
            "T0/mvel" => TopicKind::MotorVelocity,
            "T0/pose" => TopicKind::Pose,
            "T0/conf" => TopicKind::Config,
            "T0/mot" => TopicKind::Motor,
            _ => TopicKind::Unknown,
        }
    }

    /// 对应的子主题字符串
    pub fn subtopic(self) -> &'static str {
        match self {
            TopicKind::Heartbeat => "T0/hbt",
            TopicKind::DeviceName => "T0/dname",
            TopicKind::Master => "master",
            TopicKind::Info => "T0/info",
            TopicKind::Gyro => "T0/gyro",
            TopicKind::Acc => "T0/acc",
            TopicKind::Ir => "T0/ird",
            TopicKind::Line => "T0/livn",
            TopicKind::WheelVelocity => "T0/vel",
            TopicKind::MotorVelocity => "T0/mvel",
            TopicKind::Pose => "T0/pose",
            TopicKind::Config => "T0/conf",
            TopicKind::Motor => "T0/mot",
            TopicKind::Unknown => "",
        }
    }

    /// 载荷最少字段数（含时间戳）
    pub fn min_fields(self) -> usize {
        match self {
            TopicKind::Heartbeat => 4,
            TopicKind::DeviceName => 2,
            TopicKind::Master => 2,
            TopicKind::Info => 0,
            TopicKind::Gyro => 4,
            TopicKind::Acc => 4,
            TopicKind::Ir => 3,
            TopicKind::Line => 9,
            TopicKind::WheelVelocity => 4,
            TopicKind::MotorVelocity => 3,
            TopicKind::Pose => 6,
            TopicKind::Config => 8,
            TopicKind::Motor => 6,
            TopicKind::Unknown => 0,
        }
    }
}

/// 去掉入站前缀
///
/// 前缀不匹配时返回 `None`（该消息应被忽略）。
pub fn strip_drive_prefix(topic: &str) -> Option<&str> {
    topic.strip_prefix(DRIVE_PREFIX)
}

/// 拼接完整的出站主题
pub fn command_topic(subtopic: &str) -> String {
    format!("{CMD_PREFIX}{subtopic}")
}
