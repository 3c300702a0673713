//! 传感器状态同步模块
//!
//! 所有传感器状态保存在 `ArcSwap` 单元中：
//! - 解码层（接收线程）是遥测单元的唯一写入者
//! - 控制线程和日志线程通过 [`SensorView`] 无锁读取副本
//!
//! 两个例外单元由控制侧写入，但同样只有一个写入者：
//! - `acc_scale`：由加速度计标定写入
//! - `trip`：由 [`SensorView::reset_trip`] 写入

use crate::cancel::CancellationToken;
use crate::error::DriverError;
use crate::sampling::TimedSample;
use arc_swap::ArcSwap;
use robobot_protocol::{LINE_SENSOR_COUNT, WheelConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 红外测距判定为"有障碍物"的阈值（米）
pub const OBJECT_DETECTION_THRESHOLD: f64 = 0.3;

/// 等待数据时的轮询周期
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// 等待数据时的告警周期
const WAIT_WARN_INTERVAL: Duration = Duration::from_millis(500);

/// 红外测距读数（米）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IrReading {
    pub side: f64,
    pub front: f64,
}

/// 位姿（下位机里程计）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// 航向（rad）
    pub heading: f64,
    /// 俯仰（rad，若硬件支持）
    pub tilt: f64,
}

/// 左右轮速度对
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelPair {
    pub left: f64,
    pub right: f64,
}

/// 累计里程（从不清零）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct OdometryTotals {
    pub distance: f64,
    pub heading: f64,
}

/// 行程起点（`reset_trip` 时的累计值快照）
#[derive(Debug, Clone, Copy)]
pub(crate) struct TripBaseline {
    pub distance: f64,
    pub heading: f64,
    pub reset_at: Instant,
}

/// 里程计数器
///
/// `trip_*` 在进入 GOING 时清零，`total_*` 从不清零。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TripCounters {
    pub total_distance: f64,
    pub total_heading: f64,
    pub trip_distance: f64,
    pub trip_heading: f64,
}

/// 等待数据的传感器组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    Ir,
    /// 轮速 + 电机转速 + 位姿
    Odometry,
    /// 陀螺仪 + 加速度计
    Imu,
    Motor,
    Line,
}

impl SensorGroup {
    pub fn name(self) -> &'static str {
        match self {
            SensorGroup::Ir => "ir",
            SensorGroup::Odometry => "odometry",
            SensorGroup::Imu => "imu",
            SensorGroup::Motor => "mot",
            SensorGroup::Line => "line",
        }
    }
}

/// 共享状态单元
pub(crate) struct SensorCells {
    pub gyro: ArcSwap<TimedSample<[f64; 3]>>,
    /// 已乘标定系数的加速度
    pub acc: ArcSwap<TimedSample<[f64; 3]>>,
    pub acc_scale: ArcSwap<[f64; 3]>,
    pub ir: ArcSwap<TimedSample<IrReading>>,
    pub line: ArcSwap<TimedSample<[u16; LINE_SENSOR_COUNT]>>,
    pub wheel_velocity: ArcSwap<TimedSample<WheelPair>>,
    pub motor_velocity: ArcSwap<TimedSample<WheelPair>>,
    pub pose: ArcSwap<TimedSample<Pose>>,
    pub totals: ArcSwap<OdometryTotals>,
    pub trip: ArcSwap<TripBaseline>,
    pub wheel_config: ArcSwap<Option<WheelConfig>>,
    pub motor: ArcSwap<TimedSample<[f64; 5]>>,
    pub heartbeat: ArcSwap<TimedSample<()>>,
    pub robot_name: ArcSwap<String>,
    pub created_at: Instant,
}

impl SensorCells {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            gyro: ArcSwap::from_pointee(TimedSample::new([0.0; 3], 1.0)),
            acc: ArcSwap::from_pointee(TimedSample::new([0.0; 3], 1.0)),
            acc_scale: ArcSwap::from_pointee([1.0; 3]),
            ir: ArcSwap::from_pointee(TimedSample::new(IrReading::default(), 0.0)),
            line: ArcSwap::from_pointee(TimedSample::new([0; LINE_SENSOR_COUNT], 0.0)),
            wheel_velocity: ArcSwap::from_pointee(TimedSample::new(WheelPair::default(), 1000.0)),
            motor_velocity: ArcSwap::from_pointee(TimedSample::new(WheelPair::default(), 1000.0)),
            pose: ArcSwap::from_pointee(TimedSample::new(Pose::default(), 1000.0)),
            totals: ArcSwap::from_pointee(OdometryTotals::default()),
            trip: ArcSwap::from_pointee(TripBaseline {
                distance: 0.0,
                heading: 0.0,
                reset_at: now,
            }),
            wheel_config: ArcSwap::from_pointee(None),
            motor: ArcSwap::from_pointee(TimedSample::new([0.0; 5], 0.0)),
            heartbeat: ArcSwap::from_pointee(TimedSample::new((), 30.0)),
            robot_name: ArcSwap::from_pointee("unknown".to_string()),
            created_at: now,
        }
    }
}

/// 传感器状态只读句柄（可克隆，跨线程共享）
#[derive(Clone)]
pub struct SensorView {
    pub(crate) cells: Arc<SensorCells>,
}

impl SensorView {
    pub(crate) fn new(cells: Arc<SensorCells>) -> Self {
        Self { cells }
    }

    pub fn gyro(&self) -> TimedSample<[f64; 3]> {
        **self.cells.gyro.load()
    }

    /// 已标定的加速度
    pub fn acc(&self) -> TimedSample<[f64; 3]> {
        **self.cells.acc.load()
    }

    pub fn acc_scale(&self) -> [f64; 3] {
        **self.cells.acc_scale.load()
    }

    pub(crate) fn set_acc_scale(&self, scale: [f64; 3]) {
        self.cells.acc_scale.store(Arc::new(scale));
    }

    pub fn ir(&self) -> TimedSample<IrReading> {
        **self.cells.ir.load()
    }

    pub fn line(&self) -> TimedSample<[u16; LINE_SENSOR_COUNT]> {
        **self.cells.line.load()
    }

    pub fn wheel_velocity(&self) -> TimedSample<WheelPair> {
        **self.cells.wheel_velocity.load()
    }

    pub fn motor_velocity(&self) -> TimedSample<WheelPair> {
        **self.cells.motor_velocity.load()
    }

    pub fn pose(&self) -> TimedSample<Pose> {
        **self.cells.pose.load()
    }

    /// 最近一次 `T0/conf` 回读的底盘配置
    pub fn wheel_config(&self) -> Option<WheelConfig> {
        **self.cells.wheel_config.load()
    }

    pub fn motor(&self) -> TimedSample<[f64; 5]> {
        **self.cells.motor.load()
    }

    /// 电机电压（`T0/mot` 前两个字段）
    pub fn motor_voltages(&self) -> (f64, f64) {
        let data = self.motor().value;
        (data[0], data[1])
    }

    pub fn heartbeat(&self) -> TimedSample<()> {
        **self.cells.heartbeat.load()
    }

    pub fn robot_name(&self) -> String {
        self.cells.robot_name.load().as_ref().clone()
    }

    /// 累计与行程里程
    pub fn trip(&self) -> TripCounters {
        let totals = **self.cells.totals.load();
        let baseline = **self.cells.trip.load();
        TripCounters {
            total_distance: totals.distance,
            total_heading: totals.heading,
            trip_distance: totals.distance - baseline.distance,
            trip_heading: totals.heading - baseline.heading,
        }
    }

    /// 行程清零（以当前累计值为新起点）
    pub fn reset_trip(&self) {
        let totals = **self.cells.totals.load();
        self.cells.trip.store(Arc::new(TripBaseline {
            distance: totals.distance,
            heading: totals.heading,
            reset_at: Instant::now(),
        }));
    }

    /// 距上次 `reset_trip` 的时间
    pub fn trip_elapsed(&self) -> Duration {
        self.cells.trip.load().reset_at.elapsed()
    }

    /// 距状态创建的时间
    pub fn total_elapsed(&self) -> Duration {
        self.cells.created_at.elapsed()
    }

    pub fn is_object_in_front(&self) -> bool {
        self.ir().value.front < OBJECT_DETECTION_THRESHOLD
    }

    pub fn is_object_on_side(&self) -> bool {
        self.ir().value.side < OBJECT_DETECTION_THRESHOLD
    }

    /// 传感器组是否已有数据
    pub fn has_data(&self, group: SensorGroup) -> bool {
        match group {
            SensorGroup::Ir => self.ir().has_data(),
            SensorGroup::Odometry => {
                self.wheel_velocity().has_data()
                    && self.motor_velocity().has_data()
                    && self.pose().has_data()
            },
            SensorGroup::Imu => self.gyro().has_data() && self.acc().has_data(),
            SensorGroup::Motor => self.motor().has_data(),
            SensorGroup::Line => self.line().has_data(),
        }
    }

    /// 阻塞等待传感器组的第一条数据
    ///
    /// 每 10ms 轮询一次，每 0.5s 告警一次。没有超时，只能由取消令牌打断。
    ///
    /// # 错误
    /// - `DriverError::Cancelled`: 等待期间停止标志被置位
    pub fn wait_for(
        &self,
        group: SensorGroup,
        token: &CancellationToken,
    ) -> Result<(), DriverError> {
        info!("{}: Starting...", group.name());
        let start = Instant::now();
        let mut next_warn = start;

        while !self.has_data(group) {
            if token.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            let now = Instant::now();
            if now >= next_warn {
                warn!(
                    "{}: No data received after {:.2}s (continues...)",
                    group.name(),
                    (now - start).as_secs_f64()
                );
                next_warn += WAIT_WARN_INTERVAL;
            }
            token.sleep(WAIT_POLL_INTERVAL);
        }

        info!("{}: Initiated", group.name());
        Ok(())
    }
}
