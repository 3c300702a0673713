//! Builder 模式实现
//!
//! 提供链式构造 [`Robot`] 实例的便捷方式：创建解码层、启动总线客户端并等待连接。

use crate::arbitration::MasterArbitration;
use crate::calibration::{AccCalibration, calibrate_accelerometer};
use crate::cancel::CancellationToken;
use crate::client::{BusClient, TerminationCause};
use crate::commands::RobotCommands;
use crate::decoders::SensorDecoders;
use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use crate::state::{SensorGroup, SensorView};
use robobot_bus::{RxTransport, TxTransport};
use robobot_protocol::WheelGeometry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 已连接的机器人
///
/// 组合总线客户端、指令辅助和传感器视图。
#[derive(Clone)]
pub struct Robot {
    pub bus: Arc<BusClient>,
    pub commands: RobotCommands,
    pub sensors: SensorView,
}

impl Robot {
    /// 全局停止令牌
    pub fn stopped_token(&self) -> CancellationToken {
        self.bus.stopped_token()
    }

    /// 启动时的传感器初始化
    ///
    /// 依次等待：红外、里程计（随后发送里程计配置）、IMU（随后标定加速度计）、
    /// 电机、巡线传感器。
    pub fn initialize_sensors(
        &self,
        geometry: WheelGeometry,
        calibration: &AccCalibration,
    ) -> Result<(), DriverError> {
        let token = self.stopped_token();

        self.sensors.wait_for(SensorGroup::Ir, &token)?;

        self.sensors.wait_for(SensorGroup::Odometry, &token)?;
        self.commands.setup_odometry(geometry)?;

        self.sensors.wait_for(SensorGroup::Imu, &token)?;
        calibrate_accelerometer(&self.sensors, calibration, &token)?;

        self.sensors.wait_for(SensorGroup::Motor, &token)?;
        self.sensors.wait_for(SensorGroup::Line, &token)?;

        info!("All sensors initialized");
        Ok(())
    }

    /// 正常关闭总线客户端
    pub fn terminate(&self) {
        self.bus.terminate(TerminationCause::Requested);
    }
}

/// Robot Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use robobot_driver::RobotBuilder;
///
/// let robot = RobotBuilder::new()
///     .host("localhost")
///     .print_teensy_info(true)
///     .build()
///     .unwrap();
/// robot.commands.stop_movement().unwrap();
/// ```
#[cfg_attr(not(feature = "mqtt"), allow(dead_code))]
pub struct RobotBuilder {
    host: String,
    port: u16,
    client_id: Option<String>,
    keep_alive: Duration,
    pipeline_config: PipelineConfig,
    stopped: CancellationToken,
    start_time: Option<String>,
}

impl RobotBuilder {
    pub fn new() -> Self {
        Self {
            host: "localhost".to_string(),
            port: robobot_protocol::DEFAULT_PORT,
            client_id: None,
            keep_alive: Duration::from_secs(5),
            pipeline_config: PipelineConfig::default(),
            stopped: CancellationToken::new(),
            start_time: None,
        }
    }

    /// broker 主机（默认 localhost）
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// broker 端口（默认 1883）
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    pub fn print_teensy_info(mut self, enabled: bool) -> Self {
        self.pipeline_config.print_teensy_info = enabled;
        self
    }

    /// 使用外部停止令牌（例如与信号处理器共享）
    pub fn stopped_token(mut self, token: CancellationToken) -> Self {
        self.stopped = token;
        self
    }

    /// 固定启动时间（默认取当前时间）
    pub fn start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    /// 使用给定的传输端构建
    pub fn build_with<R, T>(self, rx: R, tx: T) -> Result<Robot, DriverError>
    where
        R: RxTransport + Send + 'static,
        T: TxTransport + Send + 'static,
    {
        let arbitration = match self.start_time {
            Some(start_time) => MasterArbitration::new(start_time),
            None => MasterArbitration::now(),
        };
        let (decoders, sensors) = SensorDecoders::new();
        let bus = BusClient::start(
            rx,
            tx,
            decoders,
            arbitration,
            self.pipeline_config,
            self.stopped,
        )?;

        Ok(Robot {
            commands: RobotCommands::new(bus.clone()),
            bus,
            sensors,
        })
    }

    /// 连接 MQTT broker 并构建
    ///
    /// # 错误
    /// - `DriverError::Bus(BusError::Connect)`: broker 不可达或拒绝连接
    #[cfg(feature = "mqtt")]
    pub fn build(self) -> Result<Robot, DriverError> {
        let mut settings = robobot_bus::MqttSettings {
            host: self.host.clone(),
            port: self.port,
            keep_alive: self.keep_alive,
            ..Default::default()
        };
        if let Some(client_id) = &self.client_id {
            settings.client_id = client_id.clone();
        }

        info!("Connecting to MQTT broker {}:{}", settings.host, settings.port);
        let (rx, tx) = robobot_bus::connect_mqtt(&settings)?;
        self.build_with(rx, tx)
    }
}

impl Default for RobotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robobot_bus::mock::MockBroker;

    #[test]
    fn test_build_with_mock_and_initialize() {
        let (broker, rx, tx) = MockBroker::new();
        broker.ack_connection();
        let robot = RobotBuilder::new()
            .start_time("1.000000")
            .build_with(rx, tx)
            .unwrap();
        assert_eq!(robot.bus.start_time(), "1.000000");

        for (topic, payload) in [
            ("T0/ird", "1.0 0.5 0.6"),
            ("T0/vel", "1.0 0 0 0"),
            ("T0/mvel", "1.0 0 0"),
            ("T0/pose", "1.0 0 0 0 0 0"),
            ("T0/gyro", "1.0 0 0 0"),
            ("T0/acc", "1.0 0 0 9.81"),
            ("T0/mot", "1.0 0 0 0 0 0"),
            ("T0/livn", "1.0 0 0 0 0 0 0 0 0"),
        ] {
            broker.inject(&format!("robobot/drive/{}", topic), payload);
        }

        let calibration = AccCalibration {
            samples: 2,
            sample_interval: Duration::from_millis(1),
            ..Default::default()
        };
        robot
            .initialize_sensors(WheelGeometry::default(), &calibration)
            .unwrap();
        assert!((robot.sensors.acc_scale()[2] - 1.0).abs() < 1e-9);
        assert_eq!(broker.published_on("robobot/cmd/T0/encrev"), vec!["1"]);

        robot.terminate();
        assert!(robot.bus.is_terminated());
    }
}
