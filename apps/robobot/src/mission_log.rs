//! 任务数据日志：从传感器视图取快照写入 CSV

use robobot_control::{MissionLog, MissionState, SharedLinePosition};
use robobot_driver::{SensorView, unix_time};
use robobot_tools::{DataLogger, DataRow};
use std::io::{self, Write};

pub struct SensorLog<W: Write + Send> {
    logger: DataLogger<W>,
    sensors: SensorView,
    line_position: SharedLinePosition,
}

impl<W: Write + Send> SensorLog<W> {
    pub fn new(logger: DataLogger<W>, sensors: SensorView, line_position: SharedLinePosition) -> Self {
        Self {
            logger,
            sensors,
            line_position,
        }
    }
}

impl<W: Write + Send> MissionLog for SensorLog<W> {
    fn write_row(&mut self, state: MissionState) -> io::Result<()> {
        let pose = self.sensors.pose().value;
        let ir = self.sensors.ir().value;
        let trip = self.sensors.trip();

        self.logger.write_row(&DataRow {
            timestamp: unix_time(),
            state: state.name(),
            pose: [pose.x, pose.y, pose.heading],
            gyro: self.sensors.gyro().value,
            acc: self.sensors.acc().value,
            ir: [ir.side, ir.front],
            line_position: self.line_position.load(),
            total_distance: trip.total_distance,
            total_heading: trip.total_heading,
            trip_distance: trip.trip_distance,
            trip_heading: trip.trip_heading,
        })
    }

    fn write_comment(&mut self, text: &str) -> io::Result<()> {
        self.logger.write_comment(unix_time(), text)
    }
}
