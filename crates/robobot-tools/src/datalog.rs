//! 任务数据日志（CSV）
//!
//! 每行记录一次状态快照，注释行以 `#` 开头。

use crate::ConfigError;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// 日志文件名
pub const DATA_LOG_FILE: &str = "data_log.csv";

pub const DATA_LOG_HEADER: &str = "timestamp_sec, state, x, y, heading_rad, gyro_x, gyro_y, gyro_z, acc_x, acc_y, acc_z, ir0, ir1, line_pos, total_dist, total_heading, trip_dist, trip_heading";

/// 一行数据
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataRow<'a> {
    pub timestamp: f64,
    pub state: &'a str,
    /// x, y, heading
    pub pose: [f64; 3],
    pub gyro: [f64; 3],
    pub acc: [f64; 3],
    /// 侧向、前向
    pub ir: [f64; 2],
    pub line_position: f64,
    pub total_distance: f64,
    pub total_heading: f64,
    pub trip_distance: f64,
    pub trip_heading: f64,
}

/// CSV 数据记录器
pub struct DataLogger<W: Write = BufWriter<File>> {
    writer: W,
    rows: u64,
}

impl DataLogger {
    /// 在目录下创建 `data_log.csv`（覆盖旧文件）
    pub fn create(dir: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;
        let path: PathBuf = dir.join(DATA_LOG_FILE);
        let file = File::create(&path).map_err(|e| ConfigError::io(&path, e))?;
        let logger = Self::new(BufWriter::new(file)).map_err(|e| ConfigError::io(&path, e))?;
        info!("Data logger file opened: {}", path.display());
        Ok(logger)
    }
}

impl<W: Write> DataLogger<W> {
    /// 写入表头
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{}", DATA_LOG_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_row(&mut self, row: &DataRow<'_>) -> io::Result<()> {
        let [x, y, heading] = row.pose;
        let [gx, gy, gz] = row.gyro;
        let [ax, ay, az] = row.acc;
        let [ir0, ir1] = row.ir;

        writeln!(
            self.writer,
            "{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.2},{:.3},{:.3},{:.4},{:.4}",
            row.timestamp,
            row.state,
            x,
            y,
            heading,
            gx,
            gy,
            gz,
            ax,
            ay,
            az,
            ir0,
            ir1,
            row.line_position,
            row.total_distance,
            row.total_heading,
            row.trip_distance,
            row.trip_heading,
        )?;
        self.rows += 1;
        self.writer.flush()
    }

    pub fn write_comment(&mut self, timestamp: f64, text: &str) -> io::Result<()> {
        writeln!(self.writer, "# [INFO] {} {}", timestamp, text)?;
        self.writer.flush()
    }

    /// 已写入的数据行数
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// 刷新并返回底层 writer
    pub fn close(mut self) -> io::Result<W> {
        self.writer.flush()?;
        info!("Data logger closed after {} rows", self.rows);
        Ok(self.writer)
    }
}
