//! # Robobot Tools - 配置与数据文件
//!
//! **依赖原则**: 只依赖 `robobot-protocol`，不依赖驱动层和控制层
//!
//! ## 包含模块
//!
//! - `config` - TOML 配置文件（`RobotConfig`）
//! - `waypoints` - 航点 CSV 读取
//! - `datalog` - 任务数据 CSV 记录

pub mod config;
pub mod datalog;
pub mod waypoints;

pub use config::RobotConfig;
pub use datalog::{DATA_LOG_HEADER, DataLogger, DataRow};
pub use waypoints::{load_waypoints, parse_waypoints};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 配置与数据文件错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid waypoint on line {line}: {message}")]
    Waypoint { line: usize, message: String },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}
