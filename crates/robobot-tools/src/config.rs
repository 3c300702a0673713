//! # 机器人配置
//!
//! 配置文件路径：
//! - 命令行 `--config <path>`
//! - 否则 `~/.config/robobot/config.toml`（Linux）
//!
//! 文件不存在时使用默认值；文件中缺失的字段同样取默认值。
//!
//! ```toml
//! [bus]
//! host = "localhost"
//! port = 1883
//!
//! [line_follower]
//! kp = 2.5
//! base_velocity = 0.23
//!
//! [mission]
//! intersection_map = ["straight", "big_int", "basket"]
//! ```

use crate::ConfigError;
use robobot_protocol::{DEFAULT_PORT, WheelGeometry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub bus: BusSettings,
    pub line_follower: LineFollowerSettings,
    pub pursuit: PursuitSettings,
    pub mission: MissionSettings,
    pub odometry: OdometrySettings,
    pub buttons: ButtonSettings,
    pub maintenance: MaintenanceSettings,
}

impl RobotConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("robobot").join("config.toml"))
    }

    /// 加载配置
    ///
    /// 显式给出的路径必须存在；默认路径不存在时返回默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                },
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// `[bus]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub host: String,
    pub port: u16,
    /// 为空时自动生成
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub print_teensy_info: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_id: None,
            keep_alive_secs: 5,
            print_teensy_info: false,
        }
    }
}

/// `[line_follower]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollowerSettings {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub u_limit: f64,
    pub max_integral: f64,
    /// 巡线基础速度（m/s）
    pub base_velocity: f64,
    /// 丢线超过该时间视为线已结束（毫秒）
    pub line_lost_timeout_ms: u64,
}

impl Default for LineFollowerSettings {
    fn default() -> Self {
        Self {
            kp: 2.5,
            ki: 0.035,
            kd: 1.3,
            u_limit: 5.0,
            max_integral: 2.0,
            base_velocity: 0.23,
            line_lost_timeout_ms: 1000,
        }
    }
}

/// `[pursuit]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitSettings {
    pub lookahead_gain: f64,
    pub min_lookahead: f64,
    pub max_lookahead: f64,
    pub max_turn_rate: f64,
    pub max_velocity: f64,
    pub velocity: f64,
    pub wheel_base: f64,
    /// 航点文件（命令行 `--waypoints` 优先）
    pub waypoints: Option<PathBuf>,
}

impl Default for PursuitSettings {
    fn default() -> Self {
        Self {
            lookahead_gain: 0.5,
            min_lookahead: 0.3,
            max_lookahead: 1.5,
            max_turn_rate: 1.0,
            max_velocity: 1.0,
            velocity: 0.2,
            wheel_base: 0.23,
            waypoints: None,
        }
    }
}

/// `[mission]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionSettings {
    pub tick_ms: u64,
    pub log_period_ms: u64,
    pub start_delay_ms: u64,
    /// 数据日志目录
    pub log_dir: PathBuf,
    /// 路口表（机动名称）
    pub intersection_map: Vec<String>,
    /// 投篮舵机编号
    pub servo: u8,
}

impl Default for MissionSettings {
    fn default() -> Self {
        let map = [
            "straight", "big_int", "straight", "straight", "straight", "straight", "straight",
            "basket", "90right", "axe",
        ];
        Self {
            tick_ms: 100,
            log_period_ms: 10,
            start_delay_ms: 500,
            log_dir: PathBuf::from("logs"),
            intersection_map: map.iter().map(|s| s.to_string()).collect(),
            servo: 1,
        }
    }
}

/// `[odometry]`：启动时写入下位机的底盘几何
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometrySettings {
    pub radius_left: f64,
    pub radius_right: f64,
    pub gear: f64,
    pub ticks_per_revolution: f64,
    pub wheel_base: f64,
}

impl OdometrySettings {
    pub fn geometry(&self) -> WheelGeometry {
        WheelGeometry {
            radius_left: self.radius_left,
            radius_right: self.radius_right,
            gear: self.gear,
            ticks_per_revolution: self.ticks_per_revolution,
            wheel_base: self.wheel_base,
        }
    }
}

impl Default for OdometrySettings {
    fn default() -> Self {
        let geometry = WheelGeometry::default();
        Self {
            radius_left: geometry.radius_left,
            radius_right: geometry.radius_right,
            gear: geometry.gear,
            ticks_per_revolution: geometry.ticks_per_revolution,
            wheel_base: geometry.wheel_base,
        }
    }
}

/// `[buttons]`：sysfs GPIO 按钮
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonSettings {
    pub sysfs_root: PathBuf,
    pub start_pin: u32,
    pub stop_pin: u32,
    pub auto_pull_pin: u32,
    pub shutdown_pin: u32,
}

impl ButtonSettings {
    /// 引脚的 value 文件路径
    pub fn value_path(&self, pin: u32) -> PathBuf {
        self.sysfs_root.join(format!("gpio{}", pin)).join("value")
    }
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            start_pin: 13,
            stop_pin: 6,
            auto_pull_pin: 12,
            shutdown_pin: 16,
        }
    }
}

/// `[maintenance]`：自动更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub repository_dir: PathBuf,
    pub restart_script: PathBuf,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            repository_dir: PathBuf::from("/home/local/"),
            restart_script: PathBuf::from("/home/local/restart_mqtt.bash"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.bus.port, 1883);
        assert_eq!(config.line_follower.kp, 2.5);
        assert_eq!(config.mission.intersection_map.len(), 10);
        assert_eq!(config.mission.intersection_map[7], "basket");
        assert_eq!(config.odometry.geometry(), WheelGeometry::default());
        assert_eq!(
            config.buttons.value_path(13),
            PathBuf::from("/sys/class/gpio/gpio13/value")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[bus]\nhost = \"robot.local\"\n\n[line_follower]\nbase_velocity = 0.3\n\n[mission]\nintersection_map = [\"straight\", \"90left\"]"
        )
        .unwrap();

        let config = RobotConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bus.host, "robot.local");
        assert_eq!(config.bus.port, 1883);
        assert_eq!(config.line_follower.base_velocity, 0.3);
        assert_eq!(config.line_follower.kd, 1.3);
        assert_eq!(config.mission.intersection_map, vec!["straight", "90left"]);
        assert_eq!(config.mission.tick_ms, 100);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RobotConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\nport = \"not a number\"").unwrap();
        let result = RobotConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
