//! sysfs GPIO 按钮

use robobot_control::ButtonPanel;
use robobot_tools::config::ButtonSettings;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// 通过 sysfs `value` 文件读取按钮（高电平为按下）
///
/// 读取失败视为未按下，每个引脚只告警一次。
pub struct SysfsButtons {
    start: Pin,
    stop: Pin,
    auto_pull: Pin,
    shutdown: Pin,
}

struct Pin {
    path: PathBuf,
    warned: bool,
}

impl Pin {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            warned: false,
        }
    }

    fn is_high(&mut self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(value) => value.trim() == "1",
            Err(e) => {
                if !self.warned {
                    warn!("Cannot read button {}: {}", self.path.display(), e);
                    self.warned = true;
                }
                false
            },
        }
    }
}

impl SysfsButtons {
    pub fn new(settings: &ButtonSettings) -> Self {
        Self {
            start: Pin::new(settings.value_path(settings.start_pin)),
            stop: Pin::new(settings.value_path(settings.stop_pin)),
            auto_pull: Pin::new(settings.value_path(settings.auto_pull_pin)),
            shutdown: Pin::new(settings.value_path(settings.shutdown_pin)),
        }
    }
}

impl ButtonPanel for SysfsButtons {
    fn is_start_pressed(&mut self) -> bool {
        self.start.is_high()
    }

    fn is_stop_pressed(&mut self) -> bool {
        self.stop.is_high()
    }

    fn is_auto_pull_pressed(&mut self) -> bool {
        self.auto_pull.is_high()
    }

    fn is_shutdown_pressed(&mut self) -> bool {
        self.shutdown.is_high()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_pin(root: &Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    #[test]
    fn test_reads_pin_levels() {
        let root = tempfile::tempdir().unwrap();
        let settings = ButtonSettings {
            sysfs_root: root.path().to_path_buf(),
            ..Default::default()
        };
        write_pin(root.path(), settings.start_pin, "1\n");
        write_pin(root.path(), settings.stop_pin, "0\n");

        let mut buttons = SysfsButtons::new(&settings);
        assert!(buttons.is_start_pressed());
        assert!(!buttons.is_stop_pressed());
        // 不存在的引脚视为未按下
        assert!(!buttons.is_auto_pull_pressed());
        assert!(!buttons.is_shutdown_pressed());

        write_pin(root.path(), settings.stop_pin, "1");
        assert!(buttons.is_stop_pressed());
    }
}
