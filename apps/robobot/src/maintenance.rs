//! 自动更新：`git pull` 后启动重启脚本

use robobot_control::{ControlError, MaintenanceHooks};
use robobot_tools::config::MaintenanceSettings;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::info;

pub struct GitMaintenance {
    repository_dir: PathBuf,
    restart_script: PathBuf,
}

impl GitMaintenance {
    pub fn new(settings: &MaintenanceSettings) -> Self {
        Self {
            repository_dir: settings.repository_dir.clone(),
            restart_script: settings.restart_script.clone(),
        }
    }
}

impl MaintenanceHooks for GitMaintenance {
    fn update(&mut self) -> Result<(), ControlError> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.repository_dir)
            .arg("pull")
            .status()
            .map_err(|e| ControlError::Maintenance(format!("git pull: {}", e)))?;
        if !status.success() {
            return Err(ControlError::Maintenance(format!("git pull exited with {}", status)));
        }
        info!("Pulled latest code in {}", self.repository_dir.display());
        Ok(())
    }

    fn restart(&mut self) -> Result<(), ControlError> {
        // 脚本会结束当前进程，不等待
        let child = Command::new("bash")
            .arg(&self.restart_script)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                ControlError::Maintenance(format!("{}: {}", self.restart_script.display(), e))
            })?;
        info!("Restart script started (pid {})", child.id());
        Ok(())
    }
}
