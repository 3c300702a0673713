use super::{ButtonPanel, DriveStrategy, MaintenanceHooks, MissionLog};
use super::state::{AtomicMissionState, MissionState};
use crate::error::{ControlError, report};
use robobot_driver::{CancellationToken, Robot, RobotCommands, SensorView};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 状态机配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionConfig {
    /// 控制周期（默认 100ms）
    pub tick_period: Duration,
    /// 日志线程周期（默认 10ms）
    pub log_period: Duration,
    /// 按下开始按钮后的延迟（默认 500ms）
    pub start_delay: Duration,
    /// 启动后立即开始一次任务（不等待按钮，不延迟）
    pub start_now: bool,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            log_period: Duration::from_millis(10),
            start_delay: Duration::from_millis(500),
            start_now: false,
        }
    }
}

/// 状态机退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionExit {
    /// 全局停止标志置位
    Stopped,
    /// 已拉取新代码并启动重启脚本
    Restart,
}

/// 任务状态机
pub struct MissionStateMachine<S, B, M> {
    commands: RobotCommands,
    sensors: SensorView,
    token: CancellationToken,
    strategy: S,
    buttons: B,
    hooks: M,
    state: Arc<AtomicMissionState>,
    start_now: bool,
    config: MissionConfig,
}

impl<S, B, M> MissionStateMachine<S, B, M>
where
    S: DriveStrategy,
    B: ButtonPanel,
    M: MaintenanceHooks,
{
    pub fn new(robot: &Robot, strategy: S, buttons: B, hooks: M, config: MissionConfig) -> Self {
        info!("State machine initialized");
        Self {
            commands: robot.commands.clone(),
            sensors: robot.sensors.clone(),
            token: robot.stopped_token(),
            strategy,
            buttons,
            hooks,
            state: Arc::new(AtomicMissionState::new(MissionState::Waiting)),
            start_now: config.start_now,
            config,
        }
    }

    pub fn state(&self) -> MissionState {
        self.state.get()
    }

    /// 共享状态句柄（日志或外部观察用）
    pub fn state_handle(&self) -> Arc<AtomicMissionState> {
        self.state.clone()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// 运行直到停止标志置位或需要重启
    ///
    /// 日志线程与控制循环同生命周期。进入 FINISHED 时返回
    /// [`ControlError::MissionFinished`]。
    pub fn run(&mut self, log: impl MissionLog) -> Result<MissionExit, ControlError> {
        let running = AtomicBool::new(true);
        let state = self.state.clone();
        let token = self.token.clone();
        let period = self.config.log_period;

        thread::scope(|scope| {
            let running = &running;
            let logger = thread::Builder::new()
                .name("robobot-mission-log".into())
                .spawn_scoped(scope, move || log_loop(log, &state, &token, running, period));
            match &logger {
                Ok(_) => info!("Data logger thread started"),
                Err(e) => warn!("Failed to spawn data logger thread: {}", e),
            }

            let result = self.control_loop();

            // Release: 日志线程看到 false 后退出
            running.store(false, Ordering::Release);
            if let Ok(handle) = logger
                && handle.join().is_err()
            {
                error!("Data logger thread panicked");
            }
            result
        })
    }

    fn control_loop(&mut self) -> Result<MissionExit, ControlError> {
        let mut next_tick = Instant::now();

        while !self.token.is_cancelled() && self.state() != MissionState::Finished {
            if let Some(exit) = self.tick()? {
                return Ok(exit);
            }

            next_tick += self.config.tick_period;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
            if !self.token.sleep_until(next_tick) {
                break;
            }
            report(self.commands.send_alive(), "alive");
        }

        if self.state() == MissionState::Finished {
            return self.finish();
        }
        Ok(MissionExit::Stopped)
    }

    /// 推进一个周期
    pub fn tick(&mut self) -> Result<Option<MissionExit>, ControlError> {
        match self.state() {
            MissionState::Waiting => {
                if self.start_now || self.buttons.is_start_pressed() {
                    self.start_mission();
                } else if self.buttons.is_auto_pull_pressed() {
                    return self.auto_pull().map(Some);
                } else if self.buttons.is_shutdown_pressed() {
                    info!("Shutting down the robot");
                    self.stop_robot();
                    report(self.commands.shutdown(), "shutdown");
                }
            },
            MissionState::Going => {
                if self.strategy.step() {
                    info!("Mission finished, waiting for start");
                    self.stop_robot();
                }
            },
            MissionState::Finished => return self.finish().map(Some),
        }

        if self.buttons.is_stop_pressed() {
            info!("Mission stopped by button");
            self.stop_robot();
        }
        Ok(None)
    }

    fn start_mission(&mut self) {
        if self.start_now {
            self.start_now = false;
        } else {
            info!("Starting mission (with {}ms delay)", self.config.start_delay.as_millis());
            self.token.sleep(self.config.start_delay);
        }

        report(self.commands.mission_led_running(), "mission LED");
        report(self.commands.stop_movement(), "stop");
        self.state.set(MissionState::Going);
        self.sensors.reset_trip();
        self.strategy.on_start();
    }

    fn stop_robot(&mut self) {
        info!("Stopping robot");
        report(self.commands.mission_led_waiting(), "mission LED");
        self.state.set(MissionState::Waiting);
        report(self.commands.stop_movement(), "stop");
        self.strategy.on_stop();
    }

    fn auto_pull(&mut self) -> Result<MissionExit, ControlError> {
        info!("Auto pull: pulling latest code");
        report(self.commands.mission_led_pulling_git(), "mission LED");
        self.hooks.update()?;
        report(self.commands.mission_led_off(), "mission LED");

        info!("Auto pull: restarting");
        self.hooks.restart()?;
        Ok(MissionExit::Restart)
    }

    fn finish(&mut self) -> Result<MissionExit, ControlError> {
        report(self.commands.mission_led_finished(), "mission LED");
        error!("Mission state machine entered FINISHED, this must never happen");
        Err(ControlError::MissionFinished)
    }
}

fn log_loop(
    mut log: impl MissionLog,
    state: &AtomicMissionState,
    token: &CancellationToken,
    running: &AtomicBool,
    period: Duration,
) {
    let mut previous: Option<MissionState> = None;
    let mut next = Instant::now();

    while running.load(Ordering::Acquire) && !token.is_cancelled() {
        let current = state.get();
        if current == MissionState::Finished {
            break;
        }

        if current == MissionState::Going
            && let Err(e) = log.write_row(current)
        {
            warn!("Failed to write data log row: {}", e);
        }

        if previous != Some(current) {
            let from = previous.map_or("NONE", MissionState::name);
            info!("State changed from {} to {}", from, current);
            let text = format!("STATE_MACHINE - State changed from {} to {}", from, current);
            if let Err(e) = log.write_comment(&text) {
                warn!("Failed to write data log comment: {}", e);
            }
            previous = Some(current);
        }

        next += period;
        let now = Instant::now();
        if next < now {
            next = now;
        }
        token.sleep_until(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::NoMaintenance;
    use robobot_bus::mock::MockBroker;
    use robobot_driver::RobotBuilder;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;
    use std::sync::Mutex;

    /// 按预设序列返回按钮状态
    #[derive(Default)]
    struct ScriptedButtons {
        start: VecDeque<bool>,
        stop: VecDeque<bool>,
        auto_pull: VecDeque<bool>,
        shutdown: VecDeque<bool>,
    }

    impl ButtonPanel for ScriptedButtons {
        fn is_start_pressed(&mut self) -> bool {
            self.start.pop_front().unwrap_or(false)
        }
        fn is_stop_pressed(&mut self) -> bool {
            self.stop.pop_front().unwrap_or(false)
        }
        fn is_auto_pull_pressed(&mut self) -> bool {
            self.auto_pull.pop_front().unwrap_or(false)
        }
        fn is_shutdown_pressed(&mut self) -> bool {
            self.shutdown.pop_front().unwrap_or(false)
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        calls: Vec<&'static str>,
    }

    impl MaintenanceHooks for RecordingHooks {
        fn update(&mut self) -> Result<(), ControlError> {
            self.calls.push("update");
            Ok(())
        }
        fn restart(&mut self) -> Result<(), ControlError> {
            self.calls.push("restart");
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryLog {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl MissionLog for MemoryLog {
        fn write_row(&mut self, state: MissionState) -> io::Result<()> {
            self.lines.lock().unwrap().push(format!("row {}", state));
            Ok(())
        }
        fn write_comment(&mut self, text: &str) -> io::Result<()> {
            self.lines.lock().unwrap().push(format!("# {}", text));
            Ok(())
        }
    }

    fn robot() -> (MockBroker, Robot) {
        let (broker, rx, tx) = MockBroker::new();
        broker.ack_connection();
        let robot = RobotBuilder::new()
            .start_time("1.000000")
            .build_with(rx, tx)
            .unwrap();
        broker.clear_published();
        (broker, robot)
    }

    fn fast_config() -> MissionConfig {
        MissionConfig {
            tick_period: Duration::from_millis(2),
            log_period: Duration::from_millis(1),
            start_delay: Duration::from_millis(1),
            start_now: false,
        }
    }

    #[test]
    fn test_start_button_enters_going() {
        let (broker, robot) = robot();
        let buttons = ScriptedButtons {
            start: VecDeque::from([true]),
            ..Default::default()
        };
        let commands = robot.commands.clone();
        let strategy = move || {
            commands.set_movement(0.25, 0.0).unwrap();
            false
        };
        let config = MissionConfig {
            start_delay: Duration::from_millis(50),
            ..fast_config()
        };
        let mut machine = MissionStateMachine::new(&robot, strategy, buttons, NoMaintenance, config);

        assert_eq!(machine.state(), MissionState::Waiting);
        let started = Instant::now();
        assert_eq!(machine.tick().unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(machine.state(), MissionState::Going);

        assert_eq!(broker.published_on("robobot/cmd/T0/leds"), vec!["16 0 0 255"]);
        assert_eq!(broker.published_on("robobot/cmd/ti/rc"), vec!["0 0"]);
        assert_eq!(robot.sensors.trip().trip_distance, 0.0);

        // 先停后走：下一个周期由策略发出运动指令
        assert_eq!(machine.tick().unwrap(), None);
        assert_eq!(machine.state(), MissionState::Going);
        assert_eq!(broker.published_on("robobot/cmd/ti/rc"), vec!["0 0", "0.25 0"]);

        robot.terminate();
    }

    #[test]
    fn test_strategy_finish_and_stop_button_return_to_waiting() {
        let (broker, robot) = robot();
        let steps = Rc::new(Cell::new(0));
        let counter = steps.clone();
        let strategy = move || {
            counter.set(counter.get() + 1);
            counter.get() >= 2
        };
        let buttons = ScriptedButtons {
            stop: VecDeque::from([false, false, false, true]),
            ..Default::default()
        };
        let config = MissionConfig {
            start_now: true,
            ..fast_config()
        };
        let mut machine = MissionStateMachine::new(&robot, strategy, buttons, NoMaintenance, config);

        machine.tick().unwrap();
        assert_eq!(machine.state(), MissionState::Going);
        machine.tick().unwrap();
        assert_eq!(machine.state(), MissionState::Going);
        machine.tick().unwrap();
        assert_eq!(steps.get(), 2);
        assert_eq!(machine.state(), MissionState::Waiting);
        assert!(broker.published_on("robobot/cmd/T0/leds").contains(&"16 255 0 255".to_string()));

        // --now 只生效一次，停止按钮在 WAITING 下同样会执行停止
        broker.clear_published();
        machine.tick().unwrap();
        assert_eq!(machine.state(), MissionState::Waiting);
        assert_eq!(broker.published_on("robobot/cmd/ti/rc"), vec!["0 0"]);

        robot.terminate();
    }

    #[test]
    fn test_auto_pull_runs_hooks_and_requests_restart() {
        let (broker, robot) = robot();
        let buttons = ScriptedButtons {
            auto_pull: VecDeque::from([true]),
            ..Default::default()
        };
        let mut machine = MissionStateMachine::new(
            &robot,
            || false,
            buttons,
            RecordingHooks::default(),
            fast_config(),
        );

        assert_eq!(machine.tick().unwrap(), Some(MissionExit::Restart));
        assert_eq!(machine.hooks.calls, vec!["update", "restart"]);
        let leds = broker.published_on("robobot/cmd/T0/leds");
        assert_eq!(leds.first().map(String::as_str), Some("16 241 76 40"));
        assert_eq!(leds.last().map(String::as_str), Some("16 0 0 0"));

        robot.terminate();
    }

    #[test]
    fn test_finished_state_is_an_error() {
        let (broker, robot) = robot();
        let mut machine = MissionStateMachine::new(
            &robot,
            || false,
            ScriptedButtons::default(),
            NoMaintenance,
            fast_config(),
        );
        machine.state_handle().set(MissionState::Finished);

        let result = machine.run(MemoryLog::default());
        assert!(matches!(result, Err(ControlError::MissionFinished)));
        assert_eq!(broker.published_on("robobot/cmd/T0/leds"), vec!["16 255 0 0"]);

        robot.terminate();
    }

    #[test]
    fn test_run_logs_rows_and_state_changes_until_stopped() {
        let (broker, robot) = robot();
        let token = robot.stopped_token();
        let mut steps = 0;
        let strategy = move || {
            steps += 1;
            if steps == 10 {
                token.cancel();
            }
            false
        };
        let config = MissionConfig {
            start_now: true,
            ..fast_config()
        };
        let mut machine = MissionStateMachine::new(
            &robot,
            strategy,
            ScriptedButtons::default(),
            NoMaintenance,
            config,
        );
        let log = MemoryLog::default();

        assert_eq!(machine.run(log.clone()).unwrap(), MissionExit::Stopped);

        let lines = log.lines.lock().unwrap().clone();
        assert!(
            lines
                .iter()
                .any(|l| l.ends_with("State changed from WAITING to GOING")
                    || l.ends_with("State changed from NONE to GOING"))
        );
        assert!(lines.iter().any(|l| l == "row GOING"));
        assert!(!broker.published_on("robobot/cmd/ti/alive").is_empty());

        robot.terminate();
    }
}
