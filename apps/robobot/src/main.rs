//! # Robobot
//!
//! 任务入口：连接 MQTT 总线，初始化传感器，运行 WAITING / GOING 任务状态机。
//!
//! ```bash
//! # 等待开始按钮
//! robobot --host localhost
//!
//! # 立即开始，巡线结束后沿航点行驶
//! robobot -n --waypoints route.csv -l debug
//! ```

mod buttons;
mod maintenance;
mod mission_log;

use anyhow::{Context, Result};
use buttons::SysfsButtons;
use clap::Parser;
use maintenance::GitMaintenance;
use mission_log::SensorLog;
use robobot_control::{
    ControlError, Direction, LineFollower, MissionConfig, MissionExit, MissionStateMachine,
    PathConfig, PathStrategy, PurePursuit, PursuitConfig, SharedLinePosition,
};
use robobot_driver::{AccCalibration, CancellationToken, DriverError, Robot, RobotBuilder};
use robobot_tools::{DataLogger, RobotConfig, load_waypoints};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Robobot - 巡线机器人任务程序
#[derive(Parser, Debug)]
#[command(name = "robobot")]
#[command(about = "Line-following robot mission runner", long_about = None)]
#[command(version)]
struct Args {
    /// 打印下位机（Teensy）的状态消息
    #[arg(short = 't', long)]
    print_teensy_info: bool,

    /// 立即开始任务，不等待开始按钮
    #[arg(short = 'n', long)]
    now: bool,

    /// 日志级别
    #[arg(
        short = 'l',
        long,
        default_value = "info",
        ignore_case = true,
        value_parser = ["debug", "info", "warn", "warning", "error", "critical"]
    )]
    log_level: String,

    /// MQTT broker 主机（覆盖配置文件）
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker 端口（覆盖配置文件）
    #[arg(long)]
    port: Option<u16>,

    /// 航点文件，巡线结束后用 Pure Pursuit 跟踪
    #[arg(long)]
    waypoints: Option<PathBuf>,

    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

/// `RUST_LOG` 优先于 `--log-level`
fn init_logging(level: &str) {
    let level = match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        other => other.to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: Args) -> Result<()> {
    let config = RobotConfig::load(args.config.as_deref()).context("Failed to load config")?;

    let token = CancellationToken::new();
    let mut builder = RobotBuilder::new()
        .host(args.host.clone().unwrap_or_else(|| config.bus.host.clone()))
        .port(args.port.unwrap_or(config.bus.port))
        .keep_alive(Duration::from_secs(config.bus.keep_alive_secs))
        .print_teensy_info(args.print_teensy_info || config.bus.print_teensy_info)
        .stopped_token(token.clone());
    if let Some(client_id) = &config.bus.client_id {
        builder = builder.client_id(client_id.clone());
    }
    let robot = builder.build().context("Failed to connect to the MQTT broker")?;
    report(robot.commands.stop_movement(), "stop");

    let commands = robot.commands.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted, stopping robot");
        token.cancel();
        let _ = commands.stop_movement();
    })
    .context("Failed to set signal handler")?;

    let result = run_mission(&robot, &config, &args);
    teardown(&robot);

    match result {
        Ok(MissionExit::Restart) => {
            info!("Exiting for restart");
            Ok(())
        },
        Ok(MissionExit::Stopped) => Ok(()),
        Err(e) => Err(e),
    }
}

fn run_mission(robot: &Robot, config: &RobotConfig, args: &Args) -> Result<MissionExit> {
    let logger = DataLogger::create(&config.mission.log_dir)?;
    let buttons = SysfsButtons::new(&config.buttons);

    match robot.initialize_sensors(config.odometry.geometry(), &AccCalibration::default()) {
        Ok(()) => {},
        Err(DriverError::Cancelled) => return Ok(MissionExit::Stopped),
        Err(e) => return Err(e).context("Sensor initialization failed"),
    }
    report(robot.commands.mission_led_restarting(), "mission LED");
    if !args.now {
        report(robot.commands.mission_led_waiting(), "mission LED");
    }

    let line_position = SharedLinePosition::new();
    let strategy = PathStrategy::new(
        robot,
        path_config(config)?,
        line_follower(config),
        pure_pursuit(robot, config, args)?,
        line_position.clone(),
    );

    let log = SensorLog::new(logger, robot.sensors.clone(), line_position);

    let mut machine = MissionStateMachine::new(
        robot,
        strategy,
        buttons,
        GitMaintenance::new(&config.maintenance),
        MissionConfig {
            tick_period: Duration::from_millis(config.mission.tick_ms),
            log_period: Duration::from_millis(config.mission.log_period_ms),
            start_delay: Duration::from_millis(config.mission.start_delay_ms),
            start_now: args.now,
        },
    );

    match machine.run(log) {
        Ok(exit) => Ok(exit),
        Err(ControlError::MissionFinished) => {
            anyhow::bail!("Mission state machine finished unexpectedly")
        },
        Err(e) => Err(e.into()),
    }
}

fn path_config(config: &RobotConfig) -> Result<PathConfig> {
    let intersection_map = config
        .mission
        .intersection_map
        .iter()
        .map(|name| name.parse::<Direction>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid intersection map")?;

    Ok(PathConfig {
        follow_velocity: config.line_follower.base_velocity,
        intersection_map,
        servo: config.mission.servo,
        ..PathConfig::default()
    })
}

fn line_follower(config: &RobotConfig) -> LineFollower {
    let settings = &config.line_follower;
    LineFollower::new(Instant::now())
        .with_gains(settings.kp, settings.ki, settings.kd)
        .with_output_limit(settings.u_limit)
        .with_integral_limit(settings.max_integral)
        .with_max_time_lost(Duration::from_millis(settings.line_lost_timeout_ms))
}

fn pure_pursuit(robot: &Robot, config: &RobotConfig, args: &Args) -> Result<Option<PurePursuit>> {
    let Some(path) = args.waypoints.as_ref().or(config.pursuit.waypoints.as_ref()) else {
        return Ok(None);
    };

    let settings = &config.pursuit;
    let waypoints = load_waypoints(path)?;
    let mut pursuit = PurePursuit::new(
        waypoints,
        PursuitConfig {
            lookahead_gain: settings.lookahead_gain,
            min_lookahead: settings.min_lookahead,
            max_lookahead: settings.max_lookahead,
            max_turn_rate: settings.max_turn_rate,
            max_velocity: settings.max_velocity,
            velocity: settings.velocity,
            fallback_velocity: settings.velocity,
            wheel_base: settings.wheel_base,
        },
    )?;
    // 优先使用下位机上报的轮距
    if let Some(wheels) = robot.sensors.wheel_config() {
        pursuit.set_wheel_base(wheels.wheel_base);
    }
    Ok(Some(pursuit))
}

fn teardown(robot: &Robot) {
    report(robot.commands.mission_led_off(), "mission LED");
    report(robot.commands.stop_movement(), "stop");

    let metrics = robot.bus.get_metrics();
    info!(
        "Bus metrics: sent={} received={} publish_failures={} rejected={} decode_errors={}",
        metrics.sent_total,
        metrics.received_total,
        metrics.publish_failures_total,
        metrics.rejected_sends,
        metrics.decode_errors,
    );

    robot.terminate();
    info!("Robot terminated");
}

fn report(result: Result<(), DriverError>, what: &str) {
    if let Err(e) = result {
        warn!("Failed to send {}: {}", what, e);
    }
}
