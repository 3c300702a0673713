//! 赛道策略集成测试（Mock 传输）

use robobot_bus::mock::MockBroker;
use robobot_control::*;
use robobot_driver::{Robot, RobotBuilder};
use std::time::{Duration, Instant};

const CENTERED: &str = "0 0 0 1000 1000 0 0 0";
const T_JUNCTION: &str = "1000 1000 0 0 0 0 1000 1000";

fn connect() -> (MockBroker, Robot) {
    let (broker, rx, tx) = MockBroker::new();
    broker.ack_connection();
    let robot = RobotBuilder::new()
        .start_time("1.000000")
        .build_with(rx, tx)
        .unwrap();
    // 前方无障碍
    broker.inject("robobot/drive/T0/ird", "1.0 1.0 1.0");
    assert!(wait_until(|| robot.sensors.ir().has_data()));
    (broker, robot)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// 注入一帧巡线数据并等待解码完成
fn inject_line(broker: &MockBroker, robot: &Robot, values: &str) {
    let expected = robot.sensors.line().update_count + 1;
    broker.inject("robobot/drive/T0/livn", &format!("1.0 {}", values));
    assert!(wait_until(|| robot.sensors.line().update_count >= expected));
}

fn drive_commands(broker: &MockBroker) -> Vec<(f64, f64)> {
    broker
        .published_on("robobot/cmd/ti/rc")
        .iter()
        .map(|payload| {
            let fields: Vec<f64> = payload
                .split_whitespace()
                .map(|f| f.parse().unwrap())
                .collect();
            (fields[0], fields[1])
        })
        .collect()
}

fn config(map: Vec<Direction>) -> PathConfig {
    PathConfig {
        intersection_map: map,
        slice: Duration::from_millis(20),
        poll_period: Duration::from_millis(1),
        ..Default::default()
    }
}

#[test]
fn test_follows_line_and_turns_at_mapped_intersection() {
    let (broker, robot) = connect();
    let mut path = PathStrategy::new(
        &robot,
        config(vec![Direction::Straight, Direction::Left90]),
        LineFollower::new(Instant::now()),
        None,
        SharedLinePosition::new(),
    );
    path.on_start();
    broker.clear_published();

    inject_line(&broker, &robot, CENTERED);
    assert!(!path.step());
    let commands = drive_commands(&broker);
    assert_eq!(commands.len(), 1);
    // 中间两路在线：速度加倍
    assert!((commands[0].0 - 0.46).abs() < 1e-9);
    assert!(commands[0].1.abs() < 1e-9);
    assert_eq!(path.phase(), PathPhase::FollowingLine);

    broker.clear_published();
    inject_line(&broker, &robot, T_JUNCTION);
    assert!(!path.step());
    assert_eq!(path.phase(), PathPhase::Maneuver);
    assert_eq!(path.intersection_counter(), 1.5);
    assert!(drive_commands(&broker).contains(&(-0.1, 0.0)));

    // 停止按钮打断机动
    path.on_stop();
    assert!(path.maneuver().is_none());
    assert_eq!(path.follower().velocity(), 0.0);

    robot.terminate();
}

#[test]
fn test_line_lost_finishes_path() {
    let (broker, robot) = connect();
    let follower = LineFollower::new(Instant::now()).with_max_time_lost(Duration::from_millis(30));
    let mut path = PathStrategy::new(
        &robot,
        config(PathConfig::default_map()),
        follower,
        None,
        SharedLinePosition::new(),
    );
    path.on_start();

    inject_line(&broker, &robot, "0 0 0 0 0 0 0 0");
    let mut finished = false;
    for _ in 0..10 {
        if path.step() {
            finished = true;
            break;
        }
    }
    assert!(finished);
    assert_eq!(path.phase(), PathPhase::Finished);

    // 重新开始时回到巡线
    path.on_start();
    assert_eq!(path.phase(), PathPhase::FollowingLine);
    assert_eq!(path.intersection_counter(), 0.5);

    robot.terminate();
}

#[test]
fn test_pursuit_after_last_mapped_intersection() {
    let (broker, robot) = connect();
    let pursuit = PurePursuit::new(vec![(0.0, 0.05)], PursuitConfig::default()).unwrap();
    let line_position = SharedLinePosition::new();
    let mut path = PathStrategy::new(
        &robot,
        config(vec![Direction::Straight, Direction::Straight]),
        LineFollower::new(Instant::now()),
        Some(pursuit),
        line_position.clone(),
    );
    path.on_start();

    inject_line(&broker, &robot, T_JUNCTION);
    assert!(!path.step());
    assert_eq!(path.phase(), PathPhase::PurePursuit);
    assert!(line_position.load().is_finite());

    broker.clear_published();
    // 终点在前视距离内：停车并完成
    assert!(path.step());
    assert_eq!(drive_commands(&broker), vec![(0.0, 0.0)]);

    robot.terminate();
}
