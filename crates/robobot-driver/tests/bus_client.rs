//! 总线客户端集成测试（Mock 传输）

use robobot_bus::mock::{MockBroker, MockRx, MockTx};
use robobot_driver::*;
use std::time::{Duration, Instant};

const START_TIME: &str = "1700000000.000000";

fn connect(broker: &MockBroker, rx: MockRx, tx: MockTx) -> Robot {
    broker.ack_connection();
    RobotBuilder::new()
        .start_time(START_TIME)
        .build_with(rx, tx)
        .unwrap()
}

/// 轮询直到条件成立或超时
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

#[test]
fn test_gyro_scenario_through_bus() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);

    broker.inject("robobot/drive/T0/gyro", "1000.0 0.1 0.2 0.3");
    broker.inject("robobot/drive/T0/gyro", "1000.05 0.1 0.2 0.3");
    broker.inject("robobot/drive/T0/gyro", "1000.10 0.1 0.2 0.3");

    assert!(wait_until(|| robot.sensors.gyro().update_count == 3));
    let gyro = robot.sensors.gyro();
    assert!((gyro.sampling_interval - 0.05).abs() < 1e-9);
    assert_eq!(gyro.timestamp, 1000.10);
    assert_eq!(gyro.value, [0.1, 0.2, 0.3]);

    // 之后进入 99:1 的滑动平均
    broker.inject("robobot/drive/T0/gyro", "1000.20 0.1 0.2 0.3");
    assert!(wait_until(|| robot.sensors.gyro().update_count == 4));
    let expected = (0.05 * 99.0 + (1000.20 - 1000.10)) / 100.0;
    assert!((robot.sensors.gyro().sampling_interval - expected).abs() < 1e-9);

    robot.terminate();
}

#[test]
fn test_arbitration_mismatch_rejects_and_terminates_once() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);

    broker.inject("robobot/drive/master", "1700000005.0 1699999999.000000");
    assert!(wait_until(|| robot.bus.arbitration().is_not_master()));
    broker.clear_published();

    assert_eq!(
        robot.commands.stop_movement(),
        Err(DriverError::NotMaster)
    );

    let metrics = robot.bus.get_metrics();
    assert_eq!(metrics.rejected_sends, 1);
    assert_eq!(robot.bus.termination_cause(), Some(TerminationCause::NotMaster));
    assert!(robot.bus.is_terminated());
    // 非主控不发送收尾指令
    assert!(broker.published().is_empty());

    // 再次终止不会改变原因
    robot.terminate();
    assert_eq!(robot.bus.termination_cause(), Some(TerminationCause::NotMaster));
}

#[test]
fn test_confirmed_master_keeps_sending() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);

    broker.inject("robobot/drive/master", &format!("1700000005.0 {}\n", START_TIME));
    assert!(wait_until(|| robot.bus.arbitration().is_confirmed_master()));

    // 确认后的不一致声明被忽略
    broker.inject("robobot/drive/master", "1700000006.0 1.0");
    assert!(wait_until(|| robot.bus.get_metrics().received_total >= 2));
    assert!(robot.bus.arbitration().is_confirmed_master());
    assert!(robot.commands.send_alive().is_ok());

    robot.terminate();
}

#[test]
fn test_eleven_publish_failures_terminate() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);
    let attempts_before = broker.publish_attempts();

    broker.set_publish_failure(true);
    for _ in 0..10 {
        assert!(matches!(
            robot.commands.stop_movement(),
            Err(DriverError::Bus(_))
        ));
        assert!(!robot.bus.is_terminated());
    }
    assert!(robot.commands.stop_movement().is_err());
    assert_eq!(
        robot.bus.termination_cause(),
        Some(TerminationCause::PublishFailures)
    );
    assert!(robot.bus.is_terminated());

    // 终止后没有任何发布到达传输层
    assert_eq!(broker.publish_attempts() - attempts_before, 11);
    assert_eq!(robot.commands.stop_movement(), Err(DriverError::Terminated));
    assert_eq!(broker.publish_attempts() - attempts_before, 11);
}

#[test]
fn test_heartbeat_asymmetry_stops_receive_loop() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);
    let token = robot.stopped_token();

    // 启动时已发送 ti/log，共 101 次成功发送后触发
    for _ in 0..99 {
        robot.commands.stop_movement().unwrap();
    }
    assert!(!token.is_cancelled());
    robot.commands.stop_movement().unwrap();
    assert!(token.is_cancelled());

    // 只停止，不终止
    assert!(!robot.bus.is_terminated());
    assert!(robot.bus.termination_cause().is_none());
    assert!(wait_until(|| !robot.bus.is_rx_alive()));

    robot.terminate();
}

#[test]
fn test_foreign_prefix_ignored() {
    let (broker, rx, tx) = MockBroker::new();
    let robot = connect(&broker, rx, tx);

    broker.inject("robobot/cmd/T0/gyro", "1 2 3 4");
    broker.inject("robobot/drive/T0/gyro", "1 2 3 4");
    assert!(wait_until(|| robot.sensors.gyro().has_data()));
    assert_eq!(robot.sensors.gyro().update_count, 1);
    assert_eq!(robot.bus.get_metrics().ignored_messages, 1);

    robot.terminate();
}
