//! Mock 传输后端（测试使用）
//!
//! `MockBroker` 持有测试侧句柄：注入入站事件、读取已发布消息、模拟发布失败。
//! 注意：`MockBroker` 全部副本被 drop 后，接收端会返回 `BusError::Disconnected`。

use crate::{BusError, BusEvent, RxTransport, TxTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 测试侧句柄
#[derive(Clone)]
pub struct MockBroker {
    inbound: Sender<BusEvent>,
    published: Arc<Mutex<Vec<(String, String)>>>,
    fail_publish: Arc<AtomicBool>,
    publish_attempts: Arc<AtomicU64>,
}

/// Mock 接收端
pub struct MockRx {
    inbound: Receiver<BusEvent>,
    timeout: Duration,
}

/// Mock 发送端
pub struct MockTx {
    published: Arc<Mutex<Vec<(String, String)>>>,
    fail_publish: Arc<AtomicBool>,
    publish_attempts: Arc<AtomicU64>,
}

impl MockBroker {
    /// 创建 broker 句柄和一对收发端
    pub fn new() -> (MockBroker, MockRx, MockTx) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let published = Arc::new(Mutex::new(Vec::new()));
        let fail_publish = Arc::new(AtomicBool::new(false));
        let publish_attempts = Arc::new(AtomicU64::new(0));

        let broker = MockBroker {
            inbound: tx,
            published: published.clone(),
            fail_publish: fail_publish.clone(),
            publish_attempts: publish_attempts.clone(),
        };
        let rx = MockRx {
            inbound: rx,
            timeout: Duration::from_millis(5),
        };
        let tx = MockTx {
            published,
            fail_publish,
            publish_attempts,
        };
        (broker, rx, tx)
    }

    /// 模拟 broker 的连接确认
    pub fn ack_connection(&self) {
        let _ = self.inbound.send(BusEvent::Connected);
    }

    /// 注入一条入站消息
    pub fn inject(&self, topic: &str, payload: &str) {
        let _ = self.inbound.send(BusEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
    }

    /// 切换发布失败模式
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// 成功发布的消息快照
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// 指定主题上成功发布的载荷
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// 清空已发布记录
    pub fn clear_published(&self) {
        self.published.lock().clear();
    }

    /// 发布尝试次数（含失败）
    pub fn publish_attempts(&self) -> u64 {
        self.publish_attempts.load(Ordering::SeqCst)
    }
}

impl RxTransport for MockRx {
    fn receive(&mut self) -> Result<BusEvent, BusError> {
        match self.inbound.recv_timeout(self.timeout) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(BusError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Disconnected),
        }
    }
}

impl TxTransport for MockTx {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish("mock publish failure".to_string()));
        }
        self.published
            .lock()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_roundtrip() {
        let (broker, mut rx, mut tx) = MockBroker::new();

        assert_eq!(rx.receive(), Err(BusError::Timeout));

        broker.ack_connection();
        broker.inject("robobot/drive/T0/gyro", "1 2 3 4");
        assert_eq!(rx.receive(), Ok(BusEvent::Connected));
        assert_eq!(
            rx.receive(),
            Ok(BusEvent::Message {
                topic: "robobot/drive/T0/gyro".to_string(),
                payload: "1 2 3 4".to_string()
            })
        );

        tx.publish("robobot/cmd/ti/rc", "0 0").unwrap();
        assert_eq!(broker.published_on("robobot/cmd/ti/rc"), vec!["0 0".to_string()]);
    }

    #[test]
    fn test_mock_publish_failure() {
        let (broker, _rx, mut tx) = MockBroker::new();
        broker.set_publish_failure(true);
        assert!(matches!(tx.publish("a", "b"), Err(BusError::Publish(_))));
        assert_eq!(broker.publish_attempts(), 1);
        assert!(broker.published().is_empty());
    }

    #[test]
    fn test_mock_disconnect_when_broker_dropped() {
        let (broker, mut rx, _tx) = MockBroker::new();
        drop(broker);
        assert_eq!(rx.receive(), Err(BusError::Disconnected));
    }
}
