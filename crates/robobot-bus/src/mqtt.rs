//! MQTT 后端
//!
//! 基于 rumqttc 同步客户端。`connect_mqtt()` 创建连接并订阅遥测前缀，
//! 返回可分别移动到不同线程的接收端和发送端。

use crate::{BusError, BusEvent, RxTransport, TxTransport};
use robobot_protocol::DRIVE_FILTER;
use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, MqttOptions, Packet, QoS, RecvTimeoutError,
};
use std::time::Duration;
use tracing::{debug, trace};

/// MQTT 连接参数
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// 单次接收的最长等待时间
    pub receive_timeout: Duration,
    /// 请求队列容量
    pub channel_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: crate::DEFAULT_PORT,
            client_id: format!("robobot-{}", std::process::id()),
            keep_alive: Duration::from_secs(5),
            receive_timeout: Duration::from_millis(50),
            channel_capacity: 64,
        }
    }
}

/// 创建 MQTT 连接并订阅 `robobot/drive/#`
///
/// 连接本身在接收端第一次轮询时建立；broker 不可达会在接收端以
/// `BusError::Connect` 报告。
pub fn connect_mqtt(settings: &MqttSettings) -> Result<(MqttRx, MqttTx), BusError> {
    let mut options = MqttOptions::new(
        settings.client_id.clone(),
        settings.host.clone(),
        settings.port,
    );
    options.set_keep_alive(settings.keep_alive);

    let (client, connection) = Client::new(options, settings.channel_capacity);

    client
        .subscribe(DRIVE_FILTER, QoS::AtMostOnce)
        .map_err(|e| BusError::Connect(e.to_string()))?;

    debug!(
        "MQTT client {} created for {}:{}",
        settings.client_id, settings.host, settings.port
    );

    Ok((
        MqttRx {
            connection,
            timeout: settings.receive_timeout,
            connected: false,
        },
        MqttTx { client },
    ))
}

/// MQTT 接收端
pub struct MqttRx {
    connection: Connection,
    timeout: Duration,
    connected: bool,
}

impl RxTransport for MqttRx {
    fn receive(&mut self) -> Result<BusEvent, BusError> {
        loop {
            let event = match self.connection.recv_timeout(self.timeout) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    // 首次连接之前的错误视为连接失败
                    return Err(if self.connected {
                        BusError::Connection(e.to_string())
                    } else {
                        BusError::Connect(e.to_string())
                    });
                },
                Err(RecvTimeoutError::Timeout) => return Err(BusError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(BusError::Disconnected),
            };

            match event {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BusError::Connect(format!("{:?}", ack.code)));
                    }
                    self.connected = true;
                    return Ok(BusEvent::Connected);
                },
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(BusEvent::Message {
                        topic: publish.topic,
                        payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                    });
                },
                other => {
                    trace!("MQTT event ignored: {:?}", other);
                },
            }
        }
    }
}

/// MQTT 发送端
#[derive(Clone)]
pub struct MqttTx {
    client: Client,
}

impl TxTransport for MqttTx {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}
